use crate::config::Config;
use crate::state::WindowState;
use std::sync::Arc;
use tracing::debug;

/// Отправщик настольных уведомлений о выполненных действиях.
/// Тонкая обёртка над `notify-send`; при выключенной настройке - no-op.
pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(config: &Arc<Config>) -> Self {
        Self {
            enabled: config.notifications.desktop_notifications,
        }
    }

    /// Уведомить об отправке клавиш неактивному окну.
    /// Сбой доставки не влияет на мониторинг - только debug-лог.
    pub async fn notify_action(&self, state: &WindowState, idle_secs: u64) {
        if !self.enabled {
            return;
        }

        let summary = "Terminal Continue Monitor".to_string();
        let body = format!(
            "Отправлены клавиши в {} ({}) после {} секунд неактивности",
            state.process_name, state.id, idle_secs
        );

        let result = tokio::task::spawn_blocking(move || {
            std::process::Command::new("notify-send")
                .arg(&summary)
                .arg(&body)
                .output()
        })
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {}
            Ok(Ok(output)) => {
                debug!(
                    "notify-send вернул ошибку: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Ok(Err(e)) => debug!("notify-send недоступен: {}", e),
            Err(e) => debug!("Задача уведомления прервана: {}", e),
        }
    }
}
