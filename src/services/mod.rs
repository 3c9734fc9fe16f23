//! Бэкенды терминалов: тонкий слой ввода-вывода поверх CLI
//! мультиплексора/эмулятора. Здесь только перечисление панелей с
//! метаданными процессов, чтение видимого текста и отправка клавиш;
//! детекция неактивности, отпечатки и политика повторов живут в ядре
//! мониторинга (`state`, `evaluate`, `dispatch`, `monitor`).

mod dry_run;
mod tmux;
mod wezterm;

pub use dry_run::DryRunBackend;
pub use tmux::TmuxBackend;
pub use wezterm::WeztermBackend;

use crate::config::Config;
use crate::error::{Result, TcmError};
use crate::window::{ProcessContext, WindowId};
use std::process::Output;
use std::sync::Arc;
use tracing::{info, warn};

/// Интерфейс бэкенда терминала: источник окон, чтение текста, отправка клавиш
#[async_trait::async_trait]
pub trait TerminalBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Быстрая самопроверка работоспособности бэкенда
    async fn probe(&self) -> Result<()>;

    /// Перечислить окна/панели, отфильтрованные по target_processes
    async fn list_windows(&self) -> Result<Vec<(WindowId, ProcessContext)>>;

    /// Прочитать видимый текст окна. WindowGone, если окно исчезло
    async fn read_text(&self, id: &WindowId) -> Result<String>;

    /// Отправить последовательность клавиш окну
    async fn send_keys(&self, id: &WindowId, sequence: &str) -> Result<()>;
}

/// Фабрика бэкенда по конфигурации и флагу dry_run.
/// В режиме "auto" бэкенды пробуются по очереди до первого рабочего.
pub async fn create_backend(
    config: Arc<Config>,
    dry_run: bool,
) -> Result<Arc<dyn TerminalBackend>> {
    if dry_run {
        return Ok(Arc::new(DryRunBackend::new()));
    }

    match config.backend.as_str() {
        "wezterm" => {
            let backend = Arc::new(WeztermBackend::new(config));
            backend.probe().await?;
            Ok(backend)
        }
        "tmux" => {
            let backend = Arc::new(TmuxBackend::new(config));
            backend.probe().await?;
            Ok(backend)
        }
        "auto" => {
            info!("Определяем рабочий бэкенд терминала...");

            let wezterm: Arc<dyn TerminalBackend> =
                Arc::new(WeztermBackend::new(config.clone()));
            if wezterm.probe().await.is_ok() {
                info!("Используем wezterm");
                return Ok(wezterm);
            }

            let tmux: Arc<dyn TerminalBackend> = Arc::new(TmuxBackend::new(config));
            if tmux.probe().await.is_ok() {
                info!("Используем tmux");
                return Ok(tmux);
            }

            warn!("Ни wezterm, ни tmux не отвечают");
            Err(TcmError::ServiceUnavailable(
                "Ни один бэкенд терминала не работает".to_string(),
            ))
        }
        other => Err(TcmError::Internal(format!(
            "Неизвестный бэкенд терминала: {other}"
        ))),
    }
}

/// Запустить внешнюю утилиту, не блокируя исполнитель tokio
pub(crate) async fn run_tool(program: &'static str, args: Vec<String>) -> Result<Output> {
    let output = tokio::task::spawn_blocking(move || {
        std::process::Command::new(program).args(&args).output()
    })
    .await
    .map_err(|e| TcmError::Internal(format!("Задача subprocess прервана: {e}")))??;
    Ok(output)
}

/// Убрать ANSI escape-последовательности из извлечённого текста, чтобы
/// мигание курсора и перекраска не считались активностью
pub(crate) fn strip_ansi_sequences(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\u{1b}' {
            result.push(ch);
            continue;
        }

        match chars.peek() {
            // CSI: ESC [ параметры ... финальный байт 0x40-0x7e
            Some('[') => {
                chars.next();
                for inner in chars.by_ref() {
                    if ('\u{40}'..='\u{7e}').contains(&inner) {
                        break;
                    }
                }
            }
            // OSC: ESC ] ... BEL или ESC \
            Some(']') => {
                chars.next();
                while let Some(inner) = chars.next() {
                    if inner == '\u{07}' {
                        break;
                    }
                    if inner == '\u{1b}' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            // Короткие последовательности вида ESC X
            Some(_) => {
                chars.next();
            }
            None => {}
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_csi() {
        let colored = "\u{1b}[32mока\u{1b}[0m текст\u{1b}[2J";
        assert_eq!(strip_ansi_sequences(colored), "ока текст");
    }

    #[test]
    fn test_strip_ansi_osc_title() {
        let with_title = "\u{1b}]0;window title\u{07}содержимое";
        assert_eq!(strip_ansi_sequences(with_title), "содержимое");
    }

    #[test]
    fn test_strip_ansi_plain_text_untouched() {
        let plain = "обычный текст\nстрока два";
        assert_eq!(strip_ansi_sequences(plain), plain);
    }

    #[tokio::test]
    async fn test_create_backend_dry_run() {
        let config = Arc::new(Config::default());
        let backend = create_backend(config, true).await.unwrap();
        assert_eq!(backend.name(), "dry-run");
    }

    #[tokio::test]
    async fn test_create_backend_rejects_unknown() {
        let mut config = Config::default();
        config.backend = "screen".to_string();
        let result = create_backend(Arc::new(config), false).await;
        assert!(result.is_err());
    }
}
