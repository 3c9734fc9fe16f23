use super::TerminalBackend;
use crate::error::Result;
use crate::window::{ProcessContext, WindowId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Режим сухого запуска: эмулирует две панели без реальных действий.
/// Текст первой панели замирает после нескольких чтений, чтобы детекция
/// неактивности и отправка клавиш были видны в логах.
pub struct DryRunBackend {
    read_counts: Mutex<HashMap<WindowId, u64>>,
}

/// После стольких чтений текст панели dry-0 перестаёт меняться
const FREEZE_AFTER_READS: u64 = 3;

impl DryRunBackend {
    pub fn new() -> Self {
        Self {
            read_counts: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for DryRunBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TerminalBackend for DryRunBackend {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn list_windows(&self) -> Result<Vec<(WindowId, ProcessContext)>> {
        Ok(vec![
            (
                WindowId::new("dry-0"),
                ProcessContext::new("bash", "Terminal - dry_run (замирающая)"),
            ),
            (
                WindowId::new("dry-1"),
                ProcessContext::new("bash", "Terminal - dry_run (активная)"),
            ),
        ])
    }

    async fn read_text(&self, id: &WindowId) -> Result<String> {
        let mut counts = self.read_counts.lock();
        let count = counts.entry(id.clone()).or_insert(0);
        *count += 1;

        let text = if id.as_str() == "dry-0" && *count > FREEZE_AFTER_READS {
            // Панель замерла - текст больше не меняется
            format!("$ long-running-build\nшаг {FREEZE_AFTER_READS} из 100 ...")
        } else {
            format!("$ long-running-build\nшаг {count} из 100 ...")
        };
        Ok(text)
    }

    async fn send_keys(&self, id: &WindowId, sequence: &str) -> Result<()> {
        info!("[DRY RUN] Отправка '{}' в окно {}", sequence, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_pane_freezes() {
        let backend = DryRunBackend::new();
        let frozen = WindowId::new("dry-0");

        let mut texts = Vec::new();
        for _ in 0..6 {
            texts.push(backend.read_text(&frozen).await.unwrap());
        }

        // Первые чтения меняются, после заморозки текст стабилен
        assert_ne!(texts[0], texts[1]);
        assert_eq!(texts[3], texts[4]);
        assert_eq!(texts[4], texts[5]);
    }

    #[tokio::test]
    async fn test_active_pane_keeps_changing() {
        let backend = DryRunBackend::new();
        let active = WindowId::new("dry-1");

        let first = backend.read_text(&active).await.unwrap();
        for _ in 0..5 {
            backend.read_text(&active).await.unwrap();
        }
        let last = backend.read_text(&active).await.unwrap();
        assert_ne!(first, last);
    }

    #[tokio::test]
    async fn test_send_keys_is_noop() {
        let backend = DryRunBackend::new();
        let id = WindowId::new("dry-0");
        assert!(backend.send_keys(&id, "continue{ENTER}").await.is_ok());
    }
}
