use super::{run_tool, strip_ansi_sequences, TerminalBackend};
use crate::config::Config;
use crate::error::{Result, TcmError};
use crate::keys::{self, KeySegment};
use crate::tcm_error;
use crate::window::{ProcessContext, WindowId};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Бэкенд поверх WezTerm CLI: `wezterm cli list --format json`,
/// `wezterm cli get-text`, `wezterm cli send-text`
pub struct WeztermBackend {
    config: Arc<Config>,
}

/// Запись панели из вывода `wezterm cli list --format json`
#[derive(Debug, Deserialize)]
struct PaneEntry {
    pane_id: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    foreground_process_name: String,
}

impl WeztermBackend {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    fn is_gone(stderr: &str) -> bool {
        let lower = stderr.to_lowercase();
        lower.contains("no pane") || lower.contains("could not find pane")
    }

    /// Имя процесса из полного пути исполняемого файла
    fn process_basename(path: &str) -> &str {
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }
}

#[async_trait::async_trait]
impl TerminalBackend for WeztermBackend {
    fn name(&self) -> &'static str {
        "wezterm"
    }

    async fn probe(&self) -> Result<()> {
        let output = run_tool(
            "wezterm",
            vec![
                "cli".to_string(),
                "list".to_string(),
                "--format".to_string(),
                "json".to_string(),
            ],
        )
        .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(tcm_error!(
                service_unavailable,
                "wezterm cli list: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    async fn list_windows(&self) -> Result<Vec<(WindowId, ProcessContext)>> {
        let output = run_tool(
            "wezterm",
            vec![
                "cli".to_string(),
                "list".to_string(),
                "--format".to_string(),
                "json".to_string(),
            ],
        )
        .await
        .map_err(|e| tcm_error!(source_failed, "wezterm недоступен: {e}"))?;

        if !output.status.success() {
            return Err(tcm_error!(
                source_failed,
                "wezterm cli list вернул ошибку: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let panes: Vec<PaneEntry> = serde_json::from_slice(&output.stdout)
            .map_err(|e| tcm_error!(source_failed, "Неверный JSON от wezterm: {e}"))?;

        let mut windows = Vec::new();
        for pane in panes {
            let process = Self::process_basename(&pane.foreground_process_name);
            if process.is_empty() || !self.config.is_target_process(process) {
                continue;
            }
            windows.push((
                WindowId::new(pane.pane_id.to_string()),
                ProcessContext::new(process, &pane.title),
            ));
        }

        debug!("wezterm: найдено {} целевых панелей", windows.len());
        Ok(windows)
    }

    async fn read_text(&self, id: &WindowId) -> Result<String> {
        let output = run_tool(
            "wezterm",
            vec![
                "cli".to_string(),
                "get-text".to_string(),
                "--pane-id".to_string(),
                id.as_str().to_string(),
            ],
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_gone(&stderr) {
                return Err(TcmError::WindowGone(id.clone()));
            }
            return Err(tcm_error!(read_failure, "wezterm get-text: {}", stderr.trim()));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(strip_ansi_sequences(&text))
    }

    async fn send_keys(&self, id: &WindowId, sequence: &str) -> Result<()> {
        // send-text умеет только текст: спец-клавиши переводятся в
        // буквальные эквиваленты, где они есть
        let mut payload = String::new();
        for segment in keys::parse_sequence(sequence)? {
            match segment {
                KeySegment::Text(text) => payload.push_str(&text),
                KeySegment::Special(key) => match key.as_literal() {
                    Some(literal) => payload.push_str(literal),
                    None => {
                        return Err(TcmError::Internal(format!(
                            "Клавиша {key} не поддерживается бэкендом wezterm"
                        )))
                    }
                },
            }
        }

        let output = run_tool(
            "wezterm",
            vec![
                "cli".to_string(),
                "send-text".to_string(),
                "--no-paste".to_string(),
                "--pane-id".to_string(),
                id.as_str().to_string(),
                payload,
            ],
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_gone(&stderr) {
                return Err(TcmError::WindowGone(id.clone()));
            }
            return Err(tcm_error!(transient, "wezterm send-text: {}", stderr.trim()));
        }

        debug!("wezterm: последовательность '{}' отправлена в {}", sequence, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_basename() {
        assert_eq!(WeztermBackend::process_basename("/usr/bin/bash"), "bash");
        assert_eq!(WeztermBackend::process_basename("zsh"), "zsh");
        assert_eq!(
            WeztermBackend::process_basename("C:\\Windows\\system32\\cmd.exe"),
            "cmd.exe"
        );
    }

    #[test]
    fn test_pane_entry_parsing() {
        let json = r#"[
            {"pane_id": 7, "title": "build", "foreground_process_name": "/usr/bin/bash"},
            {"pane_id": 8, "tab_id": 1}
        ]"#;
        let panes: Vec<PaneEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].pane_id, 7);
        assert_eq!(panes[1].foreground_process_name, "");
    }
}
