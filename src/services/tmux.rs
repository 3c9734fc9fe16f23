use super::{run_tool, strip_ansi_sequences, TerminalBackend};
use crate::config::Config;
use crate::error::{Result, TcmError};
use crate::keys::{self, KeySegment};
use crate::tcm_error;
use crate::window::{ProcessContext, WindowId};
use std::sync::Arc;
use tracing::debug;

/// Бэкенд поверх tmux: панели перечисляются через `list-panes`,
/// текст читается `capture-pane`, клавиши отправляются `send-keys`
pub struct TmuxBackend {
    config: Arc<Config>,
}

impl TmuxBackend {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Исчезла ли панель, судя по stderr
    fn is_gone(stderr: &str) -> bool {
        let lower = stderr.to_lowercase();
        lower.contains("can't find pane") || lower.contains("can't find window")
    }
}

#[async_trait::async_trait]
impl TerminalBackend for TmuxBackend {
    fn name(&self) -> &'static str {
        "tmux"
    }

    async fn probe(&self) -> Result<()> {
        let output = run_tool("tmux", vec!["list-panes".to_string(), "-a".to_string()]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(tcm_error!(
                service_unavailable,
                "tmux list-panes: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }

    async fn list_windows(&self) -> Result<Vec<(WindowId, ProcessContext)>> {
        let format = "#{pane_id}\t#{pane_current_command}\t#{pane_title}\t#{pane_start_command}";
        let output = run_tool(
            "tmux",
            vec![
                "list-panes".to_string(),
                "-a".to_string(),
                "-F".to_string(),
                format.to_string(),
            ],
        )
        .await
        .map_err(|e| tcm_error!(source_failed, "tmux недоступен: {e}"))?;

        if !output.status.success() {
            return Err(tcm_error!(
                source_failed,
                "tmux list-panes вернул ошибку: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut windows = Vec::new();

        for line in stdout.lines() {
            let mut parts = line.splitn(4, '\t');
            let (Some(pane_id), Some(command)) = (parts.next(), parts.next()) else {
                continue;
            };
            let title = parts.next().unwrap_or("");
            let start_command = parts.next().unwrap_or("");

            if !self.config.is_target_process(command) {
                continue;
            }

            let mut context = ProcessContext::new(command, title);
            if !start_command.is_empty() {
                context = context.with_command_line(start_command);
            }
            windows.push((WindowId::new(pane_id), context));
        }

        debug!("tmux: найдено {} целевых панелей", windows.len());
        Ok(windows)
    }

    async fn read_text(&self, id: &WindowId) -> Result<String> {
        let output = run_tool(
            "tmux",
            vec![
                "capture-pane".to_string(),
                "-p".to_string(),
                "-t".to_string(),
                id.as_str().to_string(),
            ],
        )
        .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if Self::is_gone(&stderr) {
                return Err(TcmError::WindowGone(id.clone()));
            }
            return Err(tcm_error!(read_failure, "tmux capture-pane: {}", stderr.trim()));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        Ok(strip_ansi_sequences(&text))
    }

    async fn send_keys(&self, id: &WindowId, sequence: &str) -> Result<()> {
        let segments = keys::parse_sequence(sequence)?;

        for segment in segments {
            let mut args = vec![
                "send-keys".to_string(),
                "-t".to_string(),
                id.as_str().to_string(),
            ];
            match segment {
                // -l отключает разбор имён клавиш: текст уходит буквально
                KeySegment::Text(text) => {
                    args.push("-l".to_string());
                    args.push(text);
                }
                KeySegment::Special(key) => args.push(key.tmux_name()),
            }

            let output = run_tool("tmux", args).await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                if Self::is_gone(&stderr) {
                    return Err(TcmError::WindowGone(id.clone()));
                }
                return Err(tcm_error!(transient, "tmux: {}", stderr.trim()));
            }
        }

        debug!("tmux: последовательность '{}' отправлена в {}", sequence, id);
        Ok(())
    }
}
