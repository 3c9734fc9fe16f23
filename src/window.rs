use serde::{Deserialize, Serialize};
use std::fmt;

/// Стабильный идентификатор окна/панели, назначаемый источником окон.
/// Для ядра мониторинга непрозрачен - используется только как ключ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(String);

impl WindowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Метаданные процесса-владельца окна, снятые один раз при обнаружении
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessContext {
    pub process_name: String,
    pub title: String,
    pub command_line: Option<String>,
}

impl ProcessContext {
    pub fn new(process_name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            title: title.into(),
            command_line: None,
        }
    }

    pub fn with_command_line(mut self, command_line: impl Into<String>) -> Self {
        self.command_line = Some(command_line.into());
        self
    }
}

impl fmt::Display for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "{}", self.process_name)
        } else {
            write!(f, "{} (\"{}\")", self.process_name, self.title)
        }
    }
}
