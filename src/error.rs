use crate::window::WindowId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TcmError {
    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    /// Временная ошибка окна (не отвечает, занято) - можно повторить попытку
    #[error("Временная ошибка окна: {0}")]
    Transient(String),

    /// Операция с окном не уложилась в window_operation_timeout
    #[error("Таймаут операции с окном после {0} секунд")]
    Timeout(u64),

    /// Окно больше не существует - повторять бессмысленно
    #[error("Окно {0} больше не существует")]
    WindowGone(WindowId),

    /// Не удалось прочитать текст окна - трактуется как "нет новых данных в этом цикле"
    #[error("Не удалось извлечь текст: {0}")]
    ReadFailure(String),

    /// Сам источник окон сломан - фатально, цикл мониторинга останавливается
    #[error("Источник окон недоступен: {0}")]
    SourceFailed(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl TcmError {
    /// Временная ли это ошибка, допускающая повтор отправки
    pub fn is_transient(&self) -> bool {
        matches!(self, TcmError::Transient(_) | TcmError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, TcmError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! tcm_error {
    (transient, $($arg:tt)*) => {
        $crate::error::TcmError::Transient(format!($($arg)*))
    };
    (read_failure, $($arg:tt)*) => {
        $crate::error::TcmError::ReadFailure(format!($($arg)*))
    };
    (source_failed, $($arg:tt)*) => {
        $crate::error::TcmError::SourceFailed(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::TcmError::ServiceUnavailable(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::TcmError::Internal(format!($($arg)*))
    };
}
