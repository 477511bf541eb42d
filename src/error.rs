use thiserror::Error;

use crate::events::WindowId;

#[derive(Error, Debug)]
pub enum CompleteError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Инструмент автодополнения не найден: {0}")]
    ToolNotFound(String),

    #[error("Автодополнение завершилось с ошибкой: {status} (вывод: {output})")]
    CompletionFailed { status: String, output: String },

    #[error("Редактор отклонил возвращённое событие: {0}")]
    EventResubmitFailed(String),

    #[error("Не удалось открыть окно {id}: {reason}")]
    WindowOpenFailed { id: WindowId, reason: String },

    #[error("Не удалось прочитать тег окна: {0}")]
    TagReadFailed(String),

    #[error("Потеряна подписка на журнал окон acme: {0}")]
    LogSubscriptionLost(String),

    #[error("Некорректное событие: {0}")]
    MalformedEvent(String),

    #[error("Ошибка протокола 9P: {0}")]
    Protocol(String),
}

impl CompleteError {
    pub fn protocol<T>(msg: impl Into<String>) -> Result<T> {
        Err(CompleteError::Protocol(msg.into()))
    }

    pub fn malformed<T>(msg: impl Into<String>) -> Result<T> {
        Err(CompleteError::MalformedEvent(msg.into()))
    }
}

pub type Result<T> = std::result::Result<T, CompleteError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! acme_error {
    (protocol, $($arg:tt)*) => {
        $crate::error::CompleteError::Protocol(format!($($arg)*))
    };
    (malformed, $($arg:tt)*) => {
        $crate::error::CompleteError::MalformedEvent(format!($($arg)*))
    };
    (tool_not_found, $($arg:tt)*) => {
        $crate::error::CompleteError::ToolNotFound(format!($($arg)*))
    };
    (tag_read, $($arg:tt)*) => {
        $crate::error::CompleteError::TagReadFailed(format!($($arg)*))
    };
    (log_lost, $($arg:tt)*) => {
        $crate::error::CompleteError::LogSubscriptionLost(format!($($arg)*))
    };
}
