use thiserror::Error;

/// Ошибки инициализации логирования.
#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("invalid log format: {0}")]
    InvalidFormat(String),

    #[error("invalid filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("global subscriber is already set: {0}")]
    AlreadyInitialized(String),
}
