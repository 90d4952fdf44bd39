use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки транспорта: подключение к брокеру и выполнение команд.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Не удалось подключиться к брокеру
    ConnectionFailed { address: String, reason: String },
    /// Команда брокеру завершилась ошибкой
    CommandFailed { command: String, reason: String },
    /// Соединение закрыто
    ConnectionClosed,
    /// Невалидный glob паттерн подписки
    InvalidPattern { pattern: String, reason: String },
    /// Транспорт не собран в этой сборке (выключена feature)
    Unavailable { backend: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed { address, reason } => {
                write!(f, "Failed to connect to {address}: {reason}")
            }
            Self::CommandFailed { command, reason } => {
                write!(f, "Transport command {command} failed: {reason}")
            }
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid glob pattern '{pattern}': {reason}")
            }
            Self::Unavailable { backend } => {
                write!(f, "Transport '{backend}' is not available in this build")
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl ErrorExt for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ConnectionFailed { .. } => StatusCode::ConnectionFailed,
            Self::CommandFailed { .. } => StatusCode::TransportFailure,
            Self::ConnectionClosed => StatusCode::ConnectionClosed,
            Self::InvalidPattern { .. } => StatusCode::InvalidArgs,
            Self::Unavailable { .. } => StatusCode::Unsupported,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn client_message(&self) -> String {
        match self {
            Self::ConnectionFailed { address, .. } => format!("Failed to connect to {address}"),
            Self::CommandFailed { command, .. } => format!("Transport command {command} failed"),
            Self::ConnectionClosed => "Connection closed".to_string(),
            Self::InvalidPattern { pattern, .. } => format!("Invalid pattern: {pattern}"),
            Self::Unavailable { backend } => format!("Transport '{backend}' is unavailable"),
        }
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "transport".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::ConnectionFailed { address, .. } => {
                tags.push(("address", address.clone()));
            }
            Self::CommandFailed { command, .. } => {
                tags.push(("command", command.clone()));
            }
            Self::Unavailable { backend } => {
                tags.push(("backend", backend.clone()));
            }
            _ => {}
        }

        tags
    }
}

/// Конвертация из globset::Error
#[cfg(feature = "globset")]
impl From<globset::Error> for TransportError {
    fn from(err: globset::Error) -> Self {
        TransportError::InvalidPattern {
            pattern: err.glob().unwrap_or_default().to_string(),
            reason: err.kind().to_string(),
        }
    }
}
