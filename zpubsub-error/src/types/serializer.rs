use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки сериализации полезной нагрузки.
#[derive(Debug, Clone)]
pub enum SerializerError {
    /// Не удалось закодировать значение в текст
    Encode { reason: String },
    /// Не удалось декодировать текст сообщения
    Decode { reason: String },
}

impl std::fmt::Display for SerializerError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::Encode { reason } => write!(f, "Failed to encode payload: {reason}"),
            Self::Decode { reason } => write!(f, "Failed to decode payload: {reason}"),
        }
    }
}

impl std::error::Error for SerializerError {}

impl ErrorExt for SerializerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Encode { .. } => StatusCode::SerializationFailed,
            Self::Decode { .. } => StatusCode::DeserializationFailed,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", "serializer".to_string()),
            ("status_code", self.status_code().to_string()),
        ]
    }
}

/// Конвертация из serde_json::Error
///
/// Ошибки синтаксиса и данных относятся к декодированию, остальное к
/// кодированию.
#[cfg(feature = "serde_json")]
impl From<serde_json::Error> for SerializerError {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        match err.classify() {
            Category::Syntax | Category::Data | Category::Eof => SerializerError::Decode {
                reason: err.to_string(),
            },
            Category::Io => SerializerError::Encode {
                reason: err.to_string(),
            },
        }
    }
}
