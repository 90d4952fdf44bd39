use std::any::Any;

use crate::{ErrorExt, StatusCode};

/// Ошибки конфигурации клиента и выбора бэкенда.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Недопустимое пространство имён (например, содержит `:`)
    InvalidNamespace { namespace: String, reason: String },
    /// Отрицательный или нечисловой таймаут
    InvalidTimeout { value: f64 },
    /// Бэкенд с таким именем не зарегистрирован
    UnknownBackend { name: String, available: Vec<String> },
    /// Недопустимое значение параметра
    InvalidParameter { name: String, reason: String },
    /// Ошибка загрузки источников конфигурации
    Load { reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Self::InvalidNamespace { namespace, reason } => {
                write!(f, "Invalid namespace '{namespace}': {reason}")
            }
            Self::InvalidTimeout { value } => {
                write!(
                    f,
                    "Invalid timeout {value}: must be a non-negative, representable number of seconds"
                )
            }
            Self::UnknownBackend { name, available } => {
                write!(
                    f,
                    "Unknown pub/sub backend '{name}' (available: {})",
                    available.join(", ")
                )
            }
            Self::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{name}': {reason}")
            }
            Self::Load { reason } => write!(f, "Failed to load configuration: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ErrorExt for ConfigError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidNamespace { .. } => StatusCode::InvalidNamespace,
            Self::InvalidTimeout { .. } => StatusCode::InvalidParameter,
            Self::UnknownBackend { .. } => StatusCode::UnknownBackend,
            Self::InvalidParameter { .. } => StatusCode::InvalidParameter,
            Self::Load { .. } => StatusCode::ConfigError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "config".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::UnknownBackend { name, .. } => tags.push(("backend", name.clone())),
            Self::InvalidParameter { name, .. } => tags.push(("parameter", name.clone())),
            _ => {}
        }

        tags
    }
}
