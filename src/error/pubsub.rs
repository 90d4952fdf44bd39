use std::{any::Any, time::Duration};

use thiserror::Error;
use zpubsub_error::{ErrorExt, StatusCode};

use crate::pubsub::Role;

/// Ошибки уровня pub/sub клиента.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubSubError {
    #[error("role is already set to {current}, cannot use connection as {requested}")]
    RoleConflict { current: Role, requested: Role },

    #[error("connection role is not set; call subscribe or publish first")]
    RoleUnset,

    #[error("operation {operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("pub/sub client is closed")]
    Closed,

    #[error("bad channel: {key} ns:{expected}")]
    NamespaceMismatch { key: String, expected: String },
}

impl ErrorExt for PubSubError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RoleConflict { .. } => StatusCode::RoleConflict,
            Self::RoleUnset => StatusCode::RoleUnset,
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::Closed => StatusCode::ConnectionClosed,
            Self::NamespaceMismatch { .. } => StatusCode::NamespaceMismatch,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "pubsub".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::RoleConflict { requested, .. } => tags.push(("role", requested.to_string())),
            Self::Timeout { operation, .. } => tags.push(("operation", operation.to_string())),
            _ => {}
        }

        tags
    }
}

#[cfg(test)]
mod tests {
    use zpubsub_error::StackError;

    use super::*;

    /// Тест проверяет, что конфликт ролей является ошибкой использования и
    /// не повторяется.
    #[test]
    fn test_role_conflict_is_usage_error() {
        let err = PubSubError::RoleConflict {
            current: Role::Subscriber,
            requested: Role::Publisher,
        };
        assert!(err.status_code().is_usage_error());
        assert!(!err.status_code().is_retryable());
        assert_eq!(
            err.to_string(),
            "role is already set to subscriber, cannot use connection as publisher"
        );
    }

    /// Тест проверяет downcast из StackError обратно в PubSubError.
    #[test]
    fn test_timeout_roundtrip_through_stack() {
        let stack: StackError = PubSubError::Timeout {
            operation: "publish",
            after: Duration::from_millis(20),
        }
        .into();
        assert!(stack.is_retryable());
        assert!(matches!(
            stack.downcast_ref::<PubSubError>(),
            Some(PubSubError::Timeout {
                operation: "publish",
                ..
            })
        ));
    }
}
