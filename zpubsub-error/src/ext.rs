use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок библиотеки (object-safe).
///
/// Предоставляет вспомогательные методы для работы с ошибками:
/// - извлечение статус-кода,
/// - безопасное сообщение для вызывающего кода,
/// - детализированное сообщение для логов,
/// - теги для систем наблюдаемости.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Статус ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any), чтобы можно было
    /// выполнить downcast к конкретному типу.
    fn as_any(&self) -> &dyn Any;

    /// Безопасное сообщение для вызывающего кода.
    ///
    /// Для внутренних ошибок не раскрывает деталей и возвращает
    /// `"Internal error"`.
    fn client_message(&self) -> String {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal | StatusCode::Unexpected => {
                "Internal error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Детализированное сообщение для логов (Debug-представление).
    fn log_message(&self) -> String {
        format!("{self:?}")
    }

    /// Набор тегов для метрик: пары ключ–значение.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ]
    }

    /// Короткое имя типа ошибки (без пути модулей).
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{any::Any, error::Error, fmt};

    use super::*;

    // Ошибка без переопределения status_code (default = Internal).
    #[derive(Debug)]
    struct DefaultError(pub &'static str);

    impl fmt::Display for DefaultError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "DefaultError: {}", self.0)
        }
    }

    impl Error for DefaultError {}

    impl ErrorExt for DefaultError {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct ConflictError;

    impl fmt::Display for ConflictError {
        fn fmt(
            &self,
            f: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            write!(f, "role conflict")
        }
    }

    impl Error for ConflictError {}

    impl ErrorExt for ConflictError {
        fn status_code(&self) -> StatusCode {
            StatusCode::RoleConflict
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Тест проверяет, что по умолчанию статус ошибки — `Internal`, а
    /// сообщение для вызывающего скрывает детали.
    #[test]
    fn test_default_status_and_client_message() {
        let e = DefaultError("sensitive");
        assert_eq!(e.status_code(), StatusCode::Internal);
        assert_eq!(e.client_message(), "Internal error");
    }

    /// Тест проверяет, что для не-internal кодов `client_message` совпадает
    /// с `Display`.
    #[test]
    fn test_client_message_non_internal() {
        let e = ConflictError;
        assert_eq!(e.client_message(), e.to_string());
    }

    /// Тест проверяет downcast через `as_any`.
    #[test]
    fn test_as_any_downcast() {
        let e = DefaultError("x");
        let down = e.as_any().downcast_ref::<DefaultError>();
        assert_eq!(down.unwrap().0, "x");
    }

    /// Тест проверяет теги метрик и короткое имя типа.
    #[test]
    fn test_metrics_tags_and_type_name() {
        let e = ConflictError;
        let tags = e.metrics_tags();
        assert!(tags
            .iter()
            .any(|(k, v)| *k == "status_code" && v == &StatusCode::RoleConflict.to_string()));
        assert!(e.type_name().ends_with("ConflictError"));
    }
}
