use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::warn;
use zpubsub_error::{ConfigError, ZResult};

use crate::error::PubSubError;

/// Разделитель пространства имён и имени канала.
pub const NAMESPACE_DELIMITER: char = ':';

/// Пользовательская функция построения ключа: `(имя, явный namespace)`.
pub type KeyBuilder = Arc<dyn Fn(&str, Option<&str>) -> String + Send + Sync>;

/// Реакция на входящий ключ с чужим пространством имён.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceMode {
    /// Предупреждение в лог, суффикс всё равно возвращается.
    #[default]
    Permissive,
    /// Несовпадение превращается в [`PubSubError::NamespaceMismatch`].
    Strict,
}

/// Построение и разбор ключей каналов и шаблонов с пространством имён.
#[derive(Clone, Default)]
pub struct NamespaceCodec {
    default_namespace: Option<String>,
    key_builder: Option<KeyBuilder>,
    mode: NamespaceMode,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl NamespaceCodec {
    /// Создаёт кодек с пространством имён по умолчанию.
    pub fn new(default_namespace: Option<String>) -> ZResult<Self> {
        if let Some(ns) = default_namespace.as_deref() {
            validate_namespace(ns)?;
        }
        Ok(Self {
            default_namespace,
            key_builder: None,
            mode: NamespaceMode::default(),
        })
    }

    pub fn with_key_builder(
        mut self,
        key_builder: KeyBuilder,
    ) -> Self {
        self.key_builder = Some(key_builder);
        self
    }

    pub fn with_mode(
        mut self,
        mode: NamespaceMode,
    ) -> Self {
        self.mode = mode;
        self
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    pub fn mode(&self) -> NamespaceMode {
        self.mode
    }

    /// Собирает ключ `"{namespace}:{name}"`.
    ///
    /// Явный `namespace` имеет приоритет над пространством по умолчанию; если
    /// нет ни того, ни другого, возвращается голое имя.
    pub fn build_key(
        &self,
        name: &str,
        namespace: Option<&str>,
    ) -> String {
        if let Some(builder) = &self.key_builder {
            return builder(name, namespace);
        }
        match namespace.or(self.default_namespace.as_deref()) {
            Some(ns) => format!("{ns}{NAMESPACE_DELIMITER}{name}"),
            None => name.to_string(),
        }
    }

    /// Снимает пространство имён с входящего ключа канала.
    ///
    /// Префикс считается своим, если он пуст, совпадает с явным `namespace`
    /// или с пространством по умолчанию.
    pub fn parse_key(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> ZResult<String> {
        let Some(expected) = namespace.or(self.default_namespace.as_deref()) else {
            return Ok(key.to_string());
        };
        let Some((prefix, rest)) = key.split_once(NAMESPACE_DELIMITER) else {
            return Ok(key.to_string());
        };

        let own = prefix.is_empty()
            || prefix == expected
            || Some(prefix) == self.default_namespace.as_deref();
        if !own {
            warn!(channel = %key, namespace = %expected, "Namespace mismatch on inbound key");
            if self.mode == NamespaceMode::Strict {
                return Err(PubSubError::NamespaceMismatch {
                    key: key.to_string(),
                    expected: expected.to_string(),
                }
                .into());
            }
        }

        Ok(rest.to_string())
    }

    /// Снимает пространство имён с шаблона из `pmessage`.
    pub fn parse_pattern(
        &self,
        pattern: &str,
        namespace: Option<&str>,
    ) -> ZResult<String> {
        self.parse_key(pattern, namespace)
    }
}

/// Пространство имён не может содержать разделитель.
pub fn validate_namespace(namespace: &str) -> ZResult<()> {
    if namespace.contains(NAMESPACE_DELIMITER) {
        return Err(ConfigError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: format!("must not contain '{NAMESPACE_DELIMITER}'"),
        }
        .into());
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for NamespaceCodec {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NamespaceCodec")
            .field("default_namespace", &self.default_namespace)
            .field("custom_key_builder", &self.key_builder.is_some())
            .field("mode", &self.mode)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
