use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use zpubsub_error::{ConfigError, ZResult};

use crate::pubsub::{validate_namespace, NamespaceMode};

/// Переменная окружения с путём к файлу конфигурации.
pub const CONFIG_PATH_ENV: &str = "ZPUBSUB_CONFIG";
/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "ZPUBSUB";
/// Таймаут операций по умолчанию, секунды.
pub const DEFAULT_TIMEOUT_SECS: f64 = 500.0;
/// Шаг опроса транспорта в `listen` по умолчанию, миллисекунды.
pub const DEFAULT_LISTEN_POLL_MS: u64 = 100;

/// Параметры подключения, передаваемые транспорту как есть.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportParams {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub socket_connect_timeout_secs: Option<f64>,
}

/// Настройки клиента pub/sub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubSettings {
    /// Имя бэкенда в реестре (`"redis"`, `"memory"`)
    pub backend: String,
    /// Пространство имён по умолчанию
    pub namespace: Option<String>,
    /// Таймаут операций; `0` или отсутствие — без ограничения
    pub timeout_secs: Option<f64>,
    /// Отклонять входящие ключи с чужим пространством имён
    pub strict_namespace: bool,
    /// Шаг опроса транспорта в `listen`
    pub listen_poll_ms: u64,
    pub transport: TransportParams,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl TransportParams {
    /// `host:port` для логов и ошибок.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL вида `redis://[user@]host:port/db` для логов; пароль скрыт.
    ///
    /// Для подключения не используется: учётные данные передаются
    /// транспорту как есть, без экранирования.
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(_)) => format!("{user}:***@"),
            (None, Some(_)) => ":***@".to_string(),
            (Some(user), None) => format!("{user}@"),
            (None, None) => String::new(),
        };
        format!("redis://{auth}{}:{}/{}", self.host, self.port, self.db)
    }

    pub fn socket_connect_timeout(&self) -> Option<Duration> {
        self.socket_connect_timeout_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

impl PubSubSettings {
    /// Загружает настройки: значения по умолчанию, затем файл из
    /// `ZPUBSUB_CONFIG` (если задан), затем переменные окружения
    /// `ZPUBSUB_*` (вложенные ключи через `__`).
    pub fn load() -> ZResult<Self> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("backend", defaults.backend.clone())
            .and_then(|b| b.set_default("listen_poll_ms", defaults.listen_poll_ms))
            .and_then(|b| b.set_default("strict_namespace", defaults.strict_namespace))
            .and_then(|b| b.set_default("transport.host", defaults.transport.host.clone()))
            .and_then(|b| b.set_default("transport.port", i64::from(defaults.transport.port)))
            .and_then(|b| b.set_default("transport.db", defaults.transport.db))
            .map_err(load_error)?;

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path));
        }

        let settings: Self = builder
            // Добавляем переменные окружения с префиксом ZPUBSUB_
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(load_error)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Проверяет значения, не зависящие от реестра бэкендов.
    pub fn validate(&self) -> ZResult<()> {
        if let Some(ns) = self.namespace.as_deref() {
            validate_namespace(ns)?;
        }
        if let Some(secs) = self.timeout_secs {
            check_timeout_secs(secs)?;
        }
        if self.transport.port == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "transport.port".to_string(),
                reason: "must be non-zero".to_string(),
            }
            .into());
        }
        if self.listen_poll_ms == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "listen_poll_ms".to_string(),
                reason: "must be non-zero".to_string(),
            }
            .into());
        }
        if let Some(secs) = self.transport.socket_connect_timeout_secs {
            check_timeout_secs(secs)?;
        }
        Ok(())
    }

    /// Таймаут операций; `None` — без ограничения.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn listen_poll_interval(&self) -> Duration {
        Duration::from_millis(self.listen_poll_ms)
    }

    pub fn namespace_mode(&self) -> NamespaceMode {
        if self.strict_namespace {
            NamespaceMode::Strict
        } else {
            NamespaceMode::Permissive
        }
    }
}

/// Таймаут должен быть неотрицательным и представимым как [`Duration`].
fn check_timeout_secs(secs: f64) -> ZResult<()> {
    if secs < 0.0 || Duration::try_from_secs_f64(secs).is_err() {
        return Err(ConfigError::InvalidTimeout { value: secs }.into());
    }
    Ok(())
}

fn load_error(err: config::ConfigError) -> ConfigError {
    ConfigError::Load {
        reason: err.to_string(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
            socket_connect_timeout_secs: None,
        }
    }
}

impl Default for PubSubSettings {
    fn default() -> Self {
        Self {
            backend: default_backend().to_string(),
            namespace: None,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            strict_namespace: false,
            listen_poll_ms: DEFAULT_LISTEN_POLL_MS,
            transport: TransportParams::default(),
        }
    }
}

#[cfg(feature = "redis")]
fn default_backend() -> &'static str {
    "redis"
}

#[cfg(not(feature = "redis"))]
fn default_backend() -> &'static str {
    "memory"
}
