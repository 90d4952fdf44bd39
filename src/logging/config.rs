use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::LoggingInitError;

/// Переменная окружения, перекрывающая уровень логирования.
pub const LOG_LEVEL_ENV: &str = "ZPUBSUB_LOG_LEVEL";
/// Переменная окружения, перекрывающая формат вывода.
pub const LOG_FORMAT_ENV: &str = "ZPUBSUB_LOG_FORMAT";

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Периодичность ротации файла логов.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Настройки вывода в консоль.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
}

/// Настройки файлового вывода.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    pub file_name: String,
    pub rotation: Rotation,
    /// Формат файла; по умолчанию JSON
    pub format: LogFormat,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Базовый уровень (`trace`..`error`)
    pub level: String,
    /// Формат консольного вывода
    pub format: LogFormat,
    pub console: ConsoleConfig,
    /// Файловый вывод; `None` отключает его
    pub file: Option<FileConfig>,
    /// Уровни по целям, например `zpubsub::transport = "debug"`
    pub targets: BTreeMap<String, String>,
}

impl FromStr for LogFormat {
    type Err = LoggingInitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(LoggingInitError::InvalidFormat(s.to_string())),
        }
    }
}

impl LoggingConfig {
    /// Применяет `ZPUBSUB_LOG_LEVEL` и `ZPUBSUB_LOG_FORMAT`.
    ///
    /// Нераспознанный формат оставляет значение из конфигурации.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            self.level = level.to_ascii_lowercase();
        }
        if let Ok(format) = std::env::var(LOG_FORMAT_ENV) {
            if let Ok(format) = format.parse() {
                self.format = format;
            }
        }
    }

    pub fn validate(&self) -> Result<(), LoggingInitError> {
        let is_level = |s: &str| LEVELS.contains(&s.to_ascii_lowercase().as_str());

        if !is_level(&self.level) {
            return Err(LoggingInitError::InvalidLevel(self.level.clone()));
        }
        for (target, level) in &self.targets {
            if target.is_empty() || target.contains([',', '=']) || !is_level(level) {
                return Err(LoggingInitError::InvalidDirective {
                    directive: format!("{target}={level}"),
                    reason: "expected <target>=<level>".to_string(),
                });
            }
        }
        if let Some(file) = &self.file {
            if file.file_name.is_empty() {
                return Err(LoggingInitError::InvalidDirective {
                    directive: "file.file_name".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Директива для `EnvFilter`: `"info,zpubsub::transport=debug"`.
    pub fn build_filter_directive(&self) -> String {
        let mut directive = self.level.to_ascii_lowercase();
        for (target, level) in &self.targets {
            directive.push(',');
            directive.push_str(target);
            directive.push('=');
            directive.push_str(&level.to_ascii_lowercase());
        }
        directive
    }

    /// Создаёт каталог файлового вывода, если он включён.
    pub fn ensure_log_dir(&self) -> Result<(), LoggingInitError> {
        if let Some(file) = &self.file {
            std::fs::create_dir_all(&file.directory)?;
        }
        Ok(())
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "zpubsub.log".to_string(),
            rotation: Rotation::default(),
            format: LogFormat::Json,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            console: ConsoleConfig::default(),
            file: None,
            targets: BTreeMap::new(),
        }
    }
}
