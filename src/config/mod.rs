//! Конфигурация клиента: значения по умолчанию, файл и переменные
//! окружения.

pub mod settings;

pub use settings::*;
