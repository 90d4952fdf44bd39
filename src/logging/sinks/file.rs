use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::{
    config::{FileConfig, LoggingConfig, Rotation},
    formatter,
};

/// Файловый слой с ротацией и неблокирующей записью.
///
/// Возвращённый [`WorkerGuard`] должен жить до завершения логирования,
/// иначе хвост буфера теряется.
pub fn layer_with_config<S>(
    config: &LoggingConfig,
    file: &FileConfig,
) -> (Box<dyn LayerTrait<S> + Send + Sync>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let appender = match file.rotation {
        Rotation::Daily => rolling::daily(&file.directory, &file.file_name),
        Rotation::Hourly => rolling::hourly(&file.directory, &file.file_name),
        Rotation::Never => rolling::never(&file.directory, &file.file_name),
    };
    let (writer, guard) = non_blocking(appender);

    let layer = formatter::build_layer(&config.console, file.format, writer, false);
    (layer, guard)
}
