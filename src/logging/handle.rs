use std::{
    fmt,
    time::{Duration, Instant},
};

use tracing_appender::non_blocking::WorkerGuard;

/// Владеет фоновыми writer'ами логирования.
///
/// Пока handle жив, файловый вывод сбрасывается в фоне; [`LoggingHandle::shutdown`]
/// дожидается записи остатка буфера.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    /// Порог, после которого медленное завершение попадает в stderr
    flush_timeout: Duration,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            flush_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_flush_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    /// Сбрасывает буферы и завершает фоновые writer'ы.
    pub fn shutdown(mut self) {
        tracing::info!("Initiating logging shutdown");
        let start = Instant::now();
        drop(self.file_guard.take());

        let elapsed = start.elapsed();
        if elapsed > self.flush_timeout {
            eprintln!(
                "WARNING: Logging shutdown took {}ms (timeout: {}ms)",
                elapsed.as_millis(),
                self.flush_timeout.as_millis()
            );
        }
    }

    /// Завершение из async-контекста: сброс идёт в блокирующем потоке.
    pub async fn shutdown_async(mut self) {
        tracing::info!("Initiating logging shutdown");
        let guard = self.file_guard.take();
        let limit = self.flush_timeout;

        match tokio::time::timeout(limit, tokio::task::spawn_blocking(move || drop(guard))).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => eprintln!("Logging shutdown task panicked: {e}"),
            Err(_) => eprintln!(
                "WARNING: Logging shutdown exceeded timeout of {}ms",
                limit.as_millis()
            ),
        }
    }
}

impl fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.has_file_sink())
            .field("flush_timeout", &self.flush_timeout)
            .finish()
    }
}
