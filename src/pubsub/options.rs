use std::{fmt, sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use zpubsub_error::ZResult;

use super::Handler;

/// Пользовательский декодер полезной нагрузки для `listen`.
pub type Decoder<T> = Arc<dyn Fn(Option<&str>) -> ZResult<T> + Send + Sync>;

/// Параметры одного вызова `publish`/`subscribe`/... .
///
/// `timeout: None` берёт таймаут клиента, `Some(Duration::ZERO)` отключает
/// ограничение для этого вызова.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub namespace: Option<String>,
    pub timeout: Option<Duration>,
}

/// Параметры `listen`.
pub struct ListenOptions<T> {
    /// Пространство имён для разбора входящих ключей
    pub namespace: Option<String>,
    /// Ограничение на запуск прослушивания (закрепление роли и захват
    /// соединения); `None` — таймаут клиента, ноль — без ограничения
    pub timeout: Option<Duration>,
    /// Ограничение одного опроса; `None` или ноль — без ограничения
    pub poll_timeout: Option<Duration>,
    /// Замена декодера сериализатора
    pub decoder: Option<Decoder<T>>,
    /// Обработчик, вызываемый перед выдачей каждой записи
    pub handler: Option<Handler<T>>,
    /// Внешний сигнал остановки
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(
        mut self,
        namespace: impl Into<String>,
    ) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Отключает таймаут для этого вызова.
    pub fn unbounded(mut self) -> Self {
        self.timeout = Some(Duration::ZERO);
        self
    }
}

impl<T> ListenOptions<T> {
    pub fn new() -> Self {
        Self {
            namespace: None,
            timeout: None,
            poll_timeout: None,
            decoder: None,
            handler: None,
            cancel: None,
        }
    }

    pub fn namespace(
        mut self,
        namespace: impl Into<String>,
    ) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn poll_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    pub fn decoder<F>(
        mut self,
        decoder: F,
    ) -> Self
    where
        F: Fn(Option<&str>) -> ZResult<T> + Send + Sync + 'static,
    {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn handler(
        mut self,
        handler: Handler<T>,
    ) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn cancel(
        mut self,
        token: CancellationToken,
    ) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl<T> Default for ListenOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ListenOptions<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("ListenOptions")
            .field("namespace", &self.namespace)
            .field("timeout", &self.timeout)
            .field("poll_timeout", &self.poll_timeout)
            .field("decoder", &self.decoder.is_some())
            .field("handler", &self.handler)
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}
