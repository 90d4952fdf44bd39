use std::{
    fmt,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{Stream, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zpubsub_error::{bail, StatusCode, ZResult};

use super::{
    validate_namespace, Decoder, BackendConnection, CallOptions, Handler,
    JsonSerializer, ListenOptions, MessageKind, MessageRecord, NamespaceCodec, PubSubBuilder,
    Role, RoleScope, Serializer,
};
use crate::{
    error::PubSubError,
    transport::{NotificationKind, RawNotification},
};

/// Клиент pub/sub: пространства имён, сериализация и таймауты поверх
/// [`BackendConnection`].
///
/// Один экземпляр работает либо как издатель, либо как подписчик; роль
/// закрепляется первой операцией. После [`PubSub::close`] все операции,
/// кроме повторного `close`, возвращают [`PubSubError::Closed`].
pub struct PubSub<S: Serializer = JsonSerializer> {
    backend: Arc<BackendConnection>,
    codec: NamespaceCodec,
    /// Таймаут операций по умолчанию; `None` — без ограничения
    timeout: Option<Duration>,
    serializer: Arc<S>,
    closed: Arc<AtomicBool>,
    /// Останавливает все живые потоки `listen`
    shutdown: CancellationToken,
}

/// Общее состояние нормализации записей одного потока `listen`.
struct RecordDecoder<T, S> {
    codec: NamespaceCodec,
    namespace: Option<String>,
    serializer: Arc<S>,
    decoder: Option<Decoder<T>>,
    handler: Option<Handler<T>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl PubSub<JsonSerializer> {
    pub fn builder() -> PubSubBuilder<JsonSerializer> {
        PubSubBuilder::new()
    }
}

impl<S: Serializer> PubSub<S> {
    pub(crate) fn from_parts(
        backend: BackendConnection,
        codec: NamespaceCodec,
        timeout: Option<Duration>,
        serializer: S,
    ) -> Self {
        Self {
            backend: Arc::new(backend),
            codec,
            timeout,
            serializer: Arc::new(serializer),
            closed: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.backend.role()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.codec.default_namespace()
    }

    pub fn codec(&self) -> &NamespaceCodec {
        &self.codec
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Сериализует `value` и публикует в `channel`.
    ///
    /// Возвращает число получателей; `0` означает, что сообщение никто не
    /// получил (это не ошибка).
    pub async fn publish<V>(
        &self,
        channel: &str,
        value: &V,
    ) -> ZResult<u64>
    where
        V: Serialize + ?Sized,
    {
        self.publish_with(channel, value, CallOptions::default())
            .await
    }

    pub async fn publish_with<V>(
        &self,
        channel: &str,
        value: &V,
        opts: CallOptions,
    ) -> ZResult<u64>
    where
        V: Serialize + ?Sized,
    {
        self.ensure_open()?;
        let text = self.serializer.dumps(value)?;
        self.publish_raw(channel, &text, opts).await
    }

    /// Публикует уже закодированный текст без участия сериализатора.
    pub async fn publish_raw(
        &self,
        channel: &str,
        text: &str,
        opts: CallOptions,
    ) -> ZResult<u64> {
        self.ensure_open()?;
        let key = self.key(channel, &opts)?;
        let receivers = self
            .run_with_timeout("publish", opts.timeout, self.backend.publish(&key, text))
            .await?;

        if receivers == 0 {
            warn!(channel = %key, payload = %text, "No client subscribe channel, message is dropped");
        } else {
            debug!(channel = %key, receivers, "Published");
        }
        Ok(receivers)
    }

    pub async fn subscribe(
        &self,
        channels: &[&str],
    ) -> ZResult<()> {
        self.subscribe_with(channels, CallOptions::default())
            .await
    }

    pub async fn subscribe_with(
        &self,
        channels: &[&str],
        opts: CallOptions,
    ) -> ZResult<()> {
        let keys = self.keys("subscribe", channels, &opts)?;
        self.run_with_timeout("subscribe", opts.timeout, self.backend.subscribe(&keys))
            .await
    }

    pub async fn unsubscribe(
        &self,
        channels: &[&str],
    ) -> ZResult<()> {
        self.unsubscribe_with(channels, CallOptions::default())
            .await
    }

    pub async fn unsubscribe_with(
        &self,
        channels: &[&str],
        opts: CallOptions,
    ) -> ZResult<()> {
        let keys = self.keys("unsubscribe", channels, &opts)?;
        self.run_with_timeout("unsubscribe", opts.timeout, self.backend.unsubscribe(&keys))
            .await
    }

    pub async fn psubscribe(
        &self,
        patterns: &[&str],
    ) -> ZResult<()> {
        self.psubscribe_with(patterns, CallOptions::default())
            .await
    }

    pub async fn psubscribe_with(
        &self,
        patterns: &[&str],
        opts: CallOptions,
    ) -> ZResult<()> {
        let keys = self.keys("psubscribe", patterns, &opts)?;
        self.run_with_timeout("psubscribe", opts.timeout, self.backend.psubscribe(&keys))
            .await
    }

    pub async fn punsubscribe(
        &self,
        patterns: &[&str],
    ) -> ZResult<()> {
        self.punsubscribe_with(patterns, CallOptions::default())
            .await
    }

    pub async fn punsubscribe_with(
        &self,
        patterns: &[&str],
        opts: CallOptions,
    ) -> ZResult<()> {
        let keys = self.keys("punsubscribe", patterns, &opts)?;
        self.run_with_timeout(
            "punsubscribe",
            opts.timeout,
            self.backend.punsubscribe(&keys),
        )
        .await
    }

    /// Поток нормализованных сообщений.
    ///
    /// Каждая запись уже без пространства имён и с декодированными данными.
    /// Ошибки декодирования и (в строгом режиме) чужие пространства имён
    /// приходят как `Err`-элементы, поток при этом продолжается. Поток
    /// завершается по `options.cancel`, после [`PubSub::close`] или когда
    /// вызывающий перестаёт его опрашивать.
    pub async fn listen<T>(
        &self,
        options: ListenOptions<T>,
    ) -> ZResult<impl Stream<Item = ZResult<MessageRecord<T>>> + Send + 'static>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let ListenOptions {
            namespace,
            timeout,
            poll_timeout,
            decoder,
            handler,
            cancel,
        } = options;
        if let Some(ns) = namespace.as_deref() {
            validate_namespace(ns)?;
        }

        let cancel = cancel.unwrap_or_else(|| self.shutdown.child_token());
        let raw = self
            .run_with_timeout("listen", timeout, self.backend.listen(poll_timeout, cancel))
            .await?;

        let records = Arc::new(RecordDecoder {
            codec: self.codec.clone(),
            namespace,
            serializer: Arc::clone(&self.serializer),
            decoder,
            handler,
        });

        Ok(raw
            .then(move |notification| {
                let records = Arc::clone(&records);
                async move { records.decode(notification).await }
            })
            .take_until(self.shutdown.clone().cancelled_owned())
            .fuse())
    }

    /// Закрывает клиент: останавливает `listen` и освобождает соединение.
    /// Повторный вызов безопасен.
    pub async fn close(&self) -> ZResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shutdown.cancel();
            debug!(client = %self, "Closing pub/sub client");
        }
        self.backend.close().await
    }

    /// Закрепляет роль, сразу захватывает соединение и возвращает страж,
    /// который закрывает клиент при выходе из области.
    pub async fn scope(
        &self,
        role: Role,
    ) -> ZResult<RoleScope<'_, S>> {
        self.ensure_open()?;
        RoleScope::enter(self, role).await
    }

    pub(crate) fn backend(&self) -> &Arc<BackendConnection> {
        &self.backend
    }

    /// Помечает клиент закрытым без ожидания; соединение закрывается в фоне.
    pub(crate) fn close_in_background(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        let backend = Arc::clone(&self.backend);
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if let Err(e) = backend.close().await {
                        warn!(error = %e, "Background close failed");
                    }
                });
            }
            Err(_) => warn!("No runtime to close pub/sub connection, handle is leaked until drop"),
        }
    }

    fn ensure_open(&self) -> ZResult<()> {
        if self.is_closed() {
            bail!(PubSubError::Closed);
        }
        Ok(())
    }

    fn key(
        &self,
        name: &str,
        opts: &CallOptions,
    ) -> ZResult<String> {
        if let Some(ns) = opts.namespace.as_deref() {
            validate_namespace(ns)?;
        }
        Ok(self.codec.build_key(name, opts.namespace.as_deref()))
    }

    fn keys(
        &self,
        operation: &str,
        names: &[&str],
        opts: &CallOptions,
    ) -> ZResult<Vec<String>> {
        self.ensure_open()?;
        if names.is_empty() {
            bail!(
                StatusCode::InvalidArgs,
                "{} requires at least one channel",
                operation
            );
        }
        names.iter().map(|name| self.key(name, opts)).collect()
    }

    /// `None` — таймаут клиента, ноль — без ограничения.
    fn effective_timeout(
        &self,
        call: Option<Duration>,
    ) -> Option<Duration> {
        match call {
            None => self.timeout,
            Some(t) if t.is_zero() => None,
            Some(t) => Some(t),
        }
    }

    async fn run_with_timeout<F, T>(
        &self,
        operation: &'static str,
        call: Option<Duration>,
        fut: F,
    ) -> ZResult<T>
    where
        F: Future<Output = ZResult<T>>,
    {
        match self.effective_timeout(call) {
            Some(after) => match tokio::time::timeout(after, fut).await {
                Ok(result) => result,
                Err(_) => Err(PubSubError::Timeout { operation, after }.into()),
            },
            None => fut.await,
        }
    }
}

impl<T, S> RecordDecoder<T, S>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    S: Serializer,
{
    async fn decode(
        &self,
        n: RawNotification,
    ) -> ZResult<MessageRecord<T>> {
        let data: T = match &self.decoder {
            Some(decode) => decode(n.data.as_deref())?,
            None => self.serializer.loads(n.data.as_deref())?,
        };

        let ns = self.namespace.as_deref();
        let channel = self.codec.parse_key(&n.channel, ns)?;
        let pattern = n
            .pattern
            .as_deref()
            .map(|p| self.codec.parse_pattern(p, ns))
            .transpose()?;
        let kind = match n.kind {
            NotificationKind::PMessage => MessageKind::PMessage,
            _ => MessageKind::Message,
        };

        if let Some(handler) = &self.handler {
            handler.call(&channel, &data).await;
        }

        Ok(MessageRecord {
            kind,
            pattern,
            channel,
            data,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl<S: Serializer> fmt::Display for PubSub<S> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "PubSub ({})", self.backend.transport().describe())
    }
}

impl<S: Serializer> fmt::Debug for PubSub<S> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("PubSub")
            .field("backend", &self.backend)
            .field("codec", &self.codec)
            .field("timeout", &self.timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
