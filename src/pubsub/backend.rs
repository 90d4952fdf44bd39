use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::Stream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};
use zpubsub_error::{TransportError, ZResult};

use super::{Role, RoleGuard};
use crate::{
    error::PubSubError,
    transport::{PublisherHandle, RawNotification, SubscriberHandle, Transport},
};

/// Соединение с бэкендом, закреплённое за одной ролью.
///
/// Владеет не более чем одним транспортным дескриптором, который создаётся
/// лениво при первой операции и уничтожается в [`BackendConnection::close`].
/// Первая операция определяет роль: подписка или `listen` закрепляют
/// [`Role::Subscriber`], публикация закрепляет [`Role::Publisher`].
pub struct BackendConnection {
    transport: Arc<dyn Transport>,
    role: RoleGuard,
    handle: Mutex<Option<Handle>>,
    /// Быстрая проверка без захвата блокировки
    acquired: AtomicBool,
    /// Максимальная длительность одного опроса в `listen`
    poll_interval: Duration,
}

/// Транспортный дескриптор конкретной роли.
enum Handle {
    Publisher(Box<dyn PublisherHandle>),
    Subscriber(Box<dyn SubscriberHandle>),
}

/// Результат одного опроса транспорта.
enum PollStep {
    Message(RawNotification),
    Idle,
    Stop,
}

struct ListenState {
    conn: Arc<BackendConnection>,
    poll: Duration,
    cancel: CancellationToken,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl BackendConnection {
    pub fn new(
        transport: Arc<dyn Transport>,
        role: Option<Role>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            role: RoleGuard::new(role),
            handle: Mutex::new(None),
            acquired: AtomicBool::new(false),
            poll_interval,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role.get()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Закрепляет роль без захвата соединения.
    pub fn pin(
        &self,
        role: Role,
    ) -> ZResult<()> {
        self.role.set(role)
    }

    /// Есть ли сейчас транспортный дескриптор.
    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    /// Создаёт дескриптор для текущей роли, если его ещё нет.
    ///
    /// Идемпотентна. Пустота проверяется повторно под блокировкой, поэтому
    /// параллельные вызовы создают ровно один дескриптор.
    pub async fn acquire(&self) -> ZResult<()> {
        let role = self.role.get().ok_or(PubSubError::RoleUnset)?;
        if self.is_acquired() {
            return Ok(());
        }

        let mut guard = self.handle.lock().await;
        if guard.is_none() {
            let handle = match role {
                Role::Publisher => Handle::Publisher(self.transport.connect_publisher().await?),
                Role::Subscriber => Handle::Subscriber(self.transport.connect_subscriber().await?),
            };
            *guard = Some(handle);
            self.acquired.store(true, Ordering::Release);
            debug!(role = %role, backend = self.transport.name(), "Transport handle acquired");
        }
        Ok(())
    }

    /// Освобождает дескриптор (эквивалент `close`).
    pub async fn release(&self) -> ZResult<()> {
        self.close().await
    }

    pub async fn subscribe(
        &self,
        keys: &[String],
    ) -> ZResult<()> {
        let mut guard = self.pinned(Role::Subscriber).await?;
        subscriber_mut(&mut guard)?.subscribe(keys).await?;
        info!(channels = ?keys, "Subscribed");
        Ok(())
    }

    pub async fn unsubscribe(
        &self,
        keys: &[String],
    ) -> ZResult<()> {
        let mut guard = self.pinned(Role::Subscriber).await?;
        subscriber_mut(&mut guard)?.unsubscribe(keys).await?;
        debug!(channels = ?keys, "Unsubscribed");
        Ok(())
    }

    pub async fn psubscribe(
        &self,
        patterns: &[String],
    ) -> ZResult<()> {
        let mut guard = self.pinned(Role::Subscriber).await?;
        subscriber_mut(&mut guard)?.psubscribe(patterns).await?;
        info!(patterns = ?patterns, "Pattern subscribed");
        Ok(())
    }

    pub async fn punsubscribe(
        &self,
        patterns: &[String],
    ) -> ZResult<()> {
        let mut guard = self.pinned(Role::Subscriber).await?;
        subscriber_mut(&mut guard)?.punsubscribe(patterns).await?;
        debug!(patterns = ?patterns, "Pattern unsubscribed");
        Ok(())
    }

    /// Публикует уже закодированный текст, возвращает число получателей.
    pub async fn publish(
        &self,
        key: &str,
        text: &str,
    ) -> ZResult<u64> {
        let mut guard = self.pinned(Role::Publisher).await?;
        publisher_mut(&mut guard)?.publish(key, text).await
    }

    /// Бесконечный поток сырых уведомлений `message`/`pmessage`.
    ///
    /// Каждый опрос длится не дольше `timeout` и шага опроса соединения;
    /// между опросами блокировка отпускается, так что подписки можно менять
    /// во время прослушивания. Ошибки опроса логируются и не прерывают
    /// поток. Поток завершается при срабатывании `cancel` или после
    /// `close`.
    pub async fn listen(
        self: &Arc<Self>,
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> ZResult<impl Stream<Item = RawNotification> + Send + 'static> {
        self.role.set(Role::Subscriber)?;
        self.acquire().await?;
        let channels = self.subscriptions().await;
        info!(channels = ?channels, "Start listen");

        let poll = match timeout {
            Some(t) if !t.is_zero() => t.min(self.poll_interval),
            _ => self.poll_interval,
        };
        let state = ListenState {
            conn: Arc::clone(self),
            poll,
            cancel,
        };

        Ok(futures::stream::unfold(state, |state| async move {
            loop {
                tokio::task::yield_now().await;

                let step = tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => PollStep::Stop,
                    step = state.conn.poll_once(state.poll) => step,
                };

                match step {
                    PollStep::Message(notification) => return Some((notification, state)),
                    PollStep::Idle => continue,
                    PollStep::Stop => {
                        let channels = state.conn.subscriptions().await;
                        info!(channels = ?channels, "Stop listen");
                        return None;
                    }
                }
            }
        }))
    }

    /// Закрывает дескриптор и сбрасывает роль. Повторный вызов безопасен.
    pub async fn close(&self) -> ZResult<()> {
        let mut guard = self.handle.lock().await;
        let result = match guard.take() {
            Some(Handle::Publisher(mut h)) => h.close().await,
            Some(Handle::Subscriber(mut h)) => h.close().await,
            None => Ok(()),
        };
        self.acquired.store(false, Ordering::Release);
        self.role.clear();
        drop(guard);

        if result.is_ok() {
            debug!(backend = self.transport.name(), "Backend connection closed");
        }
        result
    }

    /// Активные подписки (пусто, если дескриптора нет).
    pub async fn subscriptions(&self) -> Vec<String> {
        match self.handle.lock().await.as_ref() {
            Some(Handle::Subscriber(sub)) => sub.subscriptions(),
            _ => Vec::new(),
        }
    }

    async fn pinned(
        &self,
        role: Role,
    ) -> ZResult<MutexGuard<'_, Option<Handle>>> {
        self.role.set(role)?;
        self.acquire().await?;
        Ok(self.handle.lock().await)
    }

    async fn poll_once(
        &self,
        poll: Duration,
    ) -> PollStep {
        let mut guard = self.handle.lock().await;
        let sub = match guard.as_mut() {
            Some(Handle::Subscriber(sub)) => sub,
            _ => return PollStep::Stop,
        };

        if !sub.is_subscribed() {
            drop(guard);
            tokio::time::sleep(poll).await;
            return PollStep::Idle;
        }

        let polled = sub.next_notification(Some(poll)).await;
        drop(guard);

        match polled {
            Ok(Some(n)) if n.kind.is_data() => {
                debug!(kind = %n.kind, channel = %n.channel, "Notification received");
                PollStep::Message(n)
            }
            Ok(Some(n)) => {
                trace!(kind = %n.kind, channel = %n.channel, "Control notification skipped");
                PollStep::Idle
            }
            Ok(None) => PollStep::Idle,
            Err(e) => {
                error!(error = %e, "Listen poll failed");
                tokio::time::sleep(poll).await;
                PollStep::Idle
            }
        }
    }
}

fn subscriber_mut(handle: &mut Option<Handle>) -> ZResult<&mut Box<dyn SubscriberHandle>> {
    match handle.as_mut() {
        Some(Handle::Subscriber(sub)) => Ok(sub),
        Some(Handle::Publisher(_)) => Err(PubSubError::RoleConflict {
            current: Role::Publisher,
            requested: Role::Subscriber,
        }
        .into()),
        None => Err(TransportError::ConnectionClosed.into()),
    }
}

fn publisher_mut(handle: &mut Option<Handle>) -> ZResult<&mut Box<dyn PublisherHandle>> {
    match handle.as_mut() {
        Some(Handle::Publisher(publisher)) => Ok(publisher),
        Some(Handle::Subscriber(_)) => Err(PubSubError::RoleConflict {
            current: Role::Subscriber,
            requested: Role::Publisher,
        }
        .into()),
        None => Err(TransportError::ConnectionClosed.into()),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Debug for BackendConnection {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("BackendConnection")
            .field("transport", &self.transport.describe())
            .field("role", &self.role.get())
            .field("acquired", &self.is_acquired())
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use futures::StreamExt;
    use zpubsub_error::StatusCode;

    use super::*;
    use crate::transport::{MemoryTransport, NotificationKind};

    const POLL: Duration = Duration::from_millis(10);

    fn memory_conn(transport: &MemoryTransport) -> Arc<BackendConnection> {
        Arc::new(BackendConnection::new(
            Arc::new(transport.clone()),
            None,
            POLL,
        ))
    }

    /// Транспорт, считающий созданные дескрипторы.
    struct CountingTransport {
        inner: MemoryTransport,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }

        async fn connect_publisher(&self) -> ZResult<Box<dyn PublisherHandle>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.inner.connect_publisher().await
        }

        async fn connect_subscriber(&self) -> ZResult<Box<dyn SubscriberHandle>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.inner.connect_subscriber().await
        }
    }

    /// Транспорт с заранее заданной последовательностью ответов опроса.
    struct ScriptedTransport {
        script: parking_lot::Mutex<Option<VecDeque<ZResult<Option<RawNotification>>>>>,
    }

    struct ScriptedSubscriber {
        script: VecDeque<ZResult<Option<RawNotification>>>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }

        async fn connect_publisher(&self) -> ZResult<Box<dyn PublisherHandle>> {
            Err(TransportError::Unavailable {
                backend: "scripted".to_string(),
            }
            .into())
        }

        async fn connect_subscriber(&self) -> ZResult<Box<dyn SubscriberHandle>> {
            let script = self.script.lock().take().unwrap_or_default();
            Ok(Box::new(ScriptedSubscriber { script }))
        }
    }

    #[async_trait]
    impl SubscriberHandle for ScriptedSubscriber {
        async fn subscribe(
            &mut self,
            _keys: &[String],
        ) -> ZResult<()> {
            Ok(())
        }

        async fn unsubscribe(
            &mut self,
            _keys: &[String],
        ) -> ZResult<()> {
            Ok(())
        }

        async fn psubscribe(
            &mut self,
            _patterns: &[String],
        ) -> ZResult<()> {
            Ok(())
        }

        async fn punsubscribe(
            &mut self,
            _patterns: &[String],
        ) -> ZResult<()> {
            Ok(())
        }

        async fn next_notification(
            &mut self,
            timeout: Option<Duration>,
        ) -> ZResult<Option<RawNotification>> {
            match self.script.pop_front() {
                Some(step) => step,
                None => {
                    if let Some(t) = timeout {
                        tokio::time::sleep(t).await;
                    }
                    Ok(None)
                }
            }
        }

        fn is_subscribed(&self) -> bool {
            true
        }

        fn subscriptions(&self) -> Vec<String> {
            vec!["scripted".to_string()]
        }

        async fn close(&mut self) -> ZResult<()> {
            Ok(())
        }
    }

    /// Тест проверяет, что первая операция закрепляет роль, а операция
    /// другой роли получает RoleConflict.
    #[tokio::test]
    async fn test_first_operation_pins_role() {
        let transport = MemoryTransport::new();
        let conn = memory_conn(&transport);

        conn.subscribe(&["a".to_string()]).await.unwrap();
        assert_eq!(conn.role(), Some(Role::Subscriber));

        let err = conn.publish("a", "x").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::RoleConflict);
    }

    /// Тест проверяет, что acquire без роли возвращает RoleUnset.
    #[tokio::test]
    async fn test_acquire_without_role() {
        let conn = memory_conn(&MemoryTransport::new());
        let err = conn.acquire().await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::RoleUnset);
        assert!(!conn.is_acquired());
    }

    /// Тест проверяет, что параллельные операции создают ровно один
    /// транспортный дескриптор.
    #[tokio::test]
    async fn test_concurrent_acquire_creates_single_handle() {
        let transport = Arc::new(CountingTransport {
            inner: MemoryTransport::new(),
            connects: AtomicUsize::new(0),
        });
        let conn = Arc::new(BackendConnection::new(
            transport.clone(),
            Some(Role::Publisher),
            POLL,
        ));

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let conn = conn.clone();
                tokio::spawn(async move { conn.publish(&format!("c{i}"), "x").await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    /// Тест проверяет идемпотентность close и сброс роли.
    #[tokio::test]
    async fn test_close_idempotent_and_clears_role() {
        let conn = memory_conn(&MemoryTransport::new());
        conn.publish("a", "x").await.unwrap();
        assert!(conn.is_acquired());

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert!(!conn.is_acquired());
        assert_eq!(conn.role(), None);

        conn.subscribe(&["a".to_string()]).await.unwrap();
        assert_eq!(conn.role(), Some(Role::Subscriber));
    }

    /// Тест проверяет, что listen отдаёт только message/pmessage.
    #[tokio::test]
    async fn test_listen_filters_control_messages() {
        let transport = MemoryTransport::new();
        let sub = memory_conn(&transport);
        let publisher = memory_conn(&transport);

        sub.subscribe(&["a".to_string()]).await.unwrap();
        let stream = sub.listen(None, CancellationToken::new()).await.unwrap();
        let mut stream = Box::pin(stream);

        assert_eq!(publisher.publish("a", "1").await.unwrap(), 1);
        let n = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.kind, NotificationKind::Message);
        assert_eq!(n.data.as_deref(), Some("1"));
    }

    /// Тест проверяет, что ошибки опроса логируются и поток продолжает
    /// работу.
    #[tokio::test]
    async fn test_listen_survives_poll_errors() {
        let script: VecDeque<ZResult<Option<RawNotification>>> = VecDeque::from(vec![
            Err(TransportError::CommandFailed {
                command: "GET_MESSAGE".to_string(),
                reason: "reset".to_string(),
            }
            .into()),
            Ok(Some(RawNotification::control(
                NotificationKind::Subscribe,
                "a",
            ))),
            Err(TransportError::ConnectionClosed.into()),
            Ok(Some(RawNotification::message("a", "ok"))),
        ]);
        let transport = Arc::new(ScriptedTransport {
            script: parking_lot::Mutex::new(Some(script)),
        });
        let conn = Arc::new(BackendConnection::new(transport, None, POLL));

        let stream = conn.listen(None, CancellationToken::new()).await.unwrap();
        let mut stream = Box::pin(stream);
        let n = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, RawNotification::message("a", "ok"));
    }

    /// Тест проверяет, что отмена во время опроса завершает поток без
    /// элемента.
    #[tokio::test]
    async fn test_listen_cancel_mid_poll() {
        let transport = MemoryTransport::new();
        let conn = memory_conn(&transport);
        conn.subscribe(&["a".to_string()]).await.unwrap();

        let cancel = CancellationToken::new();
        let stream = conn.listen(Some(Duration::ZERO), cancel.clone()).await.unwrap();
        let task = tokio::spawn(async move {
            let stream = Box::pin(stream);
            stream.collect::<Vec<_>>().await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let items = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(items.is_empty());
    }

    /// Тест проверяет, что close завершает активный поток listen.
    #[tokio::test]
    async fn test_close_ends_listen() {
        let transport = MemoryTransport::new();
        let conn = memory_conn(&transport);
        conn.subscribe(&["a".to_string()]).await.unwrap();

        let stream = conn.listen(None, CancellationToken::new()).await.unwrap();
        let task = tokio::spawn(async move { Box::pin(stream).collect::<Vec<_>>().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        conn.close().await.unwrap();
        let items = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(items.is_empty());
    }

    /// Тест проверяет, что подписка во время listen не блокируется
    /// навсегда.
    #[tokio::test]
    async fn test_subscribe_while_listening() {
        let transport = MemoryTransport::new();
        let conn = memory_conn(&transport);
        let publisher = memory_conn(&transport);

        let stream = conn.listen(None, CancellationToken::new()).await.unwrap();
        let mut stream = Box::pin(stream);
        let reader = tokio::spawn(async move { stream.next().await });

        tokio::time::timeout(Duration::from_secs(1), conn.subscribe(&["late".to_string()]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(publisher.publish("late", "x").await.unwrap(), 1);

        let n = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(n.channel, "late");
    }
}
