use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use dashmap::DashMap;
use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use zpubsub_error::{TransportError, ZResult};

use super::{
    NotificationKind, PublisherHandle, RawNotification, SubscriberHandle, Transport,
};

/// Внутрипроцессный брокер сообщений.
///
/// Поддерживает:
/// - Точные подписки по имени канала
/// - Подписки по шаблонам (glob, `*` совпадает с любыми символами)
/// - Подсчёт получателей как в Redis: по одному на каждую совпавшую
///   подписку
/// - Статистику публикаций и сброшенных сообщений
#[derive(Debug, Default)]
pub struct MemoryBroker {
    /// Идентификатор подписчика → его подписки и очередь
    subscribers: DashMap<u64, Arc<SubscriberSlot>>,
    next_id: AtomicU64,
    /// Общее количество вызовов `publish`
    pub publish_count: AtomicU64,
    /// Количество публикаций без единого получателя
    pub dropped_count: AtomicU64,
}

/// Транспорт поверх [`MemoryBroker`].
///
/// Все клиенты, созданные из одного транспорта, разделяют один брокер.
///
/// Очередь подписчика не ограничена: подтверждения подписок и сообщения
/// копятся, пока их не вычитывает `next_notification` (например, `listen`).
/// Подписчик, который не слушает, должен быть закрыт; закрытие снимает его
/// с брокера и освобождает очередь.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    broker: Arc<MemoryBroker>,
}

/// Подписки и неограниченная очередь одного подписчика.
#[derive(Debug)]
struct SubscriberSlot {
    channels: RwLock<HashSet<String>>,
    patterns: RwLock<Vec<(String, GlobMatcher)>>,
    tx: mpsc::UnboundedSender<RawNotification>,
}

struct MemoryPublisher {
    broker: Option<Arc<MemoryBroker>>,
}

struct MemorySubscriber {
    broker: Arc<MemoryBroker>,
    id: u64,
    slot: Arc<SubscriberSlot>,
    rx: mpsc::UnboundedReceiver<RawNotification>,
    closed: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Публикация сообщения.
    ///
    /// Работает в два этапа для каждого подписчика:
    /// 1. Точное совпадение канала
    /// 2. Все совпавшие шаблоны
    ///
    /// Возвращает число доставок.
    pub fn publish(
        &self,
        channel: &str,
        payload: &str,
    ) -> u64 {
        self.publish_count.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            let slot = entry.value();

            // 1) точное совпадение
            if slot.channels.read().contains(channel)
                && slot
                    .tx
                    .send(RawNotification::message(channel, payload))
                    .is_ok()
            {
                delivered += 1;
            }

            // 2) по шаблону
            for (pattern, matcher) in slot.patterns.read().iter() {
                if matcher.is_match(channel)
                    && slot
                        .tx
                        .send(RawNotification::pmessage(pattern.as_str(), channel, payload))
                        .is_ok()
                {
                    delivered += 1;
                }
            }
        }

        if delivered == 0 {
            self.dropped_count.fetch_add(1, Ordering::Relaxed);
        }
        trace!(channel, delivered, "Memory broker publish");
        delivered
    }

    /// Количество подключённых подписчиков.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Количество подписчиков, подписанных на канал точно.
    pub fn channel_subscribers(
        &self,
        channel: &str,
    ) -> usize {
        self.subscribers
            .iter()
            .filter(|e| e.value().channels.read().contains(channel))
            .count()
    }

    fn register(&self) -> (u64, Arc<SubscriberSlot>, mpsc::UnboundedReceiver<RawNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SubscriberSlot {
            channels: RwLock::new(HashSet::new()),
            patterns: RwLock::new(Vec::new()),
            tx,
        });
        self.subscribers.insert(id, slot.clone());
        (id, slot, rx)
    }

    fn unregister(
        &self,
        id: u64,
    ) {
        self.subscribers.remove(&id);
    }
}

impl MemoryTransport {
    /// Создаёт транспорт с новым брокером.
    pub fn new() -> Self {
        Self::default()
    }

    /// Создаёт транспорт поверх существующего брокера.
    pub fn with_broker(broker: Arc<MemoryBroker>) -> Self {
        Self { broker }
    }

    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }
}

impl SubscriberSlot {
    fn ack(
        &self,
        kind: NotificationKind,
        key: &str,
    ) {
        let _ = self.tx.send(RawNotification::control(kind, key));
    }
}

impl MemorySubscriber {
    fn ensure_open(&self) -> ZResult<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed.into());
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализация транспортных трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn connect_publisher(&self) -> ZResult<Box<dyn PublisherHandle>> {
        debug!("Memory publisher connected");
        Ok(Box::new(MemoryPublisher {
            broker: Some(self.broker.clone()),
        }))
    }

    async fn connect_subscriber(&self) -> ZResult<Box<dyn SubscriberHandle>> {
        let (id, slot, rx) = self.broker.register();
        debug!(id, "Memory subscriber connected");
        Ok(Box::new(MemorySubscriber {
            broker: self.broker.clone(),
            id,
            slot,
            rx,
            closed: false,
        }))
    }
}

#[async_trait]
impl PublisherHandle for MemoryPublisher {
    async fn publish(
        &mut self,
        key: &str,
        text: &str,
    ) -> ZResult<u64> {
        match &self.broker {
            Some(broker) => Ok(broker.publish(key, text)),
            None => Err(TransportError::ConnectionClosed.into()),
        }
    }

    async fn close(&mut self) -> ZResult<()> {
        self.broker = None;
        Ok(())
    }
}

#[async_trait]
impl SubscriberHandle for MemorySubscriber {
    async fn subscribe(
        &mut self,
        keys: &[String],
    ) -> ZResult<()> {
        self.ensure_open()?;
        for key in keys {
            self.slot.channels.write().insert(key.clone());
            self.slot.ack(NotificationKind::Subscribe, key);
        }
        Ok(())
    }

    async fn unsubscribe(
        &mut self,
        keys: &[String],
    ) -> ZResult<()> {
        self.ensure_open()?;
        for key in keys {
            self.slot.channels.write().remove(key);
            self.slot.ack(NotificationKind::Unsubscribe, key);
        }
        Ok(())
    }

    async fn psubscribe(
        &mut self,
        patterns: &[String],
    ) -> ZResult<()> {
        self.ensure_open()?;
        let compiled = patterns
            .iter()
            .map(|p| -> Result<_, globset::Error> {
                Ok((p.clone(), Glob::new(p)?.compile_matcher()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(TransportError::from)?;

        for (pattern, matcher) in compiled {
            let mut current = self.slot.patterns.write();
            if !current.iter().any(|(p, _)| *p == pattern) {
                current.push((pattern.clone(), matcher));
            }
            drop(current);
            self.slot.ack(NotificationKind::PSubscribe, &pattern);
        }
        Ok(())
    }

    async fn punsubscribe(
        &mut self,
        patterns: &[String],
    ) -> ZResult<()> {
        self.ensure_open()?;
        for pattern in patterns {
            self.slot.patterns.write().retain(|(p, _)| p != pattern);
            self.slot.ack(NotificationKind::PUnsubscribe, pattern);
        }
        Ok(())
    }

    async fn next_notification(
        &mut self,
        timeout: Option<Duration>,
    ) -> ZResult<Option<RawNotification>> {
        self.ensure_open()?;
        let received = match timeout {
            Some(t) => match tokio::time::timeout(t, self.rx.recv()).await {
                Ok(received) => received,
                Err(_) => return Ok(None),
            },
            None => self.rx.recv().await,
        };
        received
            .map(Some)
            .ok_or_else(|| TransportError::ConnectionClosed.into())
    }

    fn is_subscribed(&self) -> bool {
        !self.closed
            && (!self.slot.channels.read().is_empty() || !self.slot.patterns.read().is_empty())
    }

    fn subscriptions(&self) -> Vec<String> {
        let mut all: Vec<String> = self.slot.channels.read().iter().cloned().collect();
        all.sort();
        all.extend(self.slot.patterns.read().iter().map(|(p, _)| p.clone()));
        all
    }

    async fn close(&mut self) -> ZResult<()> {
        if !self.closed {
            self.closed = true;
            self.broker.unregister(self.id);
            debug!(id = self.id, "Memory subscriber closed");
        }
        Ok(())
    }
}

impl Drop for MemorySubscriber {
    fn drop(&mut self) {
        self.broker.unregister(self.id);
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
