//! Граница с брокером сообщений.
//!
//! Ядро клиента требует от транспорта четыре примитива:
//!
//! - `publish(key, text) -> count` — число получателей;
//! - `subscribe`/`unsubscribe` и `psubscribe`/`punsubscribe`;
//! - `next_notification(timeout)` — следующее уведомление или `None` по
//!   таймауту;
//! - `close()`.
//!
//! Пул соединений, повторы и переподключение относятся к транспорту.
//!
//! Реализации:
//! - `memory`: внутрипроцессный брокер с glob-шаблонами;
//! - `redis` (feature `redis`): Redis через крейт `redis`.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use zpubsub_error::ZResult;

pub use self::memory::{MemoryBroker, MemoryTransport};
#[cfg(feature = "redis")]
pub use self::redis::RedisTransport;

/// Тип сырого уведомления от брокера.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Message,
    PMessage,
    Subscribe,
    Unsubscribe,
    PSubscribe,
    PUnsubscribe,
}

/// Уведомление в том виде, в каком его отдаёт транспорт.
///
/// `channel` и `pattern` ещё содержат пространство имён, `data` не
/// декодирована.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    pub kind: NotificationKind,
    pub channel: String,
    pub pattern: Option<String>,
    pub data: Option<String>,
}

/// Фабрика соединений конкретного бэкенда.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Короткое имя бэкенда (`"memory"`, `"redis"`).
    fn name(&self) -> &'static str;

    /// Человекочитаемое описание адреса.
    fn describe(&self) -> String;

    async fn connect_publisher(&self) -> ZResult<Box<dyn PublisherHandle>>;

    async fn connect_subscriber(&self) -> ZResult<Box<dyn SubscriberHandle>>;
}

/// Соединение для публикации.
#[async_trait]
pub trait PublisherHandle: Send {
    async fn publish(
        &mut self,
        key: &str,
        text: &str,
    ) -> ZResult<u64>;

    async fn close(&mut self) -> ZResult<()>;
}

/// Соединение для подписки.
#[async_trait]
pub trait SubscriberHandle: Send {
    async fn subscribe(
        &mut self,
        keys: &[String],
    ) -> ZResult<()>;

    async fn unsubscribe(
        &mut self,
        keys: &[String],
    ) -> ZResult<()>;

    async fn psubscribe(
        &mut self,
        patterns: &[String],
    ) -> ZResult<()>;

    async fn punsubscribe(
        &mut self,
        patterns: &[String],
    ) -> ZResult<()>;

    /// Ждёт следующее уведомление не дольше `timeout` (`None` — без
    /// ограничения). По истечении таймаута возвращает `Ok(None)`.
    async fn next_notification(
        &mut self,
        timeout: Option<Duration>,
    ) -> ZResult<Option<RawNotification>>;

    /// Есть ли хотя бы одна активная подписка.
    fn is_subscribed(&self) -> bool;

    /// Активные каналы и шаблоны (для логов).
    fn subscriptions(&self) -> Vec<String>;

    async fn close(&mut self) -> ZResult<()>;
}

impl NotificationKind {
    /// Несёт ли уведомление полезную нагрузку.
    pub fn is_data(&self) -> bool {
        matches!(self, NotificationKind::Message | NotificationKind::PMessage)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Message => "message",
            NotificationKind::PMessage => "pmessage",
            NotificationKind::Subscribe => "subscribe",
            NotificationKind::Unsubscribe => "unsubscribe",
            NotificationKind::PSubscribe => "psubscribe",
            NotificationKind::PUnsubscribe => "punsubscribe",
        }
    }
}

impl RawNotification {
    pub fn message(
        channel: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            kind: NotificationKind::Message,
            channel: channel.into(),
            pattern: None,
            data: Some(data.into()),
        }
    }

    pub fn pmessage(
        pattern: impl Into<String>,
        channel: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            kind: NotificationKind::PMessage,
            channel: channel.into(),
            pattern: Some(pattern.into()),
            data: Some(data.into()),
        }
    }

    /// Подтверждение (пере)подписки без полезной нагрузки.
    pub fn control(
        kind: NotificationKind,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            channel: channel.into(),
            pattern: None,
            data: None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
