//! Redis-транспорт.
//!
//! Публикация идёт через мультиплексированное соединение, подписка через
//! выделенное pub/sub соединение (`get_async_pubsub`).

use std::{collections::BTreeSet, time::Duration};

use ::redis::{
    aio::MultiplexedConnection, AsyncCommands, Client, ConnectionAddr, ConnectionInfo, Msg,
    RedisConnectionInfo, RedisError,
};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info};
use zpubsub_error::{TransportError, ZResult};

use super::{NotificationKind, PublisherHandle, RawNotification, SubscriberHandle, Transport};
use crate::config::TransportParams;

/// Транспорт поверх Redis.
#[derive(Debug, Clone)]
pub struct RedisTransport {
    client: Client,
    params: TransportParams,
}

struct RedisPublisher {
    conn: Option<MultiplexedConnection>,
}

struct RedisSubscriber {
    pubsub: Option<::redis::aio::PubSub>,
    channels: BTreeSet<String>,
    patterns: BTreeSet<String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RedisTransport {
    /// Создаёт транспорт по параметрам подключения.
    ///
    /// Соединение не открывается до первого использования.
    pub fn new(params: TransportParams) -> ZResult<Self> {
        let client =
            Client::open(connection_info(&params)).map_err(|e| TransportError::ConnectionFailed {
                address: params.address(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, params })
    }

    pub fn params(&self) -> &TransportParams {
        &self.params
    }

    async fn connect<F, T>(
        &self,
        fut: F,
    ) -> ZResult<T>
    where
        F: std::future::Future<Output = Result<T, RedisError>>,
    {
        let address = self.params.address();
        let result = match self.params.socket_connect_timeout() {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(TransportError::ConnectionFailed {
                        address,
                        reason: format!("connect timed out after {limit:?}"),
                    }
                    .into())
                }
            },
            None => fut.await,
        };
        result.map_err(|e| {
            TransportError::ConnectionFailed {
                address,
                reason: e.to_string(),
            }
            .into()
        })
    }
}

impl RedisSubscriber {
    fn pubsub(&mut self) -> ZResult<&mut ::redis::aio::PubSub> {
        self.pubsub
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionClosed.into())
    }
}

/// Учётные данные передаются как есть, без сборки URL.
fn connection_info(params: &TransportParams) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(params.host.clone(), params.port),
        redis: RedisConnectionInfo {
            db: params.db,
            username: params.username.clone(),
            password: params.password.clone(),
            ..Default::default()
        },
    }
}

fn command_failed(
    command: &str,
    err: RedisError,
) -> TransportError {
    if err.is_connection_dropped() || err.is_io_error() {
        return TransportError::ConnectionClosed;
    }
    TransportError::CommandFailed {
        command: command.to_string(),
        reason: err.to_string(),
    }
}

fn to_notification(msg: &Msg) -> RawNotification {
    let pattern = if msg.from_pattern() {
        msg.get_pattern::<String>().ok()
    } else {
        None
    };

    RawNotification {
        kind: if pattern.is_some() {
            NotificationKind::PMessage
        } else {
            NotificationKind::Message
        },
        channel: msg.get_channel_name().to_string(),
        pattern,
        data: msg.get_payload().ok(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Реализация транспортных трейтов
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl Transport for RedisTransport {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn describe(&self) -> String {
        format!(
            "redis {}:{}/{}",
            self.params.host, self.params.port, self.params.db
        )
    }

    async fn connect_publisher(&self) -> ZResult<Box<dyn PublisherHandle>> {
        let conn = self
            .connect(self.client.get_multiplexed_async_connection())
            .await?;
        info!(address = %self.params.address(), "Redis publisher connected");
        Ok(Box::new(RedisPublisher { conn: Some(conn) }))
    }

    async fn connect_subscriber(&self) -> ZResult<Box<dyn SubscriberHandle>> {
        let pubsub = self.connect(self.client.get_async_pubsub()).await?;
        info!(address = %self.params.address(), "Redis subscriber connected");
        Ok(Box::new(RedisSubscriber {
            pubsub: Some(pubsub),
            channels: BTreeSet::new(),
            patterns: BTreeSet::new(),
        }))
    }
}

#[async_trait]
impl PublisherHandle for RedisPublisher {
    async fn publish(
        &mut self,
        key: &str,
        text: &str,
    ) -> ZResult<u64> {
        let conn = self
            .conn
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?;
        let receivers: i64 = conn
            .publish(key, text)
            .await
            .map_err(|e| command_failed("PUBLISH", e))?;
        Ok(receivers.max(0) as u64)
    }

    async fn close(&mut self) -> ZResult<()> {
        if self.conn.take().is_some() {
            debug!("Redis publisher closed");
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriberHandle for RedisSubscriber {
    async fn subscribe(
        &mut self,
        keys: &[String],
    ) -> ZResult<()> {
        self.pubsub()?
            .subscribe(keys)
            .await
            .map_err(|e| command_failed("SUBSCRIBE", e))?;
        self.channels.extend(keys.iter().cloned());
        Ok(())
    }

    async fn unsubscribe(
        &mut self,
        keys: &[String],
    ) -> ZResult<()> {
        self.pubsub()?
            .unsubscribe(keys)
            .await
            .map_err(|e| command_failed("UNSUBSCRIBE", e))?;
        for key in keys {
            self.channels.remove(key);
        }
        Ok(())
    }

    async fn psubscribe(
        &mut self,
        patterns: &[String],
    ) -> ZResult<()> {
        self.pubsub()?
            .psubscribe(patterns)
            .await
            .map_err(|e| command_failed("PSUBSCRIBE", e))?;
        self.patterns.extend(patterns.iter().cloned());
        Ok(())
    }

    async fn punsubscribe(
        &mut self,
        patterns: &[String],
    ) -> ZResult<()> {
        self.pubsub()?
            .punsubscribe(patterns)
            .await
            .map_err(|e| command_failed("PUNSUBSCRIBE", e))?;
        for pattern in patterns {
            self.patterns.remove(pattern);
        }
        Ok(())
    }

    async fn next_notification(
        &mut self,
        timeout: Option<Duration>,
    ) -> ZResult<Option<RawNotification>> {
        let pubsub = self.pubsub()?;
        let mut messages = std::pin::pin!(pubsub.on_message());
        let next = match timeout {
            Some(t) => match tokio::time::timeout(t, messages.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(None),
            },
            None => messages.next().await,
        };
        match next {
            Some(msg) => Ok(Some(to_notification(&msg))),
            None => Err(TransportError::ConnectionClosed.into()),
        }
    }

    fn is_subscribed(&self) -> bool {
        self.pubsub.is_some() && !(self.channels.is_empty() && self.patterns.is_empty())
    }

    fn subscriptions(&self) -> Vec<String> {
        self.channels
            .iter()
            .chain(self.patterns.iter())
            .cloned()
            .collect()
    }

    async fn close(&mut self) -> ZResult<()> {
        if self.pubsub.take().is_some() {
            self.channels.clear();
            self.patterns.clear();
            debug!("Redis subscriber closed");
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
