use std::{
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use zpubsub::{
    transport::{RawNotification, SubscriberHandle},
    BackendRegistry, CallOptions, Handler, ListenOptions,
    MemoryTransport, MessageKind, NamespaceMode, PubSub, PubSubBuilder, PubSubError,
    PubSubSettings, Role, StatusCode, Transport,
};

fn client(transport: &MemoryTransport) -> PubSub {
    PubSub::builder()
        .transport(Arc::new(transport.clone()))
        .namespace("cs")
        .listen_poll_interval(Duration::from_millis(10))
        .build()
        .unwrap()
}

async fn next_data(sub: &mut Box<dyn SubscriberHandle>) -> RawNotification {
    loop {
        let n = sub
            .next_notification(Some(Duration::from_secs(1)))
            .await
            .unwrap()
            .expect("notification within a second");
        if n.kind.is_data() {
            return n;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderCreated {
    id: u64,
    total: f64,
}

/// Тест проверяет сценарий с namespace "cs": ключ подписки, текст на
/// проводе и нормализованная запись на стороне подписчика.
#[tokio::test]
async fn test_namespaced_roundtrip_and_wire_text() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    let publisher = client(&transport);

    subscriber.subscribe(&["foo"]).await?;
    assert_eq!(transport.broker().channel_subscribers("cs:foo"), 1);

    // Сырой подписчик видит ключ и текст ровно так, как их отправил клиент
    let mut raw = transport.connect_subscriber().await?;
    raw.subscribe(&["cs:foo".to_string()]).await?;

    let mut stream = Box::pin(subscriber.listen::<Value>(ListenOptions::new()).await?);
    assert_eq!(publisher.publish("foo", &json!({"test": 1})).await?, 2);

    let wire = next_data(&mut raw).await;
    assert_eq!(wire.channel, "cs:foo");
    assert_eq!(wire.data.as_deref(), Some(r#"{"test": 1}"#));

    let record = stream.next().await.unwrap()?;
    assert_eq!(
        serde_json::to_value(&record)?,
        json!({"type": "message", "channel": "foo", "data": {"test": 1}})
    );
    Ok(())
}

/// Тест проверяет сценарий с шаблоном "foo*" под namespace "cs".
#[tokio::test]
async fn test_pattern_subscription_scenario() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    let publisher = client(&transport);

    subscriber.psubscribe(&["foo*"]).await?;
    let mut stream = Box::pin(subscriber.listen::<Value>(ListenOptions::new()).await?);

    publisher.publish("foobar", &json!("hi")).await?;
    publisher.publish("bar", &json!("miss")).await?;
    publisher.publish("food", &json!("second")).await?;

    let first = stream.next().await.unwrap()?;
    assert_eq!(
        serde_json::to_value(&first)?,
        json!({"type": "pmessage", "pattern": "foo*", "channel": "foobar", "data": "hi"})
    );
    let second = stream.next().await.unwrap()?;
    assert_eq!(second.channel, "food");
    assert_eq!(second.kind, MessageKind::PMessage);
    Ok(())
}

/// Тест проверяет публикацию без подписчиков: 0 получателей, не ошибка.
#[tokio::test]
async fn test_publish_with_no_subscribers() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let publisher = client(&transport);
    assert_eq!(publisher.publish("ghost", &json!({"a": 1})).await?, 0);
    assert_eq!(transport.broker().dropped_count.load(Ordering::Relaxed), 1);
    Ok(())
}

/// Тест проверяет конфликт ролей: подписчик не может публиковать, и
/// наоборот; после close роль сбрасывается.
#[tokio::test]
async fn test_role_lifecycle() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();

    let subscriber = client(&transport);
    subscriber.subscribe(&["a"]).await?;
    let err = subscriber.publish("a", &1).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PubSubError>(),
        Some(PubSubError::RoleConflict {
            current: Role::Subscriber,
            requested: Role::Publisher
        })
    ));

    let publisher = client(&transport);
    publisher.publish("a", &1).await?;
    let err = publisher.psubscribe(&["a*"]).await.unwrap_err();
    assert_eq!(err.status_code(), StatusCode::RoleConflict);

    subscriber.close().await?;
    subscriber.close().await?;
    assert_eq!(subscriber.role(), None);
    assert_eq!(transport.broker().subscriber_count(), 0);
    Ok(())
}

/// Тест проверяет, что отмена во время ожидания опроса завершает поток без
/// частичной записи и без ошибки.
#[tokio::test]
async fn test_cancel_mid_poll() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    subscriber.subscribe(&["quiet"]).await?;

    let cancel = CancellationToken::new();
    let stream = subscriber
        .listen::<Value>(ListenOptions::new().cancel(cancel.clone()))
        .await?;

    let consumer = tokio::spawn(async move {
        let mut stream = Box::pin(stream);
        let mut seen = Vec::new();
        while let Some(item) = stream.next().await {
            seen.push(item);
        }
        seen
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let seen = tokio::time::timeout(Duration::from_secs(1), consumer).await??;
    assert!(seen.is_empty());
    Ok(())
}

/// Тест проверяет, что нулевой таймаут опроса означает ожидание без
/// ограничения и поток всё равно получает поздние сообщения.
#[tokio::test]
async fn test_zero_poll_timeout_receives_late_message() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    let publisher = client(&transport);
    subscriber.subscribe(&["late"]).await?;

    let mut stream = Box::pin(
        subscriber
            .listen::<u32>(ListenOptions::new().poll_timeout(Duration::ZERO))
            .await?,
    );

    let delayed = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        publisher.publish("late", &9u32).await
    });

    let record = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await?
        .unwrap()?;
    assert_eq!(record.data, 9);
    assert_eq!(delayed.await??, 1);
    Ok(())
}

/// Тест проверяет, что после close все операции отклоняются, а живой
/// поток завершается.
#[tokio::test]
async fn test_closed_client_rejects_operations() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    subscriber.subscribe(&["a"]).await?;
    let mut stream = Box::pin(subscriber.listen::<Value>(ListenOptions::new()).await?);

    subscriber.close().await?;
    assert!(tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await?
        .is_none());

    for err in [
        subscriber.subscribe(&["a"]).await.unwrap_err(),
        subscriber.unsubscribe(&["a"]).await.unwrap_err(),
        subscriber.punsubscribe(&["a*"]).await.unwrap_err(),
        subscriber.publish("a", &1).await.unwrap_err(),
    ] {
        assert!(matches!(err.downcast_ref::<PubSubError>(), Some(PubSubError::Closed)));
    }
    Ok(())
}

/// Тест проверяет типизированные данные и асинхронный обработчик.
#[tokio::test]
async fn test_typed_payload_with_async_handler() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    let publisher = client(&transport);
    subscriber.subscribe(&["orders"]).await?;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handler = Handler::from_async(move |channel: String, order: OrderCreated| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((channel, order.id));
        }
    });
    let mut stream = Box::pin(
        subscriber
            .listen::<OrderCreated>(ListenOptions::new().handler(handler))
            .await?,
    );

    let order = OrderCreated { id: 7, total: 12.5 };
    publisher.publish("orders", &order).await?;

    let record = stream.next().await.unwrap()?;
    assert_eq!(record.data, order);
    assert_eq!(rx.recv().await, Some(("orders".to_string(), 7)));
    Ok(())
}

/// Тест проверяет явный namespace на вызове: подписка и прослушивание в
/// другом пространстве имён.
#[tokio::test]
async fn test_explicit_namespace_per_call() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    let publisher = client(&transport);

    subscriber
        .subscribe_with(&["jobs"], CallOptions::new().namespace("other"))
        .await?;
    assert_eq!(transport.broker().channel_subscribers("other:jobs"), 1);

    let mut stream = Box::pin(
        subscriber
            .listen::<Value>(ListenOptions::new().namespace("other"))
            .await?,
    );
    publisher
        .publish_with("jobs", &json!(1), CallOptions::new().namespace("other"))
        .await?;

    let record = stream.next().await.unwrap()?;
    assert_eq!(record.channel, "jobs");
    Ok(())
}

/// Тест проверяет строгий режим: чужой namespace приходит `Err`-элементом,
/// поток продолжается.
#[tokio::test]
async fn test_strict_namespace_mismatch_is_item() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = PubSubBuilder::new()
        .transport(Arc::new(transport.clone()))
        .namespace("cs")
        .namespace_mode(NamespaceMode::Strict)
        .listen_poll_interval(Duration::from_millis(10))
        .build()?;
    let publisher = client(&transport);

    subscriber
        .subscribe_with(&["x"], CallOptions::new().namespace("foreign"))
        .await?;
    subscriber.subscribe(&["x"]).await?;
    let mut stream = Box::pin(subscriber.listen::<Value>(ListenOptions::new()).await?);

    publisher
        .publish_with("x", &1, CallOptions::new().namespace("foreign"))
        .await?;
    publisher.publish("x", &2).await?;

    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.status_code(), StatusCode::NamespaceMismatch);
    let ok = stream.next().await.unwrap()?;
    assert_eq!(ok.data, json!(2));
    Ok(())
}

/// Тест проверяет подписку во время прослушивания: новые каналы
/// подхватываются тем же потоком.
#[tokio::test]
async fn test_resubscribe_while_listening() -> anyhow::Result<()> {
    let transport = MemoryTransport::new();
    let subscriber = client(&transport);
    let publisher = client(&transport);

    subscriber.subscribe(&["one"]).await?;
    let mut stream = Box::pin(subscriber.listen::<u32>(ListenOptions::new()).await?);

    subscriber.subscribe(&["two"]).await?;
    subscriber.unsubscribe(&["one"]).await?;
    publisher.publish("one", &1u32).await?;
    publisher.publish("two", &2u32).await?;

    let record = stream.next().await.unwrap()?;
    assert_eq!(record.channel, "two");
    assert_eq!(record.data, 2);
    Ok(())
}

/// Тест проверяет сборку клиентов из настроек через общий memory-бэкенд
/// реестра и область роли.
#[tokio::test]
async fn test_settings_registry_and_scope() -> anyhow::Result<()> {
    let settings = PubSubSettings {
        backend: "memory".to_string(),
        namespace: Some("app".to_string()),
        listen_poll_ms: 10,
        ..Default::default()
    };
    let registry = BackendRegistry::with_defaults();
    let subscriber = PubSubBuilder::from_settings(&settings, &registry)?.build()?;
    let publisher = PubSubBuilder::from_settings(&settings, &registry)?.build()?;

    let sub_scope = subscriber.scope(Role::Subscriber).await?;
    sub_scope.subscribe(&["events"]).await?;
    let mut stream = Box::pin(sub_scope.listen::<Value>(ListenOptions::new()).await?);

    let pub_scope = publisher.scope(Role::Publisher).await?;
    assert_eq!(pub_scope.publish("events", &json!({"ok": true})).await?, 1);

    let record = stream.next().await.unwrap()?;
    assert_eq!(record.data, json!({"ok": true}));

    pub_scope.release().await?;
    sub_scope.release().await?;
    assert!(stream.next().await.is_none());
    assert!(publisher.is_closed());
    Ok(())
}
