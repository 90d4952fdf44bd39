use std::{hint::black_box, sync::Arc};

use criterion::{criterion_group, criterion_main, Criterion};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use zpubsub::{
    pubsub::NamespaceCodec, JsonSerializer, ListenOptions, MemoryTransport, PubSub, Serializer,
};

fn bench_build_key(c: &mut Criterion) {
    let codec = NamespaceCodec::new(Some("cs".to_string())).unwrap();
    c.bench_function("namespace_build_key", |b| {
        b.iter(|| black_box(codec.build_key(black_box("orders.created"), None)))
    });
}

fn bench_parse_key(c: &mut Criterion) {
    let codec = NamespaceCodec::new(Some("cs".to_string())).unwrap();
    c.bench_function("namespace_parse_key", |b| {
        b.iter(|| black_box(codec.parse_key(black_box("cs:orders.created"), None).unwrap()))
    });
}

fn bench_serializer(c: &mut Criterion) {
    let serializer = JsonSerializer;
    let value = json!({"id": 42, "items": [1, 2, 3], "note": "hello"});
    let text = serializer.dumps(&value).unwrap();

    c.bench_function("json_dumps", |b| {
        b.iter(|| black_box(serializer.dumps(black_box(&value)).unwrap()))
    });
    c.bench_function("json_loads", |b| {
        b.iter(|| black_box(serializer.loads::<Value>(Some(black_box(&text))).unwrap()))
    });
}

fn bench_memory_publish_0_sub(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let publisher = PubSub::builder()
        .transport(Arc::new(MemoryTransport::new()))
        .namespace("bench")
        .build()
        .unwrap();

    c.bench_function("memory_publish_0_subs", |b| {
        b.iter(|| rt.block_on(async { black_box(publisher.publish("chan", &1).await.unwrap()) }))
    });
}

fn bench_memory_publish_listen(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let transport = MemoryTransport::new();
    let make = || {
        PubSub::builder()
            .transport(Arc::new(transport.clone()))
            .namespace("bench")
            .build()
            .unwrap()
    };
    let publisher = make();
    let subscriber = make();

    let mut stream = rt.block_on(async {
        subscriber.subscribe(&["chan"]).await.unwrap();
        Box::pin(
            subscriber
                .listen::<Value>(ListenOptions::new())
                .await
                .unwrap(),
        )
    });

    c.bench_function("memory_publish_listen_roundtrip", |b| {
        b.iter(|| {
            rt.block_on(async {
                publisher.publish("chan", &json!({"n": 1})).await.unwrap();
                black_box(stream.next().await.unwrap().unwrap())
            })
        })
    });
}

criterion_group!(
    benches,
    bench_build_key,
    bench_parse_key,
    bench_serializer,
    bench_memory_publish_0_sub,
    bench_memory_publish_listen,
);
criterion_main!(benches);
