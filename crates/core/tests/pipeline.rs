//! End-to-end routing fabric tests
//!
//! Drives the public surface the way the daemon wires it: registry,
//! routers, producer queues.

use std::sync::Arc;

use gollum_core::{
    EnqueuePolicy, Message, MessageQueue, Router, StreamId, StreamRegistry, Subscription,
};

async fn post(registry: &StreamRegistry, stream: &str, text: &str) -> StreamId {
    let id = registry.stream_id(stream);
    let msg = Message::new(text.as_bytes().to_vec(), id);
    registry.get_router(id).enqueue(msg).await;
    id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_basic_fan_out() {
    let registry = Arc::new(StreamRegistry::new());

    let router_a = Arc::new(Router::new("A", EnqueuePolicy::DropNewest));
    let router_b = Arc::new(Router::new("B", EnqueuePolicy::DropNewest));
    registry.register(Arc::clone(&router_a)).unwrap();
    registry.register(Arc::clone(&router_b)).unwrap();

    // Producer P subscribes to A only.
    let queue = Arc::new(MessageQueue::bounded(16));
    registry.subscribe(
        &[registry.stream_id("A")],
        Subscription::new("P", Arc::clone(&queue)),
    );

    for text in ["a1", "a2", "a3"] {
        router_a
            .enqueue(Message::new(text, registry.stream_id("A")))
            .await;
    }
    for text in ["b1", "b2"] {
        router_b
            .enqueue(Message::new(text, registry.stream_id("B")))
            .await;
    }

    // Exactly the three A-messages, in order.
    let mut received = Vec::new();
    while let Some(msg) = queue.try_pop() {
        received.push(String::from_utf8(msg.payload().to_vec()).unwrap());
    }
    assert_eq!(received, ["a1", "a2", "a3"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wildcard_producer_sees_every_stream() {
    let registry = Arc::new(StreamRegistry::new());

    let queue = Arc::new(MessageQueue::bounded(16));
    registry.subscribe(
        &[StreamId::wildcard()],
        Subscription::new("catch-all", Arc::clone(&queue)),
    );

    // Both routers come into existence after the subscription, one
    // explicitly, one lazily.
    let explicit = Arc::new(Router::new("explicit", EnqueuePolicy::DropNewest));
    registry.register(Arc::clone(&explicit)).unwrap();
    explicit
        .enqueue(Message::new("from-explicit", explicit.stream_id()))
        .await;

    let lazy_id = registry.stream_id("lazy");
    registry
        .get_router(lazy_id)
        .enqueue(Message::new("from-lazy", lazy_id))
        .await;

    let mut received = Vec::new();
    while let Some(msg) = queue.try_pop() {
        received.push(String::from_utf8(msg.payload().to_vec()).unwrap());
    }
    assert_eq!(received, ["from-explicit", "from-lazy"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_producer_queue_is_sole_backpressure_surface() {
    let registry = Arc::new(StreamRegistry::new());
    let router = Arc::new(Router::new("busy", EnqueuePolicy::DropNewest));
    registry.register(Arc::clone(&router)).unwrap();

    let fast = Arc::new(MessageQueue::bounded(64));
    let slow = Arc::new(MessageQueue::bounded(2));
    router.subscribe(Subscription::new("fast", Arc::clone(&fast)));
    router.subscribe(Subscription::new("slow", Arc::clone(&slow)));

    for i in 0..10 {
        router
            .enqueue(Message::new(format!("m{i}"), router.stream_id()))
            .await;
    }

    // The slow producer's overflow never affects the fast one.
    assert_eq!(fast.len(), 10);
    assert_eq!(slow.len(), 2);
    assert_eq!(router.metrics().snapshot().dropped, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_id_interning_is_shared() {
    let registry = Arc::new(StreamRegistry::new());
    let id = post(&registry, "shared", "x").await;
    assert_eq!(id, registry.stream_id("shared"));
    assert_eq!(id, StreamId::from_name("shared"));
}
