//! Router fan-out and overflow policy tests

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::format::{Filter, FilterChain, FormatError, Formatter, FormatterChain};

fn msg(text: &str, stream: &str) -> Message {
    Message::new(text.as_bytes().to_vec(), StreamId::from_name(stream))
}

fn subscribed_router(policy: EnqueuePolicy, capacity: usize) -> (Router, Arc<MessageQueue>) {
    let router = Router::new("test", policy);
    let queue = Arc::new(MessageQueue::bounded(capacity));
    router.subscribe(Subscription::new("producer", Arc::clone(&queue)));
    (router, queue)
}

#[tokio::test]
async fn test_enqueue_delivers_in_order() {
    let (router, queue) = subscribed_router(EnqueuePolicy::DropNewest, 8);

    for text in ["one", "two", "three"] {
        assert_eq!(router.enqueue(msg(text, "test")).await, 1);
    }

    assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"one");
    assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"two");
    assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"three");
}

#[tokio::test]
async fn test_fan_out_to_all_subscribers() {
    let router = Router::new("fanout", EnqueuePolicy::DropNewest);
    let q1 = Arc::new(MessageQueue::bounded(4));
    let q2 = Arc::new(MessageQueue::bounded(4));
    router.subscribe(Subscription::new("p1", Arc::clone(&q1)));
    router.subscribe(Subscription::new("p2", Arc::clone(&q2)));

    assert_eq!(router.enqueue(msg("x", "fanout")).await, 2);
    assert_eq!(q1.len(), 1);
    assert_eq!(q2.len(), 1);
}

#[tokio::test]
async fn test_duplicate_subscription_ignored() {
    let router = Router::new("dup", EnqueuePolicy::DropNewest);
    let q = Arc::new(MessageQueue::bounded(4));
    router.subscribe(Subscription::new("p", Arc::clone(&q)));
    router.subscribe(Subscription::new("p", Arc::clone(&q)));

    assert_eq!(router.subscriber_count(), 1);
    assert_eq!(router.enqueue(msg("x", "dup")).await, 1);
    assert_eq!(q.len(), 1);
}

#[tokio::test]
async fn test_drop_newest_discards_arrival() {
    let (router, queue) = subscribed_router(EnqueuePolicy::DropNewest, 1);

    assert_eq!(router.enqueue(msg("keep", "test")).await, 1);
    assert_eq!(router.enqueue(msg("lost", "test")).await, 0);

    assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"keep");
    assert!(queue.try_pop().is_none());
    assert_eq!(router.metrics().snapshot().dropped, 1);
}

#[tokio::test]
async fn test_drop_oldest_evicts_head() {
    let (router, queue) = subscribed_router(EnqueuePolicy::DropOldest, 1);

    router.enqueue(msg("old", "test")).await;
    router.enqueue(msg("new", "test")).await;

    assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"new");
    assert!(queue.try_pop().is_none());
}

#[tokio::test]
async fn test_block_policy_waits_for_room() {
    let (router, queue) = subscribed_router(
        EnqueuePolicy::Block {
            deadline: Duration::from_millis(500),
        },
        1,
    );

    router.enqueue(msg("first", "test")).await;

    // Free a slot shortly after the second enqueue starts waiting.
    let q = Arc::clone(&queue);
    let drainer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.try_pop()
    });

    assert_eq!(router.enqueue(msg("second", "test")).await, 1);
    drainer.await.unwrap();
    assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"second");
}

#[tokio::test]
async fn test_block_policy_drops_after_deadline() {
    let (router, queue) = subscribed_router(
        EnqueuePolicy::Block {
            deadline: Duration::from_millis(20),
        },
        1,
    );

    router.enqueue(msg("first", "test")).await;
    assert_eq!(router.enqueue(msg("second", "test")).await, 0);
    assert_eq!(queue.len(), 1);
    assert_eq!(router.metrics().snapshot().dropped, 1);
}

struct RejectAll;

impl Filter for RejectAll {
    fn accepts(&self, _msg: &Message) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "reject_all"
    }
}

#[tokio::test]
async fn test_filtered_message_counted_not_delivered() {
    let (router, queue) = subscribed_router(EnqueuePolicy::DropNewest, 4);
    router.set_chains(FilterChain::new(vec![Box::new(RejectAll)]), FormatterChain::empty());

    assert_eq!(router.enqueue(msg("x", "test")).await, 0);
    assert!(queue.is_empty());

    let s = router.metrics().snapshot();
    assert_eq!(s.filtered, 1);
    assert_eq!(s.dropped, 0);
}

struct Upper;

impl Formatter for Upper {
    fn format(&self, mut msg: Message) -> Result<Message, FormatError> {
        let upper = msg.payload().to_ascii_uppercase();
        msg.set_payload(upper);
        Ok(msg)
    }

    fn name(&self) -> &'static str {
        "upper"
    }
}

#[tokio::test]
async fn test_formatter_applied_before_fan_out() {
    let (router, queue) = subscribed_router(EnqueuePolicy::DropNewest, 4);
    router.set_chains(FilterChain::empty(), FormatterChain::new(vec![Box::new(Upper)]));

    router.enqueue(msg("quiet", "test")).await;
    assert_eq!(queue.try_pop().unwrap().payload().as_ref(), b"QUIET");
}

struct Broken;

impl Formatter for Broken {
    fn format(&self, _msg: Message) -> Result<Message, FormatError> {
        Err(FormatError::new("broken", "no"))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_formatter_failure_drops_and_counts() {
    let (router, queue) = subscribed_router(EnqueuePolicy::DropNewest, 4);
    router.set_chains(FilterChain::empty(), FormatterChain::new(vec![Box::new(Broken)]));

    assert_eq!(router.enqueue(msg("x", "test")).await, 0);
    assert!(queue.is_empty());
    assert_eq!(router.metrics().snapshot().format_errors, 1);
}

#[tokio::test]
async fn test_no_subscribers_drops() {
    let router = Router::new("empty", EnqueuePolicy::DropNewest);
    assert_eq!(router.enqueue(msg("x", "empty")).await, 0);
    assert_eq!(router.metrics().snapshot().dropped, 1);
}

#[tokio::test]
async fn test_concurrent_enqueue_preserves_per_task_order() {
    let router = Arc::new(Router::new("conc", EnqueuePolicy::Block {
        deadline: Duration::from_secs(1),
    }));
    let queue = Arc::new(MessageQueue::bounded(512));
    router.subscribe(Subscription::new("p", Arc::clone(&queue)));

    let mut tasks = vec![];
    for task_id in 0..4u32 {
        let router = Arc::clone(&router);
        tasks.push(tokio::spawn(async move {
            for i in 0..50u32 {
                let text = format!("{task_id}:{i}");
                router.enqueue(msg(&text, "conc")).await;
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    // Per submitting task, sequence must be increasing.
    let mut last_seen = [None::<u32>; 4];
    while let Some(m) = queue.try_pop() {
        let text = String::from_utf8(m.payload().to_vec()).unwrap();
        let (task, i) = text.split_once(':').unwrap();
        let task: usize = task.parse().unwrap();
        let i: u32 = i.parse().unwrap();
        if let Some(prev) = last_seen[task] {
            assert!(i > prev, "task {task} delivered {i} after {prev}");
        }
        last_seen[task] = Some(i);
    }
}
