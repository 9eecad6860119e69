//! Router - per-stream fan-out to subscribed producers
//!
//! One router exists per stream. Consumers hand messages to
//! [`Router::enqueue`] which runs the stream's filter and formatter chains
//! and then offers the message to every subscribed producer's inbound
//! queue, applying the configured overflow policy.
//!
//! `enqueue` is called from many consumer tasks concurrently; all state
//! it touches is behind locks held only for non-awaiting sections.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::time::Instant;

use crate::format::{FilterChain, FormatterChain};
use crate::message::Message;
use crate::metrics::{DropTracker, PipelineMetrics};
use crate::queue::MessageQueue;
use crate::stream::StreamId;

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;

/// Behavior when a subscriber's inbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueuePolicy {
    /// Wait with backoff up to the deadline, then drop and count
    Block {
        /// Longest time a single enqueue may wait per subscriber
        deadline: Duration,
    },
    /// Evict the head of the subscriber queue, append the new message
    DropOldest,
    /// Discard the arriving message
    DropNewest,
}

impl Default for EnqueuePolicy {
    fn default() -> Self {
        Self::DropNewest
    }
}

/// A producer's inbound queue as seen by the router
#[derive(Clone)]
pub struct Subscription {
    producer: Arc<str>,
    queue: Arc<MessageQueue>,
}

impl Subscription {
    /// Create a subscription for the named producer
    pub fn new(producer: impl Into<Arc<str>>, queue: Arc<MessageQueue>) -> Self {
        Self {
            producer: producer.into(),
            queue,
        }
    }

    /// Name of the subscribed producer
    #[inline]
    #[must_use]
    pub fn producer(&self) -> &str {
        &self.producer
    }

    /// The producer's inbound queue
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("producer", &self.producer)
            .field("queue_len", &self.queue.len())
            .finish()
    }
}

struct Chains {
    filters: FilterChain,
    formatters: FormatterChain,
}

/// Fan-out point for a single stream
pub struct Router {
    stream_id: StreamId,
    name: Arc<str>,
    policy: EnqueuePolicy,
    subscribers: RwLock<Vec<Subscription>>,
    chains: RwLock<Chains>,
    metrics: Arc<PipelineMetrics>,
    drop_tracker: DropTracker,
    is_default: bool,
}

impl Router {
    /// Create a router for the named stream
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, policy: EnqueuePolicy) -> Self {
        let name = name.into();
        Self {
            stream_id: StreamId::from_name(&name),
            name,
            policy,
            subscribers: RwLock::new(Vec::new()),
            chains: RwLock::new(Chains {
                filters: FilterChain::empty(),
                formatters: FormatterChain::empty(),
            }),
            metrics: Arc::new(PipelineMetrics::new()),
            drop_tracker: DropTracker::new(),
            is_default: false,
        }
    }

    /// A lazily-created router with no subscribers; everything it
    /// receives is dropped and counted
    #[must_use]
    pub(crate) fn default_for(name: impl Into<Arc<str>>) -> Self {
        let mut router = Self::new(name, EnqueuePolicy::DropNewest);
        router.is_default = true;
        router
    }

    /// The stream this router fans out
    #[inline]
    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// The stream name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this router was lazily created as a drop target
    #[inline]
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// The configured overflow policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> EnqueuePolicy {
        self.policy
    }

    /// Shared metrics for this router
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Install the filter and formatter chains (bootstrap only)
    pub fn set_chains(&self, filters: FilterChain, formatters: FormatterChain) {
        let mut chains = self.chains.write().unwrap();
        chains.filters = filters;
        chains.formatters = formatters;
    }

    /// Subscribe a producer's inbound queue
    ///
    /// Subscribing the same producer twice is a no-op; delivery order per
    /// message follows subscription order.
    pub fn subscribe(&self, subscription: Subscription) {
        let mut subs = self.subscribers.write().unwrap();
        if subs.iter().any(|s| s.producer == subscription.producer) {
            return;
        }
        tracing::debug!(
            stream = %self.name,
            producer = %subscription.producer,
            "producer subscribed"
        );
        subs.push(subscription);
    }

    /// Number of subscribed producers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().len()
    }

    /// Route a message to every subscriber
    ///
    /// Order of operations: filter chain, formatter chain, fan-out. A
    /// filtered message is counted and silently consumed. A formatter
    /// failure counts as a format error and consumes the message. Returns
    /// the number of subscriber queues the message reached.
    pub async fn enqueue(&self, msg: Message) -> usize {
        self.metrics.record_enqueued();

        let msg = {
            let chains = self.chains.read().unwrap();

            if !chains.filters.accepts(&msg) {
                self.metrics.record_filtered();
                return 0;
            }

            match chains.formatters.format(msg) {
                Ok(msg) => msg,
                Err(err) => {
                    self.metrics.record_format_error();
                    tracing::debug!(stream = %self.name, error = %err, "formatter dropped message");
                    return 0;
                }
            }
        };

        // Snapshot so no lock is held across awaits.
        let subscribers: Vec<Subscription> = self.subscribers.read().unwrap().clone();
        if subscribers.is_empty() {
            self.metrics.record_dropped();
            if !self.is_default {
                self.drop_tracker.record(&self.name);
            }
            return 0;
        }

        let mut delivered = 0;
        let last = subscribers.len() - 1;
        let mut msg = Some(msg);
        for (i, sub) in subscribers.iter().enumerate() {
            // The last subscriber takes ownership; earlier ones get a clone.
            let m = if i == last {
                msg.take()
            } else {
                msg.clone()
            };
            let Some(m) = m else { break };
            if self.offer(sub, m).await {
                delivered += 1;
                self.metrics.record_routed();
            } else {
                self.metrics.record_dropped();
                self.drop_tracker.record(sub.producer());
            }
        }

        delivered
    }

    /// Route a message without ever suspending
    ///
    /// Same filter/format/fan-out order as [`enqueue`](Self::enqueue) but
    /// overflow always drops the arriving message, regardless of the
    /// configured policy. This is the only entry point the internal log
    /// bridge may use - a blocking log path could deadlock the pipeline
    /// it is reporting on.
    pub fn try_enqueue(&self, msg: Message) -> usize {
        self.metrics.record_enqueued();

        let msg = {
            let chains = self.chains.read().unwrap();
            if !chains.filters.accepts(&msg) {
                self.metrics.record_filtered();
                return 0;
            }
            match chains.formatters.format(msg) {
                Ok(msg) => msg,
                Err(_err) => {
                    self.metrics.record_format_error();
                    return 0;
                }
            }
        };

        let subscribers = self.subscribers.read().unwrap();
        let mut delivered = 0;
        for sub in subscribers.iter() {
            match sub.queue.try_push(msg.clone()) {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.record_routed();
                }
                Err(_full) => {
                    self.metrics.record_dropped();
                }
            }
        }
        if subscribers.is_empty() {
            self.metrics.record_dropped();
        }
        delivered
    }

    /// Offer one message to one subscriber under the configured policy
    async fn offer(&self, sub: &Subscription, msg: Message) -> bool {
        match self.policy {
            EnqueuePolicy::DropNewest => sub.queue.try_push(msg).is_ok(),
            EnqueuePolicy::DropOldest => match sub.queue.push_evict(msg) {
                Ok(None) => true,
                Ok(Some(_evicted)) => {
                    // The arriving message got in; the evicted head is the drop.
                    self.metrics.record_dropped();
                    true
                }
                Err(_closed) => false,
            },
            EnqueuePolicy::Block { deadline } => {
                let give_up = Instant::now() + deadline;
                let mut backoff = Duration::from_millis(1);
                let mut msg = msg;
                loop {
                    match sub.queue.try_push(msg) {
                        Ok(()) => return true,
                        Err(back) => {
                            if sub.queue.is_closed() || Instant::now() >= give_up {
                                return false;
                            }
                            msg = back;
                        }
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_millis(16));
                }
            }
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("stream", &self.name)
            .field("policy", &self.policy)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
