//! Internal log stream
//!
//! Log events emitted anywhere in the process are bridged onto the
//! `_GOLLUM_` stream as ordinary messages, so producers can subscribe to
//! the multiplexer's own log like any other stream.
//!
//! [`LogStreamLayer`] is a `tracing` layer doing the bridging (the Rust
//! analogue of a logrus hook); [`LogConsumer`] is the plugin wrapper that
//! gives the bridge a place in the lifecycle. Enqueueing is strictly
//! non-blocking and drop-on-overflow: a logging pipeline that logs its
//! own overflows must never recurse or deadlock.

use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::message::Message;
use crate::plugin::{ConsumerBase, PluginHandle, PluginRole, PluginState};
use crate::registry::StreamRegistry;
use crate::stream::StreamId;

thread_local! {
    // Guards against the bridge logging through itself.
    static IN_BRIDGE: Cell<bool> = const { Cell::new(false) };
}

struct Shared {
    registry: Arc<StreamRegistry>,
    enabled: AtomicBool,
}

/// `tracing` layer forwarding events onto the internal log stream
#[derive(Clone)]
pub struct LogStreamLayer {
    shared: Arc<Shared>,
}

struct FieldCollector {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.push((field.name().to_string(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields.push((field.name().to_string(), format!("{value:?}")));
        }
    }
}

impl LogStreamLayer {
    fn bridge(&self, event: &Event<'_>) {
        if !self.shared.enabled.load(Ordering::Acquire) {
            return;
        }

        let mut collector = FieldCollector {
            message: String::new(),
            fields: Vec::new(),
        };
        event.record(&mut collector);

        let level = event.metadata().level().as_str().to_ascii_lowercase();
        let mut line = collector.message;
        for (key, value) in &collector.fields {
            let _ = write!(line, " {key}={value}");
        }
        // Rendered entries may carry a trailing linefeed; the stream
        // transports bare payloads.
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }

        let mut msg = Message::new(line.into_bytes(), StreamId::log_internal());
        let timestamp = msg.timestamp().to_rfc3339();
        let meta = msg.metadata_mut();
        meta.set("Level", level.into_bytes());
        meta.set("Time", timestamp.into_bytes());
        for (key, value) in collector.fields {
            meta.set(key, value.into_bytes());
        }

        let router = self.shared.registry.get_router(StreamId::log_internal());
        router.try_enqueue(msg);
    }
}

impl<S: Subscriber> Layer<S> for LogStreamLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        IN_BRIDGE.with(|flag| {
            if flag.get() {
                return;
            }
            flag.set(true);
            self.bridge(event);
            flag.set(false);
        });
    }
}

/// The internal log consumer plugin
///
/// Owns the bridge's on/off switch; its task only listens for the stop
/// command. Its shutdown timeout is one millisecond - there is nothing
/// to drain.
pub struct LogConsumer;

impl LogConsumer {
    /// Shutdown bound for the internal log consumer
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(1);

    /// Spawn the consumer task and return its plugin handle
    pub fn spawn(registry: Arc<StreamRegistry>) -> (PluginHandle, LogStreamLayer) {
        let shared = Arc::new(Shared {
            registry,
            enabled: AtomicBool::new(true),
        });
        let layer = LogStreamLayer {
            shared: Arc::clone(&shared),
        };

        let (mut base, control, state) =
            ConsumerBase::new("_log", vec![StreamId::log_internal()]);
        base.set_state(PluginState::Active);

        let task_shared = shared;
        let join = tokio::spawn(async move {
            base.stopped().await;
            task_shared.enabled.store(false, Ordering::Release);
            base.set_state(PluginState::Dead);
        });

        let handle = PluginHandle::new(
            "_log",
            PluginRole::Consumer,
            control,
            state,
            vec![StreamId::log_internal()],
            Self::SHUTDOWN_TIMEOUT,
            join,
        );
        (handle, layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginControl;
    use crate::queue::MessageQueue;
    use crate::router::{EnqueuePolicy, Router, Subscription};

    fn registry_with_log_sink() -> (Arc<StreamRegistry>, Arc<MessageQueue>) {
        let registry = Arc::new(StreamRegistry::new());
        let router = Arc::new(Router::new(
            crate::stream::LOG_INTERNAL_STREAM,
            EnqueuePolicy::DropNewest,
        ));
        let queue = Arc::new(MessageQueue::bounded(16));
        router.subscribe(Subscription::new("sink", Arc::clone(&queue)));
        registry.register(router).unwrap();
        (registry, queue)
    }

    #[test]
    fn test_layer_strips_trailing_newline() {
        let (registry, queue) = registry_with_log_sink();
        let layer = LogStreamLayer {
            shared: Arc::new(Shared {
                registry,
                enabled: AtomicBool::new(true),
            }),
        };

        use tracing_subscriber::prelude::*;
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("something happened\n");
        });

        let msg = queue.try_pop().expect("log message bridged");
        assert_eq!(msg.payload().as_ref(), b"something happened");
        assert_eq!(msg.metadata().get("Level").unwrap().as_ref(), b"info");
        assert!(msg.metadata().get("Time").is_some());
    }

    #[test]
    fn test_layer_attaches_adhoc_fields() {
        let (registry, queue) = registry_with_log_sink();
        let layer = LogStreamLayer {
            shared: Arc::new(Shared {
                registry,
                enabled: AtomicBool::new(true),
            }),
        };

        use tracing_subscriber::prelude::*;
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(producer = "file", "sink unavailable");
        });

        let msg = queue.try_pop().expect("log message bridged");
        assert_eq!(msg.metadata().get("Level").unwrap().as_ref(), b"warn");
        assert_eq!(msg.metadata().get("producer").unwrap().as_ref(), b"file");
        let text = String::from_utf8(msg.payload().to_vec()).unwrap();
        assert!(text.contains("sink unavailable"));
        assert!(text.contains("producer=file"));
    }

    #[tokio::test]
    async fn test_log_consumer_stop_disables_bridge() {
        let (registry, _queue) = registry_with_log_sink();
        let (handle, layer) = LogConsumer::spawn(registry);

        assert!(layer.shared.enabled.load(Ordering::Acquire));
        assert!(handle.control(PluginControl::StopConsumer).await);
        assert!(handle.join(Duration::from_millis(100)).await);
        assert!(!layer.shared.enabled.load(Ordering::Acquire));
    }
}
