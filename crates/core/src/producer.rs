//! ProducerBase - shared producer mechanics
//!
//! Concrete producers embed a `ProducerBase` and drive their work loop
//! with [`ProducerBase::next_event`], the Rust rendering of the tickered
//! control loop: one await point multiplexing the inbound queue, the
//! control channel and the flush ticker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};

use crate::format::FormatterChain;
use crate::message::Message;
use crate::metrics::PipelineMetrics;
use crate::plugin::{PluginControl, PluginState, StateCell, CONTROL_CHANNEL_CAPACITY};
use crate::queue::MessageQueue;
use crate::stream::StreamId;

/// What a producer's event loop should do next
#[derive(Debug)]
pub enum ProducerEvent {
    /// A message arrived on the inbound queue
    Message(Message),
    /// The flush ticker fired
    Tick,
    /// Rotate the sink
    Roll,
    /// Drain and shut down
    Stop,
}

/// Shared producer plumbing: inbound queue, control channel, state,
/// formatter chain and counters
pub struct ProducerBase {
    name: String,
    queue: Arc<MessageQueue>,
    control: mpsc::Receiver<PluginControl>,
    state: Arc<StateCell>,
    streams: Vec<StreamId>,
    shutdown_timeout: Duration,
    formatters: FormatterChain,
    metrics: Arc<PipelineMetrics>,
}

impl ProducerBase {
    /// Create the base plus the sender/state pair for the plugin handle
    ///
    /// `queue_capacity` bounds the inbound queue - the producer's whole
    /// backpressure surface.
    pub fn new(
        name: impl Into<String>,
        streams: Vec<StreamId>,
        queue_capacity: usize,
        shutdown_timeout: Duration,
    ) -> (Self, mpsc::Sender<PluginControl>, Arc<StateCell>) {
        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let state = Arc::new(StateCell::new());
        (
            Self {
                name: name.into(),
                queue: Arc::new(MessageQueue::bounded(queue_capacity)),
                control: rx,
                state: Arc::clone(&state),
                streams,
                shutdown_timeout,
                formatters: FormatterChain::empty(),
                metrics: Arc::new(PipelineMetrics::new()),
            },
            tx,
            state,
        )
    }

    /// Instance name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The inbound queue routers push into
    #[inline]
    #[must_use]
    pub fn queue(&self) -> Arc<MessageQueue> {
        Arc::clone(&self.queue)
    }

    /// Streams this producer subscribes to
    #[inline]
    #[must_use]
    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    /// Upper bound for draining on stop
    #[inline]
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Producer-local counters
    #[inline]
    #[must_use]
    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Install the producer-level formatter chain
    pub fn set_formatters(&mut self, formatters: FormatterChain) {
        self.formatters = formatters;
    }

    /// Update the lifecycle state
    #[inline]
    pub fn set_state(&self, state: PluginState) {
        self.state.set(state);
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> PluginState {
        self.state.get()
    }

    /// Run the producer-level formatter chain over a message
    ///
    /// A formatter failure counts and consumes the message; the caller
    /// just skips it.
    pub fn format(&self, msg: Message) -> Option<Message> {
        if self.formatters.is_empty() {
            return Some(msg);
        }
        match self.formatters.format(msg) {
            Ok(msg) => Some(msg),
            Err(err) => {
                self.metrics.record_format_error();
                tracing::debug!(producer = %self.name, error = %err, "formatter dropped message");
                None
            }
        }
    }

    /// Block in `Waiting` until the coordinator sends the start signal
    ///
    /// Returns false when a stop arrives (or the coordinator went away)
    /// before the start; the producer should exit without processing.
    pub async fn wait_for_start(&mut self) -> bool {
        self.state.set(PluginState::Waiting);
        loop {
            match self.control.recv().await {
                Some(PluginControl::StartProducer) => {
                    self.state.set(PluginState::Active);
                    return true;
                }
                Some(PluginControl::StopProducer) | None => {
                    self.state.set(PluginState::Dead);
                    return false;
                }
                Some(other) => {
                    tracing::trace!(producer = %self.name, command = ?other,
                        "ignoring control command before start");
                }
            }
        }
    }

    /// Await the next event: inbound message, control command or tick
    pub async fn next_event(&mut self, ticker: &mut Interval) -> ProducerEvent {
        let queue = Arc::clone(&self.queue);
        loop {
            tokio::select! {
                msg = queue.pop() => {
                    return match msg {
                        Some(msg) => ProducerEvent::Message(msg),
                        // Queue closed under us: treat as stop.
                        None => ProducerEvent::Stop,
                    };
                }
                cmd = self.control.recv() => {
                    match cmd {
                        Some(PluginControl::Roll) => return ProducerEvent::Roll,
                        Some(PluginControl::StopProducer) | None => return ProducerEvent::Stop,
                        Some(other) => {
                            tracing::trace!(producer = %self.name, command = ?other,
                                "ignoring control command");
                        }
                    }
                }
                _ = ticker.tick() => return ProducerEvent::Tick,
            }
        }
    }

    /// Drain the inbound queue best-effort, bounded by the shutdown
    /// timeout
    ///
    /// Returns the number of messages handed to `handle`.
    pub fn drain(&mut self, mut handle: impl FnMut(Message)) -> usize {
        self.state.set(PluginState::Stopping);
        self.queue.close();

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut drained = 0;
        while let Some(msg) = self.queue.try_pop() {
            handle(msg);
            drained += 1;
            if Instant::now() >= deadline {
                let left = self.queue.len();
                if left > 0 {
                    self.metrics.record_lost(left as u64);
                    tracing::warn!(producer = %self.name, messages_lost = left,
                        "shutdown timeout hit while draining");
                }
                break;
            }
        }
        drained
    }
}

impl std::fmt::Debug for ProducerBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerBase")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .field("queue_len", &self.queue.len())
            .finish()
    }
}
