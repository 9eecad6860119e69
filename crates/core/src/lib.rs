//! Gollum core - the message pipeline and routing fabric
//!
//! This crate carries everything that makes the multiplexer tick:
//!
//! - [`Message`] - the payload + metadata record moved end-to-end
//! - [`StreamRegistry`] / [`Router`] - string-interned streams and per-stream
//!   fan-out to subscribed producers
//! - [`MessageBatch`] - the double-buffered, size/time-triggered flush engine
//!   shared by disk and network producers
//! - [`ProducerBase`] / [`ConsumerBase`] - shared plugin mechanics: inbound
//!   queue, control channel, tickered event loop, graceful drain
//! - the plugin lifecycle (state machine, control commands, kind registry)
//! - the internal log stream bridge that turns `tracing` events into
//!   pipeline messages
//!
//! Concrete producers and consumers live in their own crates and compose
//! these pieces.

mod batch;
mod error;
pub mod format;
mod log_stream;
mod message;
mod metrics;
mod plugin;
mod producer;
mod queue;
mod registry;
mod router;
mod stream;

pub use batch::MessageBatch;
pub use error::{PluginError, RegistryError};
pub use log_stream::{LogConsumer, LogStreamLayer};
pub use message::{Message, Metadata};
pub use metrics::{DropTracker, PipelineMetrics, PipelineSnapshot};
pub use plugin::{
    ConsumerBase, PluginControl, PluginHandle, PluginRole, PluginState, StateCell,
    CONTROL_CHANNEL_CAPACITY,
};
pub use producer::{ProducerBase, ProducerEvent};
pub use queue::MessageQueue;
pub use registry::StreamRegistry;
pub use router::{EnqueuePolicy, Router, Subscription};
pub use stream::{StreamId, LOG_INTERNAL_STREAM, WILDCARD_STREAM};
