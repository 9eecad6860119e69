//! Plugin lifecycle - states, control commands, handles
//!
//! Every plugin (producer or consumer) owns a control channel and a state
//! cell. The control channel is the sole cancellation mechanism; the
//! coordinator drives the lifecycle:
//!
//! ```text
//! Initializing -> (configure ok) -> Waiting -> (start) -> Active
//!              -> (stop) -> Stopping -> Dead
//! ```
//!
//! A plugin whose configuration fails never leaves Initializing.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::stream::StreamId;

/// Capacity of every plugin control channel
pub const CONTROL_CHANNEL_CAPACITY: usize = 4;

/// Lifecycle state of a plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PluginState {
    /// Constructed, not yet configured
    Initializing = 0,
    /// Configured, waiting for the start signal
    Waiting = 1,
    /// Processing messages
    Active = 2,
    /// Stop received, draining
    Stopping = 3,
    /// Fully shut down
    Dead = 4,
}

impl PluginState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Initializing,
            1 => Self::Waiting,
            2 => Self::Active,
            3 => Self::Stopping,
            _ => Self::Dead,
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Shared, lock-free plugin state cell
///
/// Written by the plugin task, read by the coordinator.
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    /// New cell in `Initializing`
    #[must_use]
    pub fn new() -> Self {
        Self(AtomicU8::new(PluginState::Initializing as u8))
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn get(&self) -> PluginState {
        PluginState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Transition to a new state
    #[inline]
    pub fn set(&self, state: PluginState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Commands carried by a plugin's control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginControl {
    /// Producer may leave Waiting and start processing
    StartProducer,
    /// Consumer must stop reading and return
    StopConsumer,
    /// Producer must drain and shut down
    StopProducer,
    /// Producer should rotate its sink (log roll)
    Roll,
}

/// Whether a plugin produces (sink side) or consumes (source side)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginRole {
    Producer,
    Consumer,
}

/// Coordinator-side handle to a running plugin
///
/// Constructed by the plugin's constructor; the plugin task keeps the
/// receiving ends.
pub struct PluginHandle {
    name: String,
    role: PluginRole,
    control: mpsc::Sender<PluginControl>,
    state: Arc<StateCell>,
    streams: Vec<StreamId>,
    shutdown_timeout: Duration,
    join: JoinHandle<()>,
}

impl PluginHandle {
    /// Assemble a handle for a spawned plugin task
    pub fn new(
        name: impl Into<String>,
        role: PluginRole,
        control: mpsc::Sender<PluginControl>,
        state: Arc<StateCell>,
        streams: Vec<StreamId>,
        shutdown_timeout: Duration,
        join: JoinHandle<()>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            control,
            state,
            streams,
            shutdown_timeout,
            join,
        }
    }

    /// Instance name from the configuration
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Producer or consumer
    #[inline]
    #[must_use]
    pub fn role(&self) -> PluginRole {
        self.role
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> PluginState {
        self.state.get()
    }

    /// Streams this plugin is bound to
    #[inline]
    #[must_use]
    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    /// Upper bound for the Stopping phase
    #[inline]
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Send a control command; false when the plugin is gone
    pub async fn control(&self, cmd: PluginControl) -> bool {
        self.control.send(cmd).await.is_ok()
    }

    /// Wait for the plugin task to finish, bounded by its shutdown
    /// timeout plus `grace`
    ///
    /// Returns false when the task had to be abandoned.
    pub async fn join(self, grace: Duration) -> bool {
        let budget = self.shutdown_timeout + grace;
        match tokio::time::timeout(budget, self.join).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::error!(plugin = %self.name, error = %err, "plugin task panicked");
                false
            }
            Err(_) => {
                tracing::warn!(
                    plugin = %self.name,
                    timeout_ms = budget.as_millis() as u64,
                    "plugin did not stop in time, abandoning"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Shared consumer-side plugin mechanics: control channel and state
///
/// Concrete consumers embed this and select on [`ConsumerBase::stopped`]
/// next to their input source.
pub struct ConsumerBase {
    name: String,
    control: mpsc::Receiver<PluginControl>,
    state: Arc<StateCell>,
    streams: Vec<StreamId>,
}

impl ConsumerBase {
    /// Create the base plus the sender/state pair for the handle
    pub fn new(
        name: impl Into<String>,
        streams: Vec<StreamId>,
    ) -> (Self, mpsc::Sender<PluginControl>, Arc<StateCell>) {
        let (tx, rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        let state = Arc::new(StateCell::new());
        (
            Self {
                name: name.into(),
                control: rx,
                state: Arc::clone(&state),
                streams,
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

    /// Streams this consumer posts to
    #[inline]
    #[must_use]
    pub fn streams(&self) -> &[StreamId] {
        &self.streams
    }

    /// Update the lifecycle state
    #[inline]
    pub fn set_state(&self, state: PluginState) {
        self.state.set(state);
    }

    /// Resolve when a stop command arrives (or the channel closes)
    pub async fn stopped(&mut self) {
        loop {
            match self.control.recv().await {
                Some(PluginControl::StopConsumer) | None => return,
                Some(other) => {
                    tracing::trace!(consumer = %self.name, command = ?other, "ignoring control command");
                }
            }
        }
    }
}
