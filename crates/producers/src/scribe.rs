//! Scribe-shape network producer
//!
//! Batches messages as length-prefixed category records and sends them
//! over a framed TCP connection. The connection is best-effort: on any
//! send failure it is dropped, the batch is retained, and the next
//! flush reconnects under bounded exponential backoff.
//!
//! Frame layout per record:
//!
//! ```text
//! [u32 BE: body length][u16 BE: category length][category][payload]
//! ```

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use socket2::SockRef;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Instant, MissedTickBehavior};

use gollum_config::{GlobalConfig, ScribeProducerConfig};
use gollum_core::{
    Message, MessageBatch, PluginControl, PluginError, PluginState, ProducerBase,
    ProducerEvent, StateCell, StreamId, StreamRegistry, Subscription,
};

/// Connect attempt budget
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnect backoff bounds
const BACKOFF_MIN: Duration = Duration::from_millis(250);
const BACKOFF_MAX: Duration = Duration::from_secs(15);

/// Fallback category when no mapping matches
const DEFAULT_CATEGORY: &str = "default";

struct Backoff {
    delay: Duration,
    not_before: Instant,
}

impl Backoff {
    fn new() -> Self {
        Self {
            delay: BACKOFF_MIN,
            not_before: Instant::now(),
        }
    }

    fn ready(&self) -> bool {
        Instant::now() >= self.not_before
    }

    fn failure(&mut self) {
        self.not_before = Instant::now() + self.delay;
        self.delay = (self.delay * 2).min(BACKOFF_MAX);
    }

    fn success(&mut self) {
        self.delay = BACKOFF_MIN;
        self.not_before = Instant::now();
    }
}

/// Producer sending framed batches to a scribe-style endpoint
pub struct ScribeProducer {
    base: ProducerBase,
    batch: MessageBatch,
    batch_size: usize,
    batch_timeout: Duration,
    endpoint: String,
    send_buffer_bytes: usize,
    categories: HashMap<StreamId, String>,
    default_category: String,
    conn: Arc<Mutex<Option<TcpStream>>>,
    backoff: Backoff,
}

impl ScribeProducer {
    /// Configure a scribe producer instance
    pub fn configure(
        name: &str,
        config: &ScribeProducerConfig,
        global: &GlobalConfig,
        registry: &Arc<StreamRegistry>,
    ) -> Result<(Self, mpsc::Sender<PluginControl>, Arc<StateCell>), PluginError> {
        if config.host.is_empty() {
            return Err(PluginError::missing_option(name, "host"));
        }

        // The category mapping is resolved at send time by stream id;
        // "*" becomes the fallback.
        let mut categories = HashMap::with_capacity(config.category.len());
        let mut default_category = DEFAULT_CATEGORY.to_string();
        for (stream, category) in &config.category {
            if stream == gollum_core::WILDCARD_STREAM {
                default_category = category.clone();
            } else {
                categories.insert(registry.stream_id(stream), category.clone());
            }
        }

        let streams: Vec<_> = config
            .stream
            .iter()
            .map(|s| registry.stream_id(s))
            .collect();

        let (mut base, control, state) = ProducerBase::new(
            name,
            streams.clone(),
            global.channel_capacity,
            global.shutdown_timeout,
        );
        base.set_formatters(gollum_format::build_formatters(name, &config.formatter)?);
        registry.subscribe(&streams, Subscription::new(name, base.queue()));

        let producer = Self {
            base,
            batch: MessageBatch::new(config.buffer_size_max_kb << 10),
            batch_size: config.batch_size_byte,
            batch_timeout: Duration::from_secs(config.batch_timeout_sec.max(1)),
            endpoint: format!("{}:{}", config.host, config.port),
            send_buffer_bytes: config.buffer_size_kb << 10,
            categories,
            default_category,
            conn: Arc::new(Mutex::new(None)),
            backoff: Backoff::new(),
        };
        Ok((producer, control, state))
    }

    /// Run the producer until stopped
    pub async fn run(mut self) {
        if !self.base.wait_for_start().await {
            return;
        }
        tracing::info!(
            producer = %self.base.name(),
            endpoint = %self.endpoint,
            "scribe producer starting"
        );

        let mut ticker = tokio::time::interval(self.batch_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            match self.base.next_event(&mut ticker).await {
                ProducerEvent::Message(msg) => self.send_message(msg).await,
                ProducerEvent::Tick => {
                    if self.batch.reached_time_threshold(self.batch_timeout)
                        || self.batch.reached_size_threshold(self.batch_size)
                    {
                        self.send().await;
                    }
                }
                ProducerEvent::Roll => {
                    // Nothing rotates here; a roll just forces a
                    // reconnect on the next send.
                    self.conn.lock().await.take();
                }
                ProducerEvent::Stop => break,
            }
        }

        self.shutdown().await;
    }

    fn category_for(&self, id: StreamId) -> &str {
        self.categories
            .get(&id)
            .map(String::as_str)
            .unwrap_or(&self.default_category)
    }

    /// Append one message as a framed record, flushing as needed
    async fn send_message(&mut self, msg: Message) {
        let Some(msg) = self.base.format(msg) else {
            return;
        };
        let record = encode_record(self.category_for(msg.stream_id()), msg.payload());

        if record.len() > self.batch.max_bytes() {
            self.base.metrics().record_oversized();
            tracing::warn!(
                producer = %self.base.name(),
                size = record.len(),
                capacity = self.batch.max_bytes(),
                "oversized message dropped"
            );
            return;
        }

        if !self.batch.append_bytes(&record) {
            self.send().await;
            if !self.batch.append_bytes(&record) {
                self.base.metrics().record_lost(1);
                tracing::warn!(producer = %self.base.name(),
                    "message dropped, batch unavailable");
            }
        }

        if self.batch.reached_size_threshold(self.batch_size) {
            self.send().await;
        }
    }

    /// Flush the batch over the connection, reconnecting first if needed
    ///
    /// Without a connection the batch is simply retained; the data is
    /// retried on the next trigger.
    async fn send(&mut self) {
        if !self.ensure_connected().await {
            return;
        }

        let conn = Arc::clone(&self.conn);
        let err_conn = Arc::clone(&self.conn);
        let name = self.base.name().to_string();
        self.batch.flush(
            move |data: Bytes| async move {
                let mut guard = conn.lock().await;
                let Some(stream) = guard.as_mut() else {
                    return Err(io::Error::new(
                        io::ErrorKind::NotConnected,
                        "connection lost before send",
                    ));
                };
                if let Err(err) = stream.write_all(&data).await {
                    guard.take();
                    return Err(err);
                }
                if let Err(err) = stream.flush().await {
                    guard.take();
                    return Err(err);
                }
                Ok(data.len())
            },
            None::<fn()>,
            move |err| {
                tracing::error!(producer = %name, error = %err,
                    "send failed, keeping batch for retry");
                // Drop the connection so the next flush reconnects.
                if let Ok(mut guard) = err_conn.try_lock() {
                    guard.take();
                }
                true
            },
        );
    }

    /// Open the connection if closed; false while backoff holds or the
    /// attempt fails
    async fn ensure_connected(&mut self) -> bool {
        if self.conn.lock().await.is_some() {
            return true;
        }
        if !self.backoff.ready() {
            return false;
        }

        match timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(stream)) => {
                if let Err(err) = stream.set_nodelay(true) {
                    tracing::debug!(producer = %self.base.name(), error = %err,
                        "failed to set TCP_NODELAY");
                }
                let sock = SockRef::from(&stream);
                if let Err(err) = sock.set_send_buffer_size(self.send_buffer_bytes) {
                    tracing::debug!(producer = %self.base.name(), error = %err,
                        "failed to set send buffer size");
                }

                tracing::info!(producer = %self.base.name(), endpoint = %self.endpoint,
                    "connected");
                *self.conn.lock().await = Some(stream);
                self.backoff.success();
                true
            }
            Ok(Err(err)) => {
                self.backoff.failure();
                tracing::error!(producer = %self.base.name(), endpoint = %self.endpoint,
                    error = %err, "connection failed");
                false
            }
            Err(_elapsed) => {
                self.backoff.failure();
                tracing::error!(producer = %self.base.name(), endpoint = %self.endpoint,
                    "connection attempt timed out");
                false
            }
        }
    }

    async fn shutdown(mut self) {
        let mut pending = Vec::new();
        self.base.drain(|msg| pending.push(msg));
        for msg in pending {
            self.send_message(msg).await;
        }

        self.send().await;
        self.batch.wait_for_flush(self.base.shutdown_timeout()).await;
        if self.batch.unflushed_messages() > 0 {
            // One retry round for a batch retained by a failed send.
            self.send().await;
            self.batch.wait_for_flush(self.base.shutdown_timeout()).await;
        }

        let lost = self.batch.unflushed_messages();
        if lost > 0 {
            self.base.metrics().record_lost(lost as u64);
            tracing::warn!(producer = %self.base.name(), messages_lost = lost,
                "unflushed messages lost at shutdown");
        }
        self.batch.close(Duration::from_millis(10)).await;

        self.conn.lock().await.take();
        self.base.set_state(PluginState::Dead);
        tracing::info!(producer = %self.base.name(), "scribe producer stopped");
    }
}

/// Encode one category record with its length prefix
fn encode_record(category: &str, payload: &[u8]) -> Vec<u8> {
    let body_len = 2 + category.len() + payload.len();
    let mut record = Vec::with_capacity(4 + body_len);
    record.extend_from_slice(&(body_len as u32).to_be_bytes());
    record.extend_from_slice(&(category.len() as u16).to_be_bytes());
    record.extend_from_slice(category.as_bytes());
    record.extend_from_slice(payload);
    record
}

impl std::fmt::Debug for ScribeProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScribeProducer")
            .field("name", &self.base.name())
            .field("endpoint", &self.endpoint)
            .field("batch_bytes", &self.batch.len())
            .finish()
    }
}
