//! File producer - batched writes, rotation, background compression
//!
//! Messages accumulate in the shared double-buffered batch; flushes go
//! to the currently-open file. When a rotation trigger fires the old
//! file is handed to the background gzip task and a fresh timestamped
//! file (plus the `name_current` symlink) takes its place.

mod compress;
mod rotation;

use std::fs::{File, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use gollum_config::{FileProducerConfig, GlobalConfig};
use gollum_core::{
    Message, MessageBatch, PluginControl, PluginError, PluginState, ProducerBase,
    ProducerEvent, StateCell, StreamRegistry, Subscription,
};

pub(crate) use rotation::{FileNamer, RotationPolicy};

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;

/// Bound for the synchronous flush wait during rotation and shutdown
const FLUSH_WAIT: Duration = Duration::from_secs(5);

struct OpenFile {
    handle: Arc<File>,
    path: PathBuf,
}

/// Producer writing batched messages to a (rotating) file
pub struct FileProducer {
    base: ProducerBase,
    batch: MessageBatch,
    batch_size: usize,
    batch_timeout: Duration,
    namer: FileNamer,
    policy: RotationPolicy,
    compress: bool,
    file: Option<OpenFile>,
    file_created: DateTime<Local>,
    force_rotate: bool,
    compressors: Vec<JoinHandle<()>>,
    // Permanent sink failure; the run loop stops on the next event.
    failed: bool,
}

impl FileProducer {
    /// Configure a file producer instance
    ///
    /// Creates the output directory, subscribes the configured streams
    /// and returns the producer with its control sender and state cell.
    /// No file is opened yet - that happens lazily on the first flush.
    pub fn configure(
        name: &str,
        config: &FileProducerConfig,
        global: &GlobalConfig,
        registry: &Arc<StreamRegistry>,
    ) -> Result<(Self, mpsc::Sender<PluginControl>, Arc<StateCell>), PluginError> {
        if config.file.is_empty() {
            return Err(PluginError::missing_option(name, "file"));
        }
        let rotate_at = config
            .rotate_at_parsed()
            .map_err(|message| PluginError::invalid_option(name, "rotate_at", message))?;

        let namer = FileNamer::from_path(&config.file);
        std::fs::create_dir_all(namer.dir()).map_err(|e| PluginError::setup(name, e))?;

        let policy = if config.rotate {
            RotationPolicy::new(config.rotate_size_mb, config.rotate_timeout_min, rotate_at)
        } else {
            RotationPolicy::disabled()
        };

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
            batch: MessageBatch::new(config.batch_size_max_kb << 10),
            batch_size: config.batch_size_byte,
            batch_timeout: Duration::from_secs(config.batch_timeout_sec.max(1)),
            namer,
            policy,
            compress: config.compress,
            file: None,
            file_created: Local::now(),
            force_rotate: false,
            compressors: Vec::new(),
            failed: false,
        };
        Ok((producer, control, state))
    }

    /// Run the producer until stopped
    pub async fn run(mut self) {
        if !self.base.wait_for_start().await {
            return;
        }
        tracing::info!(producer = %self.base.name(), "file producer starting");

        let mut ticker = tokio::time::interval(self.batch_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            match self.base.next_event(&mut ticker).await {
                ProducerEvent::Message(msg) => self.write_message(msg).await,
                ProducerEvent::Tick => self.flush_on_timeout().await,
                ProducerEvent::Roll => self.rotate().await,
                ProducerEvent::Stop => break,
            }
            if self.failed {
                tracing::error!(producer = %self.base.name(),
                    "permanent sink failure, shutting down");
                break;
            }
        }

        self.shutdown().await;
    }

    /// Whether any rotation trigger currently fires
    fn needs_rotate(&self) -> io::Result<bool> {
        let Some(open) = &self.file else {
            return Ok(true);
        };
        if self.force_rotate {
            return Ok(true);
        }
        if !self.policy.enabled() {
            return Ok(false);
        }
        let size = open.handle.metadata()?.len();
        Ok(self.policy.due(self.file_created, Local::now(), size))
    }

    /// Open (or rotate to) the target file if needed
    fn open_log(&mut self) -> io::Result<()> {
        if !self.needs_rotate()? {
            return Ok(());
        }
        self.force_rotate = false;

        let (path, file_name) = if self.policy.enabled() {
            self.namer.rotated(Local::now())?
        } else {
            self.namer.plain()
        };

        // Hand the previous file to the compressor before the new one
        // exists, so the directory scan in rotated() stays consistent.
        if let Some(old) = self.file.take() {
            self.dispatch_compress(old);
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }
        let file = options.open(&path)?;

        self.file = Some(OpenFile {
            handle: Arc::new(file),
            path: path.clone(),
        });
        self.file_created = Local::now();
        tracing::info!(producer = %self.base.name(), file = %path.display(), "opened log file");

        if self.policy.enabled() {
            let link = self.namer.current_symlink();
            let _ = std::fs::remove_file(&link);
            #[cfg(unix)]
            if let Err(err) = std::os::unix::fs::symlink(&file_name, &link) {
                tracing::warn!(
                    producer = %self.base.name(),
                    link = %link.display(),
                    error = %err,
                    "failed to update current symlink"
                );
            }
            #[cfg(not(unix))]
            let _ = file_name;
        }

        Ok(())
    }

    fn dispatch_compress(&mut self, old: OpenFile) {
        self.compressors.retain(|handle| !handle.is_finished());

        if !self.compress {
            tracing::info!(producer = %self.base.name(), file = %old.path.display(), "rotated");
            return;
        }

        let target = self.namer.gzip_target(&old.path);
        let handle = tokio::task::spawn_blocking(move || {
            compress::gzip_rotated(old.handle, old.path, target);
        });
        self.compressors.push(handle);
    }

    /// Rotate if due, then flush the batch to the open file
    async fn write_batch(&mut self) {
        // Rotation hands the old file away; never do that while a flush
        // may still be writing to it.
        if self.batch.flush_in_flight() && self.needs_rotate().unwrap_or(false) {
            self.batch.wait_for_flush(FLUSH_WAIT).await;
        }

        if let Err(err) = self.open_log() {
            if err.kind() == io::ErrorKind::PermissionDenied {
                self.base.set_state(PluginState::Stopping);
                self.failed = true;
            }
            tracing::error!(producer = %self.base.name(), error = %err, "file rotate error");
            return;
        }

        let Some(open) = &self.file else { return };
        let handle = Arc::clone(&open.handle);
        let name = self.base.name().to_string();
        self.batch.flush(
            move |data: Bytes| async move {
                match tokio::task::spawn_blocking(move || {
                    use std::io::Write;
                    let mut writer: &File = &handle;
                    writer.write_all(&data)?;
                    Ok::<usize, io::Error>(data.len())
                })
                .await
                {
                    Ok(result) => result,
                    Err(join_err) => Err(io::Error::other(join_err)),
                }
            },
            None::<fn()>,
            move |err| {
                tracing::error!(producer = %name, error = %err, "file write error");
                false
            },
        );
    }

    async fn flush_on_timeout(&mut self) {
        if self.batch.reached_time_threshold(self.batch_timeout)
            || self.batch.reached_size_threshold(self.batch_size)
        {
            self.write_batch().await;
        }
    }

    async fn write_message(&mut self, msg: Message) {
        let Some(msg) = self.base.format(msg) else {
            return;
        };
        if self.batch.append(&msg) {
            return;
        }
        self.write_batch().await;
        if !self.batch.append(&msg) {
            let metrics = self.base.metrics();
            if msg.len() > self.batch.max_bytes() {
                metrics.record_oversized();
                tracing::warn!(
                    producer = %self.base.name(),
                    size = msg.len(),
                    capacity = self.batch.max_bytes(),
                    "oversized message dropped"
                );
            } else {
                metrics.record_lost(1);
                tracing::warn!(producer = %self.base.name(), "message dropped, batch unavailable");
            }
        }
    }

    async fn rotate(&mut self) {
        self.force_rotate = true;
        self.write_batch().await;
    }

    async fn shutdown(mut self) {
        let mut pending = Vec::new();
        self.base.drain(|msg| pending.push(msg));
        for msg in pending {
            self.write_message(msg).await;
        }

        // Final flush; one more round if a failed write was retained.
        self.write_batch().await;
        self.batch.wait_for_flush(FLUSH_WAIT).await;
        if self.batch.unflushed_messages() > 0 {
            self.write_batch().await;
            self.batch.wait_for_flush(self.base.shutdown_timeout()).await;
        }

        let lost = self.batch.unflushed_messages();
        if lost > 0 {
            self.base.metrics().record_lost(lost as u64);
            tracing::warn!(producer = %self.base.name(), messages_lost = lost,
                "unflushed messages lost at shutdown");
        }
        self.batch.close(Duration::from_millis(10)).await;

        for handle in self.compressors.drain(..) {
            if let Err(err) = handle.await {
                tracing::error!(producer = %self.base.name(), error = %err,
                    "compressor task failed");
            }
        }

        self.file = None;
        self.base.set_state(PluginState::Dead);
        tracing::info!(producer = %self.base.name(), "file producer stopped");
    }
}

impl std::fmt::Debug for FileProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProducer")
            .field("name", &self.base.name())
            .field("open", &self.file.as_ref().map(|o| o.path.clone()))
            .field("batch_bytes", &self.batch.len())
            .finish()
    }
}
