//! Console producer - formatted messages to stdout or stderr

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use gollum_config::{ConsoleProducerConfig, ConsoleTarget, GlobalConfig};
use gollum_core::{
    Message, PluginControl, PluginError, PluginState, ProducerBase, ProducerEvent,
    StateCell, StreamRegistry, Subscription,
};

enum Sink {
    Stdout(tokio::io::Stdout),
    Stderr(tokio::io::Stderr),
}

impl Sink {
    async fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Sink::Stdout(out) => out.write_all(data).await,
            Sink::Stderr(err) => err.write_all(data).await,
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Stdout(out) => out.flush().await,
            Sink::Stderr(err) => err.flush().await,
        }
    }
}

/// Producer writing each message to the process console
///
/// No batching - console output is for eyeballs, not throughput. A
/// message without a trailing newline gets one, so interleaved streams
/// stay line-oriented.
pub struct ConsoleProducer {
    base: ProducerBase,
    sink: Sink,
}

impl ConsoleProducer {
    /// Configure a console producer instance
    pub fn configure(
        name: &str,
        config: &ConsoleProducerConfig,
        global: &GlobalConfig,
        registry: &Arc<StreamRegistry>,
    ) -> Result<(Self, mpsc::Sender<PluginControl>, Arc<StateCell>), PluginError> {
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

        let sink = match config.target {
            ConsoleTarget::Stdout => Sink::Stdout(tokio::io::stdout()),
            ConsoleTarget::Stderr => Sink::Stderr(tokio::io::stderr()),
        };
        Ok((Self { base, sink }, control, state))
    }

    /// Run the producer until stopped
    pub async fn run(mut self) {
        if !self.base.wait_for_start().await {
            return;
        }
        tracing::debug!(producer = %self.base.name(), "console producer starting");

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            match self.base.next_event(&mut ticker).await {
                ProducerEvent::Message(msg) => self.print(msg).await,
                ProducerEvent::Tick => {
                    let _ = self.sink.flush().await;
                }
                ProducerEvent::Roll => {}
                ProducerEvent::Stop => break,
            }
        }

        let mut pending = Vec::new();
        self.base.drain(|msg| pending.push(msg));
        for msg in pending {
            self.print(msg).await;
        }
        let _ = self.sink.flush().await;
        self.base.set_state(PluginState::Dead);
    }

    async fn print(&mut self, msg: Message) {
        let Some(msg) = self.base.format(msg) else {
            return;
        };
        let result = if msg.payload().ends_with(b"\n") {
            self.sink.write(msg.payload()).await
        } else {
            match self.sink.write(msg.payload()).await {
                Ok(()) => self.sink.write(b"\n").await,
                err => err,
            }
        };
        if let Err(err) = result {
            tracing::error!(producer = %self.base.name(), error = %err, "console write error");
        }
    }
}
