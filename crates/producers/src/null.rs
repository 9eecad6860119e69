//! Null producer - counts and discards

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use gollum_config::{GlobalConfig, NullProducerConfig};
use gollum_core::{
    PluginControl, PluginError, PluginState, ProducerBase, ProducerEvent, StateCell,
    StreamRegistry, Subscription,
};

/// Producer that discards every message
///
/// Keeps a count so pipeline benchmarks and routing tests can assert
/// delivery without a real sink.
pub struct NullProducer {
    base: ProducerBase,
    discarded: Arc<AtomicU64>,
}

impl NullProducer {
    /// Configure a null producer instance
    pub fn configure(
        name: &str,
        config: &NullProducerConfig,
        global: &GlobalConfig,
        registry: &Arc<StreamRegistry>,
    ) -> Result<(Self, mpsc::Sender<PluginControl>, Arc<StateCell>), PluginError> {
        let streams: Vec<_> = config
            .stream
            .iter()
            .map(|s| registry.stream_id(s))
            .collect();

        let (base, control, state) = ProducerBase::new(
            name,
            streams.clone(),
            global.channel_capacity,
            global.shutdown_timeout,
        );
        registry.subscribe(&streams, Subscription::new(name, base.queue()));

        let producer = Self {
            base,
            discarded: Arc::new(AtomicU64::new(0)),
        };
        Ok((producer, control, state))
    }

    /// Counter handle for tests and diagnostics
    #[must_use]
    pub fn discarded(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.discarded)
    }

    /// Run the producer until stopped
    pub async fn run(mut self) {
        if !self.base.wait_for_start().await {
            return;
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            match self.base.next_event(&mut ticker).await {
                ProducerEvent::Message(_msg) => {
                    self.discarded.fetch_add(1, Ordering::Relaxed);
                }
                ProducerEvent::Tick | ProducerEvent::Roll => {}
                ProducerEvent::Stop => break,
            }
        }

        let discarded = Arc::clone(&self.discarded);
        self.base.drain(|_msg| {
            discarded.fetch_add(1, Ordering::Relaxed);
        });
        self.base.set_state(PluginState::Dead);
    }
}
