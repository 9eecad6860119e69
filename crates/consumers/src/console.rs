//! Console consumer - stdin lines onto the pipeline

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use gollum_config::{ConsoleConsumerConfig, GlobalConfig};
use gollum_core::{
    ConsumerBase, PluginControl, PluginError, PluginState, StateCell, StreamRegistry,
};

/// Consumer posting each stdin line to its configured streams
pub struct ConsoleConsumer {
    base: ConsumerBase,
    registry: Arc<StreamRegistry>,
}

impl ConsoleConsumer {
    /// Configure a console consumer instance
    pub fn configure(
        name: &str,
        config: &ConsoleConsumerConfig,
        _global: &GlobalConfig,
        registry: &Arc<StreamRegistry>,
    ) -> Result<(Self, mpsc::Sender<PluginControl>, Arc<StateCell>), PluginError> {
        if config.stream.is_empty() {
            return Err(PluginError::missing_option(name, "stream"));
        }
        let streams: Vec<_> = config
            .stream
            .iter()
            .map(|s| registry.stream_id(s))
            .collect();

        let (base, control, state) = ConsumerBase::new(name, streams);
        Ok((
            Self {
                base,
                registry: Arc::clone(registry),
            },
            control,
            state,
        ))
    }

    /// Run the consumer until stdin closes or a stop command arrives
    pub async fn run(mut self) {
        self.base.set_state(PluginState::Active);
        tracing::debug!(consumer = %self.base.name(), "console consumer starting");

        let name = self.base.name().to_string();
        let streams = self.base.streams().to_vec();
        let registry = Arc::clone(&self.registry);

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        crate::post_line(&registry, &streams, line.into_bytes()).await;
                    }
                    Ok(None) => {
                        tracing::debug!(consumer = %name, "stdin closed");
                        break;
                    }
                    Err(err) => {
                        tracing::error!(consumer = %name, error = %err, "stdin read error");
                        break;
                    }
                },
                _ = self.base.stopped() => break,
            }
        }

        self.base.set_state(PluginState::Dead);
    }
}
