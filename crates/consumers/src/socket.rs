//! Socket consumer - newline-delimited TCP payloads
//!
//! Accepts connections and posts every received line to the configured
//! streams. One task per connection; a watch channel fans the stop
//! signal out to all of them.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use gollum_config::{GlobalConfig, SocketConsumerConfig};
use gollum_core::{
    ConsumerBase, PluginControl, PluginError, PluginState, StateCell, StreamId,
    StreamRegistry,
};

/// Consumer accepting line-oriented TCP input
pub struct SocketConsumer {
    base: ConsumerBase,
    registry: Arc<StreamRegistry>,
    address: String,
}

impl SocketConsumer {
    /// Configure a socket consumer instance
    pub fn configure(
        name: &str,
        config: &SocketConsumerConfig,
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
                address: format!("{}:{}", config.address, config.port),
            },
            control,
            state,
        ))
    }

    /// Run the consumer until stopped
    pub async fn run(mut self) {
        let name = self.base.name().to_string();
        let listener = match TcpListener::bind(&self.address).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::error!(consumer = %name, address = %self.address, error = %err,
                    "failed to bind listener");
                self.base.set_state(PluginState::Dead);
                return;
            }
        };
        self.base.set_state(PluginState::Active);
        tracing::info!(consumer = %name, address = %self.address, "socket consumer listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let streams = self.base.streams().to_vec();
        let registry = Arc::clone(&self.registry);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        tracing::debug!(consumer = %name, peer = %peer, "connection accepted");
                        let registry = Arc::clone(&registry);
                        let streams = streams.clone();
                        let stop = stop_rx.clone();
                        tokio::spawn(read_lines(socket, registry, streams, stop));
                    }
                    Err(err) => {
                        tracing::warn!(consumer = %name, error = %err, "accept failed");
                    }
                },
                _ = self.base.stopped() => break,
            }
        }

        // Connection tasks observe the flag and finish their line.
        let _ = stop_tx.send(true);
        drop(listener);
        self.base.set_state(PluginState::Dead);
        tracing::info!(consumer = %name, "socket consumer stopped");
    }
}

async fn read_lines(
    socket: TcpStream,
    registry: Arc<StreamRegistry>,
    streams: Vec<StreamId>,
    mut stop: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(socket).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => crate::post_line(&registry, &streams, line.into_bytes()).await,
                Ok(None) | Err(_) => return,
            },
            _ = stop.changed() => {
                if *stop.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use gollum_core::{EnqueuePolicy, MessageQueue, Router, Subscription};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_lines_reach_subscribed_queue() {
        let registry = Arc::new(StreamRegistry::new());
        let router = Arc::new(Router::new("net", EnqueuePolicy::DropNewest));
        let queue = Arc::new(MessageQueue::bounded(16));
        router.subscribe(Subscription::new("sink", Arc::clone(&queue)));
        registry.register(router).unwrap();

        let config = SocketConsumerConfig {
            port: 0, // pick a free port
            stream: vec!["net".into()],
            ..SocketConsumerConfig::default()
        };
        // Bind manually to learn the port before running.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = SocketConsumerConfig {
            port: addr.port(),
            ..config
        };
        let (consumer, control, state) =
            SocketConsumer::configure("tcp", &config, &GlobalConfig::default(), &registry)
                .unwrap();
        let runner = tokio::spawn(consumer.run());

        // Wait for the listener to come up.
        let mut client = None;
        for _ in 0..50 {
            match TcpStream::connect(("127.0.0.1", addr.port())).await {
                Ok(stream) => {
                    client = Some(stream);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        let mut client = client.expect("consumer listening");
        client.write_all(b"first\nsecond\n").await.unwrap();
        client.shutdown().await.unwrap();

        // Messages arrive asynchronously.
        let mut received = Vec::new();
        for _ in 0..100 {
            while let Some(msg) = queue.try_pop() {
                received.push(String::from_utf8(msg.payload().to_vec()).unwrap());
            }
            if received.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received, ["first", "second"]);

        control.send(PluginControl::StopConsumer).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.get(), PluginState::Dead);
    }
}
