//! Bootstrap and lifecycle coordination
//!
//! Order of operations:
//!
//! 1. Build the stream registry and the configured routers.
//! 2. Spawn the internal log consumer and install the tracing stack
//!    (console output plus the `_GOLLUM_` bridge).
//! 3. Construct every enabled plugin through the type registry; any
//!    configure failure aborts startup.
//! 4. Send the start signal to all producers.
//! 5. Wait for a shutdown signal (SIGHUP rolls the log producers).
//! 6. Stop consumers first, then producers, each bounded by its
//!    shutdown timeout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gollum_config::{Config, OverflowPolicy};
use gollum_core::{
    EnqueuePolicy, LogConsumer, PluginControl, PluginHandle, Router, StreamRegistry,
};

use crate::plugins::{BootstrapContext, PluginFactory};

/// Extra join budget on top of each plugin's shutdown timeout
const JOIN_GRACE: Duration = Duration::from_secs(1);

/// Startup failures split by exit code
#[derive(Debug)]
pub enum RunError {
    /// Configuration-class failure (exit code 1)
    Config(anyhow::Error),
    /// Runtime failure (exit code 2)
    Runtime(anyhow::Error),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) | Self::Runtime(err) => write!(f, "{err:#}"),
        }
    }
}

/// Run the multiplexer until a shutdown signal arrives
pub async fn run(config: Config) -> Result<(), RunError> {
    let registry = Arc::new(StreamRegistry::new());

    // Configured routers; unconfigured streams get lazy defaults later.
    for (name, stream_config) in &config.streams {
        let policy = match stream_config.policy {
            OverflowPolicy::Block => EnqueuePolicy::Block {
                deadline: stream_config.block_deadline,
            },
            OverflowPolicy::DropOldest => EnqueuePolicy::DropOldest,
            OverflowPolicy::DropNewest => EnqueuePolicy::DropNewest,
        };
        let router = Arc::new(Router::new(name.as_str(), policy));
        router.set_chains(
            gollum_format::build_filters(name, &stream_config.filter)
                .map_err(|e| RunError::Config(e.into()))?,
            gollum_format::build_formatters(name, &stream_config.formatter)
                .map_err(|e| RunError::Config(e.into()))?,
        );
        registry
            .register(router)
            .map_err(|e| RunError::Config(e.into()))?;
    }

    // The log bridge needs the registry; the subscriber stack needs the
    // bridge. Everything before this point must not log.
    let (log_handle, log_layer) = LogConsumer::spawn(Arc::clone(&registry));
    init_logging(config.log.level.as_str(), log_layer)?;

    let factory = PluginFactory::with_builtin_plugins();
    let ctx = BootstrapContext {
        registry: Arc::clone(&registry),
        global: config.global.clone(),
    };

    let mut consumers: Vec<PluginHandle> = vec![log_handle];
    for (name, consumer_config) in config.consumers.iter() {
        if !consumer_config.is_enabled() {
            tracing::info!(consumer = %name, "disabled, skipping");
            continue;
        }
        let handle = factory
            .construct_consumer(name, consumer_config, &ctx)
            .map_err(|e| RunError::Config(e.into()))?;
        consumers.push(handle);
    }

    let mut producers: Vec<PluginHandle> = Vec::new();
    for (name, producer_config) in config.producers.iter() {
        if !producer_config.is_enabled() {
            tracing::info!(producer = %name, "disabled, skipping");
            continue;
        }
        let handle = factory
            .construct_producer(name, producer_config, &ctx)
            .map_err(|e| RunError::Config(e.into()))?;
        producers.push(handle);
    }

    for producer in &producers {
        producer.control(PluginControl::StartProducer).await;
    }

    tracing::info!(
        consumers = consumers.len(),
        producers = producers.len(),
        routers = registry.router_count(),
        "gollum started"
    );

    wait_for_signals(&producers).await?;

    shutdown(consumers, producers).await;
    Ok(())
}

fn init_logging(level: &str, log_layer: gollum_core::LogStreamLayer) -> Result<(), RunError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| RunError::Config(anyhow!("invalid log level: {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(log_layer)
        .try_init()
        .map_err(|e| RunError::Runtime(anyhow!("failed to init logging: {e}")))?;
    Ok(())
}

/// Block until SIGTERM/ctrl-c; SIGHUP broadcasts a roll to producers
#[cfg(unix)]
async fn wait_for_signals(producers: &[PluginHandle]) -> Result<(), RunError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| RunError::Runtime(anyhow!("failed to listen for SIGTERM: {e}")))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| RunError::Runtime(anyhow!("failed to listen for SIGHUP: {e}")))?;

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received");
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("ctrl-c received");
                return Ok(());
            }
            _ = sighup.recv() => {
                tracing::info!("SIGHUP received, rolling producers");
                for producer in producers {
                    producer.control(PluginControl::Roll).await;
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_producers: &[PluginHandle]) -> Result<(), RunError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| RunError::Runtime(anyhow!("failed to listen for ctrl-c: {e}")))?;
    tracing::info!("ctrl-c received");
    Ok(())
}

/// Stop consumers first so no new messages enter the pipeline, then let
/// producers drain
async fn shutdown(consumers: Vec<PluginHandle>, producers: Vec<PluginHandle>) {
    tracing::info!("shutting down");

    for consumer in &consumers {
        consumer.control(PluginControl::StopConsumer).await;
    }
    for consumer in consumers {
        let name = consumer.name().to_string();
        if !consumer.join(JOIN_GRACE).await {
            tracing::warn!(consumer = %name, "did not stop cleanly");
        }
    }

    for producer in &producers {
        producer.control(PluginControl::StopProducer).await;
    }
    for producer in producers {
        let name = producer.name().to_string();
        if !producer.join(JOIN_GRACE).await {
            tracing::warn!(producer = %name, "did not stop cleanly");
        }
    }

    tracing::info!("shutdown complete");
}
