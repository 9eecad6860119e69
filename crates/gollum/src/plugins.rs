//! Plugin type registry
//!
//! Maps kind strings ("producer.file", "consumer.console", ...) to
//! constructor functions. Constructors configure the concrete plugin,
//! subscribe its streams and spawn its task, handing back the
//! coordinator-side handle.

use std::collections::HashMap;
use std::sync::Arc;

use gollum_config::{ConsumerConfig, GlobalConfig, ProducerConfig};
use gollum_consumers::{ConsoleConsumer, SocketConsumer};
use gollum_core::{PluginError, PluginHandle, PluginRole, StreamRegistry};
use gollum_producers::{ConsoleProducer, FileProducer, NullProducer, ScribeProducer};

/// Everything a constructor needs besides its own option table
pub struct BootstrapContext {
    /// The process-wide stream registry
    pub registry: Arc<StreamRegistry>,
    /// Global defaults (queue capacity, shutdown timeout)
    pub global: GlobalConfig,
}

type ProducerCtor =
    fn(&str, &ProducerConfig, &BootstrapContext) -> Result<PluginHandle, PluginError>;
type ConsumerCtor =
    fn(&str, &ConsumerConfig, &BootstrapContext) -> Result<PluginHandle, PluginError>;

/// Kind-string -> constructor registry, built once at startup
pub struct PluginFactory {
    producers: HashMap<&'static str, ProducerCtor>,
    consumers: HashMap<&'static str, ConsumerCtor>,
}

impl PluginFactory {
    /// Registry with every built-in plugin registered
    #[must_use]
    pub fn with_builtin_plugins() -> Self {
        let mut factory = Self {
            producers: HashMap::new(),
            consumers: HashMap::new(),
        };
        factory.register_producer("producer.file", construct_file);
        factory.register_producer("producer.scribe", construct_scribe);
        factory.register_producer("producer.console", construct_console_producer);
        factory.register_producer("producer.null", construct_null);
        factory.register_consumer("consumer.console", construct_console_consumer);
        factory.register_consumer("consumer.socket", construct_socket);
        factory
    }

    fn register_producer(&mut self, kind: &'static str, ctor: ProducerCtor) {
        self.producers.insert(kind, ctor);
    }

    fn register_consumer(&mut self, kind: &'static str, ctor: ConsumerCtor) {
        self.consumers.insert(kind, ctor);
    }

    /// Construct, configure and spawn a producer instance
    pub fn construct_producer(
        &self,
        name: &str,
        config: &ProducerConfig,
        ctx: &BootstrapContext,
    ) -> Result<PluginHandle, PluginError> {
        let kind = config.kind();
        let ctor = self.producers.get(kind).ok_or_else(|| PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: kind.to_string(),
        })?;
        ctor(name, config, ctx)
    }

    /// Construct, configure and spawn a consumer instance
    pub fn construct_consumer(
        &self,
        name: &str,
        config: &ConsumerConfig,
        ctx: &BootstrapContext,
    ) -> Result<PluginHandle, PluginError> {
        let kind = config.kind();
        let ctor = self.consumers.get(kind).ok_or_else(|| PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: kind.to_string(),
        })?;
        ctor(name, config, ctx)
    }
}

fn stream_ids(ctx: &BootstrapContext, streams: &[String]) -> Vec<gollum_core::StreamId> {
    streams.iter().map(|s| ctx.registry.stream_id(s)).collect()
}

fn construct_file(
    name: &str,
    config: &ProducerConfig,
    ctx: &BootstrapContext,
) -> Result<PluginHandle, PluginError> {
    let ProducerConfig::File(config) = config else {
        return Err(PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: "producer.file".into(),
        });
    };
    let streams = stream_ids(ctx, &config.stream);
    let (producer, control, state) =
        FileProducer::configure(name, config, &ctx.global, &ctx.registry)?;
    let join = tokio::spawn(producer.run());
    Ok(PluginHandle::new(
        name,
        PluginRole::Producer,
        control,
        state,
        streams,
        ctx.global.shutdown_timeout,
        join,
    ))
}

fn construct_scribe(
    name: &str,
    config: &ProducerConfig,
    ctx: &BootstrapContext,
) -> Result<PluginHandle, PluginError> {
    let ProducerConfig::Scribe(config) = config else {
        return Err(PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: "producer.scribe".into(),
        });
    };
    let streams = stream_ids(ctx, &config.stream);
    let (producer, control, state) =
        ScribeProducer::configure(name, config, &ctx.global, &ctx.registry)?;
    let join = tokio::spawn(producer.run());
    Ok(PluginHandle::new(
        name,
        PluginRole::Producer,
        control,
        state,
        streams,
        ctx.global.shutdown_timeout,
        join,
    ))
}

fn construct_console_producer(
    name: &str,
    config: &ProducerConfig,
    ctx: &BootstrapContext,
) -> Result<PluginHandle, PluginError> {
    let ProducerConfig::Console(config) = config else {
        return Err(PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: "producer.console".into(),
        });
    };
    let streams = stream_ids(ctx, &config.stream);
    let (producer, control, state) =
        ConsoleProducer::configure(name, config, &ctx.global, &ctx.registry)?;
    let join = tokio::spawn(producer.run());
    Ok(PluginHandle::new(
        name,
        PluginRole::Producer,
        control,
        state,
        streams,
        ctx.global.shutdown_timeout,
        join,
    ))
}

fn construct_null(
    name: &str,
    config: &ProducerConfig,
    ctx: &BootstrapContext,
) -> Result<PluginHandle, PluginError> {
    let ProducerConfig::Null(config) = config else {
        return Err(PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: "producer.null".into(),
        });
    };
    let streams = stream_ids(ctx, &config.stream);
    let (producer, control, state) =
        NullProducer::configure(name, config, &ctx.global, &ctx.registry)?;
    let join = tokio::spawn(producer.run());
    Ok(PluginHandle::new(
        name,
        PluginRole::Producer,
        control,
        state,
        streams,
        ctx.global.shutdown_timeout,
        join,
    ))
}

fn construct_console_consumer(
    name: &str,
    config: &ConsumerConfig,
    ctx: &BootstrapContext,
) -> Result<PluginHandle, PluginError> {
    let ConsumerConfig::Console(config) = config else {
        return Err(PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: "consumer.console".into(),
        });
    };
    let streams = stream_ids(ctx, &config.stream);
    let (consumer, control, state) =
        ConsoleConsumer::configure(name, config, &ctx.global, &ctx.registry)?;
    let join = tokio::spawn(consumer.run());
    Ok(PluginHandle::new(
        name,
        PluginRole::Consumer,
        control,
        state,
        streams,
        ctx.global.shutdown_timeout,
        join,
    ))
}

fn construct_socket(
    name: &str,
    config: &ConsumerConfig,
    ctx: &BootstrapContext,
) -> Result<PluginHandle, PluginError> {
    let ConsumerConfig::Socket(config) = config else {
        return Err(PluginError::UnknownKind {
            plugin: name.to_string(),
            kind: "consumer.socket".into(),
        });
    };
    let streams = stream_ids(ctx, &config.stream);
    let (consumer, control, state) =
        SocketConsumer::configure(name, config, &ctx.global, &ctx.registry)?;
    let join = tokio::spawn(consumer.run());
    Ok(PluginHandle::new(
        name,
        PluginRole::Consumer,
        control,
        state,
        streams,
        ctx.global.shutdown_timeout,
        join,
    ))
}
