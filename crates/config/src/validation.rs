//! Configuration validation
//!
//! Runs after parsing and turns semantic problems into typed errors
//! before any plugin is constructed.

use crate::error::{ConfigError, Result};
use crate::producers::ProducerConfig;
use crate::Config;

/// Validate a parsed configuration
pub fn validate_config(config: &Config) -> Result<()> {
    let mut any_consumer = false;
    for (_name, consumer) in config.consumers.iter() {
        if consumer.is_enabled() {
            any_consumer = true;
        }
    }

    let mut any_producer = false;
    for (name, producer) in config.producers.iter() {
        if !producer.is_enabled() {
            continue;
        }
        any_producer = true;

        match producer {
            ProducerConfig::File(file) => {
                if file.file.is_empty() {
                    return Err(ConfigError::missing_field("producer", name, "file"));
                }
                if let Err(message) = file.rotate_at_parsed() {
                    return Err(ConfigError::invalid_value(
                        "producer",
                        name,
                        "rotate_at",
                        message,
                    ));
                }
                if file.batch_size_max_kb == 0 {
                    return Err(ConfigError::invalid_value(
                        "producer",
                        name,
                        "batch_size_max_kb",
                        "must be greater than zero",
                    ));
                }
            }
            ProducerConfig::Scribe(scribe) => {
                if scribe.host.is_empty() {
                    return Err(ConfigError::missing_field("producer", name, "host"));
                }
                if scribe.buffer_size_max_kb == 0 {
                    return Err(ConfigError::invalid_value(
                        "producer",
                        name,
                        "buffer_size_max_kb",
                        "must be greater than zero",
                    ));
                }
            }
            ProducerConfig::Console(_) | ProducerConfig::Null(_) => {}
        }

        if producer.streams().is_empty() {
            return Err(ConfigError::invalid_value(
                "producer",
                name,
                "stream",
                "must name at least one stream",
            ));
        }
    }

    if !any_consumer {
        return Err(ConfigError::NoConsumersEnabled);
    }
    if !any_producer {
        return Err(ConfigError::NoProducersEnabled);
    }

    Ok(())
}
