//! Core error types

use thiserror::Error;

/// Errors from stream registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A non-default router already owns the stream
    #[error("a router for stream '{stream}' is already registered")]
    AlreadyRegistered {
        /// Name of the contested stream
        stream: String,
    },
}

/// Errors raised while constructing or configuring a plugin
///
/// All of these are fatal at startup; a plugin whose configuration fails
/// never leaves the Initializing state.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A required option is missing
    #[error("plugin '{plugin}' is missing required option '{option}'")]
    MissingOption {
        /// Plugin instance name
        plugin: String,
        /// Option name
        option: &'static str,
    },

    /// An option holds an unusable value
    #[error("plugin '{plugin}' has invalid {option}: {message}")]
    InvalidOption {
        /// Plugin instance name
        plugin: String,
        /// Option name
        option: &'static str,
        /// What is wrong with it
        message: String,
    },

    /// The plugin could not set up its resources
    #[error("plugin '{plugin}' failed to initialize: {source}")]
    Setup {
        /// Plugin instance name
        plugin: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No constructor registered for the requested kind
    #[error("unknown plugin kind '{kind}' for instance '{plugin}'")]
    UnknownKind {
        /// Plugin instance name
        plugin: String,
        /// The unrecognized kind string
        kind: String,
    },
}

impl PluginError {
    /// Missing-option helper
    pub fn missing_option(plugin: impl Into<String>, option: &'static str) -> Self {
        Self::MissingOption {
            plugin: plugin.into(),
            option,
        }
    }

    /// Invalid-option helper
    pub fn invalid_option(
        plugin: impl Into<String>,
        option: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidOption {
            plugin: plugin.into(),
            option,
            message: message.into(),
        }
    }

    /// Setup-failure helper
    pub fn setup(plugin: impl Into<String>, source: std::io::Error) -> Self {
        Self::Setup {
            plugin: plugin.into(),
            source,
        }
    }
}
