//! Error types for tspump.

use thiserror::Error;

/// Result type alias using tspump's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration is unusable (missing plugin name, undefined rate
    /// combination, ...). `start` fails synchronously with this and no
    /// stage is launched.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No plugin with this name is registered for the requested role.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// `start` was called while the pipeline is running or terminating.
    #[error("pipeline already running")]
    AlreadyRunning,

    /// A stage's wait for packets exceeded the receive timeout.
    /// Treated as a stage failure and aborts the whole pipeline.
    #[error("receive timeout after {0} ms")]
    Timeout(u64),

    /// A plugin reported an unrecoverable error during receive/process/send.
    #[error("plugin '{plugin}' failed: {message}")]
    PluginFailure {
        /// Name of the failing plugin.
        plugin: String,
        /// What went wrong, as reported by the plugin.
        message: String,
    },

    /// The pipeline was cancelled while a stage was blocked.
    ///
    /// Stages treat this as a clean exit, not a failure.
    #[error("pipeline cancelled")]
    Cancelled,

    /// I/O error (file plugins).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a `PluginFailure` for the given plugin.
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginFailure {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Whether this error is the cancellation sentinel.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
