//! Error types for the Palisade core.

use thiserror::Error;

/// Errors raised by hook handlers and the dispatch machinery.
#[derive(Debug, Error)]
pub enum HookError {
    /// A handler reported a failure of its own.
    #[error("{0}")]
    Handler(String),

    /// A handler panicked; the payload is the recovered panic message.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// An argument accessor was used on a slot holding a different kind.
    #[error("argument {index} is not {expected}")]
    BadArgument { index: usize, expected: &'static str },
}

impl HookError {
    /// Shorthand for a handler-reported failure.
    pub fn handler(message: impl Into<String>) -> Self {
        HookError::Handler(message.into())
    }
}

/// Errors raised by plugin lifecycle operations.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin '{0}' is already loaded")]
    AlreadyLoaded(String),

    #[error("failed to load plugin '{plugin}': {reason}")]
    LoadFailed { plugin: String, reason: String },
}

/// Errors raised while loading or validating framework configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Errors raised by the data-file layer.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("data file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("data file format error: {0}")]
    Format(#[from] serde_json::Error),
}
