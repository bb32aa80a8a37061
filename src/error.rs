//! Error types for conflux.

/// Result type alias for conflux operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading, merging or watching configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source failed one load attempt. Transient: the retry wrapper may
    /// try again depending on the registration's retry budget.
    #[error("loader '{loader}' failed: {message}")]
    Load {
        /// Name of the failing loader.
        loader: String,
        /// Description of the failure.
        message: String,
    },

    /// A loader exhausted its retry budget and failed permanently.
    #[error("loader '{loader}' failed permanently after {attempts} attempts: {message}")]
    Exhausted {
        /// Name of the failing loader.
        loader: String,
        /// Total number of load attempts, including the first.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// A mandatory key declared with `strict` is missing from a merge
    /// candidate. The previous snapshot stays authoritative.
    #[error("strict key '{0}' not found")]
    StrictKeyMissing(String),

    /// A key hook or post-load hook failed. Remaining hooks for the cycle
    /// are not run; already-applied store state is not rolled back.
    #[error("hook failed: {0}")]
    Hook(String),

    /// `load` was called on a store with no registered loaders.
    #[error("no loaders registered in store '{0}'")]
    NoLoaders(String),

    /// A key requested through a `must_*` getter is not set.
    #[error("config '{0}' not found")]
    KeyNotFound(String),

    /// A watcher could not start, or was used after being closed.
    #[error("watcher error: {0}")]
    Watch(String),

    /// A registered resource failed to close during shutdown.
    #[error("close error: {0}")]
    Close(String),

    /// IO error surfaced by a loader or closer.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error for other cases.
    #[error("configuration error: {0}")]
    Other(String),
}

impl ConfigError {
    /// Shorthand for a transient load failure.
    pub fn load(loader: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Load {
            loader: loader.into(),
            message: message.to_string(),
        }
    }

    /// Shorthand for a hook failure.
    pub fn hook(message: impl std::fmt::Display) -> Self {
        Self::Hook(message.to_string())
    }
}
