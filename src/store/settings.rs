//! Store settings shared by a store and its groups.

use std::time::Duration;

/// Base configuration for a [`Store`](crate::store::Store).
///
/// Groups created from a store share its settings; only the name differs.
///
/// # Examples
///
/// ```rust
/// use conflux::store::Settings;
/// use std::time::Duration;
///
/// let settings = Settings::default()
///     .with_name("api")
///     .with_max_retry(3)
///     .with_retry_delay(Duration::from_secs(2))
///     .with_exit_on_failure(false);
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    /// Name of the store, used in logs. Groups override it with the group
    /// name.
    pub name: String,
    /// Process exit code used when a critical source shuts the store down.
    pub exit_code: i32,
    /// Whether shutdown terminates the process. Disable in tests or when
    /// the embedding application handles termination itself.
    pub exit_on_failure: bool,
    /// Maximum number of contained watch-task panics before the store
    /// shuts down.
    pub max_watcher_panics: u32,
    /// Default retry budget for loaders that do not specify their own.
    pub max_retry: u32,
    /// Default delay between retries for loaders that do not specify
    /// their own.
    pub retry_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: "root".to_string(),
            exit_code: 1,
            exit_on_failure: true,
            max_watcher_panics: 0,
            max_retry: 0,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl Settings {
    /// Sets the store name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the shutdown exit code.
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Enables or disables process termination on shutdown.
    pub fn with_exit_on_failure(mut self, exit: bool) -> Self {
        self.exit_on_failure = exit;
        self
    }

    /// Sets the watch-task panic ceiling.
    pub fn with_max_watcher_panics(mut self, max: u32) -> Self {
        self.max_watcher_panics = max;
        self
    }

    /// Sets the default retry budget.
    pub fn with_max_retry(mut self, max: u32) -> Self {
        self.max_retry = max;
        self
    }

    /// Sets the default retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.name, "root");
        assert_eq!(settings.exit_code, 1);
        assert!(settings.exit_on_failure);
        assert_eq!(settings.max_watcher_panics, 0);
        assert_eq!(settings.max_retry, 0);
    }

    #[test]
    fn test_builder_style() {
        let settings = Settings::default()
            .with_name("svc")
            .with_exit_code(2)
            .with_max_retry(5);
        assert_eq!(settings.name, "svc");
        assert_eq!(settings.exit_code, 2);
        assert_eq!(settings.max_retry, 5);
    }
}
