//! Loader capability and registration handles.
//!
//! A [`Loader`] fetches configuration from one source into a [`LoadResult`]
//! scratch buffer. The store owns one registration per loader, remembering
//! which keys the loader produced last time so a source can retract a key
//! without clobbering keys owned by other sources.

use crate::error::Result;
use crate::store::Store;
use crate::value::Value;
use crate::watch::Watcher;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Mutable scratch mapping filled by one loader invocation.
///
/// A fresh `LoadResult` is handed to the loader on every reload cycle; it is
/// merged into the store and then discarded.
#[derive(Debug, Default)]
pub struct LoadResult {
    values: HashMap<String, Value>,
}

impl LoadResult {
    /// Creates an empty load result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key in the load result.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns the value currently set for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Number of keys set so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no key has been set yet.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consumes the scratch buffer, yielding the collected mapping.
    pub fn into_map(self) -> HashMap<String, Value> {
        self.values
    }
}

impl Extend<(String, Value)> for LoadResult {
    fn extend<T: IntoIterator<Item = (String, Value)>>(&mut self, iter: T) {
        self.values.extend(iter);
    }
}

/// A configuration source capability.
///
/// Implement this trait to feed a [`Store`] from a file, the environment,
/// an HTTP endpoint, a key-value store or anything else. Loaders are
/// registered with [`Store::register_loader`] or
/// [`Store::register_loader_watcher`].
#[async_trait]
pub trait Loader: Send + Sync + 'static {
    /// Name of the loader, used in logs and error messages.
    fn name(&self) -> &str;

    /// Loads configuration values into the scratch buffer.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be read; the retry wrapper
    /// may invoke `load` again depending on [`Loader::max_retry`].
    async fn load(&self, scratch: &mut LoadResult) -> Result<()>;

    /// Maximum number of retries after a failed load.
    ///
    /// `None` falls back to the store's
    /// [`Settings::max_retry`](crate::store::Settings).
    fn max_retry(&self) -> Option<u32> {
        None
    }

    /// Delay between retries.
    ///
    /// `None` falls back to the store's
    /// [`Settings::retry_delay`](crate::store::Settings).
    fn retry_delay(&self) -> Option<Duration> {
        None
    }

    /// Whether a permanent failure of this loader should shut the store
    /// down (close every registered watcher and closer, then exit unless
    /// suppressed by the store settings).
    fn stop_on_failure(&self) -> bool {
        false
    }
}

/// Hook run against the store after an event such as a completed load.
pub type StoreHook = Arc<dyn Fn(&Store) -> Result<()> + Send + Sync>;

/// One registered loader, its optional watcher, its post-load hooks, and
/// the set of keys it owned after its previous successful load.
pub(crate) struct Registration {
    pub(crate) loader: Arc<dyn Loader>,
    pub(crate) watcher: Option<Arc<dyn Watcher>>,
    hooks: Mutex<Vec<StoreHook>>,
    pub(crate) prior_keys: Mutex<HashSet<String>>,
}

impl Registration {
    pub(crate) fn new(loader: Arc<dyn Loader>, watcher: Option<Arc<dyn Watcher>>) -> Self {
        Self {
            loader,
            watcher,
            hooks: Mutex::new(Vec::new()),
            prior_keys: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn add_hook(&self, hook: StoreHook) {
        self.hooks.lock().push(hook);
    }

    /// Runs the post-load hooks in registration order. The first error
    /// aborts the remaining hooks; earlier side effects are not rolled back.
    pub(crate) fn run_hooks(&self, store: &Store) -> Result<()> {
        let hooks: Vec<StoreHook> = self.hooks.lock().clone();
        for hook in &hooks {
            hook(store)?;
        }
        Ok(())
    }

    pub(crate) fn has_hooks(&self) -> bool {
        !self.hooks.lock().is_empty()
    }
}

/// Handle returned by loader registration, used to append post-load hooks.
///
/// Hooks run after every successful load of this registration, in the order
/// they were added.
#[derive(Clone)]
pub struct LoaderHandle {
    pub(crate) registration: Arc<Registration>,
}

impl LoaderHandle {
    /// Appends a post-load hook to this registration.
    pub fn add_hook<F>(&self, hook: F) -> &Self
    where
        F: Fn(&Store) -> Result<()> + Send + Sync + 'static,
    {
        self.registration.add_hook(Arc::new(hook));
        self
    }

    /// Name of the underlying loader.
    pub fn name(&self) -> &str {
        self.registration.loader.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_result_set_get() {
        let mut result = LoadResult::new();
        result.set("host", "localhost").set("port", 8080i64);
        assert_eq!(result.len(), 2);
        assert_eq!(result.get("host"), Some(&Value::String("localhost".to_string())));
        assert_eq!(result.get("missing"), None);
    }

    #[test]
    fn test_load_result_into_map() {
        let mut result = LoadResult::new();
        result.set("a", 1i64);
        let map = result.into_map();
        assert_eq!(map.get("a"), Some(&Value::Int(1)));
    }
}
