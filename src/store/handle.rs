//! The store handle: lock-free reads, serialized merges, registration.

use super::settings::Settings;
use super::snapshot::{ChangeKind, KeyChange, Snapshot};
use crate::bind::{Bind, BoundTarget, MapBinding, StructBinding, nested_keys};
use crate::closer::Closer;
use crate::error::{ConfigError, Result};
use crate::hooks::{self, KeyHooks};
use crate::loader::{Loader, LoaderHandle, Registration};
use crate::value::Value;
use crate::watch::Watcher;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::error;

/// A concurrent configuration store.
///
/// `Store` aggregates key/value pairs from registered [`Loader`]s into an
/// immutable [`Snapshot`] published through `arc-swap`: reads are lock-free
/// and never observe a partially-applied merge. Handles are cheap to clone
/// and share the same underlying store.
///
/// # Examples
///
/// ```rust,no_run
/// use conflux::prelude::*;
///
/// # async fn example(my_loader: impl Loader) -> Result<()> {
/// let store = Store::new(Settings::default().with_exit_on_failure(false));
/// store.register_loader(my_loader);
/// store.load().await?;
///
/// let port = store.int("server.port");
/// # Ok(())
/// # }
/// ```
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) settings: Settings,
    /// The published snapshot; readers dereference it without locking.
    snapshot: ArcSwap<Snapshot>,
    /// Serializes merges. Held only for the merge/validate/publish step.
    merge_lock: Mutex<()>,
    pub(crate) registrations: Mutex<Vec<Arc<Registration>>>,
    pub(crate) key_hooks: Mutex<KeyHooks>,
    strict_keys: Mutex<Vec<String>>,
    pub(crate) loaded: AtomicBool,
    groups: Mutex<HashMap<String, Store>>,
    closers: Mutex<Vec<Arc<dyn Closer>>>,
    binding: RwLock<Option<Box<dyn BoundTarget>>>,
    shutdown_done: AtomicBool,
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl Store {
    /// Creates a store with the given settings.
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                settings,
                snapshot: ArcSwap::new(Arc::new(Snapshot::empty())),
                merge_lock: Mutex::new(()),
                registrations: Mutex::new(Vec::new()),
                key_hooks: Mutex::new(KeyHooks::default()),
                strict_keys: Mutex::new(Vec::new()),
                loaded: AtomicBool::new(false),
                groups: Mutex::new(HashMap::new()),
                closers: Mutex::new(Vec::new()),
                binding: RwLock::new(None),
                shutdown_done: AtomicBool::new(false),
            }),
        }
    }

    /// Name of the store. The root store is named `"root"` unless the
    /// settings say otherwise; groups are named after the group.
    pub fn name(&self) -> &str {
        &self.inner.settings.name
    }

    /// Returns the currently published snapshot.
    ///
    /// This is a lock-free pointer load; the returned snapshot stays
    /// internally consistent however long it is held.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.load_full()
    }

    /// Returns the value for `key`, or `None` when the key is not set.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.snapshot.load().get(key).cloned()
    }

    /// Returns the value for `key`.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_get(&self, key: &str) -> Value {
        match self.get(key) {
            Some(v) => v,
            None => panic!("{}", ConfigError::KeyNotFound(key.to_string())),
        }
    }

    /// Whether `key` is set.
    pub fn exists(&self, key: &str) -> bool {
        self.inner.snapshot.load().exists(key)
    }

    /// Returns a reusable getter for `key`.
    pub fn getter(&self, key: impl Into<String>) -> KeyGetter {
        KeyGetter {
            store: self.clone(),
            key: key.into(),
        }
    }

    /// Sets `key` to `value`, publishing a new snapshot.
    ///
    /// The bound value, if any, is updated as well. Key hooks do not fire
    /// for programmatic sets; they are reserved for loader merges.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        let _guard = self.inner.merge_lock.lock();
        let prev = self.inner.snapshot.load_full();
        let mut next = prev.as_ref().clone();
        let kind = if next.exists(&key) {
            ChangeKind::Updated
        } else {
            ChangeKind::Added
        };

        {
            let binding = self.inner.binding.read();
            if let Some(bound) = binding.as_ref() {
                bound.apply(&[KeyChange {
                    key: key.clone(),
                    kind,
                    value: Some(value.clone()),
                }]);
            }
        }

        next.insert(key, value);
        self.inner.snapshot.store(Arc::new(next));
    }

    // ---- typed getters ------------------------------------------------

    /// Gets `key` coerced to a string, or the empty string when unset or
    /// not coercible.
    pub fn string(&self, key: &str) -> String {
        self.get(key).and_then(|v| v.as_string()).unwrap_or_default()
    }

    /// Like [`Store::string`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_string(&self, key: &str) -> String {
        self.must_get(key).as_string().unwrap_or_default()
    }

    /// Gets `key` coerced to an integer, or `0`.
    pub fn int(&self, key: &str) -> i64 {
        self.get(key).and_then(|v| v.as_i64()).unwrap_or_default()
    }

    /// Like [`Store::int`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_int(&self, key: &str) -> i64 {
        self.must_get(key).as_i64().unwrap_or_default()
    }

    /// Gets `key` coerced to a float, or `0.0`.
    pub fn float(&self, key: &str) -> f64 {
        self.get(key).and_then(|v| v.as_f64()).unwrap_or_default()
    }

    /// Like [`Store::float`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_float(&self, key: &str) -> f64 {
        self.must_get(key).as_f64().unwrap_or_default()
    }

    /// Gets `key` coerced to a boolean, or `false`.
    pub fn bool(&self, key: &str) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or_default()
    }

    /// Like [`Store::bool`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_bool(&self, key: &str) -> bool {
        self.must_get(key).as_bool().unwrap_or_default()
    }

    /// Gets `key` coerced to a duration, or zero.
    pub fn duration(&self, key: &str) -> Duration {
        self.get(key)
            .and_then(|v| v.as_duration())
            .unwrap_or_default()
    }

    /// Like [`Store::duration`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_duration(&self, key: &str) -> Duration {
        self.must_get(key).as_duration().unwrap_or_default()
    }

    /// Gets `key` coerced to a point in time, or the Unix epoch.
    pub fn time(&self, key: &str) -> DateTime<Utc> {
        self.get(key)
            .and_then(|v| v.as_time())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Like [`Store::time`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_time(&self, key: &str) -> DateTime<Utc> {
        self.must_get(key)
            .as_time()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// Gets `key` coerced to a list of strings, or an empty list.
    pub fn string_slice(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(|v| v.as_string_slice())
            .unwrap_or_default()
    }

    /// Like [`Store::string_slice`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_string_slice(&self, key: &str) -> Vec<String> {
        self.must_get(key).as_string_slice().unwrap_or_default()
    }

    /// Gets `key` coerced to a list of integers, or an empty list.
    pub fn int_slice(&self, key: &str) -> Vec<i64> {
        self.get(key)
            .and_then(|v| v.as_int_slice())
            .unwrap_or_default()
    }

    /// Like [`Store::int_slice`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_int_slice(&self, key: &str) -> Vec<i64> {
        self.must_get(key).as_int_slice().unwrap_or_default()
    }

    /// Gets `key` as a string-keyed value map, or an empty map.
    pub fn string_map(&self, key: &str) -> HashMap<String, Value> {
        self.get(key)
            .and_then(|v| v.as_string_map())
            .unwrap_or_default()
    }

    /// Like [`Store::string_map`], but panics when the key is not set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_string_map(&self, key: &str) -> HashMap<String, Value> {
        self.must_get(key).as_string_map().unwrap_or_default()
    }

    /// Gets `key` as a string-to-string map, or an empty map.
    pub fn string_map_string(&self, key: &str) -> HashMap<String, String> {
        self.get(key)
            .and_then(|v| v.as_string_map_string())
            .unwrap_or_default()
    }

    /// Like [`Store::string_map_string`], but panics when the key is not
    /// set.
    ///
    /// # Panics
    ///
    /// Panics when the key is not set.
    pub fn must_string_map_string(&self, key: &str) -> HashMap<String, String> {
        self.must_get(key).as_string_map_string().unwrap_or_default()
    }

    // ---- registration -------------------------------------------------

    /// Registers a loader without a watcher.
    ///
    /// The returned handle appends post-load hooks to the registration.
    pub fn register_loader<L: Loader>(&self, loader: L) -> LoaderHandle {
        self.register(Arc::new(loader), None)
    }

    /// Registers a loader together with the watcher that triggers its
    /// reloads.
    pub fn register_loader_watcher<L, W>(&self, loader: L, watcher: W) -> LoaderHandle
    where
        L: Loader,
        W: Watcher,
    {
        self.register(Arc::new(loader), Some(Arc::new(watcher) as Arc<dyn Watcher>))
    }

    fn register(
        &self,
        loader: Arc<dyn Loader>,
        watcher: Option<Arc<dyn Watcher>>,
    ) -> LoaderHandle {
        let registration = Arc::new(Registration::new(loader, watcher));
        self.inner.registrations.lock().push(Arc::clone(&registration));
        LoaderHandle { registration }
    }

    /// Registers a hook run once per reload cycle when any key with the
    /// given prefix changes.
    pub fn register_key_hook<F>(&self, prefix: impl Into<String>, hook: F) -> &Self
    where
        F: Fn(&Store) -> Result<()> + Send + Sync + 'static,
    {
        self.inner.key_hooks.lock().add(prefix, Arc::new(hook));
        self
    }

    /// Registers a resource closed when the store shuts down.
    pub fn register_closer<C: Closer + 'static>(&self, closer: C) -> &Self {
        self.inner.closers.lock().push(Arc::new(closer));
        self
    }

    /// Declares mandatory keys.
    ///
    /// Call before the first [`Store::load`]. Once the first load succeeds,
    /// every later merge candidate must contain all declared keys or the
    /// merge is rejected and the previous snapshot stays authoritative.
    pub fn strict<I, S>(&self, keys: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.inner.strict_keys.lock() = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Runs every registered key hook and post-load hook, then descends
    /// into all child groups.
    ///
    /// # Errors
    ///
    /// The first hook error aborts the remaining hooks and is returned.
    pub fn run_hooks(&self) -> Result<()> {
        let registry = self.inner.key_hooks.lock().snapshot();
        hooks::run_all(&registry, self)?;

        let registrations: Vec<Arc<Registration>> = self.inner.registrations.lock().clone();
        for registration in &registrations {
            registration.run_hooks(self)?;
        }

        let groups: Vec<Store> = self.inner.groups.lock().values().cloned().collect();
        for group in groups {
            group.run_hooks()?;
        }
        Ok(())
    }

    // ---- groups -------------------------------------------------------

    /// Returns the named child store, creating and caching it on first
    /// reference.
    ///
    /// Groups share the parent's settings but keep independent snapshot,
    /// registration and hook state.
    pub fn group(&self, name: &str) -> Store {
        let mut groups = self.inner.groups.lock();
        if let Some(group) = groups.get(name) {
            return group.clone();
        }
        let settings = self.inner.settings.clone().with_name(name);
        let group = Store::new(settings);
        groups.insert(name.to_string(), group.clone());
        group
    }

    pub(crate) fn child_groups(&self) -> Vec<Store> {
        self.inner.groups.lock().values().cloned().collect()
    }

    // ---- binding ------------------------------------------------------

    /// Binds a struct-shaped value to the store.
    ///
    /// The bound value starts from `T::default()` and is kept in sync with
    /// every subsequent merge; read it with [`Store::value`].
    pub fn bind<T: Bind>(&self) -> &Self {
        *self.inner.binding.write() = Some(Box::new(StructBinding::<T>::new()));
        self
    }

    /// Binds a map-shaped value: changed keys are set verbatim as
    /// flattened dotted strings.
    pub fn bind_map(&self) -> &Self {
        *self.inner.binding.write() = Some(Box::new(MapBinding::new()));
        self
    }

    /// Binds a struct-shaped value and declares every leaf key of its
    /// schema as strict.
    pub fn bind_struct_strict<T: Bind>(&self) -> &Self {
        self.strict(nested_keys::<T>(""));
        self.bind::<T>()
    }

    /// Returns the current bound value.
    ///
    /// # Panics
    ///
    /// Panics when no value is bound, or when `T` is not the bound type.
    pub fn value<T: Send + Sync + 'static>(&self) -> Arc<T> {
        let current = {
            let binding = self.inner.binding.read();
            match binding.as_ref() {
                Some(bound) => bound.current(),
                None => panic!("no value bound to store '{}'", self.name()),
            }
        };
        match current.downcast::<T>() {
            Ok(value) => value,
            Err(_) => panic!("bound value of store '{}' is not the requested type", self.name()),
        }
    }

    // ---- merge internals ----------------------------------------------

    /// Merges one loader's result into the store and returns the
    /// changed-key set.
    pub(crate) fn merge(
        &self,
        registration: &Registration,
        incoming: HashMap<String, Value>,
    ) -> Result<Vec<KeyChange>> {
        let _guard = self.inner.merge_lock.lock();
        let prev = self.inner.snapshot.load_full();
        let mut prior = registration.prior_keys.lock();

        // Candidate: previous snapshot minus this loader's prior keys,
        // plus the new result. Subtracting only the loader's own keys lets
        // one source retract a key without clobbering other sources.
        let mut candidate: HashMap<String, Value> =
            HashMap::with_capacity(prev.len() + incoming.len());
        for (key, value) in prev.iter() {
            if !prior.contains(key) {
                candidate.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &incoming {
            candidate.insert(key.clone(), value.clone());
        }

        if self.inner.loaded.load(Ordering::SeqCst) {
            let strict = self.inner.strict_keys.lock();
            for key in strict.iter() {
                if !candidate.contains_key(key) {
                    return Err(ConfigError::StrictKeyMissing(key.clone()));
                }
            }
        }

        let changes = super::compute_changes(&prev, &candidate, &prior, &incoming);

        if !changes.is_empty() {
            let binding = self.inner.binding.read();
            if let Some(bound) = binding.as_ref() {
                bound.apply(&changes);
            }
        }

        self.inner.snapshot.store(Arc::new(Snapshot::from_map(candidate)));
        *prior = incoming.into_keys().collect();

        Ok(changes)
    }

    pub(crate) fn check_strict_keys(&self) -> Result<()> {
        let strict = self.inner.strict_keys.lock();
        self.inner.snapshot.load().check_strict_keys(&strict)
    }

    /// Shuts the store down: closes every registered watcher and closer
    /// exactly once, then terminates the process unless suppressed by the
    /// settings.
    pub(crate) fn stop(&self) {
        if self.inner.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }

        let registrations: Vec<Arc<Registration>> = self.inner.registrations.lock().clone();
        for registration in &registrations {
            if let Some(watcher) = &registration.watcher {
                if let Err(err) = watcher.close() {
                    error!(store = self.name(), error = %err, "failed to close watcher");
                }
            }
        }

        let closers: Vec<Arc<dyn Closer>> = self.inner.closers.lock().clone();
        for closer in &closers {
            if let Err(err) = closer.close() {
                error!(store = self.name(), error = %err, "failed to close resource");
            }
        }

        if self.inner.settings.exit_on_failure {
            std::process::exit(self.inner.settings.exit_code);
        }
    }
}

/// A reusable getter bound to one key of a store.
///
/// Handed out by [`Store::getter`]; handy for passing a single
/// configuration value into a component without exposing the whole store.
#[derive(Clone)]
pub struct KeyGetter {
    store: Store,
    key: String,
}

impl KeyGetter {
    /// Returns the current value of the key, if set.
    pub fn get(&self) -> Option<Value> {
        self.store.get(&self.key)
    }

    /// The key this getter reads.
    pub fn key(&self) -> &str {
        &self.key
    }
}
