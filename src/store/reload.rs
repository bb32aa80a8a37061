//! Loader retry wrapper and supervised watch scheduler.

use super::handle::Store;
use super::snapshot::KeyChange;
use crate::error::{ConfigError, Result};
use crate::hooks;
use crate::loader::{LoadResult, Registration};
use crate::watch::{WatchSignals, Watcher};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error};

impl Store {
    /// Loads every registered loader once, in registration order.
    ///
    /// Each loader runs through the retry wrapper; a permanent failure of a
    /// stop-on-failure loader shuts the store down. After all loaders have
    /// loaded, the strict keys are checked and the store is marked loaded;
    /// from then on every merge re-validates them.
    ///
    /// # Errors
    ///
    /// Returns the first permanent loader error, the first hook error, or a
    /// strict-key violation. With no registered loaders,
    /// [`ConfigError::NoLoaders`] is returned.
    pub async fn load(&self) -> Result<()> {
        let registrations: Vec<Arc<Registration>> = self.inner.registrations.lock().clone();
        if registrations.is_empty() {
            return Err(ConfigError::NoLoaders(self.name().to_string()));
        }

        for registration in &registrations {
            if let Err(err) = self.load_registration(registration).await {
                if registration.loader.stop_on_failure() {
                    self.stop();
                }
                return Err(err);
            }
        }

        if let Err(err) = self.check_strict_keys() {
            error!(store = self.name(), error = %err, "strict key check failed");
            return Err(err);
        }
        self.inner.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Starts every registered watcher and spawns its supervised watch
    /// task, then descends into all child groups.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the first watcher start error. Watchers started before the
    /// failure keep running.
    pub fn watch(&self) -> Result<()> {
        let registrations: Vec<Arc<Registration>> = self.inner.registrations.lock().clone();
        for registration in registrations {
            if let Some(watcher) = registration.watcher.clone() {
                let signals = watcher.start()?;
                self.spawn_watch_loop(registration, watcher, signals);
            }
        }

        for group in self.child_groups() {
            group.watch()?;
        }
        Ok(())
    }

    /// Loads all loaders, then starts watching. Stops at the first error.
    pub async fn load_watch(&self) -> Result<()> {
        self.load().await?;
        self.watch()?;
        Ok(())
    }

    /// Runs one loader through the retry wrapper, merges the result and
    /// fires the matching hooks.
    pub(crate) async fn load_registration(&self, registration: &Arc<Registration>) -> Result<()> {
        let loader = &registration.loader;
        let max_retry = loader.max_retry().unwrap_or(self.inner.settings.max_retry);
        let retry_delay = loader
            .retry_delay()
            .unwrap_or(self.inner.settings.retry_delay);

        let mut attempt: u32 = 0;
        let incoming = loop {
            let mut scratch = LoadResult::new();
            match loader.load(&mut scratch).await {
                Ok(()) => break scratch.into_map(),
                Err(err) => {
                    error!(loader = loader.name(), attempt, error = %err, "config load failed");
                    if attempt >= max_retry {
                        return Err(ConfigError::Exhausted {
                            loader: loader.name().to_string(),
                            attempts: attempt + 1,
                            message: err.to_string(),
                        });
                    }
                    // The sleep backpressures only this registration's
                    // reload path; the merge mutex is not held here.
                    tokio::time::sleep(retry_delay).await;
                    attempt += 1;
                }
            }
        };

        let changes = self.merge(registration, incoming)?;
        debug!(
            store = self.name(),
            loader = loader.name(),
            changed = changes.len(),
            "config merged"
        );

        if !changes.is_empty() {
            self.dispatch_key_hooks(&changes)?;
        }
        registration.run_hooks(self)?;
        Ok(())
    }

    fn dispatch_key_hooks(&self, changes: &[KeyChange]) -> Result<()> {
        let registry = self.inner.key_hooks.lock().snapshot();
        if registry.is_empty() {
            return Ok(());
        }
        let changed_keys: Vec<String> = changes.iter().map(|c| c.key.clone()).collect();
        hooks::dispatch(&registry, &changed_keys, self)
    }

    /// Spawns the supervised watch task for one registration.
    ///
    /// Each reload iteration runs in its own task so a panic is contained:
    /// it is logged with the running panic count and the loop keeps going
    /// until the count exceeds the configured ceiling (or the loader stops
    /// on failure), at which point the store shuts down.
    fn spawn_watch_loop(
        &self,
        registration: Arc<Registration>,
        watcher: Arc<dyn Watcher>,
        mut signals: WatchSignals,
    ) {
        let store = self.clone();
        let done_probe = signals.done.clone();
        tokio::spawn(async move {
            let mut panics: u32 = 0;
            loop {
                if *done_probe.borrow() {
                    log_watcher_done(&store, &registration, watcher.as_ref());
                    return;
                }

                tokio::select! {
                    biased;
                    changed = signals.done.changed() => {
                        if changed.is_err() || *done_probe.borrow() {
                            log_watcher_done(&store, &registration, watcher.as_ref());
                            return;
                        }
                    }
                    message = signals.changes.recv() => {
                        if message.is_none() {
                            log_watcher_done(&store, &registration, watcher.as_ref());
                            return;
                        }
                        // A close may race the change signal; honor it first.
                        if *done_probe.borrow() {
                            log_watcher_done(&store, &registration, watcher.as_ref());
                            return;
                        }

                        let reload_store = store.clone();
                        let reload_registration = Arc::clone(&registration);
                        let outcome = tokio::spawn(async move {
                            // Attempt counter starts from zero on every signal.
                            reload_store.load_registration(&reload_registration).await
                        })
                        .await;

                        match outcome {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                if registration.loader.stop_on_failure() {
                                    error!(
                                        loader = registration.loader.name(),
                                        error = %err,
                                        "critical source failed; shutting down"
                                    );
                                    store.stop();
                                    return;
                                }
                                error!(
                                    loader = registration.loader.name(),
                                    error = %err,
                                    "background reload failed"
                                );
                            }
                            Err(join_err) if join_err.is_panic() => {
                                panics += 1;
                                error!(
                                    loader = registration.loader.name(),
                                    panics, "panic in reload cycle"
                                );
                                if registration.loader.stop_on_failure()
                                    || panics > store.inner.settings.max_watcher_panics
                                {
                                    store.stop();
                                    return;
                                }
                            }
                            Err(_) => return,
                        }
                    }
                }
            }
        });
    }
}

fn log_watcher_done(store: &Store, registration: &Registration, watcher: &dyn Watcher) {
    if let Some(err) = watcher.error() {
        error!(
            store = store.name(),
            loader = registration.loader.name(),
            error = %err,
            "watcher terminated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Settings;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct ScriptedLoader {
        name: String,
        calls: Arc<AtomicU32>,
        failures: AtomicU32,
        values: Mutex<Vec<(String, crate::value::Value)>>,
        max_retry: Option<u32>,
    }

    impl ScriptedLoader {
        fn new(name: &str, failures: u32) -> Self {
            Self {
                name: name.to_string(),
                calls: Arc::new(AtomicU32::new(0)),
                failures: AtomicU32::new(failures),
                values: Mutex::new(vec![("foo".to_string(), "bar".into())]),
                max_retry: None,
            }
        }
    }

    #[async_trait]
    impl crate::loader::Loader for ScriptedLoader {
        fn name(&self) -> &str {
            &self.name
        }

        async fn load(&self, scratch: &mut LoadResult) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ConfigError::load(&self.name, "scripted failure"));
            }
            for (key, value) in self.values.lock().iter() {
                scratch.set(key.clone(), value.clone());
            }
            Ok(())
        }

        fn max_retry(&self) -> Option<u32> {
            self.max_retry
        }

        fn retry_delay(&self) -> Option<Duration> {
            Some(Duration::from_millis(1))
        }
    }

    fn test_store() -> Store {
        Store::new(Settings::default().with_exit_on_failure(false))
    }

    #[tokio::test]
    async fn test_load_without_loaders_fails() {
        let store = test_store();
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ConfigError::NoLoaders(name) if name == "root"));
    }

    #[tokio::test]
    async fn test_load_success() {
        let store = test_store();
        store.register_loader(ScriptedLoader::new("test", 0));
        store.load().await.unwrap();
        assert_eq!(store.string("foo"), "bar");
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let store = test_store();
        let mut loader = ScriptedLoader::new("flaky", 2);
        loader.max_retry = Some(2);
        let calls = Arc::clone(&loader.calls);
        store.register_loader(loader);

        store.load().await.unwrap();
        // Two failures, each retried, then success: three calls.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.string("foo"), "bar");
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let store = test_store();
        let mut loader = ScriptedLoader::new("down", 5);
        loader.max_retry = Some(1);
        let calls = Arc::clone(&loader.calls);
        store.register_loader(loader);

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Exhausted { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
