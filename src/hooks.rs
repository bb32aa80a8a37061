//! Key-hook registry and dispatcher.

use crate::error::Result;
use crate::loader::StoreHook;
use crate::store::Store;
use std::collections::BTreeMap;

/// Hooks keyed by prefix. A `BTreeMap` keeps dispatch order deterministic:
/// prefixes fire in lexicographic order.
#[derive(Default)]
pub(crate) struct KeyHooks {
    hooks: BTreeMap<String, Vec<StoreHook>>,
}

impl KeyHooks {
    pub(crate) fn add(&mut self, prefix: impl Into<String>, hook: StoreHook) {
        self.hooks.entry(prefix.into()).or_default().push(hook);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Clones the registry so hooks can run without holding the store lock.
    pub(crate) fn snapshot(&self) -> Vec<(String, Vec<StoreHook>)> {
        self.hooks
            .iter()
            .map(|(prefix, hooks)| (prefix.clone(), hooks.clone()))
            .collect()
    }
}

/// Runs each prefix's hooks at most once if any changed key matches the
/// prefix. The first error aborts remaining dispatch.
pub(crate) fn dispatch(
    registry: &[(String, Vec<StoreHook>)],
    changed_keys: &[String],
    store: &Store,
) -> Result<()> {
    for (prefix, hooks) in registry {
        if changed_keys.iter().any(|key| key.starts_with(prefix.as_str())) {
            for hook in hooks {
                hook(store)?;
            }
        }
    }
    Ok(())
}

/// Runs every registered hook unconditionally (the `run_hooks` operation).
pub(crate) fn run_all(registry: &[(String, Vec<StoreHook>)], store: &Store) -> Result<()> {
    for (_prefix, hooks) in registry {
        for hook in hooks {
            hook(store)?;
        }
    }
    Ok(())
}
