//! Opt-in process-wide default store.
//!
//! Everything in this crate works on explicit [`Store`] instances; the
//! default instance is convenience sugar for applications that want one
//! shared store without threading a handle around.

use crate::error::{ConfigError, Result};
use crate::store::{Settings, Store};
use std::sync::OnceLock;

static GLOBAL: OnceLock<Store> = OnceLock::new();

/// Installs the process-wide default store with explicit settings.
///
/// Must be called before the first [`global`] access.
///
/// # Errors
///
/// Returns an error when the default store was already constructed.
pub fn init(settings: Settings) -> Result<()> {
    GLOBAL
        .set(Store::new(settings))
        .map_err(|_| ConfigError::Other("default store already initialized".to_string()))
}

/// Returns the process-wide default store, lazily constructing it with
/// default settings on first use.
pub fn global() -> &'static Store {
    GLOBAL.get_or_init(Store::default)
}
