//! # conflux
//!
//! Composable runtime configuration with lock-free snapshots, supervised
//! hot reloads and typed value binding.
//!
//! ## Overview
//!
//! `conflux` aggregates configuration from many heterogeneous sources
//! (files, environment, HTTP endpoints, key-value stores, anything that
//! implements [`Loader`](loader::Loader)) into one uniform key/value view:
//!
//! - Lock-free atomic reads using `arc-swap`: readers never block and never
//!   observe a half-updated snapshot
//! - A retry wrapper around every loader, with per-registration budgets
//! - Supervised background reloads driven by [`Watcher`](watch::Watcher)
//!   change signals, with contained panics and bounded restarts
//! - Mandatory-key enforcement: once declared strict, a key can never
//!   silently disappear from the configuration
//! - Prefix key hooks dispatched once per reload cycle
//! - A binding engine projecting flat dotted keys onto typed structs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use conflux::prelude::*;
//!
//! struct StaticSource;
//!
//! #[async_trait]
//! impl Loader for StaticSource {
//!     fn name(&self) -> &str {
//!         "static"
//!     }
//!
//!     async fn load(&self, scratch: &mut LoadResult) -> Result<()> {
//!         scratch.set("server.host", "localhost");
//!         scratch.set("server.port", 8080i64);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let store = Store::new(Settings::default());
//! store.register_loader(StaticSource);
//! store.load().await?;
//!
//! // Lock-free reads
//! assert_eq!(store.string("server.host"), "localhost");
//! assert_eq!(store.int("server.port"), 8080);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sources and watchers
//!
//! Loaders that can change at runtime are registered together with a
//! watcher; [`Store::watch`](store::Store::watch) then keeps the snapshot
//! current in the background:
//!
//! ```rust,ignore
//! store.register_loader_watcher(my_source, PollWatcher::new(Duration::from_secs(30)))
//!     .add_hook(|store| {
//!         println!("reloaded, pool size now {}", store.int("db.pool"));
//!         Ok(())
//!     });
//! store.load_watch().await?;
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod bind;
pub mod closer;
pub mod error;
pub mod global;
pub mod loader;
pub mod store;
pub mod value;
pub mod watch;

mod hooks;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::bind::{Bind, BindingKind, FieldBinding};
    pub use crate::closer::Closer;
    pub use crate::error::{ConfigError, Result};
    pub use crate::loader::{Loader, LoaderHandle, LoadResult};
    pub use crate::store::{Settings, Snapshot, Store};
    pub use crate::value::{FromValue, Value};
    pub use crate::watch::{NopWatcher, PollWatcher, Watcher, WatchSignals};
}
