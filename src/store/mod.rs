//! The concurrent snapshot store and its lifecycle operations.

mod handle;
mod reload;
mod settings;
mod snapshot;

pub use handle::{KeyGetter, Store};
pub use settings::Settings;
pub use snapshot::{ChangeKind, KeyChange, Snapshot};

pub(crate) use snapshot::compute_changes;
