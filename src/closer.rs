//! Closeable resources released at store shutdown.

use crate::error::Result;

/// A resource closed when the store shuts down.
///
/// Closers are registered with
/// [`Store::register_closer`](crate::store::Store::register_closer) and
/// closed exactly once when a critical source fails: connection pools,
/// listeners, flush-on-exit buffers.
pub trait Closer: Send + Sync {
    /// Closes the resource.
    ///
    /// # Errors
    ///
    /// Returns an error when the resource cannot be closed cleanly; the
    /// error is logged and shutdown continues with the remaining closers.
    fn close(&self) -> Result<()>;
}

impl<F> Closer for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn close(&self) -> Result<()> {
        self()
    }
}
