//! Watcher capability: change signals that drive background reloads.
//!
//! A [`Watcher`] tells the store *when* a source may have changed; the store
//! then re-runs the matching loader. Watchers communicate through
//! [`WatchSignals`]: a change-signal channel and a done flag, selected on by
//! the supervised watch task.

mod poll;

pub use poll::PollWatcher;

use crate::error::{ConfigError, Result};
use tokio::sync::{mpsc, watch};

/// Signal handles returned by [`Watcher::start`].
///
/// The watch task selects between the two: a message on `changes` triggers
/// a reload; `done` flipping to `true` (or the change channel closing)
/// terminates the task.
pub struct WatchSignals {
    /// Receives one message per detected change.
    pub changes: mpsc::Receiver<()>,
    /// Flips to `true` when the watcher has terminated.
    pub done: watch::Receiver<bool>,
}

impl WatchSignals {
    /// Builds the signal pair along with the sender halves a watcher
    /// implementation keeps for itself.
    pub fn channel(buffer: usize) -> (mpsc::Sender<()>, watch::Sender<bool>, WatchSignals) {
        let (change_tx, change_rx) = mpsc::channel(buffer);
        let (done_tx, done_rx) = watch::channel(false);
        (
            change_tx,
            done_tx,
            WatchSignals {
                changes: change_rx,
                done: done_rx,
            },
        )
    }
}

/// A change-detection capability paired with a loader.
///
/// `start` must not block: implementations spawn their own task (or hook
/// into an external event source) and emit on the returned signals.
/// Closing a watcher stops future reload triggers; it does not cancel an
/// in-flight load, which is expected to return on its own.
pub trait Watcher: Send + Sync + 'static {
    /// Starts the watcher and returns its signal handles.
    ///
    /// # Errors
    ///
    /// Returns an error if the watcher was already started or cannot
    /// observe its source.
    fn start(&self) -> Result<WatchSignals>;

    /// Stops the watcher. Idempotent implementations may return an error
    /// on a second close, mirroring the underlying resource.
    fn close(&self) -> Result<()>;

    /// Terminal error, if the watcher stopped because of one.
    fn error(&self) -> Option<ConfigError> {
        None
    }
}

/// A watcher that never signals a change and is done immediately.
///
/// Useful as a placeholder when composing a loader/watcher pair for a
/// source that cannot change at runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopWatcher;

impl Watcher for NopWatcher {
    fn start(&self) -> Result<WatchSignals> {
        let (_change_tx, done_tx, signals) = WatchSignals::channel(1);
        // Dropping the change sender closes the channel; flag done so the
        // watch task exits without ever reloading.
        let _ = done_tx.send(true);
        Ok(signals)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nop_watcher_is_done() {
        let signals = NopWatcher.start().unwrap();
        assert!(*signals.done.borrow());
    }

    #[tokio::test]
    async fn test_nop_watcher_never_signals() {
        let mut signals = NopWatcher.start().unwrap();
        // Change channel is closed right away.
        assert_eq!(signals.changes.recv().await, None);
    }

    #[test]
    fn test_nop_watcher_close() {
        assert!(NopWatcher.close().is_ok());
    }
}
