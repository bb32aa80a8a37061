//! Fixed-interval polling watcher.

use super::{WatchSignals, Watcher};
use crate::error::{ConfigError, Result};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::watch;

/// A watcher that signals a change on a fixed interval.
///
/// This is the in-tree reference watcher: sources with no native change
/// notification (HTTP endpoints, key-value stores) are typically paired
/// with a `PollWatcher` so they reload every tick.
///
/// # Examples
///
/// ```rust,no_run
/// use conflux::watch::PollWatcher;
/// use std::time::Duration;
///
/// let watcher = PollWatcher::new(Duration::from_secs(30));
/// ```
pub struct PollWatcher {
    every: Duration,
    state: Mutex<PollState>,
}

#[derive(Default)]
struct PollState {
    started: bool,
    done_tx: Option<watch::Sender<bool>>,
}

impl PollWatcher {
    /// Creates a watcher ticking at the given interval.
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            state: Mutex::new(PollState::default()),
        }
    }

    /// The configured tick interval.
    pub fn interval(&self) -> Duration {
        self.every
    }
}

impl Watcher for PollWatcher {
    /// Spawns the ticking task. Must be called within a tokio runtime.
    fn start(&self) -> Result<WatchSignals> {
        let mut state = self.state.lock();
        if state.started {
            return Err(ConfigError::Watch("poll watcher already started".to_string()));
        }
        state.started = true;

        let (change_tx, done_tx, signals) = WatchSignals::channel(1);
        let mut done_rx = signals.done.clone();
        state.done_tx = Some(done_tx);

        let every = self.every;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(every) => {
                        if change_tx.send(()).await.is_err() {
                            // Receiver dropped: the watch task is gone.
                            return;
                        }
                    }
                    // The done flag only ever flips to true; any wakeup,
                    // including a dropped sender, means shut down.
                    _ = done_rx.changed() => return,
                }
            }
        });

        Ok(signals)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        match state.done_tx.take() {
            Some(done_tx) => {
                let _ = done_tx.send(true);
                Ok(())
            }
            None => Err(ConfigError::Watch("poll watcher not running".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_poll_emits_changes() {
        let watcher = PollWatcher::new(Duration::from_millis(10));
        let mut signals = watcher.start().unwrap();

        let got = timeout(Duration::from_secs(2), signals.changes.recv()).await;
        assert_eq!(got.unwrap(), Some(()));
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let watcher = PollWatcher::new(Duration::from_millis(10));
        let _signals = watcher.start().unwrap();
        assert!(watcher.start().is_err());
    }

    #[tokio::test]
    async fn test_close_flags_done() {
        let watcher = PollWatcher::new(Duration::from_secs(3600));
        let mut signals = watcher.start().unwrap();

        watcher.close().unwrap();
        timeout(Duration::from_secs(2), signals.done.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*signals.done.borrow());
    }

    #[tokio::test]
    async fn test_close_before_start_fails() {
        let watcher = PollWatcher::new(Duration::from_secs(1));
        assert!(watcher.close().is_err());
    }
}
