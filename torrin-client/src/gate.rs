//! Cooperative pause/cancel signaling for chunk tasks.

use std::time::Duration;

use tokio::sync::watch;

/// Manual-reset pause latch plus a one-way cancel flag.
///
/// Chunk tasks poll [`checkpoint`](ControlGate::checkpoint) at two points:
/// before slicing the body and before a retry sleep. Pausing parks tasks at
/// the next checkpoint; canceling releases parked tasks so they observe the
/// cancel and bail out.
#[derive(Debug)]
pub struct ControlGate {
    paused: watch::Sender<bool>,
    canceled: watch::Sender<bool>,
}

impl Default for ControlGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlGate {
    /// Create a gate that is neither paused nor canceled.
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (canceled, _) = watch::channel(false);
        Self { paused, canceled }
    }

    /// Park tasks at their next checkpoint.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// Release the pause latch.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Cancel, releasing any parked task. Irreversible.
    pub fn cancel(&self) {
        self.canceled.send_replace(true);
        // Wake tasks parked on the pause latch so they observe the cancel.
        self.paused.send_replace(false);
    }

    /// Returns `true` if the gate is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Returns `true` once canceled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        *self.canceled.borrow()
    }

    /// Wait until not paused. Fails if the gate is canceled while waiting
    /// or was already canceled.
    pub async fn checkpoint(&self) -> Result<(), Canceled> {
        let mut paused_rx = self.paused.subscribe();
        let mut canceled_rx = self.canceled.subscribe();
        loop {
            if *canceled_rx.borrow() {
                return Err(Canceled);
            }
            if !*paused_rx.borrow() {
                return Ok(());
            }
            tokio::select! {
                changed = paused_rx.changed() => {
                    if changed.is_err() {
                        return Err(Canceled);
                    }
                }
                changed = canceled_rx.changed() => {
                    if changed.is_err() {
                        return Err(Canceled);
                    }
                }
            }
        }
    }

    /// Sleep for `duration`, waking early if canceled.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Canceled> {
        let mut canceled_rx = self.canceled.subscribe();
        if *canceled_rx.borrow() {
            return Err(Canceled);
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            _ = canceled_rx.changed() => {
                if *canceled_rx.borrow() { Err(Canceled) } else { Ok(()) }
            }
        }
    }
}

/// Marker returned when a wait was interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canceled;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn checkpoint_passes_when_running() {
        let gate = ControlGate::new();
        assert!(gate.checkpoint().await.is_ok());
    }

    #[tokio::test]
    async fn checkpoint_parks_until_resume() {
        let gate = Arc::new(ControlGate::new());
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.checkpoint().await })
        };
        // Give the waiter a chance to park.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn cancel_releases_parked_waiters() {
        let gate = Arc::new(ControlGate::new());
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.checkpoint().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        gate.cancel();
        assert_eq!(waiter.await.unwrap(), Err(Canceled));
        assert!(gate.is_canceled());
    }

    #[tokio::test]
    async fn sleep_is_interrupted_by_cancel() {
        let gate = Arc::new(ControlGate::new());
        let sleeper = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.sleep(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        gate.cancel();
        assert_eq!(sleeper.await.unwrap(), Err(Canceled));
    }
}
