//! Shared cancellation signal.
//!
//! A [`ShutdownTrigger`] fires once; every [`Shutdown`] cloned from it observes the
//! signal. Waits that race the signal return [`Cancelled`] so callers can tell a
//! stop request apart from a timeout.

use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// Returned by waits that were interrupted by shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shutdown requested")
    }
}

impl std::error::Error for Cancelled {}

/// Fires the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// A new listener for this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal every listener. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens for the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// A dropped trigger counts as shutdown.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Sleep for `duration` unless shutdown comes first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            _ = self.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes() {
        let trigger = ShutdownTrigger::new();
        let shutdown = trigger.subscribe();
        assert_eq!(shutdown.sleep(Duration::from_secs(60)).await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted() {
        let trigger = ShutdownTrigger::new();
        let shutdown = trigger.subscribe();

        let sleeper = tokio::spawn(async move { shutdown.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.trigger();

        assert_eq!(sleeper.await.unwrap(), Err(Cancelled));
        assert!(trigger.is_triggered());
    }

    #[tokio::test]
    async fn test_dropped_trigger_cancels() {
        let trigger = ShutdownTrigger::new();
        let shutdown = trigger.subscribe();
        drop(trigger);
        shutdown.cancelled().await;
    }

    #[tokio::test]
    async fn test_already_cancelled() {
        let trigger = ShutdownTrigger::new();
        trigger.trigger();
        let late = trigger.subscribe();
        assert!(late.is_cancelled());
        assert_eq!(late.sleep(Duration::from_secs(1)).await, Err(Cancelled));
    }
}
