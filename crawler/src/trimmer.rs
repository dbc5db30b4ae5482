//! Periodic eviction of stale registry rows.

use crate::error::RegistryError;
use crate::registry::NodeRegistry;
use crate::shutdown::Shutdown;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Time between two trims.
pub const DEFAULT_TRIM_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Shortest time between two trims. Shorter intervals are raised to it.
pub const MIN_TRIM_INTERVAL: Duration = Duration::from_secs(1);

/// Calls [`NodeRegistry::trim`] once per interval until shutdown.
#[derive(Debug, Clone)]
pub struct RegistryTrimmer {
    registry: NodeRegistry,
    interval: Duration,
    shutdown: Shutdown,
}

impl RegistryTrimmer {
    pub fn new(registry: NodeRegistry, interval: Duration, shutdown: Shutdown) -> Self {
        Self {
            registry,
            interval: interval.max(MIN_TRIM_INTERVAL),
            shutdown,
        }
    }

    /// Trim every interval, first one interval after start. Failures are logged and
    /// retried on the next tick.
    pub async fn run(&self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("[trimmer] Stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.trim_once().await;
                }
            }
        }
    }

    /// Run a single trim, returning the number of evicted rows.
    pub async fn trim_once(&self) -> Option<usize> {
        match self.registry.trim().await {
            Ok(evicted) => {
                info!("[trimmer] Trimmed {evicted} core nodes");
                Some(evicted)
            }
            Err(RegistryError::Cancelled) => None,
            Err(e) => {
                warn!("[trimmer] Trim failed: {e}");
                None
            }
        }
    }
}
