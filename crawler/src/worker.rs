//! Long-running crawl workers.

use crate::connection::Connector;
use crate::error::RegistryError;
use crate::registry::NodeRegistry;
use crate::session::{HarvestSession, SessionConfig, SessionEnd};
use crate::shutdown::{Cancelled, Shutdown};
use dogemap_connection::PeerAddress;
use log::{debug, info, warn};
use std::fmt;
use std::time::Duration;

/// Read deadline of an opportunistic session.
pub const DEFAULT_OPPORTUNISTIC_DEADLINE: Duration = Duration::from_secs(5 * 60);
/// Read deadline of a pinned session.
pub const DEFAULT_PINNED_DEADLINE: Duration = Duration::from_secs(60);
/// Wait before asking an empty registry again.
pub const DEFAULT_NO_TARGET_DELAY: Duration = Duration::from_secs(5);
/// Wait between two sessions of the same worker.
pub const DEFAULT_ATTEMPT_DELAY: Duration = Duration::from_secs(10);

/// How a worker picks its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    /// Always the same, locally trusted peer. Its registry row is never touched.
    Pinned(PeerAddress),
    /// A random registry row per session.
    Opportunistic,
}

impl fmt::Display for WorkerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerMode::Pinned(peer) => write!(f, "pinned to {peer}"),
            WorkerMode::Opportunistic => write!(f, "opportunistic"),
        }
    }
}

/// Worker timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Per-session read deadline, `None` for unbounded.
    pub deadline: Option<Duration>,
    pub no_target_delay: Duration,
    pub attempt_delay: Duration,
}

impl WorkerConfig {
    /// Defaults for `mode`.
    pub fn for_mode(mode: WorkerMode) -> Self {
        let deadline = match mode {
            WorkerMode::Pinned(_) => DEFAULT_PINNED_DEADLINE,
            WorkerMode::Opportunistic => DEFAULT_OPPORTUNISTIC_DEADLINE,
        };
        Self {
            deadline: Some(deadline),
            no_target_delay: DEFAULT_NO_TARGET_DELAY,
            attempt_delay: DEFAULT_ATTEMPT_DELAY,
        }
    }
}

/// Repeatedly harvests peers until shutdown.
///
/// Session failures are expected (peers come and go) and only logged. A shutdown
/// interrupts whichever wait or read is in progress, dropping a live connection.
#[derive(Debug, Clone)]
pub struct CrawlWorker<K: Connector> {
    name: String,
    mode: WorkerMode,
    config: WorkerConfig,
    connector: K,
    registry: NodeRegistry,
    session: HarvestSession,
    shutdown: Shutdown,
}

impl<K: Connector> CrawlWorker<K> {
    /// # Arguments
    ///
    /// * `name` - Log prefix.
    /// * `mode` - Target selection.
    /// * `config` - Deadline and delays.
    /// * `connector` - Opens peer connections.
    /// * `registry` - Target source and gossip sink.
    /// * `shutdown` - Stops the worker.
    pub fn new(
        name: impl Into<String>,
        mode: WorkerMode,
        config: WorkerConfig,
        connector: K,
        registry: NodeRegistry,
        shutdown: Shutdown,
    ) -> Self {
        let session = HarvestSession::new(
            registry.clone(),
            SessionConfig {
                deadline: config.deadline,
                touch_target: matches!(mode, WorkerMode::Opportunistic),
            },
            shutdown.clone(),
        );
        Self {
            name: name.into(),
            mode,
            config,
            connector,
            registry,
            session,
            shutdown,
        }
    }

    /// Crawl until shutdown.
    pub async fn run(&self) {
        info!("[{}] Started, {}", self.name, self.mode);
        if self.crawl().await.is_err() {
            debug!("[{}] Stopped", self.name);
        }
    }

    async fn crawl(&self) -> Result<(), Cancelled> {
        loop {
            let target = self.next_target().await?;
            debug!("[{}] Harvesting {target}", self.name);
            match self.session.run(&self.connector, target).await {
                Ok(report) => match report.end {
                    SessionEnd::Cancelled => return Err(Cancelled),
                    SessionEnd::AddressQuota { cool_down } => {
                        info!(
                            "[{}] {target}: {} received, {} kept, {} new",
                            self.name, report.received, report.kept, report.added
                        );
                        self.shutdown.sleep(cool_down).await?;
                    }
                    SessionEnd::DeadlineReached => {
                        debug!(
                            "[{}] {target}: deadline reached after {} addresses",
                            self.name, report.received
                        );
                    }
                },
                Err(e) => info!("[{}] {target}: {e}", self.name),
            }
            self.shutdown.sleep(self.config.attempt_delay).await?;
        }
    }

    async fn next_target(&self) -> Result<PeerAddress, Cancelled> {
        let WorkerMode::Pinned(peer) = self.mode else {
            return self.choose_target().await;
        };
        Ok(peer)
    }

    async fn choose_target(&self) -> Result<PeerAddress, Cancelled> {
        loop {
            match self.registry.choose_target().await {
                Ok(target) => return Ok(target),
                // Nothing to crawl until the pinned worker or other peers fill the registry.
                Err(RegistryError::NotFound) => {
                    debug!("[{}] Registry is empty, waiting", self.name)
                }
                Err(RegistryError::Cancelled) => return Err(Cancelled),
                Err(e) => warn!("[{}] Choosing a target failed: {e}", self.name),
            }
            self.shutdown.sleep(self.config.no_target_delay).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_utils::{MockConnector, MockPeerConnection};
    use crate::registry::RegistryConfig;
    use crate::shutdown::ShutdownTrigger;
    use bitcoin::p2p::ServiceFlags;
    use dogemap_connection::unix_timestamp;
    use tokio::time::timeout;

    fn fast(deadline: Option<Duration>) -> WorkerConfig {
        WorkerConfig {
            deadline,
            no_target_delay: Duration::from_millis(20),
            attempt_delay: Duration::from_millis(20),
        }
    }

    async fn wait_for_dials(connector: &MockConnector, count: usize) {
        timeout(Duration::from_secs(5), async {
            while connector.dialed.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker never dialed");
    }

    #[test]
    fn test_default_deadlines() {
        let pinned = WorkerMode::Pinned("10.0.0.1:22556".parse().unwrap());
        assert_eq!(
            WorkerConfig::for_mode(pinned).deadline,
            Some(DEFAULT_PINNED_DEADLINE)
        );
        assert_eq!(
            WorkerConfig::for_mode(WorkerMode::Opportunistic).deadline,
            Some(DEFAULT_OPPORTUNISTIC_DEADLINE)
        );
    }

    #[tokio::test]
    async fn test_opportunistic_waits_for_registry() {
        let registry = NodeRegistry::open_in_memory(RegistryConfig::default(), None).unwrap();
        let trigger = ShutdownTrigger::new();
        let connector = MockConnector::new();
        let worker = CrawlWorker::new(
            "crawler-0",
            WorkerMode::Opportunistic,
            fast(Some(Duration::from_millis(20))),
            connector.clone(),
            registry.clone(),
            trigger.subscribe(),
        );
        let task = tokio::spawn(async move { worker.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(connector.dialed.lock().unwrap().is_empty());

        let target: PeerAddress = "10.0.0.9:22556".parse().unwrap();
        registry
            .upsert(target, unix_timestamp(), ServiceFlags::NETWORK)
            .await
            .unwrap();
        wait_for_dials(&connector, 1).await;

        trigger.trigger();
        task.await.unwrap();
        assert_eq!(connector.dialed.lock().unwrap()[0], target);
    }

    #[tokio::test]
    async fn test_pinned_redials_without_registry() {
        let registry = NodeRegistry::open_in_memory(RegistryConfig::default(), None).unwrap();
        let trigger = ShutdownTrigger::new();
        let connector = MockConnector::new();
        let pinned: PeerAddress = "192.168.1.2:22556".parse().unwrap();
        // First session succeeds, the rest fail to connect.
        connector.add_connection(MockPeerConnection::new());
        let worker = CrawlWorker::new(
            "local-node",
            WorkerMode::Pinned(pinned),
            fast(Some(Duration::from_millis(20))),
            connector.clone(),
            registry.clone(),
            trigger.subscribe(),
        );
        let task = tokio::spawn(async move { worker.run().await });

        wait_for_dials(&connector, 3).await;
        trigger.trigger();
        task.await.unwrap();

        assert!(connector
            .dialed
            .lock()
            .unwrap()
            .iter()
            .all(|peer| *peer == pinned));
        // The pinned peer is never added to rotation.
        assert_eq!(registry.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_live_session() {
        let registry = NodeRegistry::open_in_memory(RegistryConfig::default(), None).unwrap();
        let trigger = ShutdownTrigger::new();
        let connector = MockConnector::new();
        connector.add_connection(MockPeerConnection::new());
        let worker = CrawlWorker::new(
            "local-node",
            WorkerMode::Pinned("192.168.1.2:22556".parse().unwrap()),
            fast(None),
            connector.clone(),
            registry,
            trigger.subscribe(),
        );
        let task = tokio::spawn(async move { worker.run().await });

        wait_for_dials(&connector, 1).await;
        trigger.trigger();
        timeout(Duration::from_secs(1), task)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
