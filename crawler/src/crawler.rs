//! The crawler and the tasks it spawns.

use crate::connection::{Connector, TcpConnector};
use crate::identity::NodeKey;
use crate::registry::NodeRegistry;
use crate::task_group::{RestartPolicy, TaskGroup};
use crate::trimmer::RegistryTrimmer;
use crate::worker::{CrawlWorker, WorkerConfig, WorkerMode};
use dogemap_connection::{ConnectionConfiguration, PeerAddress};
use log::info;
use std::time::Duration;

/// Name of the pinned worker's task.
pub const PINNED_TASK: &str = "local-node";
/// Name of the trimmer's task.
pub const TRIMMER_TASK: &str = "trimmer";

/// A crawler for the Dogecoin peer-to-peer network.
///
/// Runs a pinned worker (optional), any number of opportunistic workers and the
/// registry trimmer as supervised tasks. Build one with
/// [`CrawlerBuilder`](crate::CrawlerBuilder).
#[derive(Debug, Clone)]
pub struct Crawler {
    registry: NodeRegistry,
    connection: ConnectionConfiguration,
    pinned: Option<PeerAddress>,
    workers: usize,
    pinned_deadline: Option<Duration>,
    opportunistic_deadline: Duration,
    restart: RestartPolicy,
    trim_interval: Duration,
    node_key: Option<NodeKey>,
}

impl Crawler {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: NodeRegistry,
        connection: ConnectionConfiguration,
        pinned: Option<PeerAddress>,
        workers: usize,
        pinned_deadline: Option<Duration>,
        opportunistic_deadline: Duration,
        restart: RestartPolicy,
        trim_interval: Duration,
        node_key: Option<NodeKey>,
    ) -> Self {
        Self {
            registry,
            connection,
            pinned,
            workers,
            pinned_deadline,
            opportunistic_deadline,
            restart,
            trim_interval,
            node_key,
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn connection(&self) -> &ConnectionConfiguration {
        &self.connection
    }

    pub fn pinned_peer(&self) -> Option<PeerAddress> {
        self.pinned
    }

    /// Number of opportunistic workers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn node_key(&self) -> Option<&NodeKey> {
        self.node_key.as_ref()
    }

    /// Start every task over real TCP connections.
    ///
    /// Call [`TaskGroup::shutdown`] on the result to stop them.
    pub fn spawn(&self) -> TaskGroup {
        self.spawn_with(TcpConnector::new(self.connection.clone()))
    }

    pub(crate) fn spawn_with<K: Connector>(&self, connector: K) -> TaskGroup {
        if let Some(key) = &self.node_key {
            info!("Node public key is {}", key.public_key());
        }
        let mut group = TaskGroup::new();
        // Registry retries give up on shutdown too.
        let registry = self.registry.with_shutdown(group.shutdown_signal());

        if let Some(peer) = self.pinned {
            let mode = WorkerMode::Pinned(peer);
            let config = WorkerConfig {
                deadline: self.pinned_deadline,
                ..WorkerConfig::for_mode(mode)
            };
            spawn_worker(
                &mut group,
                PINNED_TASK.to_string(),
                mode,
                config,
                self.restart,
                connector.clone(),
                registry.clone(),
            );
        }

        for n in 0..self.workers {
            let mode = WorkerMode::Opportunistic;
            let config = WorkerConfig {
                deadline: Some(self.opportunistic_deadline),
                ..WorkerConfig::for_mode(mode)
            };
            spawn_worker(
                &mut group,
                format!("crawler-{n}"),
                mode,
                config,
                self.restart,
                connector.clone(),
                registry.clone(),
            );
        }

        let trim_interval = self.trim_interval;
        group.spawn(TRIMMER_TASK, self.restart, move |shutdown| {
            let trimmer = RegistryTrimmer::new(registry.clone(), trim_interval, shutdown);
            async move {
                trimmer.run().await;
                Ok(())
            }
        });

        info!(
            "Crawler started: {} tasks ({})",
            group.len(),
            group.names().collect::<Vec<_>>().join(", ")
        );
        group
    }
}

fn spawn_worker<K: Connector>(
    group: &mut TaskGroup,
    name: String,
    mode: WorkerMode,
    config: WorkerConfig,
    restart: RestartPolicy,
    connector: K,
    registry: NodeRegistry,
) {
    group.spawn(name.clone(), restart, move |shutdown| {
        let worker = CrawlWorker::new(
            name.clone(),
            mode,
            config,
            connector.clone(),
            registry.clone(),
            shutdown,
        );
        async move {
            worker.run().await;
            Ok(())
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CrawlerBuilder;
    use crate::connection::test_utils::MockConnector;
    use crate::registry::RegistryConfig;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_spawn_names_tasks() {
        let registry = NodeRegistry::open_in_memory(RegistryConfig::default(), None).unwrap();
        let crawler = CrawlerBuilder::new(registry)
            .with_pinned_peer("127.0.0.1:22556".parse().unwrap())
            .unwrap()
            .with_workers(2)
            .build();

        let group = crawler.spawn_with(MockConnector::new());
        assert_eq!(
            group.names().collect::<Vec<_>>(),
            vec![PINNED_TASK, "crawler-0", "crawler-1", TRIMMER_TASK]
        );

        timeout(Duration::from_secs(2), group.shutdown())
            .await
            .expect("tasks did not stop");
    }

    #[tokio::test]
    async fn test_spawn_without_workers() {
        let registry = NodeRegistry::open_in_memory(RegistryConfig::default(), None).unwrap();
        let group = CrawlerBuilder::new(registry)
            .build()
            .spawn_with(MockConnector::new());
        assert_eq!(group.names().collect::<Vec<_>>(), vec![TRIMMER_TASK]);
        group.shutdown().await;
    }
}
