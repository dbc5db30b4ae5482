//! Builder pattern for configuring and creating crawler instances.

use crate::crawler::Crawler;
use crate::identity::NodeKey;
use crate::registry::{NodeRegistry, RegistryConfig};
use crate::task_group::RestartPolicy;
use crate::trimmer::DEFAULT_TRIM_INTERVAL;
use crate::worker::{DEFAULT_OPPORTUNISTIC_DEADLINE, DEFAULT_PINNED_DEADLINE};
use dogemap_connection::{ConnectionConfiguration, PeerAddress};
use std::fmt;
use std::time::Duration;

/// Errors that can occur during crawler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlerBuilderError {
    /// User agent is empty.
    InvalidUserAgent,
    /// Pinned peer has no usable port.
    InvalidPinnedPeer(PeerAddress),
    /// A retention window of zero days would evict every node.
    ZeroRetention,
    /// The registry cannot be trimmed continuously.
    ZeroTrimInterval,
}

impl fmt::Display for CrawlerBuilderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlerBuilderError::InvalidUserAgent => write!(f, "Invalid user agent: empty"),
            CrawlerBuilderError::InvalidPinnedPeer(peer) => {
                write!(f, "Invalid pinned peer {peer}: port must not be 0")
            }
            CrawlerBuilderError::ZeroRetention => {
                write!(f, "Retention window must be at least one day")
            }
            CrawlerBuilderError::ZeroTrimInterval => {
                write!(f, "Trim interval must not be zero")
            }
        }
    }
}

impl std::error::Error for CrawlerBuilderError {}

/// Builder for creating a customized [`Crawler`] instance.
///
/// # Example
///
/// ```
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use dogemap_crawler::{CrawlerBuilder, NodeRegistry, RegistryConfig};
///
/// let registry = NodeRegistry::open_in_memory(RegistryConfig::default(), None)?;
///
/// // Crawl from a local node with four opportunistic workers.
/// let crawler = CrawlerBuilder::new(registry)
///     .with_pinned_peer("192.168.1.20:22556".parse()?)?
///     .with_workers(4)
///     .with_retention_days(2)?
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CrawlerBuilder {
    /// Storage for discovered nodes.
    registry: NodeRegistry,
    /// Settings for every outbound connection.
    connection: ConnectionConfiguration,
    /// Locally trusted peer kept connected, if any.
    pinned: Option<PeerAddress>,
    /// Number of opportunistic workers.
    workers: usize,
    /// Read deadline of a pinned session.
    pinned_deadline: Option<Duration>,
    /// Read deadline of an opportunistic session.
    opportunistic_deadline: Duration,
    /// Relaunch policy for crashed tasks.
    restart: RestartPolicy,
    /// Time between two registry trims.
    trim_interval: Duration,
    /// This crawler's identity.
    node_key: Option<NodeKey>,
}

impl CrawlerBuilder {
    /// Create a new crawler builder writing into `registry`.
    ///
    /// # Arguments
    ///
    /// * `registry` - The node registry to fill and select targets from.
    ///
    /// # Returns
    ///
    /// A new `CrawlerBuilder` instance with no pinned peer and no opportunistic workers.
    pub fn new(registry: NodeRegistry) -> Self {
        CrawlerBuilder {
            registry,
            connection: ConnectionConfiguration::default(),
            pinned: None,
            workers: 0,
            pinned_deadline: Some(DEFAULT_PINNED_DEADLINE),
            opportunistic_deadline: DEFAULT_OPPORTUNISTIC_DEADLINE,
            restart: RestartPolicy::default(),
            trim_interval: DEFAULT_TRIM_INTERVAL,
            node_key: None,
        }
    }

    /// Set the connection settings used for every peer.
    ///
    /// # Arguments
    ///
    /// * `config` - Handshake and timeout settings.
    ///
    /// # Returns
    ///
    /// Self for method chaining.
    pub fn with_connection_configuration(mut self, config: ConnectionConfiguration) -> Self {
        self.connection = config;
        self
    }

    /// Set a custom user agent string for the crawler.
    ///
    /// # Arguments
    ///
    /// * `user_agent` - The user agent string to advertise.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining if validation succeeds.
    /// * `Err(CrawlerBuilderError)` - If the user agent is empty.
    pub fn with_user_agent<S: Into<String>>(
        mut self,
        user_agent: S,
    ) -> Result<Self, CrawlerBuilderError> {
        let user_agent = user_agent.into();
        if user_agent.trim().is_empty() {
            return Err(CrawlerBuilderError::InvalidUserAgent);
        }
        self.connection = self.connection.with_user_agent(user_agent);
        Ok(self)
    }

    /// Keep a connection to a locally trusted peer.
    ///
    /// Addresses it gossips are stored, but it is never added to the crawl rotation.
    ///
    /// # Arguments
    ///
    /// * `peer` - The peer to stay connected to.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining if validation succeeds.
    /// * `Err(CrawlerBuilderError)` - If the peer's port is 0.
    pub fn with_pinned_peer(mut self, peer: PeerAddress) -> Result<Self, CrawlerBuilderError> {
        if peer.port() == 0 {
            return Err(CrawlerBuilderError::InvalidPinnedPeer(peer));
        }
        self.pinned = Some(peer);
        Ok(self)
    }

    /// Set the number of opportunistic workers.
    ///
    /// Each one crawls a randomly chosen registry node at a time.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the pinned session's read deadline, `None` to keep reading until the peer
    /// disconnects. Defaults to 60 seconds.
    pub fn with_pinned_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.pinned_deadline = deadline;
        self
    }

    /// Set the opportunistic sessions' read deadline. Defaults to 5 minutes.
    pub fn with_opportunistic_deadline(mut self, deadline: Duration) -> Self {
        self.opportunistic_deadline = deadline;
        self
    }

    /// Set how crashed tasks are relaunched.
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart = policy;
        self
    }

    /// Set the time between two registry trims. Defaults to one hour.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining if validation succeeds.
    /// * `Err(CrawlerBuilderError)` - If `interval` is zero.
    pub fn with_trim_interval(mut self, interval: Duration) -> Result<Self, CrawlerBuilderError> {
        if interval.is_zero() {
            return Err(CrawlerBuilderError::ZeroTrimInterval);
        }
        self.trim_interval = interval;
        Ok(self)
    }

    /// Set the retention window of the registry.
    ///
    /// # Arguments
    ///
    /// * `days` - Nodes not seen for longer are evicted and their gossip ignored.
    ///
    /// # Returns
    ///
    /// * `Ok(Self)` - The builder for method chaining if validation succeeds.
    /// * `Err(CrawlerBuilderError)` - If `days` is zero.
    pub fn with_retention_days(mut self, days: u32) -> Result<Self, CrawlerBuilderError> {
        if days == 0 {
            return Err(CrawlerBuilderError::ZeroRetention);
        }
        self.registry = self.registry.with_config(RegistryConfig {
            retention_days: days,
            ..self.registry.config()
        });
        Ok(self)
    }

    /// Set this crawler's identity.
    pub fn with_node_key(mut self, key: NodeKey) -> Self {
        self.node_key = Some(key);
        self
    }

    /// Build the crawler with the configured options.
    ///
    /// # Returns
    ///
    /// A configured `Crawler` instance.
    pub fn build(self) -> Crawler {
        Crawler::new(
            self.registry,
            self.connection,
            self.pinned,
            self.workers,
            self.pinned_deadline,
            self.opportunistic_deadline,
            self.restart,
            self.trim_interval,
            self.node_key,
        )
    }
}
