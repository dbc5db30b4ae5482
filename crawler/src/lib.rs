//! Dogecoin network crawler.
//!
//! Workers harvest address gossip from peers into a persistent [`NodeRegistry`],
//! which a trimmer keeps inside its retention window. Everything runs as supervised
//! tasks of a [`TaskGroup`] started by [`Crawler::spawn`].

mod builder;
mod connection;
mod crawler;
mod error;
mod identity;
mod registry;
mod session;
mod shutdown;
mod task_group;
mod trimmer;
mod worker;

pub use builder::{CrawlerBuilder, CrawlerBuilderError};
pub use crawler::{Crawler, PINNED_TASK, TRIMMER_TASK};
pub use error::RegistryError;
pub use identity::{KeyError, NodeKey, NODE_KEY_SIZE};
pub use registry::{
    CoreNode, NodeRegistry, RegistryConfig, RegistryStats, Upsert, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETENTION_DAYS, DEFAULT_RETRY_DELAY,
};
pub use session::{HarvestReport, SessionEnd, SessionError, ADDRESS_QUOTA};
pub use shutdown::{Cancelled, Shutdown, ShutdownTrigger};
pub use task_group::{RestartPolicy, TaskGroup, TaskResult};
pub use trimmer::{RegistryTrimmer, DEFAULT_TRIM_INTERVAL, MIN_TRIM_INTERVAL};
pub use worker::{
    WorkerMode, DEFAULT_ATTEMPT_DELAY, DEFAULT_NO_TARGET_DELAY, DEFAULT_OPPORTUNISTIC_DEADLINE,
    DEFAULT_PINNED_DEADLINE,
};

// Re-exports.
pub use dogemap_connection::{
    ConnectionConfiguration, ConnectionError, PeerAddress, DEFAULT_PORT,
};
