//! Address harvesting over one peer connection.
//!
//! A [`HarvestSession`] dials a target, optionally marks it as contacted, then runs a
//! receive loop that answers pings, re-solicits gossip with `getaddr`, and writes every
//! gossiped address inside the retention window into the registry. The session ends
//! once the peer has sent its burst of addresses, when the read deadline passes, or on
//! shutdown.

use crate::connection::{Connector, PeerConnection};
use crate::error::RegistryError;
use crate::registry::{NodeRegistry, Upsert};
use crate::shutdown::Shutdown;
use dogemap_connection::message::{AddrMessage, NetworkMessage};
use dogemap_connection::{unix_timestamp, ConnectionError, PeerAddress};
use log::{debug, info, trace, warn};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Addresses after which a peer has nothing more to offer on this connection.
///
/// Peers answer a single `getaddr` per connection with at most this many entries.
pub const ADDRESS_QUOTA: usize = 1000;

/// Cool-down after a session that added no new nodes.
const MAX_COOL_DOWN_SECS: u64 = 60;

/// Per-session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Overall read deadline, `None` to read until the peer goes away.
    pub deadline: Option<Duration>,
    /// Refresh the target's registry row once the handshake succeeds.
    pub touch_target: bool,
}

/// Why a session stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent its full burst of addresses. Wait `cool_down` before the next
    /// connection.
    AddressQuota { cool_down: Duration },
    DeadlineReached,
    Cancelled,
}

/// Summary of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarvestReport {
    /// Address entries received.
    pub received: usize,
    /// Entries inside the retention window, written to the registry.
    pub kept: usize,
    /// Entries that were not yet registered.
    pub added: usize,
    pub end: SessionEnd,
}

/// Back off harder the fewer new nodes a session found.
pub fn cool_down(added: usize) -> Duration {
    Duration::from_secs(MAX_COOL_DOWN_SECS.saturating_sub(added as u64).max(1))
}

/// Whether a gossip entry seen at `time` is inside the retention window ending at `cutoff`.
pub fn within_retention(time: i64, cutoff: i64) -> bool {
    time >= cutoff
}

/// Errors that end a session early.
#[derive(Debug)]
pub enum SessionError {
    /// Connecting, the handshake, or the connection itself failed.
    Connection(ConnectionError),
    Registry(RegistryError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Connection(e) => write!(f, "connection error: {e}"),
            SessionError::Registry(e) => write!(f, "registry error: {e}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Connection(e) => Some(e),
            SessionError::Registry(e) => Some(e),
        }
    }
}

impl From<ConnectionError> for SessionError {
    fn from(err: ConnectionError) -> Self {
        SessionError::Connection(err)
    }
}

impl From<RegistryError> for SessionError {
    fn from(err: RegistryError) -> Self {
        SessionError::Registry(err)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    received: usize,
    kept: usize,
    added: usize,
}

impl Tally {
    fn add(&mut self, batch: Tally) {
        self.received += batch.received;
        self.kept += batch.kept;
        self.added += batch.added;
    }

    fn finish(self, end: SessionEnd) -> HarvestReport {
        HarvestReport {
            received: self.received,
            kept: self.kept,
            added: self.added,
            end,
        }
    }
}

/// Drives connections through the harvest loop.
#[derive(Debug, Clone)]
pub struct HarvestSession {
    registry: NodeRegistry,
    config: SessionConfig,
    shutdown: Shutdown,
}

impl HarvestSession {
    pub fn new(registry: NodeRegistry, config: SessionConfig, shutdown: Shutdown) -> Self {
        Self {
            registry,
            config,
            shutdown,
        }
    }

    /// Connect to `target` and harvest it.
    ///
    /// The connection is closed when this returns.
    ///
    /// # Arguments
    ///
    /// * `connector` - Creates the handshaked connection.
    /// * `target` - The peer to harvest.
    ///
    /// # Returns
    ///
    /// * `Ok(HarvestReport)` - The session ran to one of its normal ends.
    /// * `Err(SessionError)` - Connecting or reading from the peer failed.
    pub async fn run<K: Connector>(
        &self,
        connector: &K,
        target: PeerAddress,
    ) -> Result<HarvestReport, SessionError> {
        let mut conn = tokio::select! {
            _ = self.shutdown.cancelled() => return Ok(Tally::default().finish(SessionEnd::Cancelled)),
            conn = connector.connect(target) => conn?,
        };
        debug!("[{target}] Handshake complete");

        if self.config.touch_target {
            match self.registry.touch_contact_time(target).await {
                Ok(_) => {}
                Err(RegistryError::Cancelled) => {
                    return Ok(Tally::default().finish(SessionEnd::Cancelled))
                }
                Err(e) => warn!("[{target}] Failed to refresh contact time: {e}"),
            }
        }

        self.harvest(&mut conn).await
    }

    /// Run the receive loop on an established connection.
    pub async fn harvest<C: PeerConnection>(
        &self,
        conn: &mut C,
    ) -> Result<HarvestReport, SessionError> {
        let who = conn.peer();
        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        let mut tally = Tally::default();

        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(tally.finish(SessionEnd::Cancelled)),
                _ = wait_until(deadline) => {
                    debug!("[{who}] Read deadline reached");
                    return Ok(tally.finish(SessionEnd::DeadlineReached));
                }
                message = conn.receive() => message?,
            };

            let handled = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(tally.finish(SessionEnd::Cancelled)),
                handled = self.handle(conn, &who, message) => handled,
            };
            match handled {
                Ok(batch) => tally.add(batch),
                Err(SessionError::Registry(RegistryError::Cancelled)) => {
                    return Ok(tally.finish(SessionEnd::Cancelled))
                }
                Err(e) => return Err(e),
            }

            if tally.received >= ADDRESS_QUOTA {
                let wait = cool_down(tally.added);
                debug!(
                    "[{who}] Received {} addresses, cooling down for {}s",
                    tally.received,
                    wait.as_secs()
                );
                return Ok(tally.finish(SessionEnd::AddressQuota { cool_down: wait }));
            }
        }
    }

    async fn handle<C: PeerConnection>(
        &self,
        conn: &mut C,
        who: &PeerAddress,
        message: NetworkMessage,
    ) -> Result<Tally, SessionError> {
        match message {
            NetworkMessage::Ping(ping) => {
                trace!("[{who}] Ping received");
                conn.send(NetworkMessage::Pong(ping)).await?;
                // Each ping is a chance to ask for more gossip.
                conn.send(NetworkMessage::GetAddr).await?;
                Ok(Tally::default())
            }
            NetworkMessage::Addr(addr) => self.store_addresses(who, addr).await,
            NetworkMessage::Reject(reject) => {
                warn!("[{who}] Reject: {reject}");
                Ok(Tally::default())
            }
            other => {
                trace!("[{who}] Ignoring {}", other.command());
                Ok(Tally::default())
            }
        }
    }

    async fn store_addresses(
        &self,
        who: &PeerAddress,
        addr: AddrMessage,
    ) -> Result<Tally, SessionError> {
        let now = unix_timestamp();
        let cutoff = self.registry.config().cutoff(now);
        let mut batch = Tally {
            received: addr.addresses.len(),
            ..Tally::default()
        };

        for entry in &addr.addresses {
            // Peers older than 31402 send untimed entries.
            let time = entry.time.map(i64::from).unwrap_or(now);
            if !within_retention(time, cutoff) {
                continue;
            }
            batch.kept += 1;
            match self
                .registry
                .upsert(entry.peer_address(), time, entry.services)
                .await
            {
                Ok(Upsert::Inserted) => batch.added += 1,
                Ok(Upsert::Updated) => {}
                Err(RegistryError::Cancelled) => return Err(RegistryError::Cancelled.into()),
                Err(e) => warn!("[{who}] Failed to store {}: {e}", entry.peer_address()),
            }
        }

        match self.registry.stats().await {
            Ok(stats) => info!(
                "[{who}] Addresses: {} received, {} expired, {} new, {} in registry",
                batch.received,
                batch.received - batch.kept,
                batch.added,
                stats.total
            ),
            Err(e) => debug!("[{who}] Registry stats unavailable: {e}"),
        }
        Ok(batch)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
