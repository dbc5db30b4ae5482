//! Persistent registry of Dogecoin core nodes.
//!
//! Backed by a single SQLite connection. Every operation runs as one immediate
//! transaction on the blocking thread pool. SQLite reports contention with another
//! process (a reader holding the file, for instance) as `SQLITE_BUSY`, which is
//! retried after a short delay up to [`RegistryConfig::max_attempts`] times. The delay
//! is cut short by shutdown.

use crate::error::RegistryError;
use crate::shutdown::Shutdown;
use bitcoin::p2p::ServiceFlags;
use dogemap_connection::{unix_timestamp, PeerAddress};
use log::{debug, error, warn};
use rusqlite::types::Type;
use rusqlite::{
    ffi, params, Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior,
};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default retention window for registry rows.
pub const DEFAULT_RETENTION_DAYS: u32 = 3;
/// Attempts made while storage stays busy.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;
/// Delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

const SECONDS_PER_DAY: i64 = 86_400;

/// Schema migrations, applied in order. The schema version is kept in
/// `PRAGMA user_version`.
const MIGRATIONS: &[&str] = &[
    // 1: initial schema.
    "CREATE TABLE IF NOT EXISTS core_nodes (
        address BLOB NOT NULL PRIMARY KEY,
        last_seen INTEGER NOT NULL,
        services INTEGER NOT NULL,
        is_new INTEGER NOT NULL,
        day_counter INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS core_nodes_last_seen ON core_nodes (last_seen);
    CREATE INDEX IF NOT EXISTS core_nodes_is_new ON core_nodes (is_new);",
];

/// Registry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Rows (and gossip entries) older than this many days are stale.
    pub retention_days: u32,
    /// Attempts made while storage stays busy, at least one.
    pub max_attempts: u32,
    /// Delay between two attempts.
    pub retry_delay: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RegistryConfig {
    /// Oldest timestamp still inside the retention window at `now`.
    ///
    /// Timestamps equal to the cutoff are retained.
    pub fn cutoff(&self, now: i64) -> i64 {
        now - i64::from(self.retention_days) * SECONDS_PER_DAY
    }
}

/// A row of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreNode {
    pub address: PeerAddress,
    /// Unix seconds.
    pub last_seen: i64,
    pub services: ServiceFlags,
}

/// Row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total: u64,
    /// Rows still flagged fresh.
    pub fresh: u64,
}

/// Outcome of [`NodeRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Failure inside a transaction attempt.
#[derive(Debug)]
enum TxError {
    Sql(rusqlite::Error),
    NotFound,
}

impl From<rusqlite::Error> for TxError {
    fn from(err: rusqlite::Error) -> Self {
        TxError::Sql(err)
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

/// A primary key or unique constraint failed. Other constraint failures are bugs.
fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE
        ),
        _ => false,
    }
}

fn address_from_column(key: Vec<u8>) -> rusqlite::Result<PeerAddress> {
    PeerAddress::from_bytes(&key)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Blob, Box::new(e)))
}

/// Concurrency-safe handle on the node registry. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    conn: Arc<Mutex<Connection>>,
    config: RegistryConfig,
    shutdown: Option<Shutdown>,
}

impl NodeRegistry {
    /// Open (or create) the registry stored at `path` and bring its schema up to date.
    ///
    /// # Arguments
    ///
    /// * `path` - SQLite database file.
    /// * `config` - Retention settings.
    /// * `shutdown` - Interrupts retry delays when fired.
    pub fn open(
        path: impl AsRef<Path>,
        config: RegistryConfig,
        shutdown: Option<Shutdown>,
    ) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| RegistryError::StorageProblem {
            operation: "open",
            source,
        })?;
        debug!(target: "registry", "Opened SQLite registry at {}", path.display());
        Self::from_connection(conn, config, shutdown)
    }

    /// A registry that lives in memory, for tests and throwaway runs.
    pub fn open_in_memory(
        config: RegistryConfig,
        shutdown: Option<Shutdown>,
    ) -> Result<Self, RegistryError> {
        let conn =
            Connection::open_in_memory().map_err(|source| RegistryError::StorageProblem {
                operation: "open",
                source,
            })?;
        Self::from_connection(conn, config, shutdown)
    }

    fn from_connection(
        mut conn: Connection,
        config: RegistryConfig,
        shutdown: Option<Shutdown>,
    ) -> Result<Self, RegistryError> {
        let problem = |source| RegistryError::StorageProblem {
            operation: "init schema",
            source,
        };
        // Busy is handled by our own retry loop.
        conn.busy_timeout(Duration::ZERO).map_err(problem)?;
        let version = migrate(&mut conn).map_err(problem)?;
        debug!(target: "registry", "Registry schema at version {version}");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
            shutdown,
        })
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// A handle on the same storage with different settings.
    pub fn with_config(&self, config: RegistryConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    /// A handle on the same storage whose retry delays end at `shutdown`.
    pub fn with_shutdown(&self, shutdown: Shutdown) -> Self {
        Self {
            shutdown: Some(shutdown),
            ..self.clone()
        }
    }

    /// Insert a newly discovered node, or refresh a known one.
    ///
    /// `last_seen` never moves backwards. New rows are flagged fresh.
    pub async fn upsert(
        &self,
        address: PeerAddress,
        timestamp: i64,
        services: ServiceFlags,
    ) -> Result<Upsert, RegistryError> {
        let services = services.to_u64() as i64;
        let result = self
            .transact("upsert", move |tx| {
                if update_node(tx, &address, timestamp, services)? {
                    return Ok(Upsert::Updated);
                }
                insert_node(tx, &address, timestamp, services)?;
                Ok(Upsert::Inserted)
            })
            .await;
        match result {
            // Another writer inserted the row between our update and insert.
            Err(RegistryError::AlreadyExists) => {
                self.transact("upsert", move |tx| {
                    update_node(tx, &address, timestamp, services)?;
                    Ok(Upsert::Updated)
                })
                .await
            }
            other => other,
        }
    }

    /// Insert a node that must not exist yet.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyExists`] if the address is already registered.
    pub async fn insert(
        &self,
        address: PeerAddress,
        timestamp: i64,
        services: ServiceFlags,
    ) -> Result<(), RegistryError> {
        let services = services.to_u64() as i64;
        self.transact("insert", move |tx| {
            insert_node(tx, &address, timestamp, services)?;
            Ok(())
        })
        .await
    }

    /// Record a successful handshake with `address` by setting its last seen time
    /// to now. Returns false if the address is not registered.
    pub async fn touch_contact_time(&self, address: PeerAddress) -> Result<bool, RegistryError> {
        self.transact("touch contact time", move |tx| {
            let updated = tx.execute(
                "UPDATE core_nodes SET last_seen = MAX(last_seen, ?1) WHERE address = ?2",
                params![unix_timestamp(), &address.to_bytes()[..]],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    /// Pick a crawl target at random, preferring fresh rows.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if the registry is empty.
    pub async fn choose_target(&self) -> Result<PeerAddress, RegistryError> {
        self.transact("choose target", |tx| {
            let fresh: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT address FROM core_nodes WHERE is_new = 1 ORDER BY RANDOM() LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let key = match fresh {
                Some(key) => key,
                None => tx
                    .query_row(
                        "SELECT address FROM core_nodes ORDER BY RANDOM() LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?
                    .ok_or(TxError::NotFound)?,
            };
            Ok(address_from_column(key)?)
        })
        .await
    }

    pub async fn stats(&self) -> Result<RegistryStats, RegistryError> {
        self.transact("stats", |tx| {
            let (total, fresh): (i64, i64) = tx.query_row(
                "SELECT COUNT(*), COALESCE(SUM(is_new), 0) FROM core_nodes",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(RegistryStats {
                total: total as u64,
                fresh: fresh as u64,
            })
        })
        .await
    }

    /// Every registered node, most recently seen first.
    pub async fn list_all(&self) -> Result<Vec<CoreNode>, RegistryError> {
        self.transact("list all", |tx| {
            let mut stmt = tx.prepare(
                "SELECT address, last_seen, services FROM core_nodes ORDER BY last_seen DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(CoreNode {
                    address: address_from_column(row.get(0)?)?,
                    last_seen: row.get(1)?,
                    services: ServiceFlags::from(row.get::<_, i64>(2)? as u64),
                })
            })?;
            let mut nodes = Vec::new();
            for node in rows {
                nodes.push(node?);
            }
            Ok(nodes)
        })
        .await
    }

    /// Delete rows that fell out of the retention window. Returns the number removed.
    pub async fn trim(&self) -> Result<usize, RegistryError> {
        self.trim_before(self.config.cutoff(unix_timestamp())).await
    }

    /// Delete rows last seen strictly before `cutoff`.
    pub async fn trim_before(&self, cutoff: i64) -> Result<usize, RegistryError> {
        self.transact("trim", move |tx| {
            Ok(tx.execute(
                "DELETE FROM core_nodes WHERE last_seen < ?1",
                params![cutoff],
            )?)
        })
        .await
    }

    /// Run `f` in an immediate transaction, retrying while storage is busy.
    async fn transact<T, F>(&self, operation: &'static str, f: F) -> Result<T, RegistryError>
    where
        T: Send + 'static,
        F: Fn(&Transaction<'_>) -> Result<T, TxError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let conn = Arc::clone(&self.conn);
            let f = Arc::clone(&f);
            let outcome = tokio::task::spawn_blocking(move || -> Result<T, TxError> {
                // A panic mid-transaction rolls it back, the connection stays usable.
                let mut conn = conn.lock().unwrap_or_else(PoisonError::into_inner);
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let value = (*f)(&tx)?;
                tx.commit()?;
                Ok(value)
            })
            .await
            .map_err(|_| RegistryError::BlockingTaskFailed)?;

            match outcome {
                Ok(value) => return Ok(value),
                Err(TxError::NotFound) => return Err(RegistryError::NotFound),
                Err(TxError::Sql(e)) if is_busy(&e) => {
                    debug!(target: "registry", "{operation}: storage busy (attempt {attempt}/{max_attempts})");
                    if attempt < max_attempts {
                        self.backoff().await?;
                    }
                }
                Err(TxError::Sql(e)) if is_duplicate_key(&e) => {
                    return Err(RegistryError::AlreadyExists)
                }
                Err(TxError::Sql(source)) => {
                    error!(target: "registry", "{operation}: {source}");
                    return Err(RegistryError::StorageProblem { operation, source });
                }
            }
        }
        warn!(target: "registry", "{operation}: giving up after {max_attempts} attempts");
        Err(RegistryError::StorageConflict {
            operation,
            attempts: max_attempts,
        })
    }

    async fn backoff(&self) -> Result<(), RegistryError> {
        let delay = self.config.retry_delay;
        match &self.shutdown {
            Some(shutdown) => Ok(shutdown.sleep(delay).await?),
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

/// Apply pending migrations, returning the resulting schema version.
fn migrate(conn: &mut Connection) -> rusqlite::Result<u32> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current: u32 = tx.pragma_query_value(None, "user_version", |row| row.get(0))?;
    for (index, migration) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        debug!(target: "registry", "Applying registry migration {}", index + 1);
        tx.execute_batch(migration)?;
    }
    let latest = MIGRATIONS.len() as u32;
    if latest > current {
        tx.pragma_update(None, "user_version", latest)?;
    }
    tx.commit()?;
    Ok(latest.max(current))
}

fn update_node(
    tx: &Transaction<'_>,
    address: &PeerAddress,
    timestamp: i64,
    services: i64,
) -> rusqlite::Result<bool> {
    let updated = tx.execute(
        "UPDATE core_nodes SET last_seen = MAX(last_seen, ?1), services = ?2 WHERE address = ?3",
        params![timestamp, services, &address.to_bytes()[..]],
    )?;
    Ok(updated > 0)
}

fn insert_node(
    tx: &Transaction<'_>,
    address: &PeerAddress,
    timestamp: i64,
    services: i64,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO core_nodes (address, last_seen, services, is_new, day_counter)
         VALUES (?1, ?2, ?3, 1, 0)",
        params![&address.to_bytes()[..], timestamp, services],
    )?;
    Ok(())
}
