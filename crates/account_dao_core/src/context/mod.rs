//! Persistence context: factory, unit-of-work and transaction scope.
//!
//! # Responsibility
//! - Produce one fresh, configured connection per unit-of-work.
//! - Keep the backing store alive and migrated for the factory's lifetime.
//!
//! # Invariants
//! - Factories are constructed explicitly and injected; there is no
//!   process-wide store handle.
//! - Connections handed out by a factory point at a migrated schema.

pub mod transaction;
pub mod unit_of_work;

use crate::db::{configure_connection, open_db, DbError, DbResult};
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const TEMPORARY_DB_FILE_NAME: &str = "accounts.db";

/// Source of unit-of-work connections.
pub trait PersistenceContextFactory {
    /// Opens a new connection that will back exactly one unit-of-work.
    fn open_context(&self) -> DbResult<Connection>;
}

impl<T: PersistenceContextFactory + ?Sized> PersistenceContextFactory for Arc<T> {
    fn open_context(&self) -> DbResult<Connection> {
        (**self).open_context()
    }
}

impl<T: PersistenceContextFactory + ?Sized> PersistenceContextFactory for &T {
    fn open_context(&self) -> DbResult<Connection> {
        (**self).open_context()
    }
}

/// Where the account store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLocation {
    /// Throwaway database file, deleted with the factory.
    Temporary,
    File(PathBuf),
}

/// Store configuration consumed by `SqliteContextFactory::from_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// How long a unit-of-work waits on a locked database file.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn temporary() -> Self {
        Self {
            location: StoreLocation::Temporary,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

#[derive(Debug)]
enum ContextTarget {
    File(PathBuf),
    Temporary {
        path: PathBuf,
        // Removes the database file when the factory is dropped.
        _dir: TempDir,
    },
}

/// SQLite-backed persistence context factory.
#[derive(Debug)]
pub struct SqliteContextFactory {
    target: ContextTarget,
    busy_timeout: Duration,
}

impl SqliteContextFactory {
    /// Builds a factory and migrates the configured store.
    pub fn from_config(config: &StoreConfig) -> DbResult<Self> {
        let target = match &config.location {
            StoreLocation::Temporary => {
                let dir = tempfile::Builder::new()
                    .prefix("account-dao-")
                    .tempdir()
                    .map_err(DbError::Io)?;
                let path = dir.path().join(TEMPORARY_DB_FILE_NAME);
                drop(open_db(&path)?);
                ContextTarget::Temporary { path, _dir: dir }
            }
            StoreLocation::File(path) => {
                // Bootstrap connection only runs migrations.
                drop(open_db(path)?);
                ContextTarget::File(path.clone())
            }
        };

        info!(
            "event=context_factory_init module=context status=ok mode={} busy_timeout_ms={}",
            target.mode(),
            config.busy_timeout_ms
        );

        Ok(Self {
            target,
            busy_timeout: config.busy_timeout(),
        })
    }

    /// Factory over a fresh throwaway store with default settings.
    pub fn temporary() -> DbResult<Self> {
        Self::from_config(&StoreConfig::temporary())
    }

    /// Factory over a database file with default settings.
    pub fn open_file(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::from_config(&StoreConfig::file(path.as_ref()))
    }
}

impl ContextTarget {
    fn mode(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Temporary { .. } => "temporary",
        }
    }
}

impl PersistenceContextFactory for SqliteContextFactory {
    fn open_context(&self) -> DbResult<Connection> {
        let path = match &self.target {
            ContextTarget::File(path) => path,
            ContextTarget::Temporary { path, .. } => path,
        };
        let conn = Connection::open(path)?;
        configure_connection(&conn, self.busy_timeout)?;
        Ok(conn)
    }
}
