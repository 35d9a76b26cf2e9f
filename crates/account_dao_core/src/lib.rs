//! Transactional data access for account records.
//! Every DAO call runs in its own SQLite transaction and either commits fully
//! or leaves the store untouched.

pub mod context;
pub mod dao;
pub mod db;
pub mod logging;
pub mod model;

pub use context::transaction::{within_transaction, DaoError, DaoResult, TransactionMode};
pub use context::unit_of_work::{
    Managed, NamedParams, PersistenceError, PersistenceResult, UnitOfWork,
};
pub use context::{PersistenceContextFactory, SqliteContextFactory, StoreConfig, StoreLocation};
pub use dao::account_dao::{AccountDao, SqliteAccountDao};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::account::{Account, AccountId, AccountValidationError, Gender};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
