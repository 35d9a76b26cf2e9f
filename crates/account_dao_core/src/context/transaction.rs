//! Scoped transaction runner.
//!
//! # Responsibility
//! - Open a fresh unit-of-work, run one operation inside it, then commit or
//!   roll back.
//! - Collapse every failure into the single `DaoError` reported to callers.
//!
//! # Invariants
//! - The connection backing a unit-of-work is closed on every exit path,
//!   including unwinding (dropping an unfinished `Transaction` rolls back).
//! - Nothing is retried.

use super::unit_of_work::{PersistenceError, PersistenceResult, UnitOfWork};
use super::PersistenceContextFactory;
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type DaoResult<T> = Result<T, DaoError>;

/// The only error kind surfaced by the account DAO.
///
/// Both variants mean the operation had no effect on the store. Inspect
/// `cause()` to tell a missing record from a constraint or I/O failure.
#[derive(Debug)]
pub enum DaoError {
    /// The operation failed and its transaction was rolled back (or was never
    /// opened).
    RolledBack {
        operation: &'static str,
        cause: PersistenceError,
    },
    /// The operation failed and the rollback failed as well. The connection
    /// has been discarded, so SQLite still drops the pending changes.
    RollbackFailed {
        operation: &'static str,
        cause: PersistenceError,
        rollback: rusqlite::Error,
    },
}

impl DaoError {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::RolledBack { operation, .. } => operation,
            Self::RollbackFailed { operation, .. } => operation,
        }
    }

    /// The underlying failure that aborted the operation.
    pub fn cause(&self) -> &PersistenceError {
        match self {
            Self::RolledBack { cause, .. } => cause,
            Self::RollbackFailed { cause, .. } => cause,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.cause(), PersistenceError::NoResult)
    }

    pub fn is_non_unique(&self) -> bool {
        matches!(self.cause(), PersistenceError::NonUniqueResult { .. })
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::RolledBack { .. } => "rolled_back",
            Self::RollbackFailed { .. } => "rollback_failed",
        }
    }
}

impl Display for DaoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RolledBack { operation, cause } => write!(
                f,
                "account dao `{operation}` failed, transaction rolled back: {cause}"
            ),
            Self::RollbackFailed {
                operation,
                cause,
                rollback,
            } => write!(
                f,
                "account dao `{operation}` failed: {cause}; rollback also failed: {rollback}"
            ),
        }
    }
}

impl Error for DaoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause())
    }
}

/// Lock behavior requested when the transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Deferred: takes a shared lock on first read.
    Read,
    /// Immediate: takes the write lock up front.
    Write,
}

impl TransactionMode {
    fn behavior(self) -> TransactionBehavior {
        match self {
            Self::Read => TransactionBehavior::Deferred,
            Self::Write => TransactionBehavior::Immediate,
        }
    }
}

/// Runs `work` inside a fresh unit-of-work obtained from `factory`.
///
/// Commits when `work` returns `Ok`; rolls back and wraps the cause in
/// `DaoError` otherwise. The unit-of-work connection is closed before this
/// function returns.
///
/// # Side effects
/// - Emits `dao_op` logging events with operation name, status and duration.
pub fn within_transaction<F, T, W>(
    factory: &F,
    mode: TransactionMode,
    operation: &'static str,
    work: W,
) -> DaoResult<T>
where
    F: PersistenceContextFactory + ?Sized,
    W: FnOnce(&UnitOfWork<'_>) -> PersistenceResult<T>,
{
    let started_at = Instant::now();

    let outcome = match factory.open_context() {
        Ok(mut conn) => {
            let outcome = run_unit_of_work(&mut conn, mode, operation, work);
            close_context(conn, operation);
            outcome
        }
        Err(err) => Err(DaoError::RolledBack {
            operation,
            cause: err.into(),
        }),
    };

    match &outcome {
        Ok(_) => info!(
            "event=dao_op module=dao status=ok op={operation} duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=dao_op module=dao status=error op={operation} duration_ms={} error_code={} error={}",
            started_at.elapsed().as_millis(),
            err.error_code(),
            err.cause()
        ),
    }

    outcome
}

fn run_unit_of_work<T, W>(
    conn: &mut Connection,
    mode: TransactionMode,
    operation: &'static str,
    work: W,
) -> DaoResult<T>
where
    W: FnOnce(&UnitOfWork<'_>) -> PersistenceResult<T>,
{
    let tx = conn
        .transaction_with_behavior(mode.behavior())
        .map_err(|err| DaoError::RolledBack {
            operation,
            cause: err.into(),
        })?;
    let uow = UnitOfWork::new(tx);

    match work(&uow) {
        Ok(value) => match uow.tx.commit() {
            Ok(()) => Ok(value),
            Err(err) => Err(DaoError::RolledBack {
                operation,
                cause: err.into(),
            }),
        },
        Err(cause) => match uow.tx.rollback() {
            Ok(()) => Err(DaoError::RolledBack { operation, cause }),
            Err(rollback) => Err(DaoError::RollbackFailed {
                operation,
                cause,
                rollback,
            }),
        },
    }
}

fn close_context(conn: Connection, operation: &'static str) {
    if let Err((_conn, err)) = conn.close() {
        // The handle is dropped here; sqlite3_close_v2 finishes the close
        // once outstanding statements are finalized.
        warn!(
            "event=context_close module=dao status=error op={operation} error={}",
            err
        );
    }
}
