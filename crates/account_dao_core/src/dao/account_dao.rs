//! Account DAO contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide save/find/update/remove over the `accounts` table.
//! - Keep transaction lifecycle out of callers' hands.
//!
//! # Invariants
//! - Each method opens, commits or rolls back, and closes its own unit-of-work.
//! - `update` never inserts; `remove` resolves the caller's copy to the
//!   managed record before deleting it.

use crate::context::transaction::{within_transaction, DaoResult, TransactionMode};
use crate::context::{PersistenceContextFactory, SqliteContextFactory};
use crate::model::account::{Account, AccountId};
use rusqlite::named_params;

/// CRUD contract for accounts.
pub trait AccountDao {
    /// Persists a new account and writes the assigned id into `account`.
    fn save(&self, account: &mut Account) -> DaoResult<AccountId>;
    fn find_by_id(&self, id: AccountId) -> DaoResult<Account>;
    fn find_by_email(&self, email: &str) -> DaoResult<Account>;
    /// Returns every stored account in ascending id order.
    fn find_all(&self) -> DaoResult<Vec<Account>>;
    /// Overwrites the stored record that shares `account.id`.
    fn update(&self, account: &Account) -> DaoResult<()>;
    fn remove(&self, account: &Account) -> DaoResult<()>;
}

/// Account DAO backed by an injected persistence context factory.
pub struct SqliteAccountDao<F: PersistenceContextFactory = SqliteContextFactory> {
    factory: F,
}

impl<F: PersistenceContextFactory> SqliteAccountDao<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<F: PersistenceContextFactory> AccountDao for SqliteAccountDao<F> {
    fn save(&self, account: &mut Account) -> DaoResult<AccountId> {
        within_transaction(&self.factory, TransactionMode::Write, "save", |uow| {
            uow.persist(account)
        })
    }

    fn find_by_id(&self, id: AccountId) -> DaoResult<Account> {
        within_transaction(&self.factory, TransactionMode::Read, "find_by_id", |uow| {
            let managed = uow.query_single("id = :id", named_params! { ":id": id })?;
            Ok(managed.into_detached())
        })
    }

    fn find_by_email(&self, email: &str) -> DaoResult<Account> {
        within_transaction(
            &self.factory,
            TransactionMode::Read,
            "find_by_email",
            |uow| {
                let managed =
                    uow.query_single("email = :email", named_params! { ":email": email })?;
                Ok(managed.into_detached())
            },
        )
    }

    fn find_all(&self) -> DaoResult<Vec<Account>> {
        within_transaction(&self.factory, TransactionMode::Read, "find_all", |uow| {
            let managed = uow.query_list(None, &[])?;
            Ok(managed.into_iter().map(|item| item.into_detached()).collect())
        })
    }

    fn update(&self, account: &Account) -> DaoResult<()> {
        within_transaction(&self.factory, TransactionMode::Write, "update", |uow| {
            uow.merge(account)?;
            Ok(())
        })
    }

    fn remove(&self, account: &Account) -> DaoResult<()> {
        within_transaction(&self.factory, TransactionMode::Write, "remove", |uow| {
            // Deletion requires the managed counterpart.
            let managed = uow.merge(account)?;
            uow.remove(managed)
        })
    }
}
