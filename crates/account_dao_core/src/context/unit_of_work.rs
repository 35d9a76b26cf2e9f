//! Unit-of-work over one open SQLite transaction.
//!
//! # Responsibility
//! - Expose persist/merge/remove/query primitives for accounts.
//! - Track which account instances are managed by the current transaction.
//!
//! # Invariants
//! - A `UnitOfWork` never outlives its transaction; commit and rollback are
//!   driven only by `within_transaction`.
//! - `Managed` values can only be produced by, and handed back to, the
//!   unit-of-work they belong to.
//! - Write paths call `Account::validate()` before any SQL mutation.

use crate::db::DbError;
use crate::model::account::{Account, AccountId, AccountValidationError, Gender};
use rusqlite::types::ToSql;
use rusqlite::{named_params, params, Row, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::Deref;

const ACCOUNT_SELECT_SQL: &str = "SELECT
    id,
    email,
    first_name,
    last_name,
    gender,
    birthday,
    balance_cents,
    created_at
FROM accounts";

/// Named query parameters, usually built with `rusqlite::named_params!`.
pub type NamedParams<'p> = [(&'p str, &'p dyn ToSql)];

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Failure raised inside a unit-of-work.
///
/// Always reaches callers wrapped in `DaoError`.
#[derive(Debug)]
pub enum PersistenceError {
    Db(DbError),
    Validation(AccountValidationError),
    /// A single-result query matched zero rows.
    NoResult,
    /// A single-result query matched more than one row.
    NonUniqueResult { count: usize },
    /// Entity has no id, so there is no stored record to reconcile with.
    Transient,
    /// Entity already carries an id and cannot be persisted as new.
    DetachedEntity(AccountId),
    InvalidData(String),
}

impl PersistenceError {
    /// `true` when the store refused a write (CHECK, UNIQUE, trigger abort).
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            Self::Db(err) => err.sqlite_code() == Some(rusqlite::ErrorCode::ConstraintViolation),
            _ => false,
        }
    }
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::NoResult => write!(f, "no account matched the query"),
            Self::NonUniqueResult { count } => {
                write!(f, "expected one account, query matched {count}")
            }
            Self::Transient => write!(f, "account has not been saved yet"),
            Self::DetachedEntity(id) => {
                write!(f, "account {id} is already persisted; use update instead")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted account data: {message}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::NoResult => None,
            Self::NonUniqueResult { .. } => None,
            Self::Transient => None,
            Self::DetachedEntity(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for PersistenceError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<AccountValidationError> for PersistenceError {
    fn from(value: AccountValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Account instance known to be in sync with the open transaction.
///
/// Borrowed from the `UnitOfWork` that produced it; call `into_detached` to
/// keep the value after the transaction ends. The lifetime is invariant, so a
/// managed account cannot be passed to a different unit-of-work:
///
/// ```compile_fail
/// use account_dao_core::{within_transaction, SqliteContextFactory, TransactionMode};
///
/// let factory = SqliteContextFactory::temporary().unwrap();
/// let _ = within_transaction(&factory, TransactionMode::Write, "outer", |outer| {
///     if let Some(managed) = outer.find(1)? {
///         let _ = within_transaction(&factory, TransactionMode::Write, "inner", |inner| {
///             inner.remove(managed)
///         });
///     }
///     Ok(())
/// });
/// ```
///
/// The same call on the owning unit-of-work compiles:
///
/// ```
/// use account_dao_core::{within_transaction, SqliteContextFactory, TransactionMode};
///
/// let factory = SqliteContextFactory::temporary().unwrap();
/// let _ = within_transaction(&factory, TransactionMode::Write, "remove", |uow| {
///     if let Some(managed) = uow.find(1)? {
///         uow.remove(managed)?;
///     }
///     Ok(())
/// });
/// ```
#[derive(Debug)]
pub struct Managed<'uow> {
    account: Account,
    _uow: PhantomData<fn(&'uow ()) -> &'uow ()>,
}

impl Managed<'_> {
    /// Stored id; always present for managed accounts.
    pub fn id(&self) -> AccountId {
        self.account.id.unwrap_or_default()
    }

    pub fn into_detached(self) -> Account {
        self.account
    }
}

impl Deref for Managed<'_> {
    type Target = Account;

    fn deref(&self) -> &Account {
        &self.account
    }
}

/// One logical interaction with the account store, scoped to a transaction.
pub struct UnitOfWork<'conn> {
    pub(super) tx: Transaction<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub(super) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    /// Inserts a new account and writes the store-assigned id back into it.
    pub fn persist(&self, account: &mut Account) -> PersistenceResult<AccountId> {
        if let Some(id) = account.id {
            return Err(PersistenceError::DetachedEntity(id));
        }
        account.validate()?;

        self.tx.execute(
            "INSERT INTO accounts (
                email,
                first_name,
                last_name,
                gender,
                birthday,
                balance_cents,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                account.email.as_str(),
                account.first_name.as_str(),
                account.last_name.as_str(),
                account.gender.map(gender_to_db),
                account.birthday.as_deref(),
                account.balance_cents,
                account.created_at,
            ],
        )?;

        let id = self.tx.last_insert_rowid();
        account.id = Some(id);
        Ok(id)
    }

    /// Reconciles a detached account's fields into the stored record that
    /// shares its id and returns the managed copy.
    ///
    /// Strict: never inserts. A transient account fails with `Transient`, an
    /// unknown id with `NoResult`.
    pub fn merge(&self, account: &Account) -> PersistenceResult<Managed<'_>> {
        let id = account.id.ok_or(PersistenceError::Transient)?;
        account.validate()?;

        let changed = self.tx.execute(
            "UPDATE accounts
             SET
                email = ?1,
                first_name = ?2,
                last_name = ?3,
                gender = ?4,
                birthday = ?5,
                balance_cents = ?6,
                created_at = ?7
             WHERE id = ?8;",
            params![
                account.email.as_str(),
                account.first_name.as_str(),
                account.last_name.as_str(),
                account.gender.map(gender_to_db),
                account.birthday.as_deref(),
                account.balance_cents,
                account.created_at,
                id,
            ],
        )?;

        if changed == 0 {
            return Err(PersistenceError::NoResult);
        }

        Ok(self.manage(account.clone()))
    }

    /// Deletes an account managed by this unit-of-work.
    pub fn remove<'uow>(&'uow self, managed: Managed<'uow>) -> PersistenceResult<()> {
        let changed = self
            .tx
            .execute("DELETE FROM accounts WHERE id = ?1;", [managed.id()])?;
        if changed == 0 {
            return Err(PersistenceError::NoResult);
        }
        Ok(())
    }

    /// Loads one account by primary key.
    pub fn find(&self, id: AccountId) -> PersistenceResult<Option<Managed<'_>>> {
        match self.query_single("id = :id", named_params! { ":id": id }) {
            Ok(managed) => Ok(Some(managed)),
            Err(PersistenceError::NoResult) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Runs the account select with a `WHERE` template and expects exactly
    /// one row.
    pub fn query_single(
        &self,
        filter: &str,
        named: &NamedParams<'_>,
    ) -> PersistenceResult<Managed<'_>> {
        let mut stmt = self
            .tx
            .prepare(&format!("{ACCOUNT_SELECT_SQL} WHERE {filter} LIMIT 2;"))?;
        let mut rows = stmt.query(named)?;

        let first = match rows.next()? {
            Some(row) => parse_account_row(row)?,
            None => return Err(PersistenceError::NoResult),
        };
        if rows.next()?.is_some() {
            let count = self.count_matching(filter, named)?;
            return Err(PersistenceError::NonUniqueResult { count });
        }

        Ok(self.manage(first))
    }

    /// Runs the account select with an optional `WHERE` template. Rows come
    /// back in ascending id order.
    pub fn query_list(
        &self,
        filter: Option<&str>,
        named: &NamedParams<'_>,
    ) -> PersistenceResult<Vec<Managed<'_>>> {
        let sql = match filter {
            Some(filter) => format!("{ACCOUNT_SELECT_SQL} WHERE {filter} ORDER BY id ASC;"),
            None => format!("{ACCOUNT_SELECT_SQL} ORDER BY id ASC;"),
        };

        let mut stmt = self.tx.prepare(&sql)?;
        let mut rows = stmt.query(named)?;
        let mut accounts = Vec::new();

        while let Some(row) = rows.next()? {
            accounts.push(self.manage(parse_account_row(row)?));
        }

        Ok(accounts)
    }

    fn count_matching(&self, filter: &str, named: &NamedParams<'_>) -> PersistenceResult<usize> {
        let count: i64 = self.tx.query_row(
            &format!("SELECT COUNT(*) FROM accounts WHERE {filter};"),
            named,
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn manage(&self, account: Account) -> Managed<'_> {
        Managed {
            account,
            _uow: PhantomData,
        }
    }
}

fn parse_account_row(row: &Row<'_>) -> PersistenceResult<Account> {
    let gender = match row.get::<_, Option<String>>("gender")? {
        Some(value) => Some(parse_gender(&value).ok_or_else(|| {
            PersistenceError::InvalidData(format!("invalid gender `{value}` in accounts.gender"))
        })?),
        None => None,
    };

    Ok(Account {
        id: Some(row.get("id")?),
        email: row.get("email")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        gender,
        birthday: row.get("birthday")?,
        balance_cents: row.get("balance_cents")?,
        created_at: row.get("created_at")?,
    })
}

fn gender_to_db(gender: Gender) -> &'static str {
    match gender {
        Gender::Male => "male",
        Gender::Female => "female",
    }
}

fn parse_gender(value: &str) -> Option<Gender> {
    match value {
        "male" => Some(Gender::Male),
        "female" => Some(Gender::Female),
        _ => None,
    }
}
