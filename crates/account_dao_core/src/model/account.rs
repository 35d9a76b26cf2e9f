//! Account domain model.
//!
//! # Responsibility
//! - Define the canonical account record and its validation rules.
//!
//! # Invariants
//! - `id` is assigned by the store on first save and never reused.
//! - `email` is a lookup key; uniqueness is expected but not enforced here.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Store-assigned account identifier (SQLite rowid).
pub type AccountId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Account record as stored in the `accounts` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `None` until the account has been saved.
    pub id: Option<AccountId>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<Gender>,
    /// ISO-8601 calendar date, stored as given.
    pub birthday: Option<String>,
    pub balance_cents: i64,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Validation failures for account write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountValidationError {
    BlankEmail,
    MalformedEmail(String),
    NonPositiveId(AccountId),
}

impl Display for AccountValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankEmail => write!(f, "account email must not be blank"),
            Self::MalformedEmail(_) => write!(f, "account email is malformed"),
            Self::NonPositiveId(id) => write!(f, "account id must be positive, got {id}"),
        }
    }
}

impl Error for AccountValidationError {}

impl Account {
    /// Creates an unsaved account stamped with the current time.
    pub fn new(
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            gender: None,
            birthday: None,
            balance_cents: 0,
            created_at: now_epoch_ms(),
        }
    }

    /// Returns `true` when this account has never been saved.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// Checks invariants required before any write reaches the store.
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        if let Some(id) = self.id {
            if id <= 0 {
                return Err(AccountValidationError::NonPositiveId(id));
            }
        }

        let email = self.email.trim();
        if email.is_empty() {
            return Err(AccountValidationError::BlankEmail);
        }

        let mut parts = email.split('@');
        let well_formed = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
            _ => false,
        };
        if !well_formed {
            return Err(AccountValidationError::MalformedEmail(self.email.clone()));
        }

        Ok(())
    }
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}
