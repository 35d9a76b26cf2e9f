//! Data access objects.
//!
//! # Responsibility
//! - Map entity-level CRUD calls onto unit-of-work primitives.
//! - Run every call inside its own transaction.
//!
//! # Invariants
//! - DAO methods report failures only as `DaoError`.
//! - A failed call leaves no partial state in the store.

pub mod account_dao;
