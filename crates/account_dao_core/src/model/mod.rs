//! Domain model for the account store.
//!
//! # Responsibility
//! - Define the account record exchanged between callers and the DAO.
//!
//! # Invariants
//! - An account without an `id` has never been persisted.
//! - Caller-held accounts are detached snapshots; the store owns the
//!   authoritative record.

pub mod account;
