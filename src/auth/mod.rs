//! Persistence of users and their provider identities.
//!
//! Provides:
//! - `users` and `identities` tables, created on open
//! - Transactional identity resolution (find-or-create user, bind identity,
//!   refresh provider metadata)
//! - Read-side lookups used by the dashboard
//!
//! ## Design Decisions
//! - One SQLite connection behind a `parking_lot::Mutex`; resolution holds it
//!   for a single transaction.
//! - `(provider, identifier)` uniqueness is a schema constraint, not just a
//!   query convention.

pub mod store;

pub use store::{Identity, IdentityStore, NewUser, Resolution, User};
