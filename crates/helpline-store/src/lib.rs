//! # helpline-store
//!
//! Persistence for the ticket aggregate, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the ticket
//! lifecycle: create, read, message append (with the implicit status
//! transition) and explicit status updates.  The message log is append-only;
//! reads always return it re-sorted by timestamp ascending.

pub mod database;
pub mod migrations;
pub mod models;
pub mod tickets;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
