//! Minimal store port used by the migration engine.
//!
//! The engine only needs three primitives from a database: checking whether
//! a table exists, executing a statement and running a query. All of them
//! happen inside a [`Transaction`] obtained from a [`Store`].

mod sqlite;
mod types;

pub use sqlite::{SqliteStore, SqliteTransaction};
pub use types::{Row, Store, StoreError, Transaction, Value};
