//! Types for the migration system.

use crate::store::{StoreError, Transaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error types for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid registry: {0}")]
    InvalidRegistry(String),

    #[error("Unknown migration '{0}' was found in the ledger")]
    UnknownLedgerEntry(String),

    #[error("Unknown destination migration level '{0}'")]
    UnknownDestination(String),

    #[error("Failed to load performed migrations: {0}")]
    LedgerLoad(#[source] StoreError),

    #[error("Failed to {direction} migration '{id}': {source}")]
    OperationFailed {
        id: String,
        direction: MigrationDirection,
        #[source]
        source: StoreError,
    },

    #[error("Failed to update ledger for migration '{id}': {source}")]
    LedgerWrite {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to commit after {direction} complete, outcome unknown: {source}")]
    CommitFailed {
        direction: MigrationDirection,
        #[source]
        source: StoreError,
    },

    #[error("Migration '{0}' has not been performed")]
    NotPerformed(String),
}

/// Trait for a single migration step.
///
/// A migration is identified by a stable ID and carries a forward and a
/// backward operation. Both run inside the caller's transaction.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Non-empty ID, unique within a registry and stable across deployments.
    fn id(&self) -> &str;

    /// Human-readable description of what this migration does.
    fn description(&self) -> &str;

    /// Whether this migration creates and drops the ledger table itself.
    ///
    /// Reverting such a migration removes the storage its ledger row lived
    /// in, so the engine does not delete the row afterwards.
    fn owns_ledger(&self) -> bool {
        false
    }

    /// Apply the migration.
    async fn up(&self, tx: &mut dyn Transaction) -> Result<(), StoreError>;

    /// Revert the migration.
    async fn down(&self, tx: &mut dyn Transaction) -> Result<(), StoreError>;
}

/// Migration built from plain SQL statements.
///
/// ```ignore
/// let migration = SqlMigration::new("0030_tags", "creates tags table")
///     .forward("CREATE TABLE tags (name TEXT PRIMARY KEY)")
///     .backward("DROP TABLE tags");
/// ```
#[derive(Debug, Clone)]
pub struct SqlMigration {
    id: String,
    description: String,
    forward: Vec<String>,
    backward: Vec<String>,
}

impl SqlMigration {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            forward: Vec::new(),
            backward: Vec::new(),
        }
    }

    /// Append a forward statement.
    pub fn forward(mut self, statement: impl Into<String>) -> Self {
        self.forward.push(statement.into());
        self
    }

    /// Append a backward statement. Backward statements run in the order added.
    pub fn backward(mut self, statement: impl Into<String>) -> Self {
        self.backward.push(statement.into());
        self
    }
}

#[async_trait]
impl Migration for SqlMigration {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn up(&self, tx: &mut dyn Transaction) -> Result<(), StoreError> {
        for statement in &self.forward {
            tx.execute(statement, &[]).await?;
        }
        Ok(())
    }

    async fn down(&self, tx: &mut dyn Transaction) -> Result<(), StoreError> {
        for statement in &self.backward {
            tx.execute(statement, &[]).await?;
        }
        Ok(())
    }
}

/// Durable record of an applied migration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub description: String,
    pub performed_at: DateTime<Utc>,
}

/// Applied state of one registry entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub id: String,
    pub description: String,
    /// Set only for migrations present in the ledger.
    pub performed_at: Option<DateTime<Utc>>,
}

/// Result of a successful migrate or rollback run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub direction: MigrationDirection,
    /// IDs of the migrations applied or reverted, in execution order.
    pub migrations_applied: Vec<String>,
}

/// Direction of migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Applying forward operations.
    Up,
    /// Reverting with backward operations.
    Down,
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationDirection::Up => write!(f, "perform"),
            MigrationDirection::Down => write!(f, "rollback"),
        }
    }
}
