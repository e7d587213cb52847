//! Migration registry holding the ordered list of migrations.

use super::ledger::LedgerMigration;
use super::types::{Migration, MigrationError};
use std::sync::Arc;

/// Registry of all known migrations.
///
/// The registry order is the only ordering migrations have: they are applied
/// front to back and reverted back to front. The ledger bootstrap migration
/// is always the first entry and cannot be supplied by callers.
pub struct MigrationRegistry {
    migrations: Vec<Arc<dyn Migration>>,
}

impl MigrationRegistry {
    /// Create a registry containing only the ledger bootstrap migration.
    pub fn new() -> Self {
        Self {
            migrations: vec![Arc::new(LedgerMigration)],
        }
    }

    /// Build a registry from migrations in application order.
    pub fn with_migrations<I>(migrations: I) -> Result<Self, MigrationError>
    where
        I: IntoIterator<Item = Arc<dyn Migration>>,
    {
        let mut registry = Self::new();
        for migration in migrations {
            registry.register(migration)?;
        }
        Ok(registry)
    }

    /// Append a migration to the end of the registry.
    pub fn register(&mut self, migration: Arc<dyn Migration>) -> Result<(), MigrationError> {
        let id = migration.id();

        if id.is_empty() {
            return Err(MigrationError::InvalidRegistry(
                "migration ID must not be empty".to_string(),
            ));
        }
        if migration.owns_ledger() {
            return Err(MigrationError::InvalidRegistry(format!(
                "migration '{id}' claims the ledger table, which only the bootstrap migration may own"
            )));
        }
        if self.contains(id) {
            return Err(MigrationError::InvalidRegistry(format!(
                "duplicate migration ID '{id}'"
            )));
        }

        self.migrations.push(migration);
        Ok(())
    }

    /// All migrations in order, bootstrap first.
    pub fn migrations(&self) -> &[Arc<dyn Migration>] {
        &self.migrations
    }

    /// Index of the migration with the given ID.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.migrations.iter().position(|m| m.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.migrations.iter().map(|m| m.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
