//! Migration engine for the configuration store.
//!
//! This module applies an ordered list of schema and data migrations to a
//! [`Store`](crate::store::Store) exactly once each, and can revert them back
//! to any earlier point.
//!
//! # Overview
//!
//! - Migrations are registered in a `MigrationRegistry`, whose first entry is
//!   always the bootstrap migration that creates the ledger table
//! - The ledger records which migrations have run and when
//! - The `MigrationExecutor` applies pending migrations (`migrate`), reverts
//!   them (`rollback`) and checks for drift (`ensure`)
//! - Every run is a single transaction: a failing step leaves the store as it
//!   was before the run
//!
//! # Usage
//!
//! ```ignore
//! let registry = create_registry()?;
//! let executor = MigrationExecutor::new(registry);
//! executor.migrate(&store).await?;
//! executor.ensure(&store).await?;
//! ```

mod executor;
pub mod ledger;
pub mod migrations;
mod registry;
mod types;

pub use executor::MigrationExecutor;
pub use ledger::{LedgerMigration, LEDGER_MIGRATION_ID, LEDGER_TABLE};
pub use registry::MigrationRegistry;
pub use types::{
    LedgerEntry, Migration, MigrationDirection, MigrationError, MigrationReport,
    MigrationStatus, SqlMigration,
};

use migrations::m0010_configs_table;
use migrations::m0020_test_config_data::TestConfigDataMigration;
use std::sync::Arc;

/// Create the application migration registry.
///
/// Migrations are registered in application order. New migrations go at the
/// end; reordering or renaming an applied migration makes its ledger entry
/// unknown and blocks further runs.
pub fn create_registry() -> Result<Arc<MigrationRegistry>, MigrationError> {
    let mut registry = MigrationRegistry::new();

    registry.register(Arc::new(m0010_configs_table::migration()))?;
    registry.register(Arc::new(TestConfigDataMigration))?;

    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrations::m0020_test_config_data;

    #[test]
    fn test_create_registry() {
        let registry = create_registry().unwrap();

        assert_eq!(
            registry.ids(),
            vec![
                LEDGER_MIGRATION_ID,
                m0010_configs_table::ID,
                m0020_test_config_data::ID
            ]
        );
    }

    #[test]
    fn test_only_bootstrap_owns_ledger() {
        let registry = create_registry().unwrap();
        let owners: Vec<_> = registry
            .migrations()
            .iter()
            .filter(|m| m.owns_ledger())
            .map(|m| m.id())
            .collect();

        assert_eq!(owners, vec![LEDGER_MIGRATION_ID]);
    }
}
