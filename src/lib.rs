pub mod config;
pub mod migration;
pub mod store;

// Re-export commonly used types
pub use config::{get_config, ConfigError};
pub use migration::{
    create_registry, LedgerEntry, Migration, MigrationDirection, MigrationError,
    MigrationExecutor, MigrationRegistry, MigrationReport, MigrationStatus, SqlMigration,
};
pub use store::{Row, SqliteStore, Store, StoreError, Transaction, Value};
