//! Creates the table holding stored configurations.

use crate::migration::types::SqlMigration;

pub const ID: &str = "0010_configs_table";

/// Configurations keyed by `(type, name)` with JSON text data.
pub fn migration() -> SqlMigration {
    SqlMigration::new(ID, "creates table with config data")
        .forward(
            "CREATE TABLE configs (
                type TEXT NOT NULL,
                name TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (type, name)
            )",
        )
        .backward("DROP TABLE configs")
}
