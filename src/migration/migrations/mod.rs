//! Application migrations.
//!
//! Add new migrations here as they are created, and register them at the
//! end of [`create_registry`](crate::migration::create_registry).

pub mod m0010_configs_table;
pub mod m0020_test_config_data;
