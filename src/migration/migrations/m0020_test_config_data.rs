//! Seeds the configs table with test data.

use crate::migration::types::Migration;
use crate::store::{StoreError, Transaction, Value};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::json;

pub const ID: &str = "0020_test_config_data";

/// A configuration inserted by this migration.
pub struct SeedConfig {
    pub config_type: &'static str,
    pub name: &'static str,
    pub data: serde_json::Value,
}

pub static SEED_CONFIGS: Lazy<Vec<SeedConfig>> = Lazy::new(|| {
    vec![
        SeedConfig {
            config_type: "database.postgres",
            name: "service.test",
            data: json!({
                "host": "localhost",
                "port": "5432",
                "database": "devdb",
                "user": "mr_robot",
                "password": "secret",
                "schema": "public"
            }),
        },
        SeedConfig {
            config_type: "rabbit.log",
            name: "service.test",
            data: json!({
                "host": "10.0.5.42",
                "port": "5671",
                "virtualhost": "/",
                "user": "guest",
                "password": "guest"
            }),
        },
    ]
});

/// Inserts [`SEED_CONFIGS`]; reverting deletes exactly those keys.
pub struct TestConfigDataMigration;

#[async_trait]
impl Migration for TestConfigDataMigration {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "fills db with the test data"
    }

    async fn up(&self, tx: &mut dyn Transaction) -> Result<(), StoreError> {
        for seed in SEED_CONFIGS.iter() {
            tx.execute(
                "INSERT INTO configs (type, name, data) VALUES (?1, ?2, ?3)",
                &[
                    Value::from(seed.config_type),
                    Value::from(seed.name),
                    Value::from(seed.data.to_string()),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn down(&self, tx: &mut dyn Transaction) -> Result<(), StoreError> {
        for seed in SEED_CONFIGS.iter() {
            tx.execute(
                "DELETE FROM configs WHERE type = ?1 AND name = ?2",
                &[Value::from(seed.config_type), Value::from(seed.name)],
            )
            .await?;
        }
        Ok(())
    }
}
