//! Lookup of stored configurations.
//!
//! Configurations live in the `configs` table created by the
//! `0010_configs_table` migration, keyed by `(type, name)`.

use crate::store::{Store, StoreError, Value};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Empty type or name")]
    EmptyKey,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Fetch the configuration data stored under `(config_type, name)`.
///
/// Returns `None` when no such configuration exists.
pub async fn get_config(
    store: &dyn Store,
    config_type: &str,
    name: &str,
) -> Result<Option<serde_json::Value>, ConfigError> {
    if config_type.is_empty() || name.is_empty() {
        return Err(ConfigError::EmptyKey);
    }

    let mut tx = store.begin().await?;
    let rows = tx
        .query(
            "SELECT data FROM configs WHERE type = ?1 AND name = ?2",
            &[Value::from(config_type), Value::from(name)],
        )
        .await;
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Failed to close read transaction");
    }

    let Some(row) = rows?.into_iter().next() else {
        return Ok(None);
    };

    let data = serde_json::from_str(row.text(0)?)?;
    Ok(Some(data))
}
