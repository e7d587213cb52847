//! Ledger of performed migrations.
//!
//! The ledger is a table with one row per applied migration. It is created
//! by [`LedgerMigration`], which every registry carries as its first entry.

use super::registry::MigrationRegistry;
use super::types::{LedgerEntry, Migration, MigrationError};
use crate::store::{Row, StoreError, Transaction, Value};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "migrations_ledger";

/// ID of the bootstrap migration.
pub const LEDGER_MIGRATION_ID: &str = "migrations_table";

/// Bootstrap migration that owns the ledger table.
pub struct LedgerMigration;

#[async_trait]
impl Migration for LedgerMigration {
    fn id(&self) -> &str {
        LEDGER_MIGRATION_ID
    }

    fn description(&self) -> &str {
        "creates table with migration data"
    }

    fn owns_ledger(&self) -> bool {
        true
    }

    async fn up(&self, tx: &mut dyn Transaction) -> Result<(), StoreError> {
        let statement = format!(
            "CREATE TABLE {LEDGER_TABLE} (
                id TEXT PRIMARY KEY,
                description TEXT,
                performed_at TEXT
            )"
        );
        tx.execute(&statement, &[]).await?;
        Ok(())
    }

    async fn down(&self, tx: &mut dyn Transaction) -> Result<(), StoreError> {
        tx.execute(&format!("DROP TABLE {LEDGER_TABLE}"), &[]).await?;
        Ok(())
    }
}

/// Load the IDs of performed migrations.
///
/// Returns an empty set when the ledger table does not exist yet. Fails if
/// the ledger holds an ID the registry does not know.
pub async fn load_performed(
    tx: &mut dyn Transaction,
    registry: &MigrationRegistry,
) -> Result<HashSet<String>, MigrationError> {
    let entries = load_known_entries(tx, registry).await?;
    Ok(entries.into_iter().map(|entry| entry.id).collect())
}

/// Load every ledger entry, failing on IDs the registry does not know.
pub async fn load_known_entries(
    tx: &mut dyn Transaction,
    registry: &MigrationRegistry,
) -> Result<Vec<LedgerEntry>, MigrationError> {
    let entries = load_entries(tx).await?;

    if let Some(unknown) = entries.iter().find(|entry| !registry.contains(&entry.id)) {
        return Err(MigrationError::UnknownLedgerEntry(unknown.id.clone()));
    }

    Ok(entries)
}

/// Load every ledger entry, oldest first.
pub async fn load_entries(tx: &mut dyn Transaction) -> Result<Vec<LedgerEntry>, MigrationError> {
    if !tx
        .table_exists(LEDGER_TABLE)
        .await
        .map_err(MigrationError::LedgerLoad)?
    {
        return Ok(Vec::new());
    }

    let statement = format!(
        "SELECT id, description, performed_at FROM {LEDGER_TABLE} ORDER BY performed_at, id"
    );
    let rows = tx
        .query(&statement, &[])
        .await
        .map_err(MigrationError::LedgerLoad)?;

    rows.iter()
        .map(decode_entry)
        .collect::<Result<Vec<_>, _>>()
        .map_err(MigrationError::LedgerLoad)
}

/// Insert or replace the ledger row for `entry`.
pub async fn record(tx: &mut dyn Transaction, entry: &LedgerEntry) -> Result<(), StoreError> {
    let statement = format!(
        "INSERT INTO {LEDGER_TABLE} (id, description, performed_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
            description = excluded.description,
            performed_at = excluded.performed_at"
    );
    tx.execute(
        &statement,
        &[
            Value::from(entry.id.as_str()),
            Value::from(entry.description.as_str()),
            Value::from(entry.performed_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
        ],
    )
    .await?;
    Ok(())
}

/// Delete the ledger row for `id`.
pub async fn remove(tx: &mut dyn Transaction, id: &str) -> Result<(), StoreError> {
    let statement = format!("DELETE FROM {LEDGER_TABLE} WHERE id = ?1");
    tx.execute(&statement, &[Value::from(id)]).await?;
    Ok(())
}

fn decode_entry(row: &Row) -> Result<LedgerEntry, StoreError> {
    let description = if row.is_null(1) {
        String::new()
    } else {
        row.text(1)?.to_string()
    };

    Ok(LedgerEntry {
        id: row.text(0)?.to_string(),
        description,
        performed_at: parse_datetime(row.text(2)?)?,
    })
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Decode(format!("invalid performed_at '{s}': {e}")))
}
