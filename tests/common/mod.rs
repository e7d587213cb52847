#![allow(dead_code)]

use configd::{Migration, SqlMigration, SqliteStore, Store, Value};
use std::sync::Arc;

/// Create a fresh in-memory store.
pub async fn create_test_store() -> SqliteStore {
    SqliteStore::in_memory()
        .await
        .expect("Should open in-memory store")
}

/// Migration creating a single-column table.
pub fn create_table(id: &str, table: &str) -> Arc<dyn Migration> {
    Arc::new(
        SqlMigration::new(id, format!("creates table {table}"))
            .forward(format!("CREATE TABLE {table} (data TEXT PRIMARY KEY)"))
            .backward(format!("DROP TABLE {table}")),
    )
}

/// Migration inserting one row into an existing table.
pub fn insert_row(id: &str, table: &str, value: &str) -> Arc<dyn Migration> {
    Arc::new(
        SqlMigration::new(id, format!("inserts {value} into {table}"))
            .forward(format!("INSERT INTO {table} (data) VALUES ('{value}')"))
            .backward(format!("DELETE FROM {table} WHERE data = '{value}'")),
    )
}

pub async fn table_exists(store: &dyn Store, table: &str) -> bool {
    let mut tx = store.begin().await.expect("Should begin");
    tx.table_exists(table).await.expect("Should check table")
}

pub async fn row_exists(store: &dyn Store, table: &str, value: &str) -> bool {
    let mut tx = store.begin().await.expect("Should begin");
    let rows = tx
        .query(
            &format!("SELECT data FROM {table} WHERE data = ?1"),
            &[Value::from(value)],
        )
        .await
        .expect("Should query");
    !rows.is_empty()
}

/// IDs recorded in the ledger, or an empty list if it does not exist.
pub async fn ledger_ids(store: &dyn Store) -> Vec<String> {
    let mut tx = store.begin().await.expect("Should begin");
    if !tx
        .table_exists(configd::migration::LEDGER_TABLE)
        .await
        .expect("Should check table")
    {
        return Vec::new();
    }

    let rows = tx
        .query(
            &format!(
                "SELECT id FROM {} ORDER BY id",
                configd::migration::LEDGER_TABLE
            ),
            &[],
        )
        .await
        .expect("Should query ledger");
    rows.iter()
        .map(|row| row.text(0).expect("Should read id").to_string())
        .collect()
}
