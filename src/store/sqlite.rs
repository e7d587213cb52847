//! SQLite-backed store.
//!
//! SQLite is the only supported backend; Postgres deployments are not.

use super::types::{Row, Store, StoreError, Transaction, Value};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, Sqlite, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Store backed by a SQLite connection pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the database at `url`, creating the file if needed.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        info!("Opening store at {}", url);
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Ok(Self { pool })
    }

    /// Open a disposable in-memory database.
    ///
    /// Every SQLite connection gets its own in-memory database, so the pool
    /// is pinned to a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(Option::<Duration>::None)
            .max_lifetime(Option::<Duration>::None)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteTransaction { tx }))
    }
}

/// Transaction on a pooled SQLite connection.
///
/// The underlying sqlx transaction rolls back when dropped uncommitted.
pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, Sqlite>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn table_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(name.to_string())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count > 0)
    }

    async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<u64, StoreError> {
        let mut query = sqlx::query::<Sqlite>(statement);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Integer(v) => query.bind(*v),
                Value::Real(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.clone()),
                Value::Blob(v) => query.bind(v.clone()),
            };
        }

        let result = query.execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let mut query = sqlx::query::<Sqlite>(statement);
        for param in params {
            query = match param {
                Value::Null => query.bind(None::<String>),
                Value::Integer(v) => query.bind(*v),
                Value::Real(v) => query.bind(*v),
                Value::Text(v) => query.bind(v.clone()),
                Value::Blob(v) => query.bind(v.clone()),
            };
        }

        let rows = query.fetch_all(&mut *self.tx).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, StoreError> {
    let mut values = Vec::with_capacity(row.len());

    for index in 0..row.len() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            // Storage class of the value, not the declared column type
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get(index)?),
                "REAL" => Value::Real(row.try_get(index)?),
                "BLOB" => Value::Blob(row.try_get(index)?),
                _ => Value::Text(row.try_get(index)?),
            }
        };
        values.push(value);
    }

    Ok(Row::new(values))
}
