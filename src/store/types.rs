//! Types for the store port.

use async_trait::async_trait;
use thiserror::Error;

/// Error types for store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Decode error: {0}")]
    Decode(String),
}

/// A single column value passed to or read from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One result row, columns in statement order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Value::Null))
    }

    /// Read a text column.
    pub fn text(&self, index: usize) -> Result<&str, StoreError> {
        match self.values.get(index) {
            Some(Value::Text(value)) => Ok(value),
            Some(other) => Err(StoreError::Decode(format!(
                "column {index} is not text: {other:?}"
            ))),
            None => Err(StoreError::Decode(format!("column {index} is missing"))),
        }
    }

    /// Read an integer column.
    pub fn integer(&self, index: usize) -> Result<i64, StoreError> {
        match self.values.get(index) {
            Some(Value::Integer(value)) => Ok(*value),
            Some(other) => Err(StoreError::Decode(format!(
                "column {index} is not an integer: {other:?}"
            ))),
            None => Err(StoreError::Decode(format!("column {index} is missing"))),
        }
    }
}

/// An open unit of work against the store.
///
/// Everything executed through a transaction becomes visible to other
/// readers only after [`Transaction::commit`]. Dropping a transaction
/// without committing discards its changes.
#[async_trait]
pub trait Transaction: Send {
    /// Whether a table with the given name exists.
    async fn table_exists(&mut self, name: &str) -> Result<bool, StoreError>;

    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, statement: &str, params: &[Value]) -> Result<u64, StoreError>;

    /// Run a query and collect every row.
    async fn query(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// A persistent store that hands out transactions.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}
