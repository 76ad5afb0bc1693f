//! The data-source abstraction the engine runs against.
//!
//! The engine does not own a driver. The embedder supplies a [`DataSource`]
//! whose connections run with auto-commit disabled, execute prepared
//! statements with positional parameters, report per-item affected-row
//! counts for batches, and commit explicitly. Dropping a connection without
//! committing rolls the open transaction back, so every exit path of a
//! public engine call (normal, error, panic) releases its claim.

use thiserror::Error;

use crate::error::BoxError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error surfaced by a driver implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SqlError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters and rows
// ---------------------------------------------------------------------------

/// A parameter bound into a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    BigInt(i64),
    Bytes(Vec<u8>),
    Null,
}

/// One result row, addressed positionally.
#[derive(Debug, Clone)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn get_i64(&self, index: usize) -> Result<i64, SqlError> {
        match self.value(index)? {
            Value::BigInt(v) => Ok(*v),
            Value::Int(v) => Ok(i64::from(*v)),
            other => Err(type_mismatch(index, "integer", other)),
        }
    }

    pub fn get_i32(&self, index: usize) -> Result<i32, SqlError> {
        match self.value(index)? {
            Value::Int(v) => Ok(*v),
            Value::BigInt(v) => i32::try_from(*v)
                .map_err(|_| SqlError::new(format!("column {index}: {v} overflows i32"))),
            other => Err(type_mismatch(index, "integer", other)),
        }
    }

    pub fn get_bytes(&self, index: usize) -> Result<Vec<u8>, SqlError> {
        match self.value(index)? {
            Value::Bytes(v) => Ok(v.clone()),
            other => Err(type_mismatch(index, "bytes", other)),
        }
    }

    fn value(&self, index: usize) -> Result<&Value, SqlError> {
        self.0
            .get(index)
            .ok_or_else(|| SqlError::new(format!("column {index} out of range")))
    }
}

fn type_mismatch(index: usize, wanted: &str, got: &Value) -> SqlError {
    SqlError::new(format!("column {index}: expected {wanted}, got {got:?}"))
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// A transactional database connection.
///
/// Implementations must disable auto-commit: nothing executed through a
/// connection becomes visible until [`commit`](Connection::commit), and a
/// connection dropped without committing rolls back.
pub trait Connection {
    /// Run a select and return all rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SqlError>;

    /// Run a single write statement. Returns the affected-row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, SqlError>;

    /// Run one prepared write once per binding set. Returns one
    /// affected-row count per set, in order.
    fn execute_batch(&mut self, sql: &str, bindings: &[Vec<Value>]) -> Result<Vec<u64>, SqlError>;

    /// Commit the open transaction.
    fn commit(&mut self) -> Result<(), SqlError>;
}

/// Yields transactional connections, typically from a shared pool.
pub trait DataSource {
    type Conn: Connection;

    fn connection(&self) -> Result<Self::Conn, SqlError>;
}
