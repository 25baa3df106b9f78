//! Core value and outcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A row as returned by the store: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A scalar bound to a statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Metadata the store reports for an executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMeta {
    /// Rows written
    pub rows_affected: u64,

    /// Rows scanned
    pub rows_read: u64,

    /// Rowid of the last insert, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_row_id: Option<i64>,

    /// Store-side execution time
    #[serde(default)]
    pub duration_ms: f64,
}

/// One statement of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    /// Query text with `?` placeholders
    pub query: String,

    /// Values in placeholder order
    #[serde(default)]
    pub params: Vec<Value>,
}

impl BatchOperation {
    /// Create a batch operation.
    pub fn new(query: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }
}

/// Per-statement outcome of a batch, in input order.
///
/// `results[i]` is set iff statement `i` succeeded, `errors[i]` iff it failed.
/// Partial success is an expected outcome; nothing was rolled back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<Option<ExecutionMeta>>,
    pub errors: Vec<Option<String>>,
}

impl BatchOutcome {
    /// An outcome with `len` empty slots.
    pub fn with_len(len: usize) -> Self {
        Self {
            results: vec![None; len],
            errors: vec![None; len],
        }
    }

    /// Mark slot `index` as succeeded.
    pub fn succeed(&mut self, index: usize, meta: ExecutionMeta) {
        self.results[index] = Some(meta);
        self.errors[index] = None;
    }

    /// Mark slot `index` as failed.
    pub fn fail(&mut self, index: usize, error: impl Into<String>) {
        self.results[index] = None;
        self.errors[index] = Some(error.into());
    }

    /// Number of statements in the batch.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Whether the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// True iff every statement succeeded.
    pub fn is_fully_successful(&self) -> bool {
        self.errors.iter().all(Option::is_none)
    }

    /// Number of statements that succeeded.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    /// Indices of failed statements.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.errors
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|_| i))
            .collect()
    }
}

/// Outcome of a successful optimistic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedUpdate {
    pub rows_affected: u64,
    pub new_version: i64,
}

/// Result of one health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub healthy: bool,
    pub latency_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HealthSample {
    /// A passing probe.
    pub fn healthy(latency_ms: f64) -> Self {
        Self {
            healthy: true,
            latency_ms,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed probe.
    pub fn unhealthy(latency_ms: f64, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}
