//! The store capability consumed by Bulwark.
//!
//! The store is call-per-request: there is no connection to hold, only
//! statements to prepare, bind and run, plus a native batch call. How an
//! implementation reaches the store (request context, global binding, HTTP)
//! is up to the adapter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

use bulwark_core::{ExecutionMeta, Row, StoreError, Value};

/// Per-statement result as reported by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    /// Whether this statement succeeded
    pub success: bool,

    /// Rows affected/read and timing
    #[serde(default)]
    pub meta: ExecutionMeta,

    /// Store message when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatementResult {
    /// A successful result.
    pub fn ok(meta: ExecutionMeta) -> Self {
        Self {
            success: true,
            meta,
            error: None,
        }
    }

    /// A failed result.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            meta: ExecutionMeta::default(),
            error: Some(error.into()),
        }
    }
}

/// Handle to an edge SQL store.
#[async_trait]
pub trait Database: Send + Sync {
    /// Prepare a statement. Preparation is local and cheap to call, but the
    /// handle is worth reusing.
    fn prepare(&self, query: &str) -> Result<Arc<dyn PreparedStatement>, StoreError>;

    /// Submit bound statements as one native batch.
    ///
    /// Statements run in order. There is no cross-statement rollback: each
    /// element of the returned vector reports its own success, in input order.
    async fn batch(
        &self,
        statements: Vec<Box<dyn BoundStatement>>,
    ) -> Result<Vec<StatementResult>, StoreError>;

    /// Name for logs.
    fn name(&self) -> &str {
        "database"
    }
}

/// A prepared statement handle. Handles hold no bind state; every call
/// binds its own values into a fresh [`BoundStatement`].
pub trait PreparedStatement: Send + Sync {
    /// The SQL this handle was prepared from.
    fn sql(&self) -> &str;

    /// Bind values in placeholder order.
    fn bind(&self, params: &[Value]) -> Box<dyn BoundStatement>;
}

/// A statement with its values bound, ready to run once.
#[async_trait]
pub trait BoundStatement: Send + Sync {
    /// Execute for effect.
    async fn run(&self) -> Result<StatementResult, StoreError>;

    /// Execute and return every row.
    async fn all(&self) -> Result<Vec<Row>, StoreError>;

    /// Execute and return the first row, if any.
    async fn first(&self) -> Result<Option<Row>, StoreError> {
        Ok(self.all().await?.into_iter().next())
    }

    /// Downcast hook for adapters that need their concrete type back in
    /// [`Database::batch`].
    fn as_any(&self) -> &dyn Any;
}
