//! # bulwark-runtime
//!
//! Resilient access to an edge-hosted SQL store.
//!
//! Edge SQL stores answer over the network, throttle under load, and offer
//! only best-effort batches. This crate wraps a store adapter implementing
//! [`Database`] with:
//! - A circuit breaker that sheds load while the store is failing
//! - Retries with capped exponential backoff for transient failures
//! - Per-attempt deadlines
//! - A bounded LRU pool of prepared statements
//! - Batch execution with per-statement results
//! - Optimistic version-locked updates
//! - Health probes and pool housekeeping
//!
//! Pure logic (error taxonomy, classification, validation, configuration)
//! lives in `bulwark-core` and is re-exported here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use bulwark_runtime::{BatchOperation, ResilientDatabase, ResilienceConfig};
//!
//! let db = ResilientDatabase::new(adapter, ResilienceConfig::default())?;
//!
//! let outcome = db
//!     .execute_batch(&[
//!         BatchOperation::new("INSERT INTO events (kind) VALUES (?)", vec!["login".into()]),
//!         BatchOperation::new("UPDATE users SET seen = ? WHERE id = ?", vec![now.into(), 7.into()]),
//!     ])
//!     .await;
//!
//! if !outcome.is_fully_successful() {
//!     // Statements that succeeded were kept
//! }
//!
//! let updated = db
//!     .safe_update_with_version("accounts", 42, &[("balance", 100.into())])
//!     .await?;
//! ```

pub mod client;
pub mod database;
mod executor;
pub mod monitor;
pub mod resilience;
pub mod statement_pool;

pub use client::{BuildError, HealthReport, ResilientDatabase, ResilientDatabaseBuilder};
pub use database::{BoundStatement, Database, PreparedStatement, StatementResult};
pub use monitor::HealthMonitor;
pub use resilience::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use statement_pool::{PoolStats, StatementPool};

pub use bulwark_core::{
    BatchOperation, BatchOutcome, BulwarkError, ExecutionMeta, HealthSample, ResilienceConfig,
    Row, StoreError, StoreErrorKind, Value, VersionedUpdate,
};
