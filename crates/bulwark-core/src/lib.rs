//! # bulwark-core
//!
//! Deterministic building blocks for talking to an edge-hosted SQL store
//! that only offers single statements and best-effort batches.
//!
//! This crate holds everything that needs no I/O and no clock:
//! - The error taxonomy ([`BulwarkError`], [`StoreError`])
//! - Failure classification into transient, rate-limited and fatal
//! - Query normalization for statement pool keys
//! - Input validation for identifiers, dates and parameters
//! - SQL for optimistic version-locked updates
//! - The configuration model
//!
//! The async resilience stack lives in `bulwark-runtime`.
//!
//! ## Example
//!
//! ```rust
//! use bulwark_core::{classify, normalize_query, FailureClass, StoreError};
//!
//! let key = normalize_query("SELECT *\n  FROM users -- everyone");
//! assert_eq!(key, "SELECT * FROM users");
//!
//! let err = StoreError::new("Network connection lost.");
//! assert_eq!(classify(&err), FailureClass::Transient);
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod normalize;
pub mod types;
pub mod validate;
pub mod versioned;

// Re-export main types at crate root
pub use classify::{classify, classify_message, FailureClass};
pub use config::{
    BatchConfig, CircuitBreakerConfig, ConfigError, DeadlineConfig, MonitorConfig, PoolConfig,
    ResilienceConfig, RetryPolicy, ValidationConfig,
};
pub use error::{BulwarkError, StoreError, StoreErrorKind};
pub use normalize::{count_placeholders, normalize_query, Placeholders};
pub use types::{
    BatchOperation, BatchOutcome, ExecutionMeta, HealthSample, Row, Value, VersionedUpdate,
};
pub use validate::{validate_date, validate_identifier, InputValidator, ValidationError};
pub use versioned::{version_read, versioned_update, SqlStatement};
