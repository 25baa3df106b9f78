//! Error taxonomy shared by every layer of Bulwark.
//!
//! Store adapters report [`StoreError`]; everything above the adapter
//! boundary speaks [`BulwarkError`].

use std::time::Duration;
use thiserror::Error;

use crate::classify::{classify, FailureClass};
use crate::validate::ValidationError;

/// Structured failure tag an adapter can attach when it knows what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Network blip, reset storage object, overloaded isolate
    Transient,
    /// The store is throttling this client
    RateLimited,
    /// Constraint violation (UNIQUE, NOT NULL, FOREIGN KEY, CHECK)
    Constraint,
    /// Malformed SQL, unknown table or column
    Syntax,
    /// The adapter could not tell; fall back to message matching
    Other,
}

/// An error reported by the underlying store binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    /// Message as reported by the store
    pub message: String,

    /// Structured tag, when the adapter can provide one
    pub kind: Option<StoreErrorKind>,

    /// HTTP status, for adapters that talk to the store over HTTP
    pub status: Option<u16>,
}

impl StoreError {
    /// Create an untagged store error from its message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            status: None,
        }
    }

    /// Create a store error with a structured kind.
    pub fn with_kind(message: impl Into<String>, kind: StoreErrorKind) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
            status: None,
        }
    }

    /// Attach an HTTP status code.
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Shorthand for a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::with_kind(message, StoreErrorKind::Transient)
    }

    /// Shorthand for a throttling failure.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::with_kind(message, StoreErrorKind::RateLimited)
    }

    /// Shorthand for a constraint violation.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::with_kind(message, StoreErrorKind::Constraint)
    }
}

/// Errors surfaced by the resilient database layer.
#[derive(Error, Debug, Clone)]
pub enum BulwarkError {
    #[error("Deadline exceeded after {timeout:?}")]
    DeadlineExceeded { timeout: Duration },

    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { message: String },

    #[error("Circuit breaker open after {failures} failures, retry after {retry_after:?}")]
    CircuitBreakerOpen { failures: u32, retry_after: Duration },

    /// A transient failure that outlived the retry policy.
    #[error("Store still failing after {attempts} attempts: {last}")]
    TransientStore {
        attempts: u32,
        #[source]
        last: Box<BulwarkError>,
    },

    #[error("Version conflict on {table} id {id}: expected version {expected_version}")]
    VersionConflict {
        table: String,
        id: String,
        expected_version: i64,
    },

    #[error("No row in {table} with id {id}")]
    NotFound { table: String, id: String },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Store failure that retrying will not fix. Once a call has passed
    /// through the retry executor, only fatal store errors remain here.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to decode row: {0}")]
    Decode(String),
}

impl BulwarkError {
    /// How the retry executor should treat this error.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            BulwarkError::Store(e) => classify(e),
            BulwarkError::DeadlineExceeded { .. } => FailureClass::Transient,
            BulwarkError::RateLimitExceeded { .. } => FailureClass::RateLimited,
            _ => FailureClass::Fatal,
        }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }

    /// Whether this outcome counts as a failure of the protected resource.
    ///
    /// Validation errors never reach the store, and a version conflict means
    /// the store answered correctly; neither says anything about store health.
    pub fn trips_breaker(&self) -> bool {
        !matches!(
            self,
            BulwarkError::Validation(_)
                | BulwarkError::VersionConflict { .. }
                | BulwarkError::NotFound { .. }
                | BulwarkError::Decode(_)
        )
    }

    /// Whether the call was shed by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, BulwarkError::CircuitBreakerOpen { .. })
    }

    /// Whether an optimistic update lost a race.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, BulwarkError::VersionConflict { .. })
    }

    /// Convert a throttling failure into the caller-facing signal.
    pub fn into_rate_limited(self) -> Self {
        match self {
            BulwarkError::Store(e) => BulwarkError::RateLimitExceeded { message: e.message },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_is_message() {
        let err = StoreError::new("D1_ERROR: no such table: users");
        assert_eq!(err.to_string(), "D1_ERROR: no such table: users");
    }

    #[test]
    fn test_deadline_is_transient() {
        let err = BulwarkError::DeadlineExceeded {
            timeout: Duration::from_secs(30),
        };
        assert!(err.is_retryable());
        assert!(err.trips_breaker());
    }

    #[test]
    fn test_validation_does_not_trip_breaker() {
        let err = BulwarkError::from(ValidationError::EmptyQuery);
        assert!(!err.trips_breaker());
        assert_eq!(err.failure_class(), FailureClass::Fatal);
    }

    #[test]
    fn test_into_rate_limited_keeps_message() {
        let err = BulwarkError::from(StoreError::new("Too Many Requests"));
        match err.into_rate_limited() {
            BulwarkError::RateLimitExceeded { message } => {
                assert_eq!(message, "Too Many Requests")
            }
            other => panic!("Expected RateLimitExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_transient_store_keeps_source() {
        let err = BulwarkError::TransientStore {
            attempts: 6,
            last: Box::new(StoreError::transient("Network connection lost").into()),
        };
        assert!(err.to_string().contains("6 attempts"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
