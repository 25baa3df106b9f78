//! Failure classification for store errors.
//!
//! This is the single place that knows the store's error vocabulary. A
//! structured [`StoreErrorKind`] from the adapter always wins; HTTP status
//! comes next; message matching is the last resort for errors the store only
//! reports as plain strings.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{StoreError, StoreErrorKind};

/// What the retry executor should do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Worth retrying with backoff
    Transient,
    /// The store is throttling; reject once and let the caller cool down
    RateLimited,
    /// Retrying cannot help
    Fatal,
}

lazy_static! {
    /// Schema, syntax and constraint signatures. These name user identifiers
    /// that may contain any of the words below, so they are matched first.
    static ref FATAL_PATTERN: Regex = Regex::new(
        r"(?i)no such (?:table|column|index|function)|syntax error|constraint failed|datatype mismatch"
    ).unwrap();

    /// Throttling signatures
    static ref RATE_LIMIT_PATTERN: Regex = Regex::new(
        r"(?i)rate[\s_-]?limit|too many requests|\b429\b|throttl"
    ).unwrap();

    /// Recoverable signatures: resets, lost connections, timeouts, overload
    static ref TRANSIENT_PATTERN: Regex = Regex::new(
        r"(?i)connection (?:was )?reset|econnreset|network connection lost|network error|storage (?:operation|object)[\w\s]*reset|object (?:was )?reset|overloaded|timed out|\btimeout\b|\btemporar(?:y|ily)\b|service unavailable|try again"
    ).unwrap();
}

/// Classify a store error.
pub fn classify(error: &StoreError) -> FailureClass {
    match error.kind {
        Some(StoreErrorKind::Transient) => return FailureClass::Transient,
        Some(StoreErrorKind::RateLimited) => return FailureClass::RateLimited,
        Some(StoreErrorKind::Constraint) | Some(StoreErrorKind::Syntax) => {
            return FailureClass::Fatal
        }
        Some(StoreErrorKind::Other) | None => {}
    }

    match error.status {
        Some(429) => return FailureClass::RateLimited,
        Some(408) | Some(502) | Some(503) | Some(504) => return FailureClass::Transient,
        _ => {}
    }

    classify_message(&error.message)
}

/// Classify an error from its message alone.
pub fn classify_message(message: &str) -> FailureClass {
    // Throttling responses often also say "try again"; check them before
    // the transient signatures.
    if FATAL_PATTERN.is_match(message) {
        FailureClass::Fatal
    } else if RATE_LIMIT_PATTERN.is_match(message) {
        FailureClass::RateLimited
    } else if TRANSIENT_PATTERN.is_match(message) {
        FailureClass::Transient
    } else {
        FailureClass::Fatal
    }
}
