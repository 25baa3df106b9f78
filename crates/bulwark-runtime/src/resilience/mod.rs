//! Resilience patterns for bulwark-runtime.
//!
//! This module provides:
//! - Circuit breaker to shed load from a failing store
//! - Retry with capped exponential backoff
//! - Per-attempt deadlines
//!
//! They compose as `breaker(retry(deadline(call)))`: each attempt gets its own
//! deadline, and the breaker sees one outcome per call.

mod circuit_breaker;
mod deadline;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use deadline::with_deadline;
pub use retry::{backoff, retry};
