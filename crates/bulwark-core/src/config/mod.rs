//! Configuration for the resilience layer.
//!
//! Every section has working defaults, so an empty document is a valid
//! configuration. Durations are written human-readable (`"30s"`, `"250ms"`).

mod parser;
mod schema;

pub use parser::ConfigError;
pub use schema::{
    BatchConfig, CircuitBreakerConfig, DeadlineConfig, MonitorConfig, PoolConfig,
    ResilienceConfig, RetryPolicy, ValidationConfig,
};
