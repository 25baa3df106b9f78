//! Configuration sections and their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Circuit breaker thresholds and timeouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Consecutive half-open successes needed to close the circuit
    pub success_threshold: u32,

    /// Time spent open before a recovery probe is allowed
    #[serde(with = "duration_human")]
    pub open_timeout: Duration,

    /// Time half-open may last without a decision before reopening
    #[serde(with = "duration_human")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Capped exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    #[serde(with = "duration_human")]
    pub base_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_human")]
    pub max_delay: Duration,

    /// Growth factor between consecutive delays
    pub backoff_multiplier: f64,

    /// Randomize delays to spread out concurrent retriers
    pub jitter: bool,
}

impl RetryPolicy {
    /// Preset for single statements.
    pub fn query() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    /// Preset for batches. Same shape as [`RetryPolicy::query`]; batches get
    /// their headroom from the longer batch deadline.
    pub fn batch() -> Self {
        Self::query()
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::query()
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter:
    /// `min(base_delay * backoff_multiplier^attempt, max_delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::query()
    }
}

/// Wall-clock budgets per kind of store call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlineConfig {
    /// Single statements
    #[serde(with = "duration_human")]
    pub query: Duration,

    /// Native batches
    #[serde(with = "duration_human")]
    pub batch: Duration,

    /// Health probes
    #[serde(with = "duration_human")]
    pub probe: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            query: Duration::from_secs(30),
            batch: Duration::from_secs(60),
            probe: Duration::from_secs(5),
        }
    }
}

/// Statement pool sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum cached prepared statements
    pub max_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_size: 100 }
    }
}

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pause between operations in sequential mode
    #[serde(with = "duration_human")]
    pub sequential_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sequential_delay: Duration::from_millis(10),
        }
    }
}

/// Health probe and memory watchdog settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Statement issued by the health probe
    pub probe_query: String,

    /// Probes slower than this are reported as degraded
    #[serde(with = "duration_human")]
    pub slow_probe_threshold: Duration,

    /// Pool occupancy (percent) above which the pool is cleared
    pub cleanup_threshold_percent: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            probe_query: "SELECT 1".to_string(),
            slow_probe_threshold: Duration::from_secs(1),
            cleanup_threshold_percent: 80.0,
        }
    }
}

/// Input validation bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Tables write paths may touch; empty allows any valid identifier
    pub allowed_tables: Vec<String>,

    /// Longest inclusive date range accepted, in days
    pub max_date_range_days: i64,

    /// Largest accepted page size
    pub max_limit: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_tables: Vec::new(),
            max_date_range_days: 366,
            max_limit: 1000,
        }
    }
}

/// Complete configuration of the resilient database layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub query_retry: RetryPolicy,
    pub batch_retry: RetryPolicy,
    pub deadlines: DeadlineConfig,
    pub pool: PoolConfig,
    pub batch: BatchConfig,
    pub monitor: MonitorConfig,
    pub validation: ValidationConfig,
}
