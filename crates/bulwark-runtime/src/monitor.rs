//! Health probing and statement pool housekeeping.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use bulwark_core::{BulwarkError, HealthSample, MonitorConfig};

use crate::database::Database;
use crate::resilience::with_deadline;
use crate::statement_pool::{PoolStats, StatementPool};

/// Probes the store and keeps the statement pool in check.
///
/// The probe goes straight to the store under a deadline. It skips the
/// circuit breaker and the retry executor, so it can observe recovery while
/// the circuit is open and never changes breaker state.
pub struct HealthMonitor {
    db: Arc<dyn Database>,
    pool: Arc<StatementPool>,
    config: MonitorConfig,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        db: Arc<dyn Database>,
        pool: Arc<StatementPool>,
        config: MonitorConfig,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            db,
            pool,
            config,
            probe_timeout,
        }
    }

    /// Run the probe query once.
    pub async fn check_health(&self) -> HealthSample {
        let started = Instant::now();
        let result = self.probe().await;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(()) => {
                if started.elapsed() > self.config.slow_probe_threshold {
                    tracing::warn!(
                        latency_ms,
                        threshold = ?self.config.slow_probe_threshold,
                        "Store is degraded: slow health probe"
                    );
                }
                HealthSample::healthy(latency_ms)
            }
            Err(e) => {
                tracing::warn!(latency_ms, error = %e, "Store health probe failed");
                HealthSample::unhealthy(latency_ms, e.to_string())
            }
        }
    }

    /// Probe and log the outcome. Meant for an external scheduler.
    pub async fn periodic_health_check(&self) {
        let sample = self.check_health().await;
        if sample.healthy {
            tracing::info!(
                database = self.db.name(),
                latency_ms = sample.latency_ms,
                "Periodic health check passed"
            );
        } else {
            tracing::error!(
                database = self.db.name(),
                latency_ms = sample.latency_ms,
                error = sample.error.as_deref().unwrap_or_default(),
                "Periodic health check failed"
            );
        }
    }

    /// Clear the statement pool if its occupancy exceeds `threshold_percent`.
    ///
    /// Returns whether the pool was cleared.
    pub fn auto_cleanup_memory(&self, threshold_percent: f64) -> bool {
        let utilization = self.pool.utilization_percent();
        if utilization > threshold_percent {
            tracing::info!(
                utilization_percent = utilization,
                threshold_percent,
                "Statement pool over threshold, clearing"
            );
            self.pool.clear();
            true
        } else {
            false
        }
    }

    /// [`auto_cleanup_memory`](Self::auto_cleanup_memory) at the configured
    /// threshold.
    pub fn auto_cleanup(&self) -> bool {
        self.auto_cleanup_memory(self.config.cleanup_threshold_percent)
    }

    /// Statement pool counters.
    pub fn memory_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    async fn probe(&self) -> Result<(), BulwarkError> {
        let statement = self.db.prepare(&self.config.probe_query)?;
        let bound = statement.bind(&[]);
        with_deadline(self.probe_timeout, async move {
            bound.all().await.map(|_| ()).map_err(BulwarkError::from)
        })
        .await
    }
}
