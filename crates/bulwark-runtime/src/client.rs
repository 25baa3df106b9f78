//! The resilient database facade.
//!
//! Every store call made through [`ResilientDatabase`] runs as
//! `breaker(retry(deadline(call)))`:
//! - Input is validated before any SQL reaches the store
//! - Statements come from the shared LRU pool
//! - Each attempt is bounded by a deadline
//! - Transient failures are retried with backoff
//! - The circuit breaker sees one outcome per call

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use bulwark_core::{
    BulwarkError, ConfigError, ExecutionMeta, HealthSample, InputValidator, ResilienceConfig,
    RetryPolicy, Row, StoreError, Value,
};

use crate::database::{Database, PreparedStatement};
use crate::monitor::HealthMonitor;
use crate::resilience::{retry, with_deadline, CircuitBreaker, CircuitSnapshot};
use crate::statement_pool::{PoolStats, StatementPool};

/// Errors from building a [`ResilientDatabase`].
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Database not configured")]
    MissingDatabase,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Health probe, breaker and pool state in one view.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub sample: HealthSample,
    pub circuit: CircuitSnapshot,
    pub pool: PoolStats,
}

/// A store handle with validation, pooling, deadlines, retries and a
/// circuit breaker in front of every call.
///
/// # Example
///
/// ```rust,ignore
/// use bulwark_runtime::{ResilientDatabase, ResilienceConfig};
///
/// let db = ResilientDatabase::builder()
///     .database(adapter)
///     .config(ResilienceConfig::from_file("bulwark.yaml")?)
///     .build()?;
///
/// let users: Vec<User> = db
///     .safe_query("SELECT * FROM users WHERE plan = ?", &["pro".into()])
///     .await?;
/// ```
pub struct ResilientDatabase {
    pub(crate) db: Arc<dyn Database>,
    pub(crate) breaker: Arc<CircuitBreaker>,
    pub(crate) pool: Arc<StatementPool>,
    pub(crate) monitor: HealthMonitor,
    pub(crate) validator: InputValidator,
    pub(crate) config: ResilienceConfig,
}

impl ResilientDatabase {
    /// Wrap `db` with the given configuration.
    pub fn new(db: Arc<dyn Database>, config: ResilienceConfig) -> Result<Self, BuildError> {
        ResilientDatabaseBuilder::new()
            .database(db)
            .config(config)
            .build()
    }

    pub fn builder() -> ResilientDatabaseBuilder {
        ResilientDatabaseBuilder::new()
    }

    /// Run a read and deserialize every row into `T`.
    pub async fn safe_query<T: DeserializeOwned>(
        &self,
        query: &str,
        params: &[Value],
    ) -> Result<Vec<T>, BulwarkError> {
        let statement = self.statement(query, params)?;
        let rows = self
            .guarded(&self.config.query_retry, self.config.deadlines.query, || {
                let bound = statement.bind(params);
                async move { bound.all().await.map_err(BulwarkError::from) }
            })
            .await?;

        tracing::debug!(query = statement.sql(), rows = rows.len(), "Query succeeded");
        rows.into_iter().map(decode_row).collect()
    }

    /// Run a read and deserialize the first row, if any.
    pub async fn safe_query_first<T: DeserializeOwned>(
        &self,
        query: &str,
        params: &[Value],
    ) -> Result<Option<T>, BulwarkError> {
        let statement = self.statement(query, params)?;
        let row = self
            .guarded(&self.config.query_retry, self.config.deadlines.query, || {
                let bound = statement.bind(params);
                async move { bound.first().await.map_err(BulwarkError::from) }
            })
            .await?;

        row.map(decode_row).transpose()
    }

    /// Run a statement for effect.
    ///
    /// A statement the store reports as unsuccessful is classified like any
    /// other store error.
    pub async fn safe_execute(
        &self,
        query: &str,
        params: &[Value],
    ) -> Result<ExecutionMeta, BulwarkError> {
        let statement = self.statement(query, params)?;
        let meta = self
            .guarded(&self.config.query_retry, self.config.deadlines.query, || {
                let bound = statement.bind(params);
                async move {
                    match bound.run().await {
                        Ok(result) if result.success => Ok(result.meta),
                        Ok(result) => {
                            let message = result
                                .error
                                .unwrap_or_else(|| "statement reported failure".to_string());
                            Err(BulwarkError::from(StoreError::new(message)))
                        }
                        Err(e) => Err(BulwarkError::from(e)),
                    }
                }
            })
            .await?;

        tracing::debug!(
            query = statement.sql(),
            rows_affected = meta.rows_affected,
            "Statement executed"
        );
        Ok(meta)
    }

    /// Probe the store. Bypasses the breaker and the retry executor.
    pub async fn check_health(&self) -> HealthSample {
        self.monitor.check_health().await
    }

    /// Probe and log. Meant for an external scheduler.
    pub async fn periodic_health_check(&self) {
        self.monitor.periodic_health_check().await
    }

    /// Clear the statement pool if occupancy exceeds `threshold_percent`.
    pub fn auto_cleanup_memory(&self, threshold_percent: f64) -> bool {
        self.monitor.auto_cleanup_memory(threshold_percent)
    }

    /// Clear the statement pool if occupancy exceeds the configured
    /// `monitor.cleanup_threshold_percent`.
    pub fn auto_cleanup(&self) -> bool {
        self.monitor.auto_cleanup()
    }

    /// Statement pool counters.
    pub fn memory_stats(&self) -> PoolStats {
        self.monitor.memory_stats()
    }

    /// Probe the store and report it together with breaker and pool state.
    pub async fn health_report(&self) -> HealthReport {
        HealthReport {
            sample: self.check_health().await,
            circuit: self.breaker.snapshot(),
            pool: self.memory_stats(),
        }
    }

    /// The circuit breaker guarding this store.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The statement pool.
    pub fn pool(&self) -> &Arc<StatementPool> {
        &self.pool
    }

    /// The input validator for this store's tables.
    pub fn validator(&self) -> &InputValidator {
        &self.validator
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// Validate parameters and fetch the pooled handle.
    pub(crate) fn statement(
        &self,
        query: &str,
        params: &[Value],
    ) -> Result<Arc<dyn PreparedStatement>, BulwarkError> {
        self.validator.validate_params(query, params)?;
        self.pool.get(self.db.as_ref(), query)
    }

    /// `breaker(retry(deadline(op())))`
    pub(crate) async fn guarded<F, Fut, T>(
        &self,
        policy: &RetryPolicy,
        deadline: Duration,
        mut op: F,
    ) -> Result<T, BulwarkError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BulwarkError>>,
    {
        self.breaker
            .execute(move || retry(policy, move || with_deadline(deadline, op())))
            .await
    }
}

fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T, BulwarkError> {
    serde_json::from_value(serde_json::Value::Object(row))
        .map_err(|e| BulwarkError::Decode(e.to_string()))
}

/// Builder for [`ResilientDatabase`].
pub struct ResilientDatabaseBuilder {
    database: Option<Arc<dyn Database>>,
    config: ResilienceConfig,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl ResilientDatabaseBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            database: None,
            config: ResilienceConfig::default(),
            circuit_breaker: None,
        }
    }

    /// Set the store adapter.
    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing breaker, e.g. between several handles to one store.
    /// Without one, a breaker is built from the configuration.
    pub fn circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.circuit_breaker = Some(breaker);
        self
    }

    /// Build the handle.
    pub fn build(self) -> Result<ResilientDatabase, BuildError> {
        let db = self.database.ok_or(BuildError::MissingDatabase)?;
        let config = self.config;
        config.validate()?;

        let breaker = self
            .circuit_breaker
            .unwrap_or_else(|| Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())));
        let pool = Arc::new(StatementPool::new(config.pool.clone()));
        let monitor = HealthMonitor::new(
            db.clone(),
            pool.clone(),
            config.monitor.clone(),
            config.deadlines.probe,
        );
        let validator = InputValidator::new(config.validation.clone());

        tracing::info!(
            database = db.name(),
            failure_threshold = breaker.config().failure_threshold,
            pool_size = pool.max_size(),
            "Resilient database ready"
        );

        Ok(ResilientDatabase {
            db,
            breaker,
            pool,
            monitor,
            validator,
            config,
        })
    }
}

impl Default for ResilientDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
