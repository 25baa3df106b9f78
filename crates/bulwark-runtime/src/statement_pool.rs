//! Bounded pool of prepared statement handles.
//!
//! Handles are keyed by the normalized SQL text, so two queries that differ
//! only in layout or trailing comments share one handle. When the pool is
//! full the least recently used handle is evicted.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bulwark_core::{normalize_query, BulwarkError, PoolConfig, ValidationError};

use crate::database::{Database, PreparedStatement};

/// Pool counters for health reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub utilization_percent: f64,
}

/// LRU pool of prepared statements.
pub struct StatementPool {
    statements: Mutex<LruCache<String, Arc<dyn PreparedStatement>>>,
    max_size: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl StatementPool {
    /// Create a pool holding at most `config.max_size` handles.
    pub fn new(config: PoolConfig) -> Self {
        let max_size = NonZeroUsize::new(config.max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            statements: Mutex::new(LruCache::new(max_size)),
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the handle for `query`, preparing and pooling it on a miss.
    ///
    /// The normalized text is what gets prepared. Lookup, eviction and
    /// insertion happen under one lock, so the pool never exceeds its bound.
    pub fn get(
        &self,
        db: &dyn Database,
        query: &str,
    ) -> Result<Arc<dyn PreparedStatement>, BulwarkError> {
        let key = normalize_query(query);
        if key.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }

        let mut statements = self.statements.lock();
        if let Some(statement) = statements.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query = %key, "Statement pool hit");
            return Ok(statement.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(query = %key, "Statement pool miss, preparing");
        let statement = db.prepare(&key)?;

        // The key was just missed, so anything handed back is an eviction.
        if let Some((evicted, _)) = statements.push(key, statement.clone()) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(query = %evicted, "Evicted prepared statement");
        }

        Ok(statement)
    }

    /// Whether a handle for `query` is pooled. Does not affect recency.
    pub fn contains(&self, query: &str) -> bool {
        self.statements.lock().contains(&normalize_query(query))
    }

    /// Drop every pooled handle.
    pub fn clear(&self) {
        let mut statements = self.statements.lock();
        let dropped = statements.len();
        statements.clear();
        tracing::info!(dropped, "Statement pool cleared");
    }

    pub fn len(&self) -> usize {
        self.statements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    /// Occupancy as a percentage of `max_size`.
    pub fn utilization_percent(&self) -> f64 {
        self.len() as f64 / self.max_size() as f64 * 100.0
    }

    pub fn stats(&self) -> PoolStats {
        let size = self.len();
        PoolStats {
            size,
            max_size: self.max_size(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            utilization_percent: size as f64 / self.max_size() as f64 * 100.0,
        }
    }
}

impl Default for StatementPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
