//! Batch execution and optimistic version-locked updates.
//!
//! The store has no cross-statement transactions. A native batch runs its
//! statements in order but keeps whatever succeeded when a later statement
//! fails, so batch results always report per-statement outcomes. Updates that
//! must not be lost go through the version check instead.

use std::sync::Arc;

use bulwark_core::{
    version_read, versioned_update, BatchOperation, BatchOutcome, BulwarkError, Row, Value,
    VersionedUpdate,
};

use crate::client::ResilientDatabase;
use crate::database::{BoundStatement, PreparedStatement};

impl ResilientDatabase {
    /// Submit `operations` as one native batch.
    ///
    /// Operations that fail validation or preparation get their error in
    /// place and are not submitted. If the batch call itself fails after
    /// retries, every submitted slot carries that error.
    pub async fn execute_batch(&self, operations: &[BatchOperation]) -> BatchOutcome {
        let mut outcome = BatchOutcome::with_len(operations.len());
        if operations.is_empty() {
            return outcome;
        }

        let mut submitted: Vec<(usize, Arc<dyn PreparedStatement>, &[Value])> =
            Vec::with_capacity(operations.len());
        for (index, op) in operations.iter().enumerate() {
            match self.statement(&op.query, &op.params) {
                Ok(statement) => submitted.push((index, statement, &op.params)),
                Err(e) => {
                    tracing::debug!(index, error = %e, "Batch operation rejected before submission");
                    outcome.fail(index, e.to_string());
                }
            }
        }
        if submitted.is_empty() {
            return outcome;
        }

        let db = &self.db;
        let result = self
            .guarded(&self.config.batch_retry, self.config.deadlines.batch, || {
                let bound: Vec<Box<dyn BoundStatement>> = submitted
                    .iter()
                    .map(|(_, statement, params)| statement.bind(params))
                    .collect();
                async move { db.batch(bound).await.map_err(BulwarkError::from) }
            })
            .await;

        match result {
            Ok(results) => {
                for (position, (index, _, _)) in submitted.iter().enumerate() {
                    match results.get(position) {
                        Some(r) if r.success => outcome.succeed(*index, r.meta.clone()),
                        Some(r) => outcome.fail(
                            *index,
                            r.error
                                .clone()
                                .unwrap_or_else(|| "statement reported failure".to_string()),
                        ),
                        None => outcome.fail(*index, "store returned no result for statement"),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    statements = submitted.len(),
                    error = %e,
                    "Batch call failed"
                );
                let message = e.to_string();
                for (index, _, _) in &submitted {
                    outcome.fail(*index, message.clone());
                }
            }
        }

        if !outcome.is_fully_successful() {
            tracing::warn!(
                total = outcome.len(),
                failed = ?outcome.failed_indices(),
                "Batch completed with failures; succeeded statements were kept"
            );
        }
        outcome
    }

    /// Run `operations` one at a time with a fixed pause between them.
    ///
    /// Each operation is a full guarded call. Failures are recorded and the
    /// remaining operations still run.
    pub async fn execute_sequential(&self, operations: &[BatchOperation]) -> BatchOutcome {
        let mut outcome = BatchOutcome::with_len(operations.len());

        for (index, op) in operations.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch.sequential_delay).await;
            }
            match self.safe_execute(&op.query, &op.params).await {
                Ok(meta) => outcome.succeed(index, meta),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Sequential operation failed, continuing");
                    outcome.fail(index, e.to_string());
                }
            }
        }

        outcome
    }

    /// Apply `updates` to row `id` only if its version is still
    /// `expected_version`, bumping the version in the same statement.
    ///
    /// A lost race surfaces as [`BulwarkError::VersionConflict`] and is not
    /// retried.
    pub async fn update_if_version(
        &self,
        table: &str,
        id: impl Into<Value>,
        updates: &[(&str, Value)],
        expected_version: i64,
    ) -> Result<VersionedUpdate, BulwarkError> {
        let table = self.validator.validate_table(table)?;
        for (column, _) in updates {
            self.validator.validate_column(column)?;
        }
        let id = id.into();
        let statement = versioned_update(table, &id, updates, expected_version)?;

        let meta = self.safe_execute(&statement.sql, &statement.params).await?;
        if meta.rows_affected == 0 {
            tracing::warn!(
                table,
                id = %id,
                expected_version,
                "Version conflict: row changed since it was read"
            );
            return Err(BulwarkError::VersionConflict {
                table: table.to_string(),
                id: id.to_string(),
                expected_version,
            });
        }

        Ok(VersionedUpdate {
            rows_affected: meta.rows_affected,
            new_version: expected_version + 1,
        })
    }

    /// Read the current version of row `id`, then update it under that
    /// version.
    pub async fn safe_update_with_version(
        &self,
        table: &str,
        id: impl Into<Value>,
        updates: &[(&str, Value)],
    ) -> Result<VersionedUpdate, BulwarkError> {
        let table = self.validator.validate_table(table)?;
        let id = id.into();
        let read = version_read(table, &id)?;

        let row: Row = self
            .safe_query_first(&read.sql, &read.params)
            .await?
            .ok_or_else(|| BulwarkError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            })?;
        let current = row
            .get(bulwark_core::versioned::VERSION_COLUMN)
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| {
                BulwarkError::Decode(format!("{}.version is missing or not an integer", table))
            })?;

        self.update_if_version(table, id, updates, current).await
    }
}
