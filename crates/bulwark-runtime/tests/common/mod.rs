//! Shared utilities for integration testing: an in-memory fake store.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulwark_runtime::{
    BoundStatement, Database, ExecutionMeta, PreparedStatement, Row, StatementResult, StoreError,
    Value,
};

/// A failure injected into the next store call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Connection-level failure worth retrying
    Transient,
    /// HTTP 429 from the store
    RateLimited,
    /// Constraint violation
    Fatal,
    /// Never answers
    Hang,
}

impl Fault {
    fn error(&self) -> StoreError {
        match self {
            Fault::Transient | Fault::Hang => StoreError::transient("Network connection lost."),
            Fault::RateLimited => StoreError::new("Too many requests").status(429),
            Fault::Fatal => StoreError::constraint("UNIQUE constraint failed: users.email"),
        }
    }
}

type UpdateHook = Box<dyn FnMut(&mut HashMap<String, i64>) + Send>;

#[derive(Default)]
struct State {
    script: VecDeque<Fault>,
    versions: HashMap<String, i64>,
    users: Vec<Row>,
    before_update: Option<UpdateHook>,
    executed: Vec<String>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    calls: AtomicUsize,
    batch_calls: AtomicUsize,
    prepares: AtomicUsize,
}

/// In-memory store understanding just enough SQL for the tests:
/// `SELECT 1`, `SELECT * FROM users`, version reads and versioned updates.
/// Any statement mentioning `no_such_table` fails; anything else affects
/// one row.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    shared: Arc<Shared>,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue faults; each store call consumes one.
    pub fn script(&self, faults: impl IntoIterator<Item = Fault>) {
        self.shared.state.lock().script.extend(faults);
    }

    /// Queue `fault` for the next `times` calls.
    pub fn fail_next(&self, fault: Fault, times: usize) {
        self.script(std::iter::repeat(fault).take(times));
    }

    pub fn clear_script(&self) {
        self.shared.state.lock().script.clear();
    }

    pub fn insert_versioned(&self, id: impl ToString, version: i64) {
        self.shared
            .state
            .lock()
            .versions
            .insert(id.to_string(), version);
    }

    pub fn version_of(&self, id: impl ToString) -> Option<i64> {
        self.shared.state.lock().versions.get(&id.to_string()).copied()
    }

    /// Run `hook` against the versions table right before the next
    /// versioned update is applied, like a concurrent writer would.
    pub fn before_next_update(
        &self,
        hook: impl FnMut(&mut HashMap<String, i64>) + Send + 'static,
    ) {
        self.shared.state.lock().before_update = Some(Box::new(hook));
    }

    pub fn add_user(&self, id: i64, name: &str) {
        let row = json!({ "id": id, "name": name });
        if let serde_json::Value::Object(map) = row {
            self.shared.state.lock().users.push(map);
        }
    }

    /// Statement executions through `run`/`all`/`first`.
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    /// Native batch submissions.
    pub fn batch_calls(&self) -> usize {
        self.shared.batch_calls.load(Ordering::SeqCst)
    }

    pub fn prepares(&self) -> usize {
        self.shared.prepares.load(Ordering::SeqCst)
    }

    /// SQL of every statement that reached the store, in order.
    pub fn executed(&self) -> Vec<String> {
        self.shared.state.lock().executed.clone()
    }

    pub fn into_arc(self) -> Arc<dyn Database> {
        Arc::new(self)
    }
}

impl Shared {
    /// Consume the next scripted fault, hanging if asked to.
    async fn inject(&self) -> Result<(), StoreError> {
        let fault = self.state.lock().script.pop_front();
        match fault {
            None => Ok(()),
            Some(Fault::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Fault::Hang.error())
            }
            Some(fault) => Err(fault.error()),
        }
    }

    /// Apply one statement to the in-memory state.
    fn apply(&self, sql: &str, params: &[Value]) -> Result<(StatementResult, Vec<Row>), StoreError> {
        let mut state = self.state.lock();
        state.executed.push(sql.to_string());

        if sql.contains("no_such_table") {
            return Err(StoreError::new("no such table: no_such_table"));
        }

        if sql == "SELECT 1" {
            let row = match json!({ "1": 1 }) {
                serde_json::Value::Object(map) => map,
                _ => Row::new(),
            };
            return Ok((read_result(1), vec![row]));
        }

        if sql.starts_with("SELECT * FROM users") {
            let rows = state.users.clone();
            return Ok((read_result(rows.len() as u64), rows));
        }

        if sql.starts_with("SELECT version FROM") {
            let id = params.first().map(|v| v.to_string()).unwrap_or_default();
            let rows: Vec<Row> = state
                .versions
                .get(&id)
                .map(|v| match json!({ "version": v }) {
                    serde_json::Value::Object(map) => map,
                    _ => Row::new(),
                })
                .into_iter()
                .collect();
            return Ok((read_result(rows.len() as u64), rows));
        }

        if sql.starts_with("UPDATE") && sql.contains("version = version + 1") {
            if let Some(mut hook) = state.before_update.take() {
                hook(&mut state.versions);
            }
            let n = params.len();
            let id = params[n - 2].to_string();
            let expected = match params[n - 1] {
                Value::Integer(v) => v,
                _ => return Err(StoreError::new("datatype mismatch")),
            };
            let rows_affected = match state.versions.get_mut(&id) {
                Some(current) if *current == expected => {
                    *current += 1;
                    1
                }
                _ => 0,
            };
            return Ok((write_result(rows_affected), Vec::new()));
        }

        Ok((write_result(1), Vec::new()))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<(StatementResult, Vec<Row>), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inject().await?;
        self.apply(sql, params)
    }
}

fn read_result(rows_read: u64) -> StatementResult {
    StatementResult::ok(ExecutionMeta {
        rows_read,
        ..ExecutionMeta::default()
    })
}

fn write_result(rows_affected: u64) -> StatementResult {
    StatementResult::ok(ExecutionMeta {
        rows_affected,
        ..ExecutionMeta::default()
    })
}

struct FakeStatement {
    shared: Arc<Shared>,
    sql: String,
}

impl PreparedStatement for FakeStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&self, params: &[Value]) -> Box<dyn BoundStatement> {
        Box::new(FakeBound {
            shared: self.shared.clone(),
            sql: self.sql.clone(),
            params: params.to_vec(),
        })
    }
}

struct FakeBound {
    shared: Arc<Shared>,
    sql: String,
    params: Vec<Value>,
}

#[async_trait]
impl BoundStatement for FakeBound {
    async fn run(&self) -> Result<StatementResult, StoreError> {
        let (result, _) = self.shared.execute(&self.sql, &self.params).await?;
        Ok(result)
    }

    async fn all(&self) -> Result<Vec<Row>, StoreError> {
        let (_, rows) = self.shared.execute(&self.sql, &self.params).await?;
        Ok(rows)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl Database for FakeDatabase {
    fn prepare(&self, query: &str) -> Result<Arc<dyn PreparedStatement>, StoreError> {
        self.shared.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeStatement {
            shared: self.shared.clone(),
            sql: query.to_string(),
        }))
    }

    async fn batch(
        &self,
        statements: Vec<Box<dyn BoundStatement>>,
    ) -> Result<Vec<StatementResult>, StoreError> {
        self.shared.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.inject().await?;

        let mut results = Vec::with_capacity(statements.len());
        for statement in &statements {
            let bound = statement
                .as_any()
                .downcast_ref::<FakeBound>()
                .ok_or_else(|| StoreError::new("foreign statement in batch"))?;
            let result = match self.shared.apply(&bound.sql, &bound.params) {
                Ok((result, _)) => result,
                Err(e) => StatementResult::failed(e.message),
            };
            results.push(result);
        }
        Ok(results)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
