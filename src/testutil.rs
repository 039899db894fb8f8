//! In-process fakes for the driver and cloud collaborator seams.
//!
//! Used by the unit and integration test suites; no test talks to a live
//! database or cloud API.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::cloud::{CloudError, CloudSqlInstance, CloudSqlInventory, IamTokenSource};
use crate::driver::{ConnectTarget, DriverConnection, DriverConnector, DriverError, Row, Value};

/// Build a row from `(column, value)` pairs.
pub fn row(cells: &[(&str, Value)]) -> Row {
    cells
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Serializes tests that mutate process-wide environment variables.
pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct FakeState {
    fail_connect: Option<String>,
    results: HashMap<String, Vec<Row>>,
    query_errors: HashMap<String, String>,
    query_delays: HashMap<String, std::time::Duration>,
    seen_dsns: Vec<String>,
    executed: Vec<String>,
    queries_run: Vec<String>,
    connects: usize,
    closes: usize,
}

/// A scriptable [`DriverConnector`]: stub result sets per SQL text, force
/// connect failures, and inspect every DSN and statement it saw.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose every `connect` fails with the given message.
    pub fn failing(message: &str) -> Self {
        let connector = Self::new();
        connector.state.lock().unwrap().fail_connect = Some(message.to_string());
        connector
    }

    /// Stub the rows returned for an exact SQL text. Unstubbed queries
    /// return zero rows.
    pub fn stub(&self, sql: &str, rows: Vec<Row>) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(sql.to_string(), rows);
    }

    /// Make an exact SQL text fail.
    pub fn stub_error(&self, sql: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .query_errors
            .insert(sql.to_string(), message.to_string());
    }

    /// Delay responses to an exact SQL text, for deadline tests.
    pub fn stub_delay(&self, sql: &str, delay: std::time::Duration) {
        self.state
            .lock()
            .unwrap()
            .query_delays
            .insert(sql.to_string(), delay);
    }

    pub fn seen_dsns(&self) -> Vec<String> {
        self.state.lock().unwrap().seen_dsns.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn queries_run(&self) -> Vec<String> {
        self.state.lock().unwrap().queries_run.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait::async_trait]
impl DriverConnector for FakeConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.seen_dsns.push(target.dsn.clone());
        state.connects += 1;
        if let Some(message) = &state.fail_connect {
            return Err(DriverError::Connect(message.clone()));
        }
        Ok(Box::new(FakeHandle {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeHandle {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait::async_trait]
impl DriverConnection for FakeHandle {
    async fn execute(&self, sql: &str) -> Result<(), DriverError> {
        self.state.lock().unwrap().executed.push(sql.to_string());
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, DriverError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.queries_run.push(sql.to_string());
            state.query_delays.get(sql).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().unwrap();
        if let Some(message) = state.query_errors.get(sql) {
            return Err(DriverError::Query(message.clone()));
        }
        Ok(state.results.get(sql).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().closes += 1;
    }
}

/// Token source handing out a scripted token sequence.
pub struct FakeTokenSource {
    tokens: Mutex<VecDeque<String>>,
    minted: AtomicUsize,
}

impl FakeTokenSource {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()),
            minted: AtomicUsize::new(0),
        }
    }

    /// How many tokens were minted so far.
    pub fn minted(&self) -> usize {
        self.minted.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl IamTokenSource for FakeTokenSource {
    async fn auth_token(
        &self,
        _endpoint: &str,
        _region: &str,
        _user: &str,
    ) -> Result<String, CloudError> {
        self.minted.fetch_add(1, Ordering::SeqCst);
        let mut tokens = self.tokens.lock().unwrap();
        match tokens.len() {
            0 => Err(CloudError::Api("token sequence exhausted".to_string())),
            1 => Ok(tokens[0].clone()),
            _ => Ok(tokens.pop_front().expect("non-empty")),
        }
    }
}

/// Inventory with a fixed instance list and per-instance database lists.
#[derive(Default)]
pub struct FakeInventory {
    pub instances: Vec<CloudSqlInstance>,
    pub databases: HashMap<String, Vec<String>>,
}

#[async_trait::async_trait]
impl CloudSqlInventory for FakeInventory {
    async fn list_instances(&self, _project: &str) -> Result<Vec<CloudSqlInstance>, CloudError> {
        Ok(self.instances.clone())
    }

    async fn list_databases(
        &self,
        _project: &str,
        instance: &str,
    ) -> Result<Vec<String>, CloudError> {
        Ok(self.databases.get(instance).cloned().unwrap_or_default())
    }
}
