//! In-memory fakes for the store, capture source and trigger facility.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::backoff::Backoff;
use crate::capture::{CaptureSource, CapturedEvent};
use crate::error::Error;
use crate::logging::Icons;
use crate::pipeline::CapturePipeline;
use crate::service::{CaptureService, ServiceSettings};
use crate::store::{Endpoint, Store, StoreConnection, StoreConnector, StoreError, StoreResult};
use crate::trigger::{self, TriggerCallback, TriggerError, TriggerFacility};

pub const CAPTURE: &str = "ctrl+alt+c";
pub const STOP: &str = "ctrl+shift+q";

/// Endpoints for `hosts`, in order, with a one second connect timeout.
pub fn endpoints(hosts: &[&str]) -> Vec<Endpoint> {
    hosts
        .iter()
        .enumerate()
        .map(|(index, host)| Endpoint {
            label: format!("endpoint-{index}"),
            host: (*host).to_string(),
            port: 5432,
            database: "clipboard_tts".to_string(),
            user: "postgres".to_string(),
            password: "secret".to_string(),
            connect_timeout: Duration::from_secs(1),
        })
        .collect()
}

/// Scripted result of one insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Ok,
    StatementError,
    ConnectionError,
}

#[derive(Debug, Default)]
struct StoreState {
    reachable: HashSet<String>,
    refusals_left: HashMap<String, usize>,
    ping_fails: HashSet<String>,
    hanging: HashSet<String>,
    inserts: VecDeque<InsertOutcome>,
    next_id: i64,
    connect_log: Vec<String>,
    inserted: Vec<String>,
    open: usize,
    closed: usize,
}

/// A store whose endpoints are reachable or not by host name.
#[derive(Debug, Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, host: &str, reachable: bool) {
        let mut state = self.state.lock().unwrap();
        if reachable {
            state.reachable.insert(host.to_string());
        } else {
            state.reachable.remove(host);
        }
    }

    /// `host` refuses connections until the `attempt`-th one.
    pub fn reachable_after(&self, host: &str, attempt: usize) {
        let mut state = self.state.lock().unwrap();
        state.reachable.insert(host.to_string());
        state
            .refusals_left
            .insert(host.to_string(), attempt.saturating_sub(1));
    }

    pub fn fail_ping(&self, host: &str) {
        self.state.lock().unwrap().ping_fails.insert(host.to_string());
    }

    /// Connecting to `host` never completes.
    pub fn hang(&self, host: &str) {
        self.state.lock().unwrap().hanging.insert(host.to_string());
    }

    /// Queue insert outcomes; once drained, inserts succeed.
    pub fn script_inserts(&self, outcomes: impl IntoIterator<Item = InsertOutcome>) {
        self.state.lock().unwrap().inserts.extend(outcomes);
    }

    pub fn connect_log(&self) -> Vec<String> {
        self.state.lock().unwrap().connect_log.clone()
    }

    pub fn inserted(&self) -> Vec<String> {
        self.state.lock().unwrap().inserted.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().unwrap().open
    }

    pub fn closed_connections(&self) -> usize {
        self.state.lock().unwrap().closed
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn connect(&self, endpoint: &Endpoint) -> StoreResult<Box<dyn StoreConnection>> {
        let hanging = {
            let mut state = self.state.lock().unwrap();
            state.connect_log.push(endpoint.host.clone());
            state.hanging.contains(&endpoint.host)
        };
        if hanging {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        let refused = match state.refusals_left.get_mut(&endpoint.host) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        };
        if refused || !state.reachable.contains(&endpoint.host) {
            return Err(StoreError::Connect {
                endpoint: endpoint.to_string(),
                message: "connection refused".to_string(),
            });
        }

        state.open += 1;
        Ok(Box::new(FakeConnection {
            host: endpoint.host.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[derive(Debug)]
struct FakeConnection {
    host: String,
    state: Arc<Mutex<StoreState>>,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.open -= 1;
        }
    }
}

#[async_trait]
impl StoreConnection for FakeConnection {
    async fn ping(&mut self) -> StoreResult<()> {
        if self.state.lock().unwrap().ping_fails.contains(&self.host) {
            return Err(StoreError::Connection("probe failed".to_string()));
        }
        Ok(())
    }

    async fn insert(&mut self, event: &CapturedEvent) -> StoreResult<i64> {
        let mut state = self.state.lock().unwrap();
        match state.inserts.pop_front().unwrap_or(InsertOutcome::Ok) {
            InsertOutcome::Ok => {
                state.next_id += 1;
                state.inserted.push(event.text().to_string());
                Ok(state.next_id)
            }
            InsertOutcome::StatementError => {
                Err(StoreError::Statement("relation does not exist".to_string()))
            }
            InsertOutcome::ConnectionError => {
                Err(StoreError::Connection("server closed the connection".to_string()))
            }
        }
    }

    async fn server_version(&mut self) -> StoreResult<String> {
        Ok(format!("FakeSQL 1.0 on {}", self.host))
    }

    async fn close(self: Box<Self>) {
        self.state.lock().unwrap().closed += 1;
    }
}

/// A capture source that hands out queued reads, then reports no text.
#[derive(Debug, Clone, Default)]
pub struct FakeSource {
    reads: Arc<Mutex<VecDeque<Result<Option<String>, String>>>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: &str) {
        self.reads
            .lock()
            .unwrap()
            .push_back(Ok(Some(text.to_string())));
    }

    pub fn push_error(&self, message: &str) {
        self.reads
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }
}

impl CaptureSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn read_raw(&self) -> Result<Option<String>, Error> {
        match self.reads.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(Error::platform(message)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct TriggerState {
    registrations: Vec<(String, TriggerCallback)>,
    failing: bool,
    register_calls: usize,
}

/// A trigger facility driven by the test.
#[derive(Clone, Default)]
pub struct FakeTriggers {
    state: Arc<Mutex<TriggerState>>,
}

impl std::fmt::Debug for FakeTriggers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeTriggers")
            .field("registered", &self.registered())
            .finish_non_exhaustive()
    }
}

impl FakeTriggers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every callback registered for `combo`; returns how many ran.
    pub fn fire(&self, combo: &str) -> usize {
        let mut state = self.state.lock().unwrap();
        let mut fired = 0;
        for (registered, callback) in &mut state.registrations {
            if registered == combo {
                callback();
                fired += 1;
            }
        }
        fired
    }

    /// Forget all registrations without telling anyone.
    pub fn drop_registrations(&self) {
        self.state.lock().unwrap().registrations.clear();
    }

    /// Make every following registration fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn registered(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .registrations
            .iter()
            .map(|(combo, _)| combo.clone())
            .collect()
    }

    pub fn register_calls(&self) -> usize {
        self.state.lock().unwrap().register_calls
    }
}

impl TriggerFacility for FakeTriggers {
    fn register(&mut self, combo: &str, callback: TriggerCallback) -> trigger::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.register_calls += 1;
        if state.failing {
            return Err(TriggerError::Registration {
                combo: combo.to_string(),
                message: "hook refused".to_string(),
            });
        }
        state.registrations.push((combo.to_string(), callback));
        Ok(())
    }

    fn unregister_all(&mut self) {
        self.state.lock().unwrap().registrations.clear();
    }

    fn is_active(&self) -> bool {
        !self.state.lock().unwrap().registrations.is_empty()
    }
}

/// A service over the fakes with default retry, one second liveness and one
/// re-registration attempt.
pub fn build_service(
    store: &FakeStore,
    source: &FakeSource,
    triggers: &FakeTriggers,
    hosts: &[&str],
    shutdown: CancellationToken,
    restart_count: u32,
) -> CaptureService {
    build_service_with(
        store,
        Box::new(source.clone()),
        triggers,
        hosts,
        shutdown,
        restart_count,
    )
}

/// Like [`build_service`], over any capture source.
pub fn build_service_with(
    store: &FakeStore,
    source: Box<dyn CaptureSource>,
    triggers: &FakeTriggers,
    hosts: &[&str],
    shutdown: CancellationToken,
    restart_count: u32,
) -> CaptureService {
    let connector = StoreConnector::new(
        Arc::new(store.clone()),
        endpoints(hosts),
        5,
        Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 2.0),
        Icons::ascii(),
    );
    let settings = ServiceSettings {
        capture_combo: CAPTURE.to_string(),
        stop_combo: STOP.to_string(),
        liveness_interval: Duration::from_secs(1),
        reregister_attempts: 1,
    };
    CaptureService::new(
        settings,
        CapturePipeline::new(source, connector, Icons::ascii()),
        Box::new(triggers.clone()),
        shutdown,
        restart_count,
        Icons::ascii(),
    )
}
