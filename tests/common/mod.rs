//! Shared fakes and fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use sourcekeeper::cluster::default_external_name;
use sourcekeeper::coordinator::CoordinatorOptions;
use sourcekeeper::dataset::{Dataset, DatasetError, DatasetLoader};
use sourcekeeper::settings::{AppSettings, Attribute, Cluster, DataSource, SourceListScan};
use sourcekeeper::transport::{
    QueryTransport, TransportError, TransportKind, TransportRegistry, TransportResult,
};

/// Programmable in-memory transport: scripted connection failures, a
/// mutable source list, per-source schemas, and call journals.
pub struct FakeTransport {
    pub version: String,
    /// Remaining get_version calls that fail before one succeeds.
    pub fail_connects: AtomicU32,
    pub connect_attempts: AtomicU32,
    pub attempt_times: Mutex<Vec<Instant>>,
    pub sources: Mutex<Vec<String>>,
    pub schemas: Mutex<HashMap<String, Vec<Attribute>>>,
    /// Sources whose introspection always fails.
    pub failing_sources: Mutex<HashSet<String>>,
    pub max_times: Mutex<HashMap<String, DateTime<Utc>>>,
    pub list_calls: AtomicU32,
    pub introspect_calls: Mutex<Vec<String>>,
    /// When set, each list_sources call consumes one permit first.
    pub list_gate: Option<Arc<Semaphore>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            version: "26.0.0".to_string(),
            fail_connects: AtomicU32::new(0),
            connect_attempts: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
            schemas: Mutex::new(HashMap::new()),
            failing_sources: Mutex::new(HashSet::new()),
            max_times: Mutex::new(HashMap::new()),
            list_calls: AtomicU32::new(0),
            introspect_calls: Mutex::new(Vec::new()),
            list_gate: None,
        })
    }

    pub fn with_list_gate() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut transport = Self::new();
        Arc::get_mut(&mut transport).unwrap().list_gate = Some(Arc::clone(&gate));
        (transport, gate)
    }

    pub fn set_sources(&self, sources: &[&str]) {
        *self.sources.lock().unwrap() = sources.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_schema(&self, source: &str, attributes: Vec<Attribute>) {
        self.schemas
            .lock()
            .unwrap()
            .insert(source.to_string(), attributes);
    }

    pub fn fail_introspection(&self, source: &str) {
        self.failing_sources
            .lock()
            .unwrap()
            .insert(source.to_string());
    }

    pub fn set_max_time(&self, source: &str, time: DateTime<Utc>) {
        self.max_times
            .lock()
            .unwrap()
            .insert(source.to_string(), time);
    }

    pub fn introspections_of(&self, source: &str) -> usize {
        self.introspect_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == source)
            .count()
    }
}

#[async_trait]
impl QueryTransport for FakeTransport {
    async fn get_version(&self) -> TransportResult<String> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().unwrap().push(Instant::now());
        if self.fail_connects.load(Ordering::SeqCst) > 0 {
            self.fail_connects.fetch_sub(1, Ordering::SeqCst);
            return Err(TransportError::Connection("probe refused".to_string()));
        }
        Ok(self.version.clone())
    }

    async fn list_sources(&self) -> TransportResult<Vec<String>> {
        if let Some(gate) = &self.list_gate {
            gate.acquire().await.unwrap().forget();
        }
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sources.lock().unwrap().clone())
    }

    async fn introspect(&self, source: &str) -> TransportResult<Vec<Attribute>> {
        self.introspect_calls
            .lock()
            .unwrap()
            .push(source.to_string());
        if self.failing_sources.lock().unwrap().contains(source) {
            return Err(TransportError::Introspection {
                source: source.to_string(),
                reason: "schema endpoint 500".to_string(),
            });
        }
        Ok(self
            .schemas
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute(
        &self,
        _source: &str,
        _query: &serde_json::Value,
    ) -> TransportResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn max_time(&self, source: &str) -> TransportResult<DateTime<Utc>> {
        self.max_times
            .lock()
            .unwrap()
            .get(source)
            .copied()
            .ok_or_else(|| TransportError::Query(format!("no max time for '{}'", source)))
    }
}

/// Registry whose single druid factory hands out `transport` and counts
/// how many controllers were built.
pub fn registry_with(transport: Arc<FakeTransport>) -> (TransportRegistry, Arc<AtomicU32>) {
    let builds = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&builds);
    let mut registry = TransportRegistry::new();
    registry.register(TransportKind::Druid, move |_cluster| {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::clone(&transport) as Arc<dyn QueryTransport>
    });
    (registry, builds)
}

/// A druid cluster with auto scan and both timers disabled; tests arm what
/// they need.
pub fn quiet_cluster(name: &str) -> Cluster {
    let mut cluster = Cluster::new(name, TransportKind::Druid, "http://10.0.0.1:8082");
    cluster.source_list_scan = SourceListScan::Auto;
    cluster.source_list_refresh_interval_ms = 0;
    cluster.source_reintrospect_interval_ms = 0;
    cluster
}

pub fn settings_with(clusters: Vec<Cluster>, data_sources: Vec<DataSource>) -> AppSettings {
    AppSettings::new(clusters, data_sources)
}

/// Loader serving datasets from memory; URIs not present fail like a
/// missing file. An optional gate holds every load until a permit arrives.
pub struct MemoryLoader {
    pub datasets: Mutex<HashMap<String, Dataset>>,
    pub gate: Option<Arc<Semaphore>>,
}

impl MemoryLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            datasets: Mutex::new(HashMap::new()),
            gate: None,
        })
    }

    pub fn with_gate() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let mut loader = Self::new();
        Arc::get_mut(&mut loader).unwrap().gate = Some(Arc::clone(&gate));
        (loader, gate)
    }

    pub fn set(&self, uri: &str, rows: Dataset) {
        self.datasets.lock().unwrap().insert(uri.to_string(), rows);
    }
}

#[async_trait]
impl DatasetLoader for MemoryLoader {
    async fn load(&self, uri: &str) -> Result<Dataset, DatasetError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.datasets
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| DatasetError::Read {
                uri: uri.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such dataset"),
            })
    }
}

/// Coordinator options tuned for tests: short timeout, fast sweep.
pub fn test_options() -> CoordinatorOptions {
    CoordinatorOptions {
        initial_load_timeout: Duration::from_millis(250),
        sweep_interval: Duration::from_millis(100),
        external_name: Arc::new(default_external_name),
    }
}

/// Quiet subscriber for test debugging; raise with RUST_LOG when needed.
pub fn init_logging() {
    sourcekeeper::observability::logging::init("warn");
}

/// Poll `predicate` until it holds, yielding a little virtual time between
/// checks. Panics after 1000 rounds.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
