//! The per-cluster controller: connection retry, discovery, introspection.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cluster::external::{External, ManagedExternal};
use crate::cluster::retry::connection_retry_delay_ms;
use crate::settings::{Cluster, SourceListScan};
use crate::transport::{QueryExecutor, QueryTransport, TransportRegistry, TransportResult};

/// Lifecycle state of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Disconnected,
    Connecting,
    Connected,
    Destroyed,
}

/// Invoked whenever a managed external's schema actually changes.
pub type ExternalChangeFn = Arc<dyn Fn(String, External) + Send + Sync>;

/// Produces the display name for an auto-discovered source.
pub type ExternalNameFn = Arc<dyn Fn(&Cluster, &str) -> String + Send + Sync>;

struct TimerHandle {
    token: CancellationToken,
}

#[derive(Default)]
struct Timers {
    source_list: Option<TimerHandle>,
    reintrospect: Option<TimerHandle>,
}

/// Owns one cluster's connection, its managed externals, and two polling
/// timers.
///
/// The transport is built at construction without any network I/O; the first
/// probe happens in [`init`](ClusterController::init). All timers and the
/// retry loop hang off one cancellation token, so
/// [`destroy`](ClusterController::destroy) stops everything, including an
/// in-flight retry wait. In-flight introspections are left to finish and
/// their results are dropped by whoever consumes the change callback.
pub struct ClusterController {
    id: Uuid,
    self_ref: Weak<Self>,
    cluster: Mutex<Cluster>,
    transport: Arc<dyn QueryTransport>,
    state: Mutex<ControllerState>,
    version: Mutex<Option<String>>,
    managed: tokio::sync::Mutex<Vec<ManagedExternal>>,
    on_external_change: ExternalChangeFn,
    generate_external_name: ExternalNameFn,
    cancel: CancellationToken,
    timers: Mutex<Timers>,
}

impl ClusterController {
    /// Build the controller and its transport. No network I/O happens here.
    ///
    /// `initial_managed` carries the externals already known from the
    /// snapshot, so a controller replacing an earlier one starts with the
    /// schemas it had.
    pub fn new(
        cluster: Cluster,
        registry: &TransportRegistry,
        initial_managed: Vec<ManagedExternal>,
        on_external_change: ExternalChangeFn,
        generate_external_name: ExternalNameFn,
    ) -> TransportResult<Arc<Self>> {
        let transport = registry.build(&cluster)?;
        let id = Uuid::new_v4();
        tracing::debug!(
            cluster = %cluster.name,
            kind = %cluster.kind,
            controller = %id,
            externals = initial_managed.len(),
            "Cluster controller created"
        );
        Ok(Arc::new_cyclic(|self_ref| Self {
            id,
            self_ref: self_ref.clone(),
            cluster: Mutex::new(cluster),
            transport,
            state: Mutex::new(ControllerState::Disconnected),
            version: Mutex::new(None),
            managed: tokio::sync::Mutex::new(initial_managed),
            on_external_change,
            generate_external_name,
            cancel: CancellationToken::new(),
            timers: Mutex::new(Timers::default()),
        }))
    }

    pub fn cluster_name(&self) -> String {
        self.cluster_snapshot().name
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().expect("controller state mutex poisoned")
    }

    /// Version string reported by the backend on the last successful probe.
    pub fn version(&self) -> Option<String> {
        self.version
            .lock()
            .expect("controller version mutex poisoned")
            .clone()
    }

    /// A live query handle for one source on this cluster.
    pub fn executor(&self, source: &str) -> QueryExecutor {
        QueryExecutor::new(self.cluster_name(), source, Arc::clone(&self.transport))
    }

    /// Connect, introspect the pre-existing externals, then run one
    /// source-list scan. Completes once all three finish, which can be
    /// arbitrarily late for an unreachable cluster.
    pub async fn init(&self) {
        self.connect_with_retry().await;
        if self.state() != ControllerState::Connected {
            return;
        }
        self.introspect_sources().await;
        self.scan_source_list().await;
    }

    /// On-demand freshness check, gated by the cluster's on-load flags.
    pub async fn refresh(&self) {
        if self.state() != ControllerState::Connected {
            return;
        }
        let cluster = self.cluster_snapshot();
        if cluster.source_reintrospect_on_load {
            self.introspect_sources().await;
        }
        if cluster.source_list_refresh_on_load {
            self.scan_source_list().await;
        }
    }

    /// Adopt a new cluster value, re-arming a timer only if its interval or
    /// gating setting changed.
    pub fn update_cluster(&self, next: Cluster) {
        let previous = {
            let mut guard = self.cluster.lock().expect("controller cluster mutex poisoned");
            std::mem::replace(&mut *guard, next.clone())
        };
        tracing::info!(cluster = %next.name, controller = %self.id, "Cluster configuration updated");

        if self.state() != ControllerState::Connected {
            return;
        }
        if previous.source_list_refresh_interval_ms != next.source_list_refresh_interval_ms
            || previous.source_list_scan != next.source_list_scan
        {
            self.arm_source_list_timer(&next);
        }
        if previous.source_reintrospect_interval_ms != next.source_reintrospect_interval_ms {
            self.arm_reintrospect_timer(&next);
        }
    }

    /// Stop the timers and interrupt an in-flight retry wait. Idempotent.
    /// Already-started network calls are left to finish.
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock().expect("controller state mutex poisoned");
            if *state == ControllerState::Destroyed {
                return;
            }
            *state = ControllerState::Destroyed;
        }
        self.cancel.cancel();
        let mut timers = self.timers.lock().expect("controller timers mutex poisoned");
        timers.source_list = None;
        timers.reintrospect = None;
        tracing::info!(cluster = %self.cluster_name(), controller = %self.id, "Cluster controller destroyed");
    }

    /// Look up a managed external's schema descriptor by display name.
    pub async fn get_external_by_name(&self, name: &str) -> Option<External> {
        self.managed
            .lock()
            .await
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.external.clone())
    }

    /// Current managed-external records, in registration order.
    pub async fn managed_externals(&self) -> Vec<ManagedExternal> {
        self.managed.lock().await.clone()
    }

    /// Ask the backend for its source names and register any not yet
    /// managed, matching on the source locator rather than the display
    /// name. New sources are introspected concurrently; existing ones are
    /// left untouched.
    pub async fn scan_source_list(&self) {
        let cluster = self.cluster_snapshot();
        if cluster.source_list_scan != SourceListScan::Auto {
            return;
        }

        let sources = match self.transport.list_sources().await {
            Ok(sources) => sources,
            Err(error) => {
                tracing::warn!(cluster = %cluster.name, error = %error, "Source list scan failed");
                return;
            }
        };

        let mut entered = Vec::new();
        {
            let mut managed = self.managed.lock().await;
            for source in sources {
                if managed.iter().any(|m| m.external.source == source) {
                    continue;
                }
                let name = (self.generate_external_name)(&cluster, &source);
                tracing::info!(
                    cluster = %cluster.name,
                    source = %source,
                    name = %name,
                    "Discovered new source"
                );
                managed.push(ManagedExternal::discovered(name.clone(), source));
                entered.push(name);
            }
        }

        join_all(entered.into_iter().map(|name| self.introspect_by_name(name))).await;
    }

    /// Re-introspect every managed external concurrently.
    pub async fn introspect_sources(&self) {
        let names: Vec<String> = self
            .managed
            .lock()
            .await
            .iter()
            .map(|m| m.name.clone())
            .collect();
        join_all(names.into_iter().map(|name| self.introspect_by_name(name))).await;
    }

    fn cluster_snapshot(&self) -> Cluster {
        self.cluster
            .lock()
            .expect("controller cluster mutex poisoned")
            .clone()
    }

    async fn connect_with_retry(&self) {
        {
            let mut state = self.state.lock().expect("controller state mutex poisoned");
            if *state == ControllerState::Destroyed {
                return;
            }
            *state = ControllerState::Connecting;
        }

        let cluster_name = self.cluster_name();
        let mut attempt: u64 = 0;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            attempt += 1;
            let started = Instant::now();
            match self.transport.get_version().await {
                Ok(version) => {
                    tracing::info!(
                        cluster = %cluster_name,
                        controller = %self.id,
                        version = %version,
                        attempt,
                        "Cluster connected"
                    );
                    *self.version.lock().expect("controller version mutex poisoned") =
                        Some(version);
                    {
                        let mut state =
                            self.state.lock().expect("controller state mutex poisoned");
                        if *state == ControllerState::Destroyed {
                            return;
                        }
                        *state = ControllerState::Connected;
                    }
                    self.arm_timers();
                    return;
                }
                Err(error) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    let delay_ms = connection_retry_delay_ms(elapsed_ms);
                    tracing::error!(
                        cluster = %cluster_name,
                        attempt,
                        error = %error,
                        retry_in_ms = delay_ms,
                        "Cluster connection failed"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = time::sleep(Duration::from_millis(delay_ms)) => {}
                    }
                }
            }
        }
    }

    fn arm_timers(&self) {
        let cluster = self.cluster_snapshot();
        self.arm_source_list_timer(&cluster);
        self.arm_reintrospect_timer(&cluster);
    }

    fn arm_source_list_timer(&self, cluster: &Cluster) {
        let mut timers = self.timers.lock().expect("controller timers mutex poisoned");
        if let Some(handle) = timers.source_list.take() {
            handle.token.cancel();
        }
        if cluster.source_list_scan != SourceListScan::Auto {
            return;
        }
        let interval_ms = cluster.source_list_refresh_interval_ms;
        if interval_ms == 0 {
            tracing::debug!(cluster = %cluster.name, "Source list refresh timer disabled");
            return;
        }

        let token = self.cancel.child_token();
        timers.source_list = Some(TimerHandle {
            token: token.clone(),
        });
        let weak = self.self_ref.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of a tokio interval completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(controller) = weak.upgrade() else { break };
                        controller.scan_source_list().await;
                    }
                }
            }
        });
    }

    fn arm_reintrospect_timer(&self, cluster: &Cluster) {
        let mut timers = self.timers.lock().expect("controller timers mutex poisoned");
        if let Some(handle) = timers.reintrospect.take() {
            handle.token.cancel();
        }
        let interval_ms = cluster.source_reintrospect_interval_ms;
        if interval_ms == 0 {
            tracing::debug!(cluster = %cluster.name, "Reintrospection timer disabled");
            return;
        }

        let token = self.cancel.child_token();
        timers.reintrospect = Some(TimerHandle {
            token: token.clone(),
        });
        let weak = self.self_ref.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(controller) = weak.upgrade() else { break };
                        // Historically this tick rescanned the source list
                        // instead of re-introspecting known sources; the
                        // cluster flag selects which behavior applies.
                        if controller.cluster_snapshot().reintrospect_rescans_source_list {
                            controller.scan_source_list().await;
                        } else {
                            controller.introspect_sources().await;
                        }
                    }
                }
            }
        });
    }

    async fn introspect_by_name(&self, name: String) {
        let (source, suppress) = {
            let managed = self.managed.lock().await;
            match managed.iter().find(|m| m.name == name) {
                Some(entry) => (entry.external.source.clone(), entry.suppress_introspection),
                None => return,
            }
        };
        if suppress {
            tracing::debug!(name = %name, "Introspection suppressed");
            return;
        }

        match self.transport.introspect(&source).await {
            Ok(attributes) => {
                let changed = {
                    let mut managed = self.managed.lock().await;
                    match managed.iter_mut().find(|m| m.name == name) {
                        Some(entry) if entry.external.attributes != attributes => {
                            entry.external.attributes = attributes;
                            Some(entry.external.clone())
                        }
                        _ => None,
                    }
                };
                if let Some(external) = changed {
                    tracing::debug!(
                        cluster = %self.cluster_name(),
                        name = %name,
                        attributes = external.attributes.len(),
                        "Schema changed"
                    );
                    (self.on_external_change)(name, external);
                }
            }
            Err(error) => {
                // keep the last known good schema
                tracing::warn!(
                    cluster = %self.cluster_name(),
                    name = %name,
                    source = %source,
                    error = %error,
                    "Introspection failed"
                );
            }
        }
    }
}

impl Drop for ClusterController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
