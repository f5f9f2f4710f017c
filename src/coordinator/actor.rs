//! The single-writer actor that owns the settings snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cluster::{
    ClusterController, External, ExternalChangeFn, ExternalNameFn, ManagedExternal,
};
use crate::coordinator::types::SettingsError;
use crate::dataset::{Dataset, DatasetChangeFn, DatasetLoader, FileDatasetManager, ManagedDataset};
use crate::reconcile::reconcile_named;
use crate::settings::{
    AppSettings, Attribute, AttributeKind, Cluster, DataSource, MaxTime, RefreshRule,
};
use crate::transport::TransportRegistry;

type Ack = oneshot::Sender<Result<(), SettingsError>>;

/// Everything the actor consumes, in one serialized stream.
pub(crate) enum Message {
    ChangeSettings {
        settings: AppSettings,
        done: Option<Ack>,
    },
    UpdateSettings {
        settings: AppSettings,
        reply: Ack,
    },
    AddCluster {
        cluster: Cluster,
        done: Ack,
    },
    AddDataSource {
        data_source: DataSource,
        done: Ack,
    },
    GetSettings {
        hint: Option<String>,
        reply: oneshot::Sender<AppSettings>,
    },
    /// Internal follow-up of `GetSettings`, enqueued after the refresh fan-out
    /// so the reply observes every merge the refresh produced.
    ReadSnapshot {
        reply: oneshot::Sender<AppSettings>,
    },
    ExternalChanged {
        cluster: String,
        name: String,
        external: External,
    },
    DatasetLoaded {
        name: String,
        dataset: Dataset,
    },
    MaxTimeResolved {
        name: String,
        time: DateTime<Utc>,
    },
    SweepTick,
    WorkFinished,
    Destroy {
        done: oneshot::Sender<()>,
    },
}

pub(crate) struct Actor {
    rx: mpsc::UnboundedReceiver<Message>,
    tx: mpsc::UnboundedSender<Message>,
    snapshot: AppSettings,
    snapshot_tx: watch::Sender<AppSettings>,
    ready_tx: watch::Sender<bool>,
    /// Spawned work (cluster inits, file manager inits, the initial load)
    /// that reads should wait for, bounded by the load timeout.
    outstanding: usize,
    controllers: Vec<Arc<ClusterController>>,
    file_managers: Vec<Arc<FileDatasetManager>>,
    registry: TransportRegistry,
    loader: Arc<dyn DatasetLoader>,
    external_name: ExternalNameFn,
    read_only: bool,
    sweep_interval: Duration,
    sweep_cancel: CancellationToken,
}

impl Actor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Message>,
        tx: mpsc::UnboundedSender<Message>,
        snapshot_tx: watch::Sender<AppSettings>,
        ready_tx: watch::Sender<bool>,
        outstanding: usize,
        registry: TransportRegistry,
        loader: Arc<dyn DatasetLoader>,
        external_name: ExternalNameFn,
        read_only: bool,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            rx,
            tx,
            snapshot: AppSettings::default(),
            snapshot_tx,
            ready_tx,
            outstanding,
            controllers: Vec::new(),
            file_managers: Vec::new(),
            registry,
            loader,
            external_name,
            read_only,
            sweep_interval,
            sweep_cancel: CancellationToken::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        self.spawn_sweep();
        while let Some(message) = self.rx.recv().await {
            if self.handle(message) {
                break;
            }
            let _ = self.ready_tx.send_replace(self.outstanding == 0);
        }
        self.sweep_cancel.cancel();
    }

    /// Returns true when the actor should stop.
    fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::ChangeSettings { settings, done } => {
                let result = self.change_settings(settings);
                if let Err(error) = &result {
                    tracing::error!(error = %error, "Settings change rejected");
                }
                if let Some(done) = done {
                    let _ = done.send(result);
                }
            }
            Message::UpdateSettings { settings, reply } => {
                let _ = reply.send(self.update_settings(settings));
            }
            Message::AddCluster { cluster, done } => {
                let next = self.snapshot.add_cluster(cluster);
                let _ = done.send(self.change_settings(next));
            }
            Message::AddDataSource { data_source, done } => {
                let next = self.snapshot.add_or_update_data_source(data_source);
                let _ = done.send(self.change_settings(next));
            }
            Message::GetSettings { hint, reply } => {
                if let Some(hint) = hint {
                    tracing::debug!(source = %hint, "Settings read with source hint");
                }
                let controllers: Vec<_> = self.controllers.iter().map(Arc::clone).collect();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    join_all(controllers.iter().map(|c| c.refresh())).await;
                    let _ = tx.send(Message::ReadSnapshot { reply });
                });
            }
            Message::ReadSnapshot { reply } => {
                let _ = reply.send(self.snapshot.clone());
            }
            Message::ExternalChanged {
                cluster,
                name,
                external,
            } => self.merge_external(cluster, name, external),
            Message::DatasetLoaded { name, dataset } => self.merge_dataset(name, dataset),
            Message::MaxTimeResolved { name, time } => self.merge_max_time(name, time),
            Message::SweepTick => self.sweep(),
            Message::WorkFinished => {
                self.outstanding = self.outstanding.saturating_sub(1);
            }
            Message::Destroy { done } => {
                self.shutdown();
                let _ = done.send(());
                return true;
            }
        }
        false
    }

    /// Reconcile the cluster and native-source lists against the previous
    /// snapshot, then adopt the new one.
    fn change_settings(&mut self, next: AppSettings) -> Result<(), SettingsError> {
        let previous = self.snapshot.clone();

        let mut clusters_entered: Vec<Cluster> = Vec::new();
        let mut clusters_updated: Vec<Cluster> = Vec::new();
        let mut clusters_exited: Vec<String> = Vec::new();
        reconcile_named(
            &previous.clusters,
            &next.clusters,
            |entered| clusters_entered.push(entered.clone()),
            |updated, _old| clusters_updated.push(updated.clone()),
            |exited| clusters_exited.push(exited.name.clone()),
        )?;

        let previous_native: Vec<DataSource> =
            previous.native_data_sources().into_iter().cloned().collect();
        let next_native: Vec<DataSource> =
            next.native_data_sources().into_iter().cloned().collect();
        let mut datasets_entered: Vec<DataSource> = Vec::new();
        let mut datasets_exited: Vec<String> = Vec::new();
        reconcile_named(
            &previous_native,
            &next_native,
            |entered| datasets_entered.push(entered.clone()),
            |_updated, _old| {},
            |exited| datasets_exited.push(exited.name.clone()),
        )?;

        for name in clusters_exited {
            if let Some(position) = self
                .controllers
                .iter()
                .position(|c| c.cluster_name() == name)
            {
                let controller = self.controllers.remove(position);
                controller.destroy();
            }
        }
        for cluster in clusters_updated {
            if let Some(controller) = self
                .controllers
                .iter()
                .find(|c| c.cluster_name() == cluster.name)
            {
                controller.update_cluster(cluster);
            }
        }
        for cluster in clusters_entered {
            self.create_controller(cluster, &next);
        }

        for name in datasets_exited {
            if let Some(position) = self.file_managers.iter().position(|m| m.manages(&name)) {
                let manager = self.file_managers.remove(position);
                manager.destroy();
            }
        }
        for data_source in datasets_entered {
            self.create_file_manager(&data_source);
        }

        self.adopt(next);
        Ok(())
    }

    fn create_controller(&mut self, cluster: Cluster, next: &AppSettings) {
        let initial: Vec<ManagedExternal> = next
            .data_sources_for_cluster(&cluster.name)
            .into_iter()
            .map(ManagedExternal::from_data_source)
            .collect();

        let cluster_name = cluster.name.clone();
        let tx = self.tx.clone();
        let on_change: ExternalChangeFn = Arc::new(move |name, external| {
            let _ = tx.send(Message::ExternalChanged {
                cluster: cluster_name.clone(),
                name,
                external,
            });
        });

        match ClusterController::new(
            cluster,
            &self.registry,
            initial,
            on_change,
            Arc::clone(&self.external_name),
        ) {
            Ok(controller) => {
                self.controllers.push(Arc::clone(&controller));
                self.outstanding += 1;
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    controller.init().await;
                    let _ = tx.send(Message::WorkFinished);
                });
            }
            Err(error) => {
                // other clusters are unaffected
                tracing::error!(error = %error, "Failed to build cluster controller");
            }
        }
    }

    fn create_file_manager(&mut self, data_source: &DataSource) {
        let tx = self.tx.clone();
        let on_change: DatasetChangeFn = Arc::new(move |name, dataset| {
            let _ = tx.send(Message::DatasetLoaded { name, dataset });
        });
        let manager = Arc::new(FileDatasetManager::new(
            vec![ManagedDataset::from_data_source(data_source)],
            Arc::clone(&self.loader),
            on_change,
        ));
        self.file_managers.push(Arc::clone(&manager));
        self.outstanding += 1;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            manager.init().await;
            let _ = tx.send(Message::WorkFinished);
        });
    }

    /// Re-bind cluster-backed sources to live executors and adopt the
    /// snapshot in memory. Durability of the new value is not guaranteed
    /// by this path.
    fn update_settings(&mut self, settings: AppSettings) -> Result<(), SettingsError> {
        if self.read_only {
            return Err(SettingsError::ReadOnlySettings);
        }
        self.adopt(settings);
        Ok(())
    }

    /// Adopt a snapshot: executors re-resolved against live controllers,
    /// native sources left unbound, value published wholesale.
    fn adopt(&mut self, settings: AppSettings) {
        let controllers = &self.controllers;
        self.snapshot = settings.attach_executors(|data_source| {
            if data_source.is_native() {
                return None;
            }
            controllers
                .iter()
                .find(|c| c.cluster_name() == data_source.engine)
                .map(|c| c.executor(&data_source.source))
        });
        let _ = self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    fn merge_external(&mut self, cluster: String, name: String, external: External) {
        // late result from a controller that no longer exists
        let Some(controller) = self
            .controllers
            .iter()
            .find(|c| c.cluster_name() == cluster)
        else {
            tracing::debug!(cluster = %cluster, name = %name, "Dropping schema for removed cluster");
            return;
        };

        let executor = controller.executor(&external.source);
        let data_source = match self.snapshot.data_source(&name) {
            Some(existing) => {
                let mut data_source = existing.clone();
                data_source.source = external.source;
                data_source.attributes = Some(external.attributes);
                data_source.executor = Some(executor);
                data_source
            }
            None => {
                let mut data_source = DataSource::new(name.clone(), cluster, external.source);
                data_source.attributes = Some(external.attributes);
                data_source.executor = Some(executor);
                data_source
            }
        };
        tracing::debug!(name = %data_source.name, "Merging discovered schema");
        self.snapshot = self.snapshot.add_or_update_data_source(data_source);
        let _ = self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    fn merge_dataset(&mut self, name: String, dataset: Dataset) {
        // stale callback for a source that was since removed
        let Some(existing) = self.snapshot.data_source(&name) else {
            tracing::debug!(name = %name, "Dropping dataset for removed source");
            return;
        };
        let mut data_source = existing.clone();
        data_source.attributes = Some(attributes_from_rows(&dataset));
        self.snapshot = self.snapshot.add_or_update_data_source(data_source);
        let _ = self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    fn merge_max_time(&mut self, name: String, time: DateTime<Utc>) {
        let Some(existing) = self.snapshot.data_source(&name) else {
            return;
        };
        let mut data_source = existing.clone();
        data_source.max_time = Some(MaxTime {
            time,
            updated: Utc::now(),
        });
        self.snapshot = self.snapshot.add_or_update_data_source(data_source);
        let _ = self.snapshot_tx.send_replace(self.snapshot.clone());
    }

    /// One pass over the query-driven sources; stale ones get their latest
    /// boundary re-derived concurrently. Results come back as messages.
    fn sweep(&self) {
        let now = Utc::now();
        for data_source in &self.snapshot.data_sources {
            if !matches!(data_source.refresh_rule, RefreshRule::Query { .. }) {
                continue;
            }
            if !data_source
                .refresh_rule
                .should_update(data_source.max_time.as_ref(), now)
            {
                continue;
            }
            let Some(executor) = data_source.executor.clone() else {
                continue;
            };
            let name = data_source.name.clone();
            let tx = self.tx.clone();
            tokio::spawn(async move {
                match executor.max_time().await {
                    Ok(time) => {
                        let _ = tx.send(Message::MaxTimeResolved { name, time });
                    }
                    Err(error) => {
                        tracing::warn!(source = %name, error = %error, "Max time check failed");
                    }
                }
            });
        }
    }

    fn spawn_sweep(&self) {
        let token = self.sweep_cancel.clone();
        let tx = self.tx.clone();
        let interval = self.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of a tokio interval completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(Message::SweepTick).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn shutdown(&mut self) {
        tracing::info!(
            controllers = self.controllers.len(),
            file_managers = self.file_managers.len(),
            "Settings coordinator shutting down"
        );
        self.sweep_cancel.cancel();
        for controller in self.controllers.drain(..) {
            controller.destroy();
        }
        for manager in self.file_managers.drain(..) {
            manager.destroy();
        }
    }
}

/// Derive an attribute list from loaded rows, keyed off the first row.
fn attributes_from_rows(rows: &[serde_json::Value]) -> Vec<Attribute> {
    let Some(serde_json::Value::Object(first)) = rows.first() else {
        return Vec::new();
    };
    first
        .iter()
        .map(|(key, value)| {
            let kind = match value {
                serde_json::Value::Number(_) => AttributeKind::Number,
                serde_json::Value::Bool(_) => AttributeKind::Boolean,
                serde_json::Value::String(s)
                    if chrono::DateTime::parse_from_rfc3339(s).is_ok() =>
                {
                    AttributeKind::Time
                }
                _ => AttributeKind::String,
            };
            Attribute::new(key.clone(), kind)
        })
        .collect()
}
