//! Public handle over the coordinator actor.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time;

use crate::cluster::{default_external_name, ExternalNameFn};
use crate::coordinator::actor::{Actor, Message};
use crate::coordinator::types::{SettingsError, SettingsSource};
use crate::dataset::DatasetLoader;
use crate::settings::{AppSettings, Cluster, DataSource};
use crate::transport::TransportRegistry;

/// Tunables for a coordinator instance.
pub struct CoordinatorOptions {
    /// Upper bound a read waits for in-flight initial work. Exceeding it is
    /// logged, never fatal.
    pub initial_load_timeout: Duration,

    /// Cadence of the max-time staleness sweep.
    pub sweep_interval: Duration,

    /// Names auto-discovered sources.
    pub external_name: ExternalNameFn,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            initial_load_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(1),
            external_name: Arc::new(default_external_name),
        }
    }
}

/// Cloneable handle to the settings coordinator.
///
/// All mutations are serialized through the actor's queue; a later call
/// observes the fully-applied result of an earlier one.
#[derive(Clone)]
pub struct SettingsCoordinator {
    tx: mpsc::UnboundedSender<Message>,
    ready: watch::Receiver<bool>,
    snapshot: watch::Receiver<AppSettings>,
    initial_load_timeout: Duration,
}

impl SettingsCoordinator {
    /// Spawn the actor and, for a durable source, its initial load.
    pub fn start(
        source: SettingsSource,
        registry: TransportRegistry,
        loader: Arc<dyn DatasetLoader>,
        options: CoordinatorOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(AppSettings::default());
        let (ready_tx, ready_rx) = watch::channel(false);

        let read_only = source.is_read_only();
        let mut outstanding = 0;
        match source {
            SettingsSource::Transient(settings) | SettingsSource::ReadOnly(settings) => {
                let _ = tx.send(Message::ChangeSettings {
                    settings,
                    done: None,
                });
            }
            SettingsSource::Loader { load, .. } => {
                outstanding = 1;
                let tx = tx.clone();
                tokio::spawn(async move {
                    match load.await {
                        Ok(settings) => {
                            let _ = tx.send(Message::ChangeSettings {
                                settings,
                                done: None,
                            });
                        }
                        Err(error) => {
                            tracing::error!(error = %error, "Initial settings load failed");
                        }
                    }
                    let _ = tx.send(Message::WorkFinished);
                });
            }
        }

        let actor = Actor::new(
            rx,
            tx.clone(),
            snapshot_tx,
            ready_tx,
            outstanding,
            registry,
            loader,
            options.external_name,
            read_only,
            options.sweep_interval,
        );
        tokio::spawn(actor.run());

        Self {
            tx,
            ready: ready_rx,
            snapshot: snapshot_rx,
            initial_load_timeout: options.initial_load_timeout,
        }
    }

    /// Wait (bounded) for in-flight initial work, nudge every live cluster
    /// controller to refresh, and return the freshest snapshot.
    ///
    /// `source_hint` names the source the caller is interested in; it is
    /// currently only logged.
    pub async fn get_settings(
        &self,
        source_hint: Option<&str>,
    ) -> Result<AppSettings, SettingsError> {
        let mut ready = self.ready.clone();
        match time::timeout(self.initial_load_timeout, ready.wait_for(|ready| *ready)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(SettingsError::CoordinatorClosed),
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.initial_load_timeout.as_millis() as u64,
                    "Initial load still in flight, serving best-effort snapshot"
                );
            }
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Message::GetSettings {
                hint: source_hint.map(str::to_string),
                reply: reply_tx,
            })
            .map_err(|_| SettingsError::CoordinatorClosed)?;
        reply_rx.await.map_err(|_| SettingsError::CoordinatorClosed)
    }

    /// Reconcile controllers and file managers against `settings` and adopt
    /// it as the current snapshot.
    pub async fn change_settings(&self, settings: AppSettings) -> Result<(), SettingsError> {
        self.send_acked(|done| Message::ChangeSettings {
            settings,
            done: Some(done),
        })
        .await
    }

    /// Adopt `settings` with executors re-bound to live controllers.
    ///
    /// Rejected when the settings location is read-only. Adoption here is
    /// in-memory only; durability is not guaranteed by this call.
    pub async fn update_settings(&self, settings: AppSettings) -> Result<(), SettingsError> {
        self.send_acked(|reply| Message::UpdateSettings { settings, reply })
            .await
    }

    /// Add or replace one cluster and reconcile.
    pub async fn add_cluster(&self, cluster: Cluster) -> Result<(), SettingsError> {
        self.send_acked(|done| Message::AddCluster { cluster, done })
            .await
    }

    /// Add or replace one data source and reconcile.
    pub async fn add_data_source(&self, data_source: DataSource) -> Result<(), SettingsError> {
        self.send_acked(|done| Message::AddDataSource { data_source, done })
            .await
    }

    /// The snapshot as last published, without nudging any controller.
    pub fn current_snapshot(&self) -> AppSettings {
        self.snapshot.borrow().clone()
    }

    /// Stop the sweep, destroy all controllers and managers, close the
    /// queue. Later calls on any clone fail with
    /// [`SettingsError::CoordinatorClosed`].
    pub async fn destroy(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Message::Destroy { done: done_tx }).is_ok() {
            let _ = done_rx.await;
        }
    }

    async fn send_acked(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), SettingsError>>) -> Message,
    ) -> Result<(), SettingsError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(make(ack_tx))
            .map_err(|_| SettingsError::CoordinatorClosed)?;
        ack_rx.await.map_err(|_| SettingsError::CoordinatorClosed)?
    }
}
