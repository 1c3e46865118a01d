//! The reconciliation pipeline and its lifecycle.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};

use crate::config::{SidecarConfig, SourceConfig};
use crate::coordinator::types::{ReconcileError, RunError, SetupError};
use crate::lifecycle::Shutdown;
use crate::materialize::Materializer;
use crate::observability::metrics;
use crate::reload::{ChildExit, ProcessError, ReloadTrigger};
use crate::resilience::RateLimiter;
use crate::source::{ConfigSource, FileSource, KubernetesSource, Snapshot};

/// How long to wait for a killed child to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to let an in-flight reconciliation finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// State touched by a reconciliation. Guarded by one lock so cycles never overlap.
struct ReconcileState {
    limiter: RateLimiter,
    materializer: Materializer,
}

/// Bridges the snapshot stream to the filesystem and the reload trigger.
pub struct Coordinator {
    config: SidecarConfig,
    source: Box<dyn ConfigSource>,
    trigger: ReloadTrigger,
    state: Mutex<ReconcileState>,
    shutdown: Shutdown,
    /// Snapshot applied during initialization; the watch loop dedupes against it.
    baseline: Snapshot,
}

impl Coordinator {
    /// Build the configured source and trigger, then [`initialize`](Self::initialize).
    pub async fn from_config(config: SidecarConfig) -> Result<Arc<Self>, SetupError> {
        let source: Box<dyn ConfigSource> = match &config.source {
            SourceConfig::File { path } => Box::new(FileSource::new(path)),
            kube @ SourceConfig::Kubernetes { .. } => Box::new(
                KubernetesSource::from_config(&config.resource, kube).map_err(|error| {
                    SetupError::Source {
                        resource: config.resource.to_string(),
                        error,
                    }
                })?,
            ),
        };
        let trigger = ReloadTrigger::from_config(&config)?;

        Self::initialize(config, source, trigger).await
    }

    /// Create the root directory and reconcile the current snapshot once.
    ///
    /// Any failure here aborts startup.
    pub async fn initialize(
        config: SidecarConfig,
        source: Box<dyn ConfigSource>,
        trigger: ReloadTrigger,
    ) -> Result<Arc<Self>, SetupError> {
        if config.root_dir.as_os_str().is_empty() {
            return Err(SetupError::MissingRoot);
        }
        tokio::fs::create_dir_all(&config.root_dir)
            .await
            .map_err(|source| SetupError::CreateRoot {
                path: config.root_dir.clone(),
                source,
            })?;

        let baseline = source.get().await.map_err(|error| SetupError::Source {
            resource: source.describe(),
            error,
        })?;
        tracing::info!(
            source = %source.describe(),
            entries = baseline.len(),
            "Fetched initial snapshot"
        );

        let coordinator = Self {
            state: Mutex::new(ReconcileState {
                limiter: RateLimiter::from_config(&config.rate_limit),
                materializer: Materializer::new(config.root_dir.clone()),
            }),
            config,
            source,
            trigger,
            shutdown: Shutdown::new(),
            baseline,
        };

        coordinator
            .reconcile(&coordinator.baseline)
            .await
            .map_err(SetupError::InitialSync)?;

        Ok(Arc::new(coordinator))
    }

    pub fn trigger(&self) -> &ReloadTrigger {
        &self.trigger
    }

    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_stopping()
    }

    /// Files written by the last successful reconciliation.
    pub async fn written_files(&self) -> HashSet<PathBuf> {
        self.state.lock().await.materializer.written().clone()
    }

    /// Apply a changed snapshot. A no-op once shutdown has begun.
    pub async fn on_snapshot_changed(&self, snapshot: &Snapshot) -> Result<(), ReconcileError> {
        if self.shutdown.is_stopping() {
            tracing::debug!("Shutdown in progress, ignoring snapshot");
            return Ok(());
        }
        self.reconcile(snapshot).await
    }

    async fn reconcile(&self, snapshot: &Snapshot) -> Result<(), ReconcileError> {
        let mut state = self.state.lock().await;
        state.limiter.accept().await;

        // Stop may have arrived while we were throttled.
        if self.shutdown.is_stopping() {
            metrics::record_reconciliation("skipped");
            return Ok(());
        }

        if let Err(e) = state.materializer.sync(snapshot).await {
            metrics::record_reconciliation("sync_error");
            return Err(e.into());
        }
        metrics::record_files_written(state.materializer.written().len());

        if let Err(e) = self.trigger.reload().await {
            metrics::record_reconciliation("reload_error");
            return Err(e.into());
        }

        metrics::record_reconciliation("success");
        tracing::info!(
            root = %self.config.root_dir.display(),
            files = snapshot.len(),
            trigger = self.trigger.kind(),
            "Reconciliation complete"
        );
        Ok(())
    }

    /// Begin shutdown. Only the first call does anything.
    pub fn stop(&self) -> Result<(), ProcessError> {
        if !self.shutdown.trigger() {
            return Ok(());
        }
        tracing::info!("Stopping coordinator");

        match self.trigger.supervisor() {
            Some(supervisor) => supervisor.stop(),
            None => Ok(()),
        }
    }

    /// Start the child (if any) and the watch loop, then block until
    /// [`stop`](Self::stop) or an unexpected child exit.
    pub async fn run(self: &Arc<Self>) -> Result<(), RunError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        if self.shutdown.is_stopping() {
            return Ok(());
        }

        let mut child_exit = match self.trigger.supervisor() {
            Some(supervisor) => Some(supervisor.start()?),
            None => None,
        };

        let updates = match self.source.subscribe(self.shutdown.subscribe()).await {
            Ok(updates) => updates,
            Err(error) => {
                if let Err(e) = self.stop() {
                    tracing::warn!(error = %e, "Failed to stop child after subscription error");
                }
                return Err(RunError::Subscribe {
                    resource: self.source.describe(),
                    error,
                });
            }
        };

        let watcher = tokio::spawn(Arc::clone(self).watch(updates, self.shutdown.subscribe()));
        tracing::info!(source = %self.source.describe(), "Coordinator running");

        let exited = match child_exit.as_mut() {
            Some(exit_rx) => tokio::select! {
                _ = shutdown_rx.recv() => None,
                exit = exit_rx => Some(exit),
            },
            None => {
                let _ = shutdown_rx.recv().await;
                None
            }
        };

        match exited {
            Some(Ok(exit)) if exit.is_crash() => {
                self.shutdown.trigger();
                return Err(RunError::ProcessCrashed(exit));
            }
            Some(Ok(_)) => {}
            Some(Err(_)) => {
                self.shutdown.trigger();
                return Err(RunError::SupervisionLost);
            }
            None => {
                if let Some(exit_rx) = child_exit {
                    wait_for_reap(exit_rx).await;
                }
            }
        }

        if tokio::time::timeout(DRAIN_TIMEOUT, watcher).await.is_err() {
            tracing::warn!("In-flight reconciliation did not finish before shutdown");
        }
        tracing::info!("Coordinator stopped");
        Ok(())
    }

    async fn watch(
        self: Arc<Self>,
        mut updates: mpsc::Receiver<Snapshot>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut last_observed = self.baseline.clone();

        loop {
            let next = tokio::select! {
                next = updates.recv() => next,
                _ = shutdown.recv() => None,
            };
            let Some(mut snapshot) = next else { break };

            // Each snapshot is complete, so only the newest queued one matters.
            while let Ok(newer) = updates.try_recv() {
                snapshot = newer;
            }

            if snapshot == last_observed {
                tracing::debug!("Snapshot unchanged, skipping");
                continue;
            }
            last_observed = snapshot.clone();

            if let Err(e) = self.on_snapshot_changed(&snapshot).await {
                tracing::error!(error = %e, "Unable to populate configuration directory");
            }
        }

        tracing::debug!("Watch loop exited");
    }
}

async fn wait_for_reap(exit_rx: oneshot::Receiver<ChildExit>) {
    match tokio::time::timeout(REAP_TIMEOUT, exit_rx).await {
        Ok(Ok(exit)) => tracing::debug!("{}", exit),
        Ok(Err(_)) => tracing::warn!("Child exit was never reported"),
        Err(_) => tracing::warn!(
            timeout_secs = REAP_TIMEOUT.as_secs(),
            "Child process was not reaped in time"
        ),
    }
}
