//! Chaos lifecycle controller
//!
//! Wraps one fault's creation as a delayed, cancellable operation and tracks
//! its status from creation to the end of the experiment:
//!
//! ```text
//! Pending -> Created -> Started <-> Paused
//!    |                     |          |
//!    v                     +--> Ended <+
//! Deleted          (any non-terminal) -> Unknown
//! ```
//!
//! Every transition is fanned out, in registration order, to the registered
//! [`ChaosListener`]s. A failing listener is logged and skipped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cluster::{condition_is_true, ChaosCondition, ClusterClient, ConditionType};
use crate::error::{ClusterResult, LifecycleError, LifecycleResult, Result};
use crate::experiment::FaultKind;
use crate::store::NamedExperiment;

/// Status of a single chaos object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChaosStatus {
    Pending,
    Created,
    Started,
    Paused,
    Ended,
    Unknown,
    Deleted,
}

impl ChaosStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChaosStatus::Ended | ChaosStatus::Unknown | ChaosStatus::Deleted)
    }

    pub fn can_transition_to(&self, to: ChaosStatus) -> bool {
        use ChaosStatus::*;
        match (self, to) {
            (Pending, Created) | (Pending, Deleted) => true,
            (Created, Started) => true,
            (Started, Paused) | (Paused, Started) => true,
            (Started, Ended) | (Paused, Ended) => true,
            (from, Unknown) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ChaosStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChaosStatus::Pending => "pending",
            ChaosStatus::Created => "created",
            ChaosStatus::Started => "started",
            ChaosStatus::Paused => "paused",
            ChaosStatus::Ended => "ended",
            ChaosStatus::Unknown => "unknown",
            ChaosStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of a chaos object handed to listeners
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosSnapshot {
    pub description: String,
    pub kind: Option<FaultKind>,
    pub name: String,
    pub status: ChaosStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub spec: String,
}

impl ChaosSnapshot {
    /// Time between start and end, or start and now while running
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        Some(self.ended_at.unwrap_or_else(Utc::now) - start)
    }

    /// Short type label such as `failure` or `chaos`
    pub fn type_label(&self) -> String {
        self.kind.map(|k| k.to_string()).unwrap_or_else(|| "chaos".to_string())
    }
}

/// Observer of chaos transitions
#[async_trait]
pub trait ChaosListener: Send + Sync {
    async fn on_chaos_created(&self, _chaos: &ChaosSnapshot) -> Result<()> {
        Ok(())
    }

    async fn on_chaos_creation_failed(&self, _chaos: &ChaosSnapshot, _reason: &str) -> Result<()> {
        Ok(())
    }

    async fn on_chaos_started(&self, _chaos: &ChaosSnapshot) -> Result<()> {
        Ok(())
    }

    async fn on_chaos_paused(&self, _chaos: &ChaosSnapshot) -> Result<()> {
        Ok(())
    }

    async fn on_chaos_ended(&self, _chaos: &ChaosSnapshot) -> Result<()> {
        Ok(())
    }

    async fn on_chaos_status_unknown(&self, _chaos: &ChaosSnapshot) -> Result<()> {
        Ok(())
    }
}

/// The work that actually creates a chaos object
#[async_trait]
pub trait ChaosAction: Send + Sync {
    async fn create(&self) -> Result<()>;

    fn name(&self) -> String;

    fn kind(&self) -> Option<FaultKind> {
        None
    }

    fn spec(&self) -> String {
        String::new()
    }
}

/// How a creation attempt finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// Cancelled before the delay elapsed, or deleted while pending
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum ListenerEvent<'a> {
    Created,
    CreationFailed(&'a str),
    Started,
    Paused,
    Ended,
    StatusUnknown,
}

/// Options for a [`LifecycleController`]
#[derive(Clone, Default)]
pub struct LifecycleOptions {
    pub description: String,
    /// Delay before the creation action runs
    pub delay: Duration,
    pub listeners: Vec<Arc<dyn ChaosListener>>,
}

struct ChaosState {
    status: ChaosStatus,
    /// Set while the creation action runs; a pending chaos cannot be cancelled then
    creating: bool,
    created_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

struct Inner {
    description: String,
    delay: Duration,
    action: Arc<dyn ChaosAction>,
    listeners: Vec<Arc<dyn ChaosListener>>,
    state: Mutex<ChaosState>,
}

/// Drives one chaos object through its lifecycle
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

/// Receives the single outcome of [`LifecycleController::create_async`]
pub struct CreationHandle {
    rx: oneshot::Receiver<LifecycleResult<CreateOutcome>>,
}

impl CreationHandle {
    pub async fn outcome(self) -> LifecycleResult<CreateOutcome> {
        self.rx.await.map_err(|_| LifecycleError::OutcomeLost)?
    }
}

impl LifecycleController {
    pub fn new(action: Arc<dyn ChaosAction>, options: LifecycleOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                description: options.description,
                delay: options.delay,
                action,
                listeners: options.listeners,
                state: Mutex::new(ChaosState {
                    status: ChaosStatus::Pending,
                    creating: false,
                    created_at: None,
                    started_at: None,
                    ended_at: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ChaosState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> ChaosStatus {
        self.state().status
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn snapshot(&self) -> ChaosSnapshot {
        let state = self.state();
        ChaosSnapshot {
            description: self.inner.description.clone(),
            kind: self.inner.action.kind(),
            name: self.inner.action.name(),
            status: state.status,
            created_at: state.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
            spec: self.inner.action.spec(),
        }
    }

    /// Wait out the delay, then create unless `cancel` fires first
    pub async fn create_sync(&self, cancel: &CancellationToken) -> LifecycleResult<CreateOutcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(description = %self.inner.description, "Chaos creation cancelled");
                self.cancel();
                Ok(CreateOutcome::Cancelled)
            }
            _ = tokio::time::sleep(self.inner.delay) => self.create_now().await,
        }
    }

    /// Same as [`create_sync`](Self::create_sync) on a spawned task
    pub fn create_async(&self, cancel: CancellationToken) -> CreationHandle {
        let (tx, rx) = oneshot::channel();
        let controller = self.clone();
        tokio::spawn(async move {
            let outcome = controller.create_sync(&cancel).await;
            if tx.send(outcome).is_err() {
                debug!(description = %controller.inner.description, "Creation outcome receiver dropped");
            }
        });
        CreationHandle { rx }
    }

    /// Move a pending chaos to `Deleted`; no effect once creation has begun
    pub fn cancel(&self) -> bool {
        let mut state = self.state();
        if state.status == ChaosStatus::Pending && !state.creating {
            state.status = ChaosStatus::Deleted;
            true
        } else {
            false
        }
    }

    async fn create_now(&self) -> LifecycleResult<CreateOutcome> {
        {
            let mut state = self.state();
            if state.status == ChaosStatus::Deleted {
                return Ok(CreateOutcome::Cancelled);
            }
            state.creating = true;
        }

        info!(description = %self.inner.description, name = %self.inner.action.name(), "Creating chaos object");
        match self.inner.action.create().await {
            Ok(()) => {
                self.on_created().await?;
                Ok(CreateOutcome::Created)
            }
            Err(e) => {
                self.state().creating = false;
                let reason = e.to_string();
                self.on_creation_failed(&reason).await?;
                Err(LifecycleError::CreationFailed { reason })
            }
        }
    }

    fn transition(&self, to: ChaosStatus) -> LifecycleResult<ChaosSnapshot> {
        {
            let mut state = self.state();
            if !state.status.can_transition_to(to) {
                return Err(LifecycleError::InvalidTransition {
                    description: self.inner.description.clone(),
                    from: state.status,
                    to,
                });
            }
            let now = Utc::now();
            match to {
                ChaosStatus::Created => {
                    state.created_at = Some(now);
                    state.creating = false;
                }
                ChaosStatus::Started if state.started_at.is_none() => state.started_at = Some(now),
                ChaosStatus::Ended => state.ended_at = Some(now),
                _ => {}
            }
            debug!(description = %self.inner.description, from = %state.status, to = %to, "Chaos transition");
            state.status = to;
        }
        Ok(self.snapshot())
    }

    async fn notify(&self, event: ListenerEvent<'_>, snapshot: &ChaosSnapshot) {
        for listener in &self.inner.listeners {
            let result = match event {
                ListenerEvent::Created => listener.on_chaos_created(snapshot).await,
                ListenerEvent::CreationFailed(reason) => listener.on_chaos_creation_failed(snapshot, reason).await,
                ListenerEvent::Started => listener.on_chaos_started(snapshot).await,
                ListenerEvent::Paused => listener.on_chaos_paused(snapshot).await,
                ListenerEvent::Ended => listener.on_chaos_ended(snapshot).await,
                ListenerEvent::StatusUnknown => listener.on_chaos_status_unknown(snapshot).await,
            };
            if let Err(e) = result {
                error!(error = %e, event = ?event, name = %snapshot.name, "Chaos listener failed");
            }
        }
    }

    async fn transition_and_notify(&self, to: ChaosStatus, event: ListenerEvent<'_>) -> LifecycleResult<()> {
        let snapshot = self.transition(to)?;
        self.notify(event, &snapshot).await;
        Ok(())
    }

    pub async fn on_created(&self) -> LifecycleResult<()> {
        self.transition_and_notify(ChaosStatus::Created, ListenerEvent::Created).await
    }

    /// Report a failed creation; the status stays `Pending`
    pub async fn on_creation_failed(&self, reason: &str) -> LifecycleResult<()> {
        let status = self.status();
        if status != ChaosStatus::Pending {
            return Err(LifecycleError::InvalidTransition {
                description: self.inner.description.clone(),
                from: status,
                to: ChaosStatus::Pending,
            });
        }
        warn!(description = %self.inner.description, reason, "Chaos creation failed");
        let snapshot = self.snapshot();
        self.notify(ListenerEvent::CreationFailed(reason), &snapshot).await;
        Ok(())
    }

    pub async fn on_started(&self) -> LifecycleResult<()> {
        self.transition_and_notify(ChaosStatus::Started, ListenerEvent::Started).await
    }

    pub async fn on_paused(&self) -> LifecycleResult<()> {
        self.transition_and_notify(ChaosStatus::Paused, ListenerEvent::Paused).await
    }

    pub async fn on_ended(&self) -> LifecycleResult<()> {
        self.transition_and_notify(ChaosStatus::Ended, ListenerEvent::Ended).await
    }

    pub async fn on_status_unknown(&self) -> LifecycleResult<()> {
        self.transition_and_notify(ChaosStatus::Unknown, ListenerEvent::StatusUnknown).await
    }

    /// Feed one observation of the chaos object's conditions
    ///
    /// Conditions are mapped onto transitions from the current status; an
    /// observation error moves a live chaos to `Unknown`.
    pub async fn observe(&self, observation: ClusterResult<Vec<ChaosCondition>>) -> LifecycleResult<ChaosStatus> {
        let conditions = match observation {
            Ok(conditions) => conditions,
            Err(e) => {
                warn!(error = %e, description = %self.inner.description, "Chaos observation failed");
                if !self.status().is_terminal() {
                    self.on_status_unknown().await?;
                }
                return Ok(self.status());
            }
        };

        let injected = condition_is_true(&conditions, ConditionType::AllInjected);
        let recovered = condition_is_true(&conditions, ConditionType::AllRecovered);
        let paused = condition_is_true(&conditions, ConditionType::Paused);

        if self.status() == ChaosStatus::Created && (injected || recovered) {
            self.on_started().await?;
        }
        match self.status() {
            ChaosStatus::Started if paused => self.on_paused().await?,
            ChaosStatus::Paused if !paused => self.on_started().await?,
            _ => {}
        }
        if matches!(self.status(), ChaosStatus::Started | ChaosStatus::Paused) && recovered && !injected {
            self.on_ended().await?;
        }
        Ok(self.status())
    }
}

/// Chaos created by applying a persisted manifest
pub struct ManifestChaos {
    cluster: Arc<dyn ClusterClient>,
    experiment: NamedExperiment,
}

impl ManifestChaos {
    pub fn new(cluster: Arc<dyn ClusterClient>, experiment: NamedExperiment) -> Self {
        Self { cluster, experiment }
    }

    pub fn experiment(&self) -> &NamedExperiment {
        &self.experiment
    }

    /// Current conditions of the applied resource
    pub async fn conditions(&self) -> ClusterResult<Vec<ChaosCondition>> {
        self.cluster
            .experiment_conditions(
                self.experiment.namespace.as_deref(),
                self.experiment.kind.crd(),
                &self.experiment.resource_name(),
            )
            .await
    }

    /// Delete the applied resource
    pub async fn remove(&self) -> ClusterResult<()> {
        self.cluster
            .delete(
                self.experiment.namespace.as_deref(),
                self.experiment.kind.crd(),
                &self.experiment.resource_name(),
            )
            .await
    }
}

#[async_trait]
impl ChaosAction for ManifestChaos {
    async fn create(&self) -> Result<()> {
        self.cluster.apply(&self.experiment.path).await?;
        Ok(())
    }

    fn name(&self) -> String {
        self.experiment.resource_name()
    }

    fn kind(&self) -> Option<FaultKind> {
        Some(self.experiment.kind)
    }

    fn spec(&self) -> String {
        self.experiment.manifest.clone()
    }
}
