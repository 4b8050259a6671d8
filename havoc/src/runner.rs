//! Apply-and-wait for a single experiment

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::cluster::ClusterClient;
use crate::error::{ClusterError, ExperimentError, ExperimentResult};
use crate::store::NamedExperiment;

/// Default bound on waiting for an experiment to recover
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(180);

/// Condition Chaos Mesh reports once every injected fault is gone
pub const RECOVERED_CONDITION: &str = "AllRecovered=True";

/// Applies persisted experiments and waits for them to finish
#[derive(Clone)]
pub struct ExperimentRunner {
    cluster: Arc<dyn ClusterClient>,
    timeout: Duration,
}

impl ExperimentRunner {
    pub fn new(cluster: Arc<dyn ClusterClient>) -> Self {
        Self { cluster, timeout: DEFAULT_APPLY_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Apply the manifest without waiting; the resource is left in place
    pub async fn apply(&self, experiment: &NamedExperiment) -> ExperimentResult<()> {
        info!(
            kind = %experiment.kind,
            name = %experiment.name,
            path = %experiment.path.display(),
            "Applying experiment manifest"
        );
        self.cluster
            .apply(&experiment.path)
            .await
            .map_err(|source| ExperimentError::Apply {
                kind: experiment.kind,
                name: experiment.name.clone(),
                namespace: experiment.namespace.clone().unwrap_or_default(),
                source,
            })
    }

    /// Apply, wait for recovery, log the events raised meanwhile, then delete
    pub async fn apply_and_wait(&self, experiment: &NamedExperiment) -> ExperimentResult<()> {
        let applied_at = Utc::now();
        self.apply(experiment).await?;

        let namespace = experiment.namespace.as_deref();
        let crd = experiment.kind.crd();
        let selector = format!("waitLabel={}", experiment.name);

        let waited = self
            .cluster
            .wait_for_condition(namespace, crd, &selector, RECOVERED_CONDITION, self.timeout)
            .await;
        if waited.is_ok() {
            info!(kind = %experiment.kind, name = %experiment.name, "Chaos experiment successfully recovered");
        }

        let cleaned = self.cleanup(experiment, applied_at).await;

        match (waited, cleaned) {
            (Err(source), cleaned) => {
                if let Err(cleanup_err) = cleaned {
                    error!(error = %cleanup_err, name = %experiment.name, "Cleanup after timeout failed");
                }
                Err(ExperimentError::Timeout { kind: experiment.kind, name: experiment.name.clone(), source })
            }
            (Ok(()), Err(source)) => Err(ExperimentError::Cleanup {
                kind: experiment.kind,
                name: experiment.name.clone(),
                source,
            }),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    async fn cleanup(&self, experiment: &NamedExperiment, since: chrono::DateTime<Utc>) -> Result<(), ClusterError> {
        let namespace = experiment.namespace.as_deref();
        let resource = experiment.resource_name();

        match self.cluster.list_events_since(namespace, &resource, since).await {
            Ok(events) => {
                debug!(count = events.len(), "Listing all experiment events");
                for event in events {
                    info!(time = %event.time, reason = %event.reason, message = %event.message, "Experiment event");
                }
            }
            Err(e) => warn!(error = %e, name = %resource, "Could not list experiment events"),
        }

        self.cluster.delete(namespace, experiment.kind.crd(), &resource).await
    }
}
