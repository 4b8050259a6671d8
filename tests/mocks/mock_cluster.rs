use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use havoc::cluster::{ChaosCondition, ClusterEvent};
use havoc::error::{ClusterError, ClusterResult};
use havoc::{ClusterClient, Instance};

/// One recorded control-plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    ListInstances {
        namespace: String,
        label_filter: Option<String>,
    },
    Apply {
        path: PathBuf,
    },
    Wait {
        namespace: Option<String>,
        resource: String,
        selector: String,
        condition: String,
        timeout: Duration,
    },
    Delete {
        namespace: Option<String>,
        resource: String,
        name: String,
    },
    ListEvents {
        namespace: Option<String>,
        object: String,
    },
    Conditions {
        namespace: Option<String>,
        resource: String,
        name: String,
    },
}

#[derive(Default)]
struct ClusterState {
    namespaces: HashMap<String, Vec<Instance>>,
    calls: Vec<ClusterCall>,
    fail_apply: bool,
    fail_wait: bool,
    fail_delete: bool,
    wait_delay: Duration,
    events: Vec<ClusterEvent>,
    // `None` scripts an observation error
    conditions: VecDeque<Option<Vec<ChaosCondition>>>,
}

/// In-memory cluster that records calls and never touches a real control plane
#[derive(Default)]
pub struct MockCluster {
    state: Mutex<ClusterState>,
}

fn failed(command: &str, stderr: &str) -> ClusterError {
    ClusterError::CommandFailed {
        command: command.to_string(),
        status: 1,
        stderr: stderr.to_string(),
    }
}

fn matches_filter(instance: &Instance, filter: &str) -> bool {
    filter.split(',').filter(|s| !s.is_empty()).all(|selector| {
        let (key, value) = selector.split_once('=').unwrap_or((selector, ""));
        instance.labels.iter().any(|l| l.key == key && (value.is_empty() || l.value == value))
    })
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_namespace(self, namespace: &str, pods: Vec<Instance>) -> Self {
        self.state().namespaces.insert(namespace.to_string(), pods);
        self
    }

    pub fn failing_apply(self) -> Self {
        self.state().fail_apply = true;
        self
    }

    pub fn failing_wait(self) -> Self {
        self.state().fail_wait = true;
        self
    }

    pub fn failing_delete(self) -> Self {
        self.state().fail_delete = true;
        self
    }

    /// Time a wait takes before the condition is met
    pub fn with_wait_delay(self, delay: Duration) -> Self {
        self.state().wait_delay = delay;
        self
    }

    pub fn with_events(self, events: Vec<ClusterEvent>) -> Self {
        self.state().events = events;
        self
    }

    /// Queue the conditions returned by the next observation
    pub fn push_conditions(&self, conditions: Vec<ChaosCondition>) {
        self.state().conditions.push_back(Some(conditions));
    }

    /// Make the next observation fail
    pub fn push_observation_error(&self) {
        self.state().conditions.push_back(None);
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.state().calls.clone()
    }

    pub fn applied(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::Apply { path } => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ClusterCall::Delete { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ClusterCall) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl ClusterClient for MockCluster {
    async fn list_instances(&self, namespace: &str, label_filter: Option<&str>) -> ClusterResult<Vec<Instance>> {
        self.record(ClusterCall::ListInstances {
            namespace: namespace.to_string(),
            label_filter: label_filter.map(str::to_string),
        });
        let pods = self
            .state()
            .namespaces
            .get(namespace)
            .cloned()
            .ok_or_else(|| ClusterError::NamespaceNotFound { namespace: namespace.to_string() })?;
        Ok(match label_filter {
            Some(filter) => pods.into_iter().filter(|p| matches_filter(p, filter)).collect(),
            None => pods,
        })
    }

    async fn apply(&self, path: &Path) -> ClusterResult<()> {
        self.record(ClusterCall::Apply { path: path.to_path_buf() });
        if self.state().fail_apply {
            return Err(failed("kubectl apply", "admission webhook denied the request"));
        }
        Ok(())
    }

    async fn wait_for_condition(
        &self,
        namespace: Option<&str>,
        resource: &str,
        selector: &str,
        condition: &str,
        timeout: Duration,
    ) -> ClusterResult<()> {
        self.record(ClusterCall::Wait {
            namespace: namespace.map(str::to_string),
            resource: resource.to_string(),
            selector: selector.to_string(),
            condition: condition.to_string(),
            timeout,
        });
        let (fail, delay) = {
            let state = self.state();
            (state.fail_wait, state.wait_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay.min(timeout)).await;
        }
        if fail || delay > timeout {
            return Err(failed("kubectl wait", "timed out waiting for the condition"));
        }
        Ok(())
    }

    async fn delete(&self, namespace: Option<&str>, resource: &str, name: &str) -> ClusterResult<()> {
        self.record(ClusterCall::Delete {
            namespace: namespace.map(str::to_string),
            resource: resource.to_string(),
            name: name.to_string(),
        });
        if self.state().fail_delete {
            return Err(failed("kubectl delete", "the server is currently unable to handle the request"));
        }
        Ok(())
    }

    async fn list_events_since(
        &self,
        namespace: Option<&str>,
        object: &str,
        since: DateTime<Utc>,
    ) -> ClusterResult<Vec<ClusterEvent>> {
        self.record(ClusterCall::ListEvents {
            namespace: namespace.map(str::to_string),
            object: object.to_string(),
        });
        Ok(self.state().events.iter().filter(|e| e.time >= since).cloned().collect())
    }

    async fn experiment_conditions(
        &self,
        namespace: Option<&str>,
        resource: &str,
        name: &str,
    ) -> ClusterResult<Vec<ChaosCondition>> {
        self.record(ClusterCall::Conditions {
            namespace: namespace.map(str::to_string),
            resource: resource.to_string(),
            name: name.to_string(),
        });
        match self.state().conditions.pop_front() {
            Some(Some(conditions)) => Ok(conditions),
            Some(None) => Err(failed("kubectl get", "connection refused")),
            None => Ok(Vec::new()),
        }
    }
}
