//! Cluster control-plane access
//!
//! [`ClusterClient`] is the seam every cluster interaction goes through;
//! [`Kubectl`] implements it by shelling out to `kubectl` and parsing its
//! JSON output.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClusterError, ClusterResult};
use crate::topology::Instance;

/// An event raised for a chaos object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub time: DateTime<Utc>,
    pub reason: String,
    pub message: String,
}

/// Chaos Mesh status condition types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Selected,
    AllInjected,
    AllRecovered,
    Paused,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosCondition {
    #[serde(rename = "type")]
    pub kind: ConditionType,
    pub status: ConditionStatus,
}

impl ChaosCondition {
    pub fn new(kind: ConditionType, status: ConditionStatus) -> Self {
        Self { kind, status }
    }
}

/// True when `conditions` holds `kind` with status `True`
pub fn condition_is_true(conditions: &[ChaosCondition], kind: ConditionType) -> bool {
    conditions
        .iter()
        .any(|c| c.kind == kind && c.status == ConditionStatus::True)
}

/// Operations havoc needs from the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List pods of a namespace, optionally narrowed by a label filter
    async fn list_instances(&self, namespace: &str, label_filter: Option<&str>) -> ClusterResult<Vec<Instance>>;

    /// Apply a manifest file
    async fn apply(&self, path: &Path) -> ClusterResult<()>;

    /// Block until resources matching `selector` report `condition` or `timeout` passes
    async fn wait_for_condition(
        &self,
        namespace: Option<&str>,
        resource: &str,
        selector: &str,
        condition: &str,
        timeout: Duration,
    ) -> ClusterResult<()>;

    async fn delete(&self, namespace: Option<&str>, resource: &str, name: &str) -> ClusterResult<()>;

    /// Events for `object` seen after `since`
    async fn list_events_since(
        &self,
        namespace: Option<&str>,
        object: &str,
        since: DateTime<Utc>,
    ) -> ClusterResult<Vec<ClusterEvent>>;

    /// Current status conditions of a chaos resource
    async fn experiment_conditions(
        &self,
        namespace: Option<&str>,
        resource: &str,
        name: &str,
    ) -> ClusterResult<Vec<ChaosCondition>>;
}

#[derive(Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<PodItem>,
}

#[derive(Deserialize)]
struct PodItem {
    metadata: PodMetadata,
}

#[derive(Deserialize)]
struct PodMetadata {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventItem {
    last_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ChaosObject {
    #[serde(default)]
    status: Option<ChaosObjectStatus>,
}

#[derive(Deserialize)]
struct ChaosObjectStatus {
    #[serde(default)]
    conditions: Vec<ChaosCondition>,
}

fn parse<T: serde::de::DeserializeOwned>(what: &str, out: &str) -> ClusterResult<T> {
    serde_json::from_str(out).map_err(|source| ClusterError::Parse { what: what.to_string(), source })
}

/// Pods from `kubectl get pods -o json` output
pub fn parse_pod_list(out: &str) -> ClusterResult<Vec<Instance>> {
    let list: PodList = parse("pod list", out)?;
    Ok(list
        .items
        .into_iter()
        .map(|p| Instance::new(p.metadata.name, p.metadata.labels))
        .collect())
}

/// Events after `since` from `kubectl get events -o json` output
pub fn parse_events_since(out: &str, since: DateTime<Utc>) -> ClusterResult<Vec<ClusterEvent>> {
    let list: EventList = parse("event list", out)?;
    Ok(list
        .items
        .into_iter()
        .filter_map(|e| {
            let time = e.last_timestamp?;
            (time > since).then(|| ClusterEvent { time, reason: e.reason, message: e.message })
        })
        .collect())
}

/// `kubectl` backed cluster client
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
}

impl Kubectl {
    pub fn new() -> Self {
        Self { binary: "kubectl".to_string() }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[String]) -> ClusterResult<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %command, "Executing command");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| ClusterError::Spawn { command: command.clone(), source })?;

        if !output.status.success() {
            return Err(ClusterError::CommandFailed {
                command,
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new()
    }
}

fn args<const N: usize>(parts: [&str; N], namespace: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
    if let Some(ns) = namespace {
        out.push("-n".to_string());
        out.push(ns.to_string());
    }
    out
}

/// A failed `get ns` means the namespace is missing only when the server said so
fn namespace_lookup_error(namespace: &str, err: ClusterError) -> ClusterError {
    match err {
        ClusterError::CommandFailed { ref stderr, .. } if stderr.contains("NotFound") || stderr.contains("not found") => {
            ClusterError::NamespaceNotFound { namespace: namespace.to_string() }
        }
        other => other,
    }
}

fn wait_args(
    namespace: Option<&str>,
    resource: &str,
    selector: &str,
    condition: &str,
    timeout: Duration,
) -> Vec<String> {
    let condition = format!("condition={}", condition);
    // kubectl takes Go durations; milliseconds keep sub-second timeouts intact
    let timeout = format!("{}ms", timeout.as_millis());
    args(
        ["wait", resource, "-l", selector, "--for", &condition, "--timeout", &timeout],
        namespace,
    )
}

#[async_trait]
impl ClusterClient for Kubectl {
    async fn list_instances(&self, namespace: &str, label_filter: Option<&str>) -> ClusterResult<Vec<Instance>> {
        self.run(&args(["get", "ns", namespace], None))
            .await
            .map_err(|e| namespace_lookup_error(namespace, e))?;

        let mut cmd = args(["get", "pods"], Some(namespace));
        if let Some(filter) = label_filter.filter(|f| !f.is_empty()) {
            cmd.push("-l".to_string());
            cmd.push(filter.to_string());
        }
        cmd.push("-o".to_string());
        cmd.push("json".to_string());

        let out = self.run(&cmd).await?;
        parse_pod_list(&out)
    }

    async fn apply(&self, path: &Path) -> ClusterResult<()> {
        let path = path.to_string_lossy();
        self.run(&args(["apply", "-f", &path], None)).await.map(|_| ())
    }

    async fn wait_for_condition(
        &self,
        namespace: Option<&str>,
        resource: &str,
        selector: &str,
        condition: &str,
        timeout: Duration,
    ) -> ClusterResult<()> {
        self.run(&wait_args(namespace, resource, selector, condition, timeout))
            .await
            .map(|_| ())
    }

    async fn delete(&self, namespace: Option<&str>, resource: &str, name: &str) -> ClusterResult<()> {
        self.run(&args(["delete", resource, name], namespace)).await.map(|_| ())
    }

    async fn list_events_since(
        &self,
        namespace: Option<&str>,
        object: &str,
        since: DateTime<Utc>,
    ) -> ClusterResult<Vec<ClusterEvent>> {
        let selector = format!("involvedObject.name={}", object);
        let out = self
            .run(&args(["get", "events", "--field-selector", &selector, "-o", "json"], namespace))
            .await?;
        parse_events_since(&out, since)
    }

    async fn experiment_conditions(
        &self,
        namespace: Option<&str>,
        resource: &str,
        name: &str,
    ) -> ClusterResult<Vec<ChaosCondition>> {
        let out = self.run(&args(["get", resource, name, "-o", "json"], namespace)).await?;
        let object: ChaosObject = parse("chaos object", &out)?;
        Ok(object.status.map(|s| s.conditions).unwrap_or_default())
    }
}
