//! Namespace topology analysis
//!
//! Turns a flat pod listing into the targets experiments are generated for:
//! standalone pods, label groups and partition pairs.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::HavocConfig;
use crate::error::{TopologyError, TopologyResult};

/// A label pair; compared and rendered through its canonical selector form
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

impl Label {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into() }
    }

    /// Selector form `'key': 'value'`
    pub fn canonical(&self) -> String {
        format!("'{}': '{}'", self.key, self.value)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': '{}'", self.key, self.value)
    }
}

/// A pod snapshot taken once per topology read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    /// Labels in key order
    pub labels: Vec<Label>,
}

impl Instance {
    pub fn new(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels: labels.into_iter().map(|(k, v)| Label::new(k, v)).collect(),
        }
    }
}

/// A label shared by two or more pods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Canonical selector
    pub label: String,
    pub members: Vec<String>,
}

/// Two partition-eligible labels to cut off from each other
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionPair {
    pub first: String,
    pub second: String,
}

/// Ignore rules and partition marker applied during analysis
#[derive(Debug, Clone, Default)]
pub struct TopologyRules {
    /// Substrings of pod names to skip
    pub ignore_pods: Vec<String>,
    /// Labels never grouped; exact matches are also dropped from the member map
    pub ignore_group_labels: Vec<String>,
    /// Substring that marks a label as partition-eligible; empty disables pairing
    pub partition_marker: String,
}

impl TopologyRules {
    pub fn from_config(config: &HavocConfig) -> Self {
        Self {
            ignore_pods: config.ignore_pods.clone(),
            ignore_group_labels: config.ignore_group_labels.clone(),
            partition_marker: config.network_partition.label.clone(),
        }
    }

    fn is_partition_label(&self, label: &str) -> bool {
        !self.partition_marker.is_empty() && label.contains(&self.partition_marker)
    }
}

/// Result of analyzing one topology read
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyAnalysis {
    /// Pods not in any group, sorted by name
    pub standalone: Vec<Instance>,
    /// Groups in ascending label order
    pub groups: Vec<Group>,
    /// Every non-ignored label with the pods carrying it
    pub label_members: BTreeMap<String, Vec<String>>,
    pub partition_pairs: Vec<PartitionPair>,
}

impl TopologyAnalysis {
    pub fn group_labels(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.label.as_str())
    }
}

fn contains_any(target: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| target.contains(p.as_str()))
}

/// Analyze a pod listing
pub fn analyze(namespace: &str, instances: Vec<Instance>, rules: &TopologyRules) -> TopologyResult<TopologyAnalysis> {
    info!(namespace, count = instances.len(), "Processing pods info");

    let mut instances: Vec<Instance> = instances
        .into_iter()
        .filter(|i| !contains_any(&i.name, &rules.ignore_pods))
        .collect();
    if instances.is_empty() {
        return Err(TopologyError::Empty { namespace: namespace.to_string() });
    }
    instances.sort_by(|a, b| a.name.cmp(&b.name));

    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut discovered: Vec<String> = Vec::new();
    let mut label_members: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for instance in &instances {
        let mut labels = instance.labels.clone();
        labels.sort_by(|a, b| a.key.cmp(&b.key));
        for label in labels {
            let canonical = label.canonical();
            let count = counts.entry(canonical.clone()).or_insert(0);
            if *count == 0 {
                discovered.push(canonical.clone());
            }
            *count += 1;
            if !rules.ignore_group_labels.contains(&canonical) {
                label_members.entry(canonical).or_default().push(instance.name.clone());
            }
        }
    }

    let mut groups = Vec::new();
    let mut partition_labels = Vec::new();
    for label in &discovered {
        let count = counts.get(label).copied().unwrap_or(0);
        if rules.is_partition_label(label) {
            info!(label = %label, count, "New partition group found");
            partition_labels.push(label.clone());
            continue;
        }
        if count > 1 && !contains_any(label, &rules.ignore_group_labels) {
            let members = label_members.get(label).cloned().unwrap_or_default();
            info!(label = %label, count, pods = ?members, "New group found");
            groups.push(Group { label: label.clone(), members });
        }
    }
    groups.sort_by(|a, b| a.label.cmp(&b.label));

    let grouped: BTreeSet<&str> = groups
        .iter()
        .flat_map(|g| g.members.iter().map(String::as_str))
        .collect();
    let standalone: Vec<Instance> = instances
        .iter()
        .filter(|i| !grouped.contains(i.name.as_str()))
        .cloned()
        .collect();
    for instance in &standalone {
        debug!(pod = %instance.name, "Pod doesn't have a group");
    }

    Ok(TopologyAnalysis {
        standalone,
        groups,
        label_members,
        partition_pairs: unique_pairs(&partition_labels),
    })
}

/// Every unordered pair `(labels[i], labels[j])` with `i < j`
pub fn unique_pairs(labels: &[String]) -> Vec<PartitionPair> {
    let mut pairs = Vec::new();
    for (i, first) in labels.iter().enumerate() {
        for second in &labels[i + 1..] {
            pairs.push(PartitionPair { first: first.clone(), second: second.clone() });
        }
    }
    pairs
}
