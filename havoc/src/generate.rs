//! Experiment generation
//!
//! Maps a [`TopologyAnalysis`] and the per-kind configuration onto fault
//! specs, renders them and collects the text by kind and name.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::HavocConfig;
use crate::error::{GenerateError, GenerateResult};
use crate::experiment::{FaultKind, FaultParams, FaultSpec, FaultTarget, Renderer, TargetMode};
use crate::topology::TopologyAnalysis;

/// Hex characters kept from the URL digest; keeps wait labels under 63 chars
const URL_HASH_LEN: usize = 16;

/// Rendered manifests keyed by kind, then by target name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultCollection {
    experiments: BTreeMap<FaultKind, BTreeMap<String, String>>,
}

impl FaultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: FaultKind, name: String, text: String) -> GenerateResult<()> {
        match self.experiments.entry(kind).or_default().entry(name) {
            Entry::Occupied(e) => Err(GenerateError::DuplicateName { kind, name: e.key().clone() }),
            Entry::Vacant(e) => {
                e.insert(text);
                Ok(())
            }
        }
    }

    pub fn get(&self, kind: FaultKind, name: &str) -> Option<&str> {
        self.experiments.get(&kind)?.get(name).map(String::as_str)
    }

    pub fn kinds(&self) -> impl Iterator<Item = FaultKind> + '_ {
        self.experiments.keys().copied()
    }

    pub fn names(&self, kind: FaultKind) -> impl Iterator<Item = &str> {
        self.experiments.get(&kind).into_iter().flat_map(|m| m.keys().map(String::as_str))
    }

    /// Iterate `(kind, name, text)` in kind then name order
    pub fn iter(&self) -> impl Iterator<Item = (FaultKind, &str, &str)> {
        self.experiments
            .iter()
            .flat_map(|(kind, m)| m.iter().map(move |(name, text)| (*kind, name.as_str(), text.as_str())))
    }

    pub fn len(&self) -> usize {
        self.experiments.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Strip quotes and turn selector punctuation into dashes
pub fn sanitize_label(label: &str) -> String {
    label
        .replace(['\'', '"'], "")
        .replace(": ", "-")
        .replace(['.', '/'], "-")
}

/// Stable short digest of an external URL
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(URL_HASH_LEN);
    hex
}

/// Hex characters of the label digest appended to colliding names
const LABEL_DIGEST_LEN: usize = 8;

/// Intensity modes in configured order, repeats dropped
fn intensities(percentage: &[u32], fixed: &[u32]) -> Vec<TargetMode> {
    let mut modes = Vec::with_capacity(percentage.len() + fixed.len());
    let all = percentage
        .iter()
        .map(|p| TargetMode::FixedPercentage(*p))
        .chain(fixed.iter().map(|n| TargetMode::FixedCount(*n)));
    for mode in all {
        if !modes.contains(&mode) {
            modes.push(mode);
        }
    }
    modes
}

fn sized_name(base: &str, mode: TargetMode) -> String {
    match (mode.intensity(), mode.suffix()) {
        (Some(n), Some(suffix)) => format!("{}-{}-{}", base, n, suffix),
        _ => base.to_string(),
    }
}

/// Name bases for `keys`, one per key
///
/// Sanitizing is lossy, so keys sharing a sanitized form get a digest of the
/// canonical key appended. Bases depend only on the key set, never on order.
fn unique_bases(keys: &[String]) -> Vec<String> {
    let sanitized: Vec<String> = keys.iter().map(|k| sanitize_label(k)).collect();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for base in &sanitized {
        *counts.entry(base.as_str()).or_default() += 1;
    }
    sanitized
        .iter()
        .zip(keys)
        .map(|(base, key)| {
            if counts.get(base.as_str()).copied().unwrap_or(0) > 1 {
                let mut digest = url_hash(key);
                digest.truncate(LABEL_DIGEST_LEN);
                format!("{}-{}", base, digest)
            } else {
                base.clone()
            }
        })
        .collect()
}

/// Builds fault specs from topology and configuration
pub struct Generator<'a> {
    config: &'a HavocConfig,
    renderer: Renderer,
}

impl<'a> Generator<'a> {
    pub fn new(config: &'a HavocConfig) -> Self {
        Self { config, renderer: Renderer::new() }
    }

    /// Build the typed specs for every configured kind
    pub fn specs(&self, namespace: &str, analysis: &TopologyAnalysis) -> Vec<FaultSpec> {
        let cfg = self.config;
        let latency = || FaultParams::Latency { latency: cfg.latency.latency.clone() };
        let memory = || FaultParams::Memory {
            workers: cfg.stress_memory.workers,
            size: cfg.stress_memory.memory.clone(),
        };
        let cpu = || FaultParams::Cpu { workers: cfg.stress_cpu.workers, load: cfg.stress_cpu.load };

        let mut specs = Vec::new();
        for &kind in &cfg.experiment_kinds {
            let before = specs.len();
            let out = &mut specs;
            match kind {
                FaultKind::Failure => single_specs(kind, &cfg.failure.duration, FaultParams::None, namespace, analysis, out),
                FaultKind::Latency => single_specs(kind, &cfg.latency.duration, latency(), namespace, analysis, out),
                FaultKind::Memory => single_specs(kind, &cfg.stress_memory.duration, memory(), namespace, analysis, out),
                FaultKind::Cpu => single_specs(kind, &cfg.stress_cpu.duration, cpu(), namespace, analysis, out),
                FaultKind::Rewind => single_specs(
                    kind,
                    &cfg.rewind.duration,
                    FaultParams::Rewind { blocks_back: cfg.rewind.blocks_back },
                    namespace,
                    analysis,
                    out,
                ),
                FaultKind::GroupFailure => group_specs(
                    kind,
                    &cfg.failure.duration,
                    &intensities(&cfg.failure.group_percentage, &cfg.failure.group_fixed),
                    FaultParams::None,
                    namespace,
                    analysis,
                    out,
                ),
                FaultKind::GroupLatency => group_specs(
                    kind,
                    &cfg.latency.duration,
                    &intensities(&cfg.latency.group_percentage, &cfg.latency.group_fixed),
                    latency(),
                    namespace,
                    analysis,
                    out,
                ),
                FaultKind::GroupMemory => group_specs(
                    kind,
                    &cfg.stress_memory.duration,
                    &intensities(&cfg.stress_memory.group_percentage, &cfg.stress_memory.group_fixed),
                    memory(),
                    namespace,
                    analysis,
                    out,
                ),
                FaultKind::GroupCpu => group_specs(
                    kind,
                    &cfg.stress_cpu.duration,
                    &intensities(&cfg.stress_cpu.group_percentage, &cfg.stress_cpu.group_fixed),
                    cpu(),
                    namespace,
                    analysis,
                    out,
                ),
                FaultKind::Partition => self.partition_specs(namespace, analysis, out),
                FaultKind::External => self.external_specs(namespace, out),
            }
            debug!(kind = %kind, count = specs.len() - before, "Generated specs");
        }
        specs
    }

    /// Generate and render the whole collection
    pub fn generate(&mut self, namespace: &str, analysis: &TopologyAnalysis) -> GenerateResult<FaultCollection> {
        info!(namespace, "Generating chaos experiments");
        let mut collection = FaultCollection::new();
        for spec in self.specs(namespace, analysis) {
            let text = self.renderer.render(&spec)?;
            collection.insert(spec.kind, spec.name, text)?;
        }
        info!(namespace, count = collection.len(), "Chaos experiments generated");
        Ok(collection)
    }

    fn partition_specs(&self, namespace: &str, analysis: &TopologyAnalysis, out: &mut Vec<FaultSpec>) {
        let cfg = &self.config.network_partition;
        let modes = intensities(&cfg.group_percentage, &cfg.group_fixed);
        let keys: Vec<String> = analysis
            .partition_pairs
            .iter()
            .map(|pair| format!("{}-{}", pair.first, pair.second))
            .collect();
        for (pair, base) in analysis.partition_pairs.iter().zip(unique_bases(&keys)) {
            for mode in &modes {
                out.push(FaultSpec {
                    kind: FaultKind::Partition,
                    name: sized_name(&base, *mode),
                    namespace: namespace.to_string(),
                    target: FaultTarget::Pair { from: pair.first.clone(), to: pair.second.clone() },
                    mode: *mode,
                    duration: cfg.duration.clone(),
                    params: FaultParams::None,
                });
            }
        }
    }

    fn external_specs(&self, namespace: &str, out: &mut Vec<FaultSpec>) {
        let cfg = &self.config.external_targets;
        for url in &cfg.urls {
            out.push(FaultSpec {
                kind: FaultKind::External,
                name: format!("{}-{}", namespace, url_hash(url)),
                namespace: namespace.to_string(),
                target: FaultTarget::Namespace,
                mode: TargetMode::Single,
                duration: cfg.duration.clone(),
                params: FaultParams::External { url: url.clone() },
            });
        }
    }
}

fn single_specs(
    kind: FaultKind,
    duration: &str,
    params: FaultParams,
    namespace: &str,
    analysis: &TopologyAnalysis,
    out: &mut Vec<FaultSpec>,
) {
    for instance in &analysis.standalone {
        out.push(FaultSpec {
            kind,
            name: instance.name.clone(),
            namespace: namespace.to_string(),
            target: FaultTarget::Instance(instance.name.clone()),
            mode: TargetMode::Single,
            duration: duration.to_string(),
            params: params.clone(),
        });
    }
}

fn group_specs(
    kind: FaultKind,
    duration: &str,
    modes: &[TargetMode],
    params: FaultParams,
    namespace: &str,
    analysis: &TopologyAnalysis,
    out: &mut Vec<FaultSpec>,
) {
    let labels: Vec<String> = analysis.groups.iter().map(|g| g.label.clone()).collect();
    for (group, base) in analysis.groups.iter().zip(unique_bases(&labels)) {
        for mode in modes {
            out.push(FaultSpec {
                kind,
                name: sized_name(&base, *mode),
                namespace: namespace.to_string(),
                target: FaultTarget::Label(group.label.clone()),
                mode: *mode,
                duration: duration.to_string(),
                params: params.clone(),
            });
        }
    }
}
