//! Fault kinds and typed fault specifications
//!
//! A [`FaultSpec`] is pure data describing one experiment. Rendering it into
//! Chaos Mesh YAML happens through the [`Renderer`], which owns the
//! Handlebars registry.

use std::fmt;
use std::str::FromStr;

use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{GenerateError, GenerateResult};
use crate::templates;

/// Closed set of fault kinds havoc knows how to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    Failure,
    GroupFailure,
    Latency,
    GroupLatency,
    Memory,
    GroupMemory,
    Cpu,
    GroupCpu,
    Partition,
    External,
    Rewind,
}

impl FaultKind {
    /// Kinds generated when the configuration does not name any
    pub const RECOMMENDED: [FaultKind; 10] = [
        FaultKind::Failure,
        FaultKind::GroupFailure,
        FaultKind::Latency,
        FaultKind::GroupLatency,
        FaultKind::Memory,
        FaultKind::GroupMemory,
        FaultKind::Cpu,
        FaultKind::GroupCpu,
        FaultKind::Partition,
        FaultKind::External,
    ];

    pub const ALL: [FaultKind; 11] = [
        FaultKind::Failure,
        FaultKind::GroupFailure,
        FaultKind::Latency,
        FaultKind::GroupLatency,
        FaultKind::Memory,
        FaultKind::GroupMemory,
        FaultKind::Cpu,
        FaultKind::GroupCpu,
        FaultKind::Partition,
        FaultKind::External,
        FaultKind::Rewind,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::Failure => "failure",
            FaultKind::GroupFailure => "group-failure",
            FaultKind::Latency => "latency",
            FaultKind::GroupLatency => "group-latency",
            FaultKind::Memory => "memory",
            FaultKind::GroupMemory => "group-memory",
            FaultKind::Cpu => "cpu",
            FaultKind::GroupCpu => "group-cpu",
            FaultKind::Partition => "partition",
            FaultKind::External => "external",
            FaultKind::Rewind => "rewind",
        }
    }

    /// Custom resource the generated manifest creates
    pub fn crd(&self) -> &'static str {
        match self {
            FaultKind::Failure | FaultKind::GroupFailure => "podchaos.chaos-mesh.org",
            FaultKind::Latency
            | FaultKind::GroupLatency
            | FaultKind::Partition
            | FaultKind::External => "networkchaos.chaos-mesh.org",
            FaultKind::Memory | FaultKind::GroupMemory | FaultKind::Cpu | FaultKind::GroupCpu => {
                "stresschaos.chaos-mesh.org"
            }
            FaultKind::Rewind => "rewindchaos.havoc.io",
        }
    }

    /// One spec per standalone instance
    pub fn is_single(&self) -> bool {
        matches!(
            self,
            FaultKind::Failure | FaultKind::Latency | FaultKind::Memory | FaultKind::Cpu | FaultKind::Rewind
        )
    }

    /// One spec per group label and intensity
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            FaultKind::GroupFailure | FaultKind::GroupLatency | FaultKind::GroupMemory | FaultKind::GroupCpu
        )
    }

    fn template(&self) -> &'static str {
        match self {
            FaultKind::Failure | FaultKind::GroupFailure => templates::POD_FAILURE,
            FaultKind::Latency | FaultKind::GroupLatency => templates::NETWORK_DELAY,
            FaultKind::Memory | FaultKind::GroupMemory => templates::STRESS_MEMORY,
            FaultKind::Cpu | FaultKind::GroupCpu => templates::STRESS_CPU,
            FaultKind::Partition => templates::NETWORK_PARTITION,
            FaultKind::External => templates::EXTERNAL_PARTITION,
            FaultKind::Rewind => templates::REWIND,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FaultKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown fault kind: {}", s))
    }
}

/// How many of the selected pods a fault hits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "kebab-case")]
pub enum TargetMode {
    Single,
    FixedCount(u32),
    FixedPercentage(u32),
}

impl TargetMode {
    /// Chaos Mesh `mode` value
    pub fn chaos_mesh_mode(&self) -> &'static str {
        match self {
            TargetMode::Single => "one",
            TargetMode::FixedCount(_) => "fixed",
            TargetMode::FixedPercentage(_) => "fixed-percent",
        }
    }

    pub fn intensity(&self) -> Option<u32> {
        match self {
            TargetMode::Single => None,
            TargetMode::FixedCount(n) | TargetMode::FixedPercentage(n) => Some(*n),
        }
    }

    /// Name suffix distinguishing the sizing policy
    pub fn suffix(&self) -> Option<&'static str> {
        match self {
            TargetMode::Single => None,
            TargetMode::FixedCount(_) => Some("fixed"),
            TargetMode::FixedPercentage(_) => Some("percent"),
        }
    }
}

/// What a fault selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultTarget {
    /// A single pod by name
    Instance(String),
    /// Every pod carrying a canonical label selector
    Label(String),
    /// Two label selectors cut off from each other
    Pair { from: String, to: String },
    /// The whole namespace
    Namespace,
}

/// Kind specific parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultParams {
    None,
    Latency { latency: String },
    Memory { workers: u32, size: String },
    Cpu { workers: u32, load: u32 },
    External { url: String },
    Rewind { blocks_back: u32 },
}

/// A fully described fault, ready to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultSpec {
    pub kind: FaultKind,
    /// Target name, unique within the kind; doubles as the wait label
    pub name: String,
    pub namespace: String,
    pub target: FaultTarget,
    pub mode: TargetMode,
    pub duration: String,
    pub params: FaultParams,
}

impl FaultSpec {
    /// Resource name of the rendered manifest, also the file stem on disk
    pub fn resource_name(&self) -> String {
        format!("{}-{}", self.kind, self.name)
    }

    fn context(&self) -> Value {
        let mut ctx = json!({
            "name": self.resource_name(),
            "namespace": self.namespace,
            "wait_label": self.name,
            "duration": self.duration,
            "mode": self.mode.chaos_mesh_mode(),
            "value": self.mode.intensity(),
        });

        match &self.target {
            FaultTarget::Instance(pod) => {
                ctx["selector_key"] = json!("fieldSelectors");
                ctx["selector_value"] = json!(format!("metadata.name: {}", pod));
            }
            FaultTarget::Label(label) => {
                ctx["selector_key"] = json!("labelSelectors");
                ctx["selector_value"] = json!(label);
            }
            FaultTarget::Pair { from, to } => {
                ctx["from_selector"] = json!(from);
                ctx["to_selector"] = json!(to);
            }
            FaultTarget::Namespace => {}
        }

        match &self.params {
            FaultParams::None => {}
            FaultParams::Latency { latency } => ctx["latency"] = json!(latency),
            FaultParams::Memory { workers, size } => {
                ctx["workers"] = json!(workers);
                ctx["size"] = json!(size);
            }
            FaultParams::Cpu { workers, load } => {
                ctx["workers"] = json!(workers);
                ctx["load"] = json!(load);
            }
            FaultParams::External { url } => ctx["url"] = json!(url),
            FaultParams::Rewind { blocks_back } => ctx["blocks_back"] = json!(blocks_back),
        }

        ctx
    }
}

/// Renders fault specs through Handlebars templates
pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        Self { registry }
    }

    /// Render a spec into manifest text
    ///
    /// Each render registers its template under a throwaway name so that a
    /// failed render never leaves a stale template behind.
    pub fn render(&mut self, spec: &FaultSpec) -> GenerateResult<String> {
        self.render_template(spec, spec.kind.template())
    }

    pub(crate) fn render_template(&mut self, spec: &FaultSpec, template: &str) -> GenerateResult<String> {
        let render_err = |reason: String| GenerateError::TemplateRender {
            kind: spec.kind,
            name: spec.name.clone(),
            reason,
        };

        let tag = Uuid::new_v4().to_string();
        self.registry
            .register_template_string(&tag, template)
            .map_err(|e| render_err(e.to_string()))?;

        let rendered = self.registry.render(&tag, &spec.context());
        self.registry.unregister_template(&tag);

        rendered.map_err(|e| render_err(e.to_string()))
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
