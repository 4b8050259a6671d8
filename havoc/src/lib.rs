//! Havoc chaos experiment library
//!
//! This library discovers the pod topology of a Kubernetes namespace,
//! generates Chaos Mesh experiments for single pods, label groups,
//! network partitions and external targets, and runs them as a chaos
//! monkey while annotating a Grafana dashboard.

pub mod config;
pub mod error;
pub mod topology;
pub mod experiment;
pub mod templates;
pub mod generate;
pub mod store;
pub mod cluster;
pub mod annotate;
pub mod runner;
pub mod lifecycle;
pub mod listeners;
pub mod monkey;
pub mod controller;

// Re-export commonly used types
pub use config::HavocConfig;
pub use error::{HavocError, Result};
pub use topology::{analyze, Instance, Label, TopologyAnalysis, TopologyRules};
pub use experiment::{FaultKind, FaultSpec, TargetMode};
pub use generate::{sanitize_label, url_hash, FaultCollection, Generator};
pub use store::{NamedExperiment, SpecStore};
pub use cluster::{ClusterClient, Kubectl};
pub use annotate::{Annotation, Annotator, GrafanaClient};
pub use runner::ExperimentRunner;
pub use lifecycle::{ChaosListener, ChaosStatus, LifecycleController, ManifestChaos};
pub use listeners::DashboardAnnotator;
pub use monkey::{ChaosMonkey, ExperimentAction, MonkeyMode};
pub use controller::Controller;
