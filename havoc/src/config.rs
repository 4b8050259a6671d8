//! Configuration management for havoc
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `HAVOC__`-prefixed environment variables (`HAVOC__MONKEY__MODE=rand`).
//! Dashboard credentials are always taken from `GRAFANA_URL`,
//! `GRAFANA_TOKEN` and `DASHBOARD_NAME` so they never have to live in a file.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::experiment::FaultKind;
use crate::monkey::MonkeyMode;

pub const DEFAULT_EXPERIMENTS_DIR: &str = "havoc-experiments";
pub const DEFAULT_MONKEY_TEMP_DIR: &str = "havoc-monkey-temp-dir";
pub const DEFAULT_GROUP_PERCENTAGE: u32 = 30;
pub const DEFAULT_FAULT_DURATION: &str = "1m";
pub const DEFAULT_NETWORK_LATENCY: &str = "500ms";
pub const DEFAULT_STRESS_MEMORY_AMOUNT: &str = "512MB";
pub const DEFAULT_STRESS_WORKERS: u32 = 1;
pub const DEFAULT_STRESS_CPU_LOAD: u32 = 100;
pub const DEFAULT_PARTITION_LABEL: &str = "havoc-network-group";
pub const DEFAULT_REWIND_BLOCKS_BACK: u32 = 10;
pub const DEFAULT_APPLY_TIMEOUT: &str = "3m";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HavocConfig {
    /// Directory generated experiments are written to
    pub dir: PathBuf,

    /// Optional `kubectl -l` filter applied when listing pods
    pub namespace_label_filter: Option<String>,

    /// Pods whose name contains any of these substrings are ignored
    pub ignore_pods: Vec<String>,

    /// Labels matching (exactly or by substring) any of these never form a group
    pub ignore_group_labels: Vec<String>,

    /// Fault kinds to generate, in the order the monkey walks them
    pub experiment_kinds: Vec<FaultKind>,

    pub failure: FailureConfig,
    pub latency: LatencyConfig,
    pub stress_memory: StressMemoryConfig,
    pub stress_cpu: StressCpuConfig,
    pub network_partition: NetworkPartitionConfig,
    pub external_targets: ExternalTargetsConfig,
    pub rewind: RewindConfig,
    pub monkey: MonkeyConfig,
    pub grafana: GrafanaConfig,
    pub logging: LoggingConfig,
}

/// Pod failure configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    pub duration: String,
    pub group_percentage: Vec<u32>,
    pub group_fixed: Vec<u32>,
}

/// Network latency configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub duration: String,
    /// Injected delay, e.g. `300ms`
    pub latency: String,
    pub group_percentage: Vec<u32>,
    pub group_fixed: Vec<u32>,
}

/// Memory stress configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressMemoryConfig {
    pub duration: String,
    pub workers: u32,
    /// Amount per worker, e.g. `256MB` or `25%`
    pub memory: String,
    pub group_percentage: Vec<u32>,
    pub group_fixed: Vec<u32>,
}

/// CPU stress configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressCpuConfig {
    pub duration: String,
    pub workers: u32,
    /// Load per worker in percent
    pub load: u32,
    pub group_percentage: Vec<u32>,
    pub group_fixed: Vec<u32>,
}

/// Network partition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkPartitionConfig {
    /// Label substring marking a label as partition-eligible; empty disables partitions
    pub label: String,
    pub duration: String,
    pub group_percentage: Vec<u32>,
    pub group_fixed: Vec<u32>,
}

/// External targets partition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalTargetsConfig {
    pub duration: String,
    pub urls: Vec<String>,
}

/// Custom rewind configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewindConfig {
    pub duration: String,
    /// How far back the target rewinds its head
    pub blocks_back: u32,
}

/// Chaos monkey configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonkeyConfig {
    /// Pre-generated experiments dir; generated on the fly when unset
    pub dir: Option<PathBuf>,
    /// Total run duration
    pub duration: String,
    /// Pause between two applications
    pub cooldown: String,
    /// `seq` or `rand`
    pub mode: String,
    /// Bound on waiting for a single experiment to recover
    pub apply_timeout: String,
}

/// Grafana dashboard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrafanaConfig {
    pub url: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub dashboard_uid: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for HavocConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_EXPERIMENTS_DIR),
            namespace_label_filter: None,
            ignore_pods: Vec::new(),
            ignore_group_labels: Vec::new(),
            experiment_kinds: FaultKind::RECOMMENDED.to_vec(),
            failure: FailureConfig::default(),
            latency: LatencyConfig::default(),
            stress_memory: StressMemoryConfig::default(),
            stress_cpu: StressCpuConfig::default(),
            network_partition: NetworkPartitionConfig::default(),
            external_targets: ExternalTargetsConfig::default(),
            rewind: RewindConfig::default(),
            monkey: MonkeyConfig::default(),
            grafana: GrafanaConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FAULT_DURATION.to_string(),
            group_percentage: vec![DEFAULT_GROUP_PERCENTAGE],
            group_fixed: Vec::new(),
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FAULT_DURATION.to_string(),
            latency: DEFAULT_NETWORK_LATENCY.to_string(),
            group_percentage: vec![DEFAULT_GROUP_PERCENTAGE],
            group_fixed: Vec::new(),
        }
    }
}

impl Default for StressMemoryConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FAULT_DURATION.to_string(),
            workers: DEFAULT_STRESS_WORKERS,
            memory: DEFAULT_STRESS_MEMORY_AMOUNT.to_string(),
            group_percentage: vec![DEFAULT_GROUP_PERCENTAGE],
            group_fixed: Vec::new(),
        }
    }
}

impl Default for StressCpuConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FAULT_DURATION.to_string(),
            workers: DEFAULT_STRESS_WORKERS,
            load: DEFAULT_STRESS_CPU_LOAD,
            group_percentage: vec![DEFAULT_GROUP_PERCENTAGE],
            group_fixed: Vec::new(),
        }
    }
}

impl Default for NetworkPartitionConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_PARTITION_LABEL.to_string(),
            duration: DEFAULT_FAULT_DURATION.to_string(),
            group_percentage: vec![100],
            group_fixed: Vec::new(),
        }
    }
}

impl Default for ExternalTargetsConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FAULT_DURATION.to_string(),
            urls: Vec::new(),
        }
    }
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_FAULT_DURATION.to_string(),
            blocks_back: DEFAULT_REWIND_BLOCKS_BACK,
        }
    }
}

impl Default for MonkeyConfig {
    fn default() -> Self {
        Self {
            dir: None,
            duration: "999h".to_string(),
            cooldown: "30s".to_string(),
            mode: "seq".to_string(),
            apply_timeout: DEFAULT_APPLY_TIMEOUT.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl HavocConfig {
    /// Load configuration from a TOML file, layered over defaults and environment
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound { path: path.to_string_lossy().to_string() });
        }
        let mut config = Self::build(Some(path))?;
        config.apply_credentials_env();
        config.validate()?;
        Ok(config)
    }

    /// Load defaults overridden by environment variables only
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::build(None)?;
        config.apply_credentials_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback order: file -> env -> defaults
    pub fn load_with_fallback<P: AsRef<Path>>(config_path: Option<P>) -> ConfigResult<Self> {
        match config_path {
            Some(path) if path.as_ref().exists() => Self::from_file(path),
            Some(path) => Err(ConfigError::FileNotFound {
                path: path.as_ref().to_string_lossy().to_string(),
            }),
            None => Self::from_env(),
        }
    }

    fn build(path: Option<&Path>) -> ConfigResult<Self> {
        let defaults = config::Config::try_from(&HavocConfig::default())
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;

        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("HAVOC")
                .prefix_separator("__")
                .separator("__"),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize::<HavocConfig>())
            .map_err(|e| ConfigError::ParseError { reason: e.to_string() })
    }

    /// Pull dashboard credentials from the environment, keeping file values when unset
    pub fn apply_credentials_env(&mut self) {
        if let Some(url) = non_empty_env("GRAFANA_URL") {
            self.grafana.url = Some(url);
        }
        if let Some(token) = non_empty_env("GRAFANA_TOKEN") {
            self.grafana.token = Some(token);
        }
        if let Some(dashboard) = non_empty_env("DASHBOARD_NAME") {
            self.grafana.dashboard_uid = Some(dashboard);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField { field: "dir".to_string() });
        }

        check_duration("failure.duration", &self.failure.duration)?;
        check_intensities("failure", &self.failure.group_percentage, &self.failure.group_fixed)?;

        check_duration("latency.duration", &self.latency.duration)?;
        check_duration("latency.latency", &self.latency.latency)?;
        check_intensities("latency", &self.latency.group_percentage, &self.latency.group_fixed)?;

        check_duration("stress_memory.duration", &self.stress_memory.duration)?;
        if self.stress_memory.workers == 0 {
            return Err(invalid("stress_memory.workers", "0"));
        }
        if self.stress_memory.memory.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "stress_memory.memory".to_string() });
        }
        check_intensities(
            "stress_memory",
            &self.stress_memory.group_percentage,
            &self.stress_memory.group_fixed,
        )?;

        check_duration("stress_cpu.duration", &self.stress_cpu.duration)?;
        if self.stress_cpu.workers == 0 {
            return Err(invalid("stress_cpu.workers", "0"));
        }
        if self.stress_cpu.load == 0 || self.stress_cpu.load > 100 {
            return Err(invalid("stress_cpu.load", &self.stress_cpu.load.to_string()));
        }
        check_intensities("stress_cpu", &self.stress_cpu.group_percentage, &self.stress_cpu.group_fixed)?;

        check_duration("network_partition.duration", &self.network_partition.duration)?;
        check_intensities(
            "network_partition",
            &self.network_partition.group_percentage,
            &self.network_partition.group_fixed,
        )?;

        check_duration("external_targets.duration", &self.external_targets.duration)?;
        if let Some(url) = self.external_targets.urls.iter().find(|u| u.trim().is_empty()) {
            return Err(invalid("external_targets.urls", url));
        }

        check_duration("rewind.duration", &self.rewind.duration)?;
        if self.experiment_kinds.contains(&FaultKind::Rewind) && self.rewind.blocks_back == 0 {
            return Err(invalid("rewind.blocks_back", "0"));
        }

        MonkeyMode::from_str(&self.monkey.mode).map_err(|_| invalid("monkey.mode", &self.monkey.mode))?;
        check_duration("monkey.duration", &self.monkey.duration)?;
        check_duration("monkey.cooldown", &self.monkey.cooldown)?;
        check_duration("monkey.apply_timeout", &self.monkey.apply_timeout)?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("havoc").join("havoc.toml"))
            .ok_or_else(|| ConfigError::MissingField { field: "config directory".to_string() })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|_| ConfigError::PermissionDenied { path: parent.to_string_lossy().to_string() })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError { reason: e.to_string() })?;

        fs::write(path, content)
            .map_err(|_| ConfigError::PermissionDenied { path: path.to_string_lossy().to_string() })?;

        Ok(())
    }

    /// Experiments dir the monkey reads from, if one was pre-generated
    pub fn monkey_dir(&self) -> Option<&Path> {
        self.monkey.dir.as_deref()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn invalid(field: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue { field: field.to_string(), value: value.to_string() }
}

fn check_duration(field: &str, value: &str) -> ConfigResult<()> {
    parse_duration(value).map(|_| ()).map_err(|_| invalid(field, value))
}

fn check_intensities(section: &str, percentage: &[u32], fixed: &[u32]) -> ConfigResult<()> {
    if let Some(p) = percentage.iter().find(|p| **p == 0 || **p > 100) {
        return Err(invalid(&format!("{}.group_percentage", section), &p.to_string()));
    }
    if fixed.contains(&0) {
        return Err(invalid(&format!("{}.group_fixed", section), "0"));
    }
    for (field, values) in [("group_percentage", percentage), ("group_fixed", fixed)] {
        let mut seen = BTreeSet::new();
        if let Some(repeated) = values.iter().find(|v| !seen.insert(**v)) {
            return Err(invalid(&format!("{}.{}", section, field), &repeated.to_string()));
        }
    }
    Ok(())
}

/// Parse a Go-style duration such as `1h30m`, `5s`, `300ms` or `0`
pub fn parse_duration(value: &str) -> ConfigResult<Duration> {
    let err = || ConfigError::InvalidDuration { value: value.to_string() };
    let s = value.trim();
    if s.is_empty() {
        return Err(err());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(err)?;
        if num_end == 0 {
            return Err(err());
        }
        let number: f64 = rest[..num_end].parse().map_err(|_| err())?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_end] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(err()),
        };
        total += number * nanos_per_unit;
        rest = &rest[unit_end..];
    }

    Ok(Duration::from_nanos(total.round() as u64))
}
