//! Chaos monkey scheduler
//!
//! Applies persisted experiments one at a time, sequentially or by random
//! sampling, until every experiment ran (sequential), the total duration
//! elapsed, or the run was cancelled. Each application is annotated on the
//! dashboard.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::annotate::{Annotation, Annotator, GrafanaClient, GrafanaCredentials, HAVOC_TAG};
use crate::config::{parse_duration, HavocConfig};
use crate::error::{MonkeyError, Result};
use crate::experiment::FaultKind;
use crate::runner::ExperimentRunner;
use crate::store::NamedExperiment;

/// Order in which the monkey picks experiments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonkeyMode {
    Sequential,
    Random,
}

impl FromStr for MonkeyMode {
    type Err = MonkeyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "seq" | "sequential" => Ok(MonkeyMode::Sequential),
            "rand" | "random" => Ok(MonkeyMode::Random),
            other => Err(MonkeyError::InvalidMode { mode: other.to_string() }),
        }
    }
}

/// Audit record of one application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentAction {
    pub name: String,
    pub kind: FaultKind,
    pub spec: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExperimentAction {
    fn annotation(&self, dashboard_uid: &str) -> Annotation {
        Annotation {
            dashboard_uid: dashboard_uid.to_string(),
            time: self.started_at.timestamp_millis(),
            time_end: self.ended_at.map(|t| t.timestamp_millis()),
            tags: vec![HAVOC_TAG.to_string(), self.kind.to_string()],
            text: format!("ChaosExperimentFile: {}\n<pre>{}</pre>", self.name, self.spec),
        }
    }
}

/// Timing and ordering of a monkey run
#[derive(Debug, Clone)]
pub struct MonkeySettings {
    pub mode: MonkeyMode,
    /// Total run time
    pub duration: Duration,
    /// Pause after each application
    pub cooldown: Duration,
    /// Kind order for sequential runs
    pub kinds: Vec<FaultKind>,
}

impl MonkeySettings {
    pub fn from_config(config: &HavocConfig) -> Result<Self> {
        Ok(Self {
            mode: config.monkey.mode.parse()?,
            duration: parse_duration(&config.monkey.duration)?,
            cooldown: parse_duration(&config.monkey.cooldown)?,
            kinds: config.experiment_kinds.clone(),
        })
    }
}

/// The chaos monkey
pub struct ChaosMonkey {
    runner: ExperimentRunner,
    annotator: Arc<dyn Annotator>,
    dashboard_uid: String,
    settings: MonkeySettings,
    rng: StdRng,
    cancel: CancellationToken,
    actions: Vec<ExperimentAction>,
}

impl ChaosMonkey {
    /// Fails with [`MonkeyError::MissingCredentials`] when `dashboard_uid` is blank
    pub fn new(
        runner: ExperimentRunner,
        annotator: Arc<dyn Annotator>,
        dashboard_uid: impl Into<String>,
        settings: MonkeySettings,
    ) -> Result<Self> {
        let dashboard_uid = dashboard_uid.into();
        if dashboard_uid.trim().is_empty() {
            return Err(MonkeyError::MissingCredentials { missing: "DASHBOARD_NAME".to_string() }.into());
        }
        Ok(Self {
            runner,
            annotator,
            dashboard_uid,
            settings,
            rng: StdRng::from_entropy(),
            cancel: CancellationToken::new(),
            actions: Vec::new(),
        })
    }

    /// Build a monkey posting to the Grafana configured in `config`
    pub fn from_config(config: &HavocConfig, runner: ExperimentRunner) -> Result<Self> {
        let settings = MonkeySettings::from_config(config)?;
        let credentials = GrafanaCredentials::from_config(&config.grafana)?;
        let annotator = Arc::new(GrafanaClient::from_credentials(&credentials)?);
        Self::new(runner, annotator, credentials.dashboard_uid, settings)
    }

    /// Use a seeded randomness source
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Stop the run once `cancel` fires; an in-flight application still finishes
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn actions(&self) -> &[ExperimentAction] {
        &self.actions
    }

    /// Run over `pool` and return the applications made during this run
    pub async fn run(&mut self, pool: Vec<NamedExperiment>) -> Result<Vec<ExperimentAction>> {
        let deadline = Instant::now() + self.settings.duration;
        let before = self.actions.len();
        info!(
            mode = ?self.settings.mode,
            experiments = pool.len(),
            duration = ?self.settings.duration,
            cooldown = ?self.settings.cooldown,
            "Monkey started"
        );

        match self.settings.mode {
            MonkeyMode::Sequential => self.run_sequential(pool, deadline).await?,
            MonkeyMode::Random => self.run_random(pool, deadline).await?,
        }

        Ok(self.actions[before..].to_vec())
    }

    fn sequential_order(&self, mut pool: Vec<NamedExperiment>) -> Vec<NamedExperiment> {
        let rank = |kind: FaultKind| {
            self.settings
                .kinds
                .iter()
                .position(|k| *k == kind)
                .unwrap_or(self.settings.kinds.len())
        };
        pool.sort_by_key(|e| rank(e.kind));
        pool
    }

    async fn run_sequential(&mut self, pool: Vec<NamedExperiment>, deadline: Instant) -> Result<()> {
        for experiment in self.sequential_order(pool) {
            if self.should_stop(deadline) {
                return Ok(());
            }
            self.apply_and_annotate(&experiment).await?;
            if self.should_stop(deadline) {
                return Ok(());
            }
            self.cooldown().await;
        }
        info!("Monkey has finished all scheduled experiments");
        Ok(())
    }

    async fn run_random(&mut self, pool: Vec<NamedExperiment>, deadline: Instant) -> Result<()> {
        if pool.is_empty() {
            info!("No experiments to pick from");
            return Ok(());
        }
        loop {
            if self.should_stop(deadline) {
                return Ok(());
            }
            let pick = self.rng.gen_range(0..pool.len());
            self.apply_and_annotate(&pool[pick]).await?;
            if self.should_stop(deadline) {
                return Ok(());
            }
            self.cooldown().await;
        }
    }

    fn should_stop(&self, deadline: Instant) -> bool {
        if self.cancel.is_cancelled() {
            info!("Monkey was stopped");
            return true;
        }
        if Instant::now() >= deadline {
            info!("Monkey has finished by timeout");
            return true;
        }
        false
    }

    async fn cooldown(&self) {
        info!(duration = ?self.settings.cooldown, "Cooldown between experiments");
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.settings.cooldown) => {}
        }
    }

    async fn apply_and_annotate(&mut self, experiment: &NamedExperiment) -> Result<()> {
        let mut action = ExperimentAction {
            name: experiment.resource_name(),
            kind: experiment.kind,
            spec: experiment.manifest.clone(),
            started_at: Utc::now(),
            ended_at: None,
        };
        self.runner.apply_and_wait(experiment).await?;
        action.ended_at = Some(Utc::now());

        match self.annotator.post_annotation(&action.annotation(&self.dashboard_uid)).await {
            Ok(_) => info!(
                name = %action.name,
                start = %action.started_at,
                end = ?action.ended_at,
                "Annotated experiment"
            ),
            Err(e) => warn!(error = %e, name = %action.name, "Could not annotate experiment"),
        }
        self.actions.push(action);
        Ok(())
    }
}
