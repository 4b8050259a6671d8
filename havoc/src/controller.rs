//! High level operations shared by the CLI and programmatic callers
//!
//! A [`Controller`] carries the configuration, the cluster client and a
//! tracing span; nothing in havoc relies on global state.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::annotate::{GrafanaClient, GrafanaCredentials};
use crate::cluster::ClusterClient;
use crate::config::{parse_duration, HavocConfig, DEFAULT_MONKEY_TEMP_DIR};
use crate::error::{ClusterError, MonkeyError, Result, TopologyError};
use crate::experiment::FaultKind;
use crate::generate::{FaultCollection, Generator};
use crate::lifecycle::{ChaosListener, ChaosStatus, CreateOutcome, LifecycleController, LifecycleOptions, ManifestChaos};
use crate::listeners::DashboardAnnotator;
use crate::monkey::{ChaosMonkey, ExperimentAction};
use crate::runner::ExperimentRunner;
use crate::store::{NamedExperiment, SpecStore};
use crate::topology::{analyze, TopologyAnalysis, TopologyRules};

/// Default interval between status observations of a tracked experiment
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Options for [`Controller::track_chaos_file`]
#[derive(Clone)]
pub struct TrackOptions {
    /// Delay before the manifest is applied
    pub delay: Duration,
    pub poll_interval: Duration,
    pub listeners: Vec<Arc<dyn ChaosListener>>,
}

impl Default for TrackOptions {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            listeners: Vec::new(),
        }
    }
}

/// Entry point to havoc operations
#[derive(Clone)]
pub struct Controller {
    config: Arc<HavocConfig>,
    cluster: Arc<dyn ClusterClient>,
    span: Span,
}

impl Controller {
    pub fn new(config: impl Into<Arc<HavocConfig>>, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            config: config.into(),
            cluster,
            span: info_span!("havoc"),
        }
    }

    pub fn config(&self) -> &HavocConfig {
        &self.config
    }

    pub fn store(&self) -> SpecStore {
        SpecStore::new(&self.config.dir)
    }

    /// Runner bounded by the configured apply timeout
    pub fn runner(&self) -> Result<ExperimentRunner> {
        let timeout = parse_duration(&self.config.monkey.apply_timeout)?;
        Ok(ExperimentRunner::new(self.cluster.clone()).with_timeout(timeout))
    }

    /// List and analyze the pods of `namespace`
    pub async fn read_topology(&self, namespace: &str) -> Result<TopologyAnalysis> {
        let filter = self.config.namespace_label_filter.as_deref();
        let instances = self
            .cluster
            .list_instances(namespace, filter)
            .instrument(self.span.clone())
            .await
            .map_err(|e| match e {
                ClusterError::NamespaceNotFound { namespace } => TopologyError::NamespaceNotFound { namespace },
                source => TopologyError::Unavailable { namespace: namespace.to_string(), source },
            })?;

        let rules = TopologyRules::from_config(&self.config);
        Ok(self.span.in_scope(|| analyze(namespace, instances, &rules))?)
    }

    /// Generate experiments for `namespace` into the configured dir
    pub async fn generate_specs(&self, namespace: &str) -> Result<FaultCollection> {
        self.generate_specs_into(namespace, &self.config.dir).await
    }

    /// Generate experiments for `namespace` into `dir`, replacing its contents
    pub async fn generate_specs_into(&self, namespace: &str, dir: &Path) -> Result<FaultCollection> {
        let analysis = self.read_topology(namespace).await?;
        self.span.in_scope(|| -> Result<FaultCollection> {
            let collection = Generator::new(&self.config).generate(namespace, &analysis)?;
            SpecStore::new(dir).dump(&collection)?;
            Ok(collection)
        })
    }

    /// Apply one persisted experiment, optionally waiting for it to recover
    pub async fn apply_chaos_file(&self, kind: FaultKind, name: &str, wait: bool) -> Result<NamedExperiment> {
        let experiment = self.store().read(kind, name)?;
        let runner = self.runner()?;
        let applied = if wait {
            runner.apply_and_wait(&experiment).instrument(self.span.clone()).await
        } else {
            runner.apply(&experiment).instrument(self.span.clone()).await
        };
        applied?;
        Ok(experiment)
    }

    /// Dashboard listener when Grafana credentials are configured
    pub fn dashboard_listener(&self) -> Result<Option<Arc<dyn ChaosListener>>> {
        let credentials = match GrafanaCredentials::from_config(&self.config.grafana) {
            Ok(credentials) => credentials,
            Err(_) => return Ok(None),
        };
        let client = Arc::new(GrafanaClient::from_credentials(&credentials)?);
        Ok(Some(Arc::new(DashboardAnnotator::new(client, credentials.dashboard_uid))))
    }

    /// Apply one persisted experiment through the lifecycle controller
    ///
    /// The experiment's conditions are polled until it ends, its status
    /// becomes unknown, the apply timeout passes or `cancel` fires; the
    /// resource is deleted afterwards.
    pub async fn track_chaos_file(
        &self,
        kind: FaultKind,
        name: &str,
        options: TrackOptions,
        cancel: &CancellationToken,
    ) -> Result<ChaosStatus> {
        let experiment = self.store().read(kind, name)?;
        let timeout = self.runner()?.timeout();
        let chaos = Arc::new(ManifestChaos::new(self.cluster.clone(), experiment));
        let lifecycle = LifecycleController::new(
            chaos.clone(),
            LifecycleOptions {
                description: format!("{} experiment {}", kind, name),
                delay: options.delay,
                listeners: options.listeners,
            },
        );

        let outcome = lifecycle.create_sync(cancel).instrument(self.span.clone()).await?;
        if outcome == CreateOutcome::Cancelled {
            return Ok(lifecycle.status());
        }

        let deadline = Instant::now() + timeout;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
            let status = lifecycle.observe(chaos.conditions().await).await?;
            if status.is_terminal() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(kind = %kind, name, "Experiment did not end before the apply timeout");
                break;
            }
        }

        if let Err(e) = chaos.remove().await {
            warn!(error = %e, kind = %kind, name, "Failed to delete experiment");
        }
        Ok(lifecycle.status())
    }

    /// Experiments the monkey runs: the configured monkey dir, or a fresh generation
    pub async fn monkey_pool(&self, namespace: Option<&str>) -> Result<Vec<NamedExperiment>> {
        let kinds = &self.config.experiment_kinds;
        if let Some(dir) = self.config.monkey_dir() {
            info!(dir = %dir.display(), "Reading experiments for the monkey");
            return Ok(SpecStore::new(dir).read_experiments(kinds)?);
        }

        let namespace = namespace.ok_or(MonkeyError::MissingNamespace)?;
        let dir = Path::new(DEFAULT_MONKEY_TEMP_DIR);
        self.generate_specs_into(namespace, dir).await?;
        Ok(SpecStore::new(dir).read_experiments(kinds)?)
    }

    /// Run the monkey with Grafana annotations until it finishes or `cancel` fires
    pub async fn run_monkey(&self, namespace: Option<&str>, cancel: CancellationToken) -> Result<Vec<ExperimentAction>> {
        let mut monkey = ChaosMonkey::from_config(&self.config, self.runner()?)?.with_cancellation(cancel);
        let pool = self.monkey_pool(namespace).await?;
        monkey.run(pool).instrument(self.span.clone()).await
    }
}
