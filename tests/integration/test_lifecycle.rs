use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use havoc::cluster::{ChaosCondition, ConditionStatus, ConditionType};
use havoc::error::{ExperimentError, LifecycleError};
use havoc::lifecycle::{ChaosAction, CreateOutcome, LifecycleOptions};
use havoc::{ChaosListener, ChaosStatus, DashboardAnnotator, FaultKind, LifecycleController, ManifestChaos};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::{write_experiment, ClusterCall, MockAnnotator, MockCluster, RecordingListener};

/// Action that only counts how often it was asked to create
struct CountingAction {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingAction {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChaosAction for CountingAction {
    async fn create(&self) -> havoc::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExperimentError::Apply {
                kind: FaultKind::Failure,
                name: "db-0".to_string(),
                namespace: "chaos".to_string(),
                source: havoc::error::ClusterError::CommandFailed {
                    command: "kubectl apply".to_string(),
                    status: 1,
                    stderr: "forbidden".to_string(),
                },
            }
            .into());
        }
        Ok(())
    }

    fn name(&self) -> String {
        "counting".to_string()
    }
}

fn options(delay: Duration, listeners: Vec<Arc<dyn ChaosListener>>) -> LifecycleOptions {
    LifecycleOptions {
        description: "lifecycle test".to_string(),
        delay,
        listeners,
    }
}

fn conditions(injected: bool, recovered: bool, paused: bool) -> Vec<ChaosCondition> {
    let status = |on: bool| if on { ConditionStatus::True } else { ConditionStatus::False };
    vec![
        ChaosCondition::new(ConditionType::Selected, ConditionStatus::True),
        ChaosCondition::new(ConditionType::AllInjected, status(injected)),
        ChaosCondition::new(ConditionType::AllRecovered, status(recovered)),
        ChaosCondition::new(ConditionType::Paused, status(paused)),
    ]
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_delay_deletes() -> Result<()> {
    crate::init_test_environment();
    let action = CountingAction::new(false);
    let listener = Arc::new(RecordingListener::new());
    let lifecycle = LifecycleController::new(action.clone(), options(Duration::from_secs(10), vec![listener.clone()]));
    let cancel = CancellationToken::new();

    let handle = lifecycle.create_async(cancel.clone());
    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();

    assert_eq!(handle.outcome().await?, CreateOutcome::Cancelled);
    assert_eq!(lifecycle.status(), ChaosStatus::Deleted);
    assert_eq!(action.calls(), 0);
    assert!(listener.events().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_create_after_delay_notifies() -> Result<()> {
    crate::init_test_environment();
    let action = CountingAction::new(false);
    let listener = Arc::new(RecordingListener::new());
    let lifecycle = LifecycleController::new(action.clone(), options(Duration::from_secs(10), vec![listener.clone()]));

    let started = tokio::time::Instant::now();
    let outcome = lifecycle.create_async(CancellationToken::new()).outcome().await?;

    assert_eq!(outcome, CreateOutcome::Created);
    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(action.calls(), 1);
    assert_eq!(listener.entries(), vec![("created".to_string(), ChaosStatus::Created)]);
    assert!(lifecycle.snapshot().created_at.is_some());

    // Cancelling once created has no effect
    assert!(!lifecycle.cancel());
    assert_eq!(lifecycle.status(), ChaosStatus::Created);
    Ok(())
}

#[tokio::test]
async fn test_failed_creation_reports_and_stays_pending() -> Result<()> {
    crate::init_test_environment();
    let listener = Arc::new(RecordingListener::new());
    let lifecycle = LifecycleController::new(CountingAction::new(true), options(Duration::ZERO, vec![listener.clone()]));

    let err = lifecycle.create_sync(&CancellationToken::new()).await.unwrap_err();

    match err {
        LifecycleError::CreationFailed { reason } => assert!(reason.contains("forbidden"), "{}", reason),
        other => panic!("expected creation failure, got {:?}", other),
    }
    assert_eq!(lifecycle.status(), ChaosStatus::Pending);
    assert_eq!(listener.entries(), vec![("creation_failed".to_string(), ChaosStatus::Pending)]);
    Ok(())
}

#[tokio::test]
async fn test_failing_listener_does_not_block_others() -> Result<()> {
    crate::init_test_environment();
    let failing = Arc::new(RecordingListener::failing());
    let healthy = Arc::new(RecordingListener::new());
    let lifecycle = LifecycleController::new(
        CountingAction::new(false),
        options(Duration::ZERO, vec![failing.clone(), healthy.clone()]),
    );

    lifecycle.create_sync(&CancellationToken::new()).await?;
    lifecycle.observe(Ok(conditions(true, false, false))).await?;

    assert_eq!(failing.events(), vec!["created", "started"]);
    assert_eq!(healthy.events(), vec!["created", "started"]);
    assert_eq!(lifecycle.status(), ChaosStatus::Started);
    Ok(())
}

#[tokio::test]
async fn test_pause_and_resume() -> Result<()> {
    crate::init_test_environment();
    let listener = Arc::new(RecordingListener::new());
    let lifecycle = LifecycleController::new(CountingAction::new(false), options(Duration::ZERO, vec![listener.clone()]));
    lifecycle.create_sync(&CancellationToken::new()).await?;

    assert_eq!(lifecycle.observe(Ok(conditions(true, false, false))).await?, ChaosStatus::Started);
    assert_eq!(lifecycle.observe(Ok(conditions(true, false, true))).await?, ChaosStatus::Paused);
    assert_eq!(lifecycle.observe(Ok(conditions(true, false, false))).await?, ChaosStatus::Started);
    assert_eq!(lifecycle.observe(Ok(conditions(false, true, false))).await?, ChaosStatus::Ended);

    assert_eq!(listener.events(), vec!["created", "started", "paused", "started", "ended"]);

    // Terminal states ignore further observations
    assert_eq!(lifecycle.observe(Ok(conditions(true, false, false))).await?, ChaosStatus::Ended);
    Ok(())
}

#[tokio::test]
async fn test_manifest_chaos_annotates_dashboard() -> Result<()> {
    crate::init_test_environment();
    let temp = TempDir::new()?;
    let experiment = write_experiment(temp.path(), FaultKind::Latency, "api-0", "chaos")?;
    let cluster = Arc::new(MockCluster::new());
    cluster.push_conditions(conditions(true, false, false));
    cluster.push_conditions(conditions(false, true, false));

    let annotator = Arc::new(MockAnnotator::new());
    let dashboard: Arc<dyn ChaosListener> = Arc::new(DashboardAnnotator::new(annotator.clone(), "board"));
    let chaos = Arc::new(ManifestChaos::new(cluster.clone(), experiment.clone()));
    let lifecycle = LifecycleController::new(chaos.clone(), options(Duration::ZERO, vec![dashboard]));

    lifecycle.create_sync(&CancellationToken::new()).await?;
    assert_eq!(lifecycle.observe(chaos.conditions().await).await?, ChaosStatus::Started);
    assert_eq!(lifecycle.observe(chaos.conditions().await).await?, ChaosStatus::Ended);
    chaos.remove().await?;

    let annotations = annotator.annotations();
    assert_eq!(annotations.len(), 2);
    assert!(annotations[0].text.contains("<h4>latency Started</h4>"));
    assert!(annotations[1].text.contains("<h4>latency Ended</h4>"));
    assert!(annotations[1].text.contains("Name: latency-api-0"));
    assert_eq!(annotations[0].tags, vec!["havoc", "latency"]);

    let calls = cluster.calls();
    assert_eq!(calls[0], ClusterCall::Apply { path: experiment.path.clone() });
    assert_eq!(
        calls.last(),
        Some(&ClusterCall::Delete {
            namespace: Some("chaos".to_string()),
            resource: "networkchaos.chaos-mesh.org".to_string(),
            name: "latency-api-0".to_string(),
        })
    );
    Ok(())
}

#[tokio::test]
async fn test_observation_error_marks_unknown() -> Result<()> {
    crate::init_test_environment();
    let temp = TempDir::new()?;
    let experiment = write_experiment(temp.path(), FaultKind::Cpu, "worker-0", "chaos")?;
    let cluster = Arc::new(MockCluster::new());
    cluster.push_observation_error();

    let listener = Arc::new(RecordingListener::new());
    let chaos = Arc::new(ManifestChaos::new(cluster.clone(), experiment));
    let lifecycle = LifecycleController::new(chaos.clone(), options(Duration::ZERO, vec![listener.clone()]));

    lifecycle.create_sync(&CancellationToken::new()).await?;
    assert_eq!(lifecycle.observe(chaos.conditions().await).await?, ChaosStatus::Unknown);
    assert_eq!(listener.events(), vec!["created", "status_unknown"]);
    Ok(())
}

/// Action whose creation takes a while, like a slow admission webhook
struct SlowAction {
    took: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl ChaosAction for SlowAction {
    async fn create(&self) -> havoc::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.took).await;
        Ok(())
    }

    fn name(&self) -> String {
        "slow".to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_delay_does_not_interrupt_creation() -> Result<()> {
    crate::init_test_environment();
    let action = Arc::new(SlowAction { took: Duration::from_secs(5), calls: AtomicUsize::new(0) });
    let listener = Arc::new(RecordingListener::new());
    let lifecycle = LifecycleController::new(action.clone(), options(Duration::from_secs(1), vec![listener.clone()]));
    let cancel = CancellationToken::new();

    let handle = lifecycle.create_async(cancel.clone());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!lifecycle.cancel());
    cancel.cancel();

    assert_eq!(handle.outcome().await?, CreateOutcome::Created);
    assert_eq!(action.calls.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.status(), ChaosStatus::Created);
    assert_eq!(listener.events(), vec!["created"]);
    Ok(())
}
