use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use havoc::{analyze, sanitize_label, Controller, FaultKind, Generator, HavocConfig, SpecStore, TopologyRules};
use tempfile::TempDir;

use crate::{config_for, pod, three_pod_namespace, MockCluster};

/// Relative paths of every file below `root`, sorted
fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    out.sort();
    out
}

#[test]
fn test_three_pod_scenario() -> Result<()> {
    crate::test_setup!();
    let mut config = HavocConfig::default();
    config.experiment_kinds = vec![FaultKind::Failure, FaultKind::GroupFailure];
    config.failure.duration = "5s".to_string();

    let analysis = analyze("chaos", three_pod_namespace(), &TopologyRules::from_config(&config))?;
    let collection = Generator::new(&config).generate("chaos", &analysis)?;

    let single: Vec<_> = collection.names(FaultKind::Failure).collect();
    assert_eq!(single, vec!["db-0"]);

    let intensities = config.failure.group_percentage.len() + config.failure.group_fixed.len();
    let groups: Vec<_> = collection.names(FaultKind::GroupFailure).collect();
    assert_eq!(groups.len(), intensities);
    assert!(groups.iter().all(|name| name.starts_with("app-x-")));

    let text = collection.get(FaultKind::Failure, "db-0").unwrap();
    assert!(text.contains("name: failure-db-0"));
    assert!(text.contains("namespace: chaos"));
    assert!(text.contains("waitLabel: db-0"));
    assert!(text.contains("duration: 5s"));
    Ok(())
}

#[test]
fn test_group_manifest_targets_label() -> Result<()> {
    crate::test_setup!();
    let mut config = HavocConfig::default();
    config.experiment_kinds = vec![FaultKind::GroupFailure];
    config.failure.group_percentage = vec![50];
    config.failure.group_fixed = vec![1];

    let analysis = analyze("chaos", three_pod_namespace(), &TopologyRules::default())?;
    let collection = Generator::new(&config).generate("chaos", &analysis)?;

    let percent = collection.get(FaultKind::GroupFailure, "app-x-50-percent").unwrap();
    assert!(percent.contains("mode: fixed-percent"));
    assert!(percent.contains("value: '50'"));
    assert!(percent.contains("'app': 'x'"));

    let fixed = collection.get(FaultKind::GroupFailure, "app-x-1-fixed").unwrap();
    assert!(fixed.contains("mode: fixed\n"));
    assert!(fixed.contains("value: '1'"));
    Ok(())
}

#[test]
fn test_sanitize_is_idempotent() {
    crate::test_setup!();
    let samples = [
        "'app': 'x'",
        "'app.kubernetes.io/name': 'geth'",
        "\"quoted\": \"v1.2/3\"",
        "already-clean",
        "'': ''",
        "a.b/c: d",
    ];
    for sample in samples {
        let once = sanitize_label(sample);
        assert_eq!(sanitize_label(&once), once, "sanitize not idempotent for {:?}", sample);
        assert!(!once.contains('\''));
        assert!(!once.contains('/'));
    }
}

#[test]
fn test_generation_is_byte_identical() -> Result<()> {
    crate::test_setup!();
    let mut config = HavocConfig::default();
    config.failure.group_fixed = vec![1, 2];
    config.external_targets.urls = vec!["https://example.com".to_string()];
    let marker = config.network_partition.label.clone();

    let pods = {
        let mut pods = three_pod_namespace();
        pods.push(pod("edge-0", &[(marker.as_str(), "east")]));
        pods.push(pod("edge-1", &[(marker.as_str(), "west")]));
        pods
    };
    let rules = TopologyRules::from_config(&config);

    let first = Generator::new(&config).generate("chaos", &analyze("chaos", pods.clone(), &rules)?)?;
    let mut reversed = pods;
    reversed.reverse();
    let second = Generator::new(&config).generate("chaos", &analyze("chaos", reversed, &rules)?)?;

    assert_eq!(first, second);
    assert_eq!(first.names(FaultKind::Partition).count(), 1);
    assert_eq!(first.names(FaultKind::External).count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_controller_generation_is_reproducible() -> Result<()> {
    crate::init_test_environment();
    let temp = TempDir::new()?;
    let first_dir = temp.path().join("first");
    let second_dir = temp.path().join("second");

    let cluster = Arc::new(MockCluster::new().with_namespace("chaos", three_pod_namespace()));
    let controller = Controller::new(HavocConfig::default(), cluster);

    controller.generate_specs_into("chaos", &first_dir).await?;
    controller.generate_specs_into("chaos", &second_dir).await?;

    let first_files = files_under(&first_dir);
    assert!(!first_files.is_empty());
    assert_eq!(first_files, files_under(&second_dir));
    for file in &first_files {
        assert_eq!(fs::read(first_dir.join(file))?, fs::read(second_dir.join(file))?);
    }
    Ok(())
}

#[test]
fn test_persist_then_read_back() -> Result<()> {
    crate::test_setup!();
    let temp = TempDir::new()?;
    let config = config_for(temp.path(), &FaultKind::ALL);
    let analysis = analyze("chaos", three_pod_namespace(), &TopologyRules::from_config(&config))?;
    let collection = Generator::new(&config).generate("chaos", &analysis)?;

    let store = SpecStore::new(temp.path().join("specs"));
    store.dump(&collection)?;
    let experiments = store.read_experiments(&FaultKind::ALL)?;

    let written: BTreeSet<(FaultKind, String)> =
        collection.iter().map(|(kind, name, _)| (kind, name.to_string())).collect();
    let read: BTreeSet<(FaultKind, String)> =
        experiments.iter().map(|e| (e.kind, e.name.clone())).collect();
    assert_eq!(written, read);
    assert_eq!(experiments.len(), collection.len());

    for experiment in &experiments {
        assert_eq!(experiment.namespace.as_deref(), Some("chaos"));
        assert_eq!(Some(experiment.manifest.as_str()), collection.get(experiment.kind, &experiment.name));
    }
    Ok(())
}

#[test]
fn test_regeneration_wipes_previous_contents() -> Result<()> {
    crate::test_setup!();
    let temp = TempDir::new()?;
    let store = SpecStore::new(temp.path());
    let stale = store.kind_dir(FaultKind::Latency).join("latency-gone-0.yaml");
    fs::create_dir_all(stale.parent().unwrap())?;
    fs::write(&stale, "kind: NetworkChaos\n")?;

    let config = config_for(temp.path(), &[FaultKind::Failure]);
    let analysis = analyze("chaos", three_pod_namespace(), &TopologyRules::default())?;
    store.dump(&Generator::new(&config).generate("chaos", &analysis)?)?;

    assert!(!stale.exists());
    assert!(store.experiment_path(FaultKind::Failure, "db-0").is_file());
    Ok(())
}

#[test]
fn test_colliding_group_labels_both_persist() -> Result<()> {
    crate::test_setup!();
    let temp = TempDir::new()?;
    let pods = vec![
        pod("a-1", &[("app-x", "y")]),
        pod("a-2", &[("app-x", "y")]),
        pod("b-1", &[("app", "x-y")]),
        pod("b-2", &[("app", "x-y")]),
    ];
    let config = config_for(temp.path(), &[FaultKind::GroupFailure, FaultKind::GroupCpu]);
    let analysis = analyze("chaos", pods, &TopologyRules::from_config(&config))?;
    let collection = Generator::new(&config).generate("chaos", &analysis)?;

    let intensities = config.failure.group_percentage.len() + config.failure.group_fixed.len();
    assert_eq!(collection.names(FaultKind::GroupFailure).count(), 2 * intensities);

    let store = SpecStore::new(temp.path());
    store.dump(&collection)?;
    let names = store.list_names(FaultKind::GroupCpu)?;
    assert_eq!(names.len(), collection.names(FaultKind::GroupCpu).count());
    assert_eq!(names.iter().collect::<BTreeSet<_>>().len(), names.len());
    Ok(())
}
