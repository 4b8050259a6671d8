use std::collections::BTreeSet;

use havoc::error::TopologyError;
use havoc::{analyze, HavocConfig, TopologyRules};

use crate::{pod, three_pod_namespace};

#[test]
fn test_shared_label_forms_one_group() {
    crate::test_setup!();
    let pods = vec![
        pod("web-0", &[("tier", "web")]),
        pod("web-1", &[("tier", "web")]),
        pod("web-2", &[("tier", "web")]),
        pod("web-3", &[("tier", "web")]),
        pod("cache-0", &[("tier", "cache")]),
    ];

    let analysis = analyze("shop", pods, &TopologyRules::default()).unwrap();

    assert_eq!(analysis.groups.len(), 1);
    let group = &analysis.groups[0];
    assert_eq!(group.label, "'tier': 'web'");
    assert_eq!(group.members.len(), 4);
    for member in &group.members {
        assert!(analysis.standalone.iter().all(|i| &i.name != member));
    }
    let standalone: Vec<_> = analysis.standalone.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(standalone, vec!["cache-0"]);
}

#[test]
fn test_partition_pairs_are_unique() {
    crate::test_setup!();
    let config = HavocConfig::default();
    let marker = config.network_partition.label.clone();
    let zones = ["zone-a", "zone-b", "zone-c", "zone-d"];
    let pods = zones
        .iter()
        .enumerate()
        .map(|(i, zone)| pod(&format!("node-{}", i), &[(marker.as_str(), zone)]))
        .collect();

    let analysis = analyze("net", pods, &TopologyRules::from_config(&config)).unwrap();

    let p = zones.len();
    assert_eq!(analysis.partition_pairs.len(), p * (p - 1) / 2);

    let mut seen = BTreeSet::new();
    for pair in &analysis.partition_pairs {
        assert_ne!(pair.first, pair.second);
        let key = if pair.first < pair.second {
            (pair.first.clone(), pair.second.clone())
        } else {
            (pair.second.clone(), pair.first.clone())
        };
        assert!(seen.insert(key), "pair repeated: {:?}", pair);
    }
    // Partition labels never double as groups
    assert!(analysis.groups.is_empty());
}

#[test]
fn test_ignore_rules() {
    crate::test_setup!();
    let mut pods = three_pod_namespace();
    pods.push(pod("sidecar-injector-0", &[("app", "x")]));
    pods.push(pod("chart-a", &[("chart", "v1")]));
    pods.push(pod("chart-b", &[("chart", "v1")]));

    let rules = TopologyRules {
        ignore_pods: vec!["sidecar".to_string()],
        ignore_group_labels: vec!["chart".to_string()],
        partition_marker: String::new(),
    };
    let analysis = analyze("ns", pods, &rules).unwrap();

    let labels: Vec<_> = analysis.group_labels().collect();
    assert_eq!(labels, vec!["'app': 'x'"]);
    assert_eq!(analysis.groups[0].members, vec!["app-1", "app-2"]);
    let standalone: Vec<_> = analysis.standalone.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(standalone, vec!["chart-a", "chart-b", "db-0"]);
}

#[test]
fn test_everything_ignored_is_empty() {
    crate::test_setup!();
    let rules = TopologyRules {
        ignore_pods: vec!["app".to_string(), "db".to_string()],
        ..TopologyRules::default()
    };

    let err = analyze("ns", three_pod_namespace(), &rules).unwrap_err();
    assert!(matches!(err, TopologyError::Empty { ref namespace } if namespace == "ns"));

    let err = analyze("void", Vec::new(), &TopologyRules::default()).unwrap_err();
    assert!(matches!(err, TopologyError::Empty { .. }));
}
