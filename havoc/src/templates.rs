//! Chaos Mesh manifest templates
//!
//! Conditional blocks open and close mid-line so Handlebars never treats them
//! as standalone statements; the rendered YAML keeps exactly the indentation
//! written here.

pub const POD_FAILURE: &str = r#"apiVersion: chaos-mesh.org/v1alpha1
kind: PodChaos
metadata:
  name: {{name}}
  namespace: {{namespace}}
  labels:
    waitLabel: {{wait_label}}
spec:
  action: pod-failure
  mode: {{mode}}
{{#if value}}  value: '{{value}}'
{{/if}}  duration: {{duration}}
  selector:
    namespaces:
      - {{namespace}}
    {{selector_key}}:
      {{selector_value}}
"#;

pub const NETWORK_DELAY: &str = r#"apiVersion: chaos-mesh.org/v1alpha1
kind: NetworkChaos
metadata:
  name: {{name}}
  namespace: {{namespace}}
  labels:
    waitLabel: {{wait_label}}
spec:
  action: delay
  mode: {{mode}}
{{#if value}}  value: '{{value}}'
{{/if}}  duration: {{duration}}
  selector:
    namespaces:
      - {{namespace}}
    {{selector_key}}:
      {{selector_value}}
  delay:
    latency: {{latency}}
  direction: from
  target:
    mode: all
    selector:
      namespaces:
        - {{namespace}}
      {{selector_key}}:
        {{selector_value}}
"#;

pub const STRESS_MEMORY: &str = r#"apiVersion: chaos-mesh.org/v1alpha1
kind: StressChaos
metadata:
  name: {{name}}
  namespace: {{namespace}}
  labels:
    waitLabel: {{wait_label}}
spec:
  mode: {{mode}}
{{#if value}}  value: '{{value}}'
{{/if}}  duration: {{duration}}
  selector:
    namespaces:
      - {{namespace}}
    {{selector_key}}:
      {{selector_value}}
  stressors:
    memory:
      workers: {{workers}}
      size: {{size}}
"#;

pub const STRESS_CPU: &str = r#"apiVersion: chaos-mesh.org/v1alpha1
kind: StressChaos
metadata:
  name: {{name}}
  namespace: {{namespace}}
  labels:
    waitLabel: {{wait_label}}
spec:
  mode: {{mode}}
{{#if value}}  value: '{{value}}'
{{/if}}  duration: {{duration}}
  selector:
    namespaces:
      - {{namespace}}
    {{selector_key}}:
      {{selector_value}}
  stressors:
    cpu:
      workers: {{workers}}
      load: {{load}}
"#;

pub const NETWORK_PARTITION: &str = r#"apiVersion: chaos-mesh.org/v1alpha1
kind: NetworkChaos
metadata:
  name: {{name}}
  namespace: {{namespace}}
  labels:
    waitLabel: {{wait_label}}
spec:
  action: partition
  mode: {{mode}}
{{#if value}}  value: '{{value}}'
{{/if}}  duration: {{duration}}
  direction: both
  selector:
    namespaces:
      - {{namespace}}
    labelSelectors:
      {{from_selector}}
  target:
    mode: {{mode}}
{{#if value}}    value: '{{value}}'
{{/if}}    selector:
      namespaces:
        - {{namespace}}
      labelSelectors:
        {{to_selector}}
"#;

pub const EXTERNAL_PARTITION: &str = r#"apiVersion: chaos-mesh.org/v1alpha1
kind: NetworkChaos
metadata:
  name: {{name}}
  namespace: {{namespace}}
  labels:
    waitLabel: {{wait_label}}
spec:
  action: partition
  mode: all
  duration: {{duration}}
  direction: to
  selector:
    namespaces:
      - {{namespace}}
  target:
    mode: all
    selector:
      namespaces:
        - {{namespace}}
  externalTargets:
    - '{{url}}'
"#;

pub const REWIND: &str = r#"apiVersion: havoc.io/v1alpha1
kind: RewindChaos
metadata:
  name: {{name}}
  namespace: {{namespace}}
  labels:
    waitLabel: {{wait_label}}
spec:
  mode: {{mode}}
  duration: {{duration}}
  blocksBack: {{blocks_back}}
  selector:
    namespaces:
      - {{namespace}}
    {{selector_key}}:
      {{selector_value}}
"#;
