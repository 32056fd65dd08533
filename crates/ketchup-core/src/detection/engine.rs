use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use super::signatures::{group_matches, image_matches, image_version, key_matches};
use super::{
    ComponentRole, ConfidenceLevel, DeploymentClass, DetectionResult, Distribution,
    MatchedComponent, SignatureTable,
};
use crate::record::ResourceRecord;

/// Pod spec locations inside the kinds that carry one
const POD_SPEC_PATHS: &[&str] = &[
    "/spec",
    "/spec/template/spec",
    "/spec/jobTemplate/spec/template/spec",
];

const CONTAINER_LISTS: &[&str] = &["containers", "initContainers", "ephemeralContainers"];

const WORKLOAD_KINDS: &[&str] = &["Deployment", "DaemonSet", "StatefulSet"];

/// Facts gathered from raw records while a run is in progress
#[derive(Debug, Default, Clone)]
pub struct DetectionAccumulator {
    records: usize,
    /// image -> first record it was seen on
    images: BTreeMap<String, String>,
    namespaces: BTreeSet<String>,
    /// label key -> first record it was seen on
    label_keys: BTreeMap<String, String>,
    /// CRD group -> number of CRDs
    crd_groups: BTreeMap<String, usize>,
    /// (namespace, name) -> kind
    workloads: BTreeMap<(String, String), String>,
    nodes: BTreeSet<String>,
    /// node label/annotation key -> node
    node_keys: BTreeMap<String, String>,
    /// kubelet version -> node
    kubelet_versions: BTreeMap<String, String>,
    cluster_roles: BTreeSet<String>,
    config_maps: BTreeSet<(String, String)>,
}

impl DetectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the facts one resource contributes
    pub fn observe(&mut self, record: &ResourceRecord) {
        self.records += 1;
        let body = &record.raw;
        let display = record.display_name();

        if !record.namespace.is_empty() {
            self.namespaces.insert(record.namespace.clone());
        }

        if let Some(labels) = body.pointer("/metadata/labels").and_then(Value::as_object) {
            for key in labels.keys() {
                self.label_keys
                    .entry(key.clone())
                    .or_insert_with(|| display.clone());
            }
        }

        for path in POD_SPEC_PATHS {
            let Some(pod_spec) = body.pointer(path) else {
                continue;
            };
            for list in CONTAINER_LISTS {
                let containers = pod_spec.get(*list).and_then(Value::as_array);
                for container in containers.into_iter().flatten() {
                    if let Some(image) = container.get("image").and_then(Value::as_str) {
                        self.images
                            .entry(image.to_string())
                            .or_insert_with(|| display.clone());
                    }
                }
            }
        }

        match record.kind.as_str() {
            "Namespace" => {
                self.namespaces.insert(record.name.clone());
            }
            "CustomResourceDefinition" => {
                if let Some(group) = body.pointer("/spec/group").and_then(Value::as_str) {
                    *self.crd_groups.entry(group.to_string()).or_default() += 1;
                }
            }
            "Node" => {
                self.nodes.insert(record.name.clone());
                for section in ["labels", "annotations"] {
                    let keys = body
                        .pointer(&format!("/metadata/{section}"))
                        .and_then(Value::as_object);
                    for key in keys.into_iter().flat_map(|m| m.keys()) {
                        self.node_keys
                            .entry(key.clone())
                            .or_insert_with(|| record.name.clone());
                    }
                }
                if let Some(version) = body
                    .pointer("/status/nodeInfo/kubeletVersion")
                    .and_then(Value::as_str)
                {
                    self.kubelet_versions
                        .entry(version.to_string())
                        .or_insert_with(|| record.name.clone());
                }
            }
            "ClusterRole" => {
                self.cluster_roles.insert(record.name.clone());
            }
            "ConfigMap" => {
                self.config_maps
                    .insert((record.namespace.clone(), record.name.clone()));
            }
            kind if WORKLOAD_KINDS.contains(&kind) => {
                self.workloads.insert(
                    (record.namespace.clone(), record.name.clone()),
                    kind.to_string(),
                );
            }
            _ => {}
        }
    }

    /// Score the gathered facts
    ///
    /// `server_version` is the API server's reported version; when absent the
    /// kubelet version of a node is used instead.
    pub fn finish(&self, table: &SignatureTable, server_version: Option<&str>) -> DetectionResult {
        let mut result = DetectionResult::empty(table.max_score);
        result.observed_records = self.records;
        result.kubernetes_version = server_version
            .map(String::from)
            .or_else(|| self.kubelet_versions.keys().next().cloned());

        if self.records == 0 {
            return result;
        }

        let mut raw_score = 0.0;

        // Distributions are in precedence order; only the first match scores.
        let mut inferred = None;
        for signature in &table.distributions {
            let evidence = self.distribution_evidence(signature);
            if evidence.is_empty() {
                continue;
            }
            debug!(distribution = %signature.name, evidence = ?evidence, "distribution markers found");
            if inferred.is_none() {
                inferred = Some((signature, evidence));
            }
        }
        match inferred {
            Some((signature, evidence)) => {
                raw_score += signature.weight;
                result.distribution = signature.name;
                result.distribution_evidence = evidence;
            }
            None if !self.nodes.is_empty() => result.distribution = Distribution::Standard,
            None => {}
        }

        for signature in &table.components {
            let evidence = self.component_evidence(signature);
            if evidence.is_empty() {
                continue;
            }
            debug!(component = %signature.name, evidence = ?evidence, "component matched");
            raw_score += signature.weight;
            let version = self
                .images
                .keys()
                .filter(|image| signature.images.iter().any(|p| image_matches(p, image)))
                .find_map(|image| image_version(image))
                .map(String::from);
            result.matched_components.push(MatchedComponent {
                name: signature.name.clone(),
                category: signature.category.clone(),
                role: signature.role,
                weight: signature.weight,
                version,
                evidence,
            });
        }

        let has_role = |role| result.matched_components.iter().any(|c| c.role == role);
        result.deployment_class = if has_role(ComponentRole::Management) {
            DeploymentClass::Management
        } else if has_role(ComponentRole::Downstream) {
            DeploymentClass::Downstream
        } else {
            DeploymentClass::Standalone
        };

        result.raw_score = raw_score;
        result.confidence_score = (raw_score / table.max_score).min(1.0);
        result.confidence_level = ConfidenceLevel::from_score(result.confidence_score);
        result
    }

    fn distribution_evidence(&self, signature: &super::DistributionSignature) -> Vec<String> {
        let mut evidence = Vec::new();

        for prefix in &signature.node_key_prefixes {
            if let Some((key, node)) = self
                .node_keys
                .iter()
                .find(|(key, _)| key.starts_with(prefix.as_str()))
            {
                evidence.push(format!("node {node} has key {key}"));
            }
        }
        if let Some((version, node)) = self
            .kubelet_versions
            .iter()
            .find(|(version, _)| signature.kubelet_version_matches(version))
        {
            evidence.push(format!("node {node} runs kubelet {version}"));
        }
        for role in &signature.cluster_roles {
            if self.cluster_roles.contains(role) {
                evidence.push(format!("cluster role {role}"));
            }
        }
        for cm in &signature.config_maps {
            if self
                .config_maps
                .contains(&(cm.namespace.clone(), cm.name.clone()))
            {
                evidence.push(format!("config map {}/{}", cm.namespace, cm.name));
            }
        }

        evidence
    }

    fn component_evidence(&self, signature: &super::ComponentSignature) -> Vec<String> {
        let mut evidence = Vec::new();

        for pattern in &signature.images {
            if let Some((image, seen_on)) = self
                .images
                .iter()
                .find(|(image, _)| image_matches(pattern, image))
            {
                evidence.push(format!("image {image} on {seen_on}"));
            }
        }
        for namespace in &signature.namespaces {
            if self.namespaces.contains(namespace) {
                evidence.push(format!("namespace {namespace}"));
            }
        }
        for pattern in &signature.label_keys {
            if let Some((key, seen_on)) = self
                .label_keys
                .iter()
                .find(|(key, _)| key_matches(pattern, key))
            {
                evidence.push(format!("label {key} on {seen_on}"));
            }
        }
        for pattern in &signature.crd_groups {
            let matched: Vec<(&String, &usize)> = self
                .crd_groups
                .iter()
                .filter(|(group, _)| group_matches(pattern, group))
                .collect();
            if !matched.is_empty() {
                let count: usize = matched.iter().map(|(_, n)| **n).sum();
                let groups: Vec<&str> = matched.iter().map(|(g, _)| g.as_str()).collect();
                evidence.push(format!("{count} CRDs in {}", groups.join(", ")));
            }
        }
        for marker in &signature.workloads {
            if let Some(((namespace, name), kind)) = self
                .workloads
                .iter()
                .find(|((namespace, name), _)| marker.matches(namespace, name))
            {
                evidence.push(format!("{kind} {namespace}/{name}"));
            }
        }

        evidence
    }
}
