//! Signature table: what each component and distribution looks like

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::{ComponentRole, Distribution};
use crate::error::{CoreError, Result};

/// Table compiled into the binary
pub const EMBEDDED_SIGNATURES: &str = include_str!("signatures.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureTable {
    /// Raw score that maps to full confidence
    pub max_score: f64,
    /// In precedence order
    #[serde(default)]
    pub distributions: Vec<DistributionSignature>,
    #[serde(default)]
    pub components: Vec<ComponentSignature>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSignature {
    pub name: Distribution,
    pub weight: f64,
    /// Prefixes of node label or annotation keys
    #[serde(default)]
    pub node_key_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet_version_pattern: Option<String>,
    #[serde(default)]
    pub cluster_roles: Vec<String>,
    #[serde(default)]
    pub config_maps: Vec<ObjectRef>,
    #[serde(skip)]
    kubelet_regex: Option<Regex>,
}

impl DistributionSignature {
    pub fn kubelet_version_matches(&self, version: &str) -> bool {
        self.kubelet_regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(version))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSignature {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub role: ComponentRole,
    pub weight: f64,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub label_keys: Vec<String>,
    #[serde(default)]
    pub crd_groups: Vec<String>,
    #[serde(default)]
    pub workloads: Vec<WorkloadMarker>,
}

/// A Deployment, DaemonSet or StatefulSet in a given namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadMarker {
    pub namespace: String,
    /// Exact workload name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
}

impl WorkloadMarker {
    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        if self.namespace != namespace {
            return false;
        }
        match (&self.name, &self.name_prefix) {
            (Some(exact), _) => exact == name,
            (None, Some(prefix)) => name.starts_with(prefix.as_str()),
            (None, None) => true,
        }
    }
}

impl SignatureTable {
    /// The table shipped with the binary
    pub fn embedded() -> Result<Self> {
        Self::parse(EMBEDDED_SIGNATURES)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut table: Self = serde_yaml::from_str(content)?;
        table.compile()?;
        Ok(table)
    }

    /// Validate the table and compile its patterns
    fn compile(&mut self) -> Result<()> {
        if !(self.max_score.is_finite() && self.max_score > 0.0) {
            return Err(invalid("maxScore must be a positive number"));
        }

        let mut seen = HashSet::new();
        for distribution in &mut self.distributions {
            if matches!(distribution.name, Distribution::Standard | Distribution::Unknown) {
                return Err(invalid(format!(
                    "'{}' cannot be used as a distribution signature",
                    distribution.name
                )));
            }
            if !seen.insert(distribution.name.to_string()) {
                return Err(invalid(format!(
                    "distribution '{}' is defined twice",
                    distribution.name
                )));
            }
            check_weight(&distribution.name.to_string(), distribution.weight)?;
            distribution.kubelet_regex = distribution
                .kubelet_version_pattern
                .as_deref()
                .map(Regex::new)
                .transpose()
                .map_err(|e| {
                    invalid(format!(
                        "distribution '{}' has an invalid kubelet version pattern: {}",
                        distribution.name, e
                    ))
                })?;
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if component.name.trim().is_empty() {
                return Err(invalid("component name cannot be empty"));
            }
            if !seen.insert(component.name.as_str()) {
                return Err(invalid(format!(
                    "component '{}' is defined twice",
                    component.name
                )));
            }
            check_weight(&component.name, component.weight)?;
            let has_rules = !component.images.is_empty()
                || !component.namespaces.is_empty()
                || !component.label_keys.is_empty()
                || !component.crd_groups.is_empty()
                || !component.workloads.is_empty();
            if !has_rules {
                return Err(invalid(format!(
                    "component '{}' has no match rules",
                    component.name
                )));
            }
        }

        Ok(())
    }
}

fn check_weight(name: &str, weight: f64) -> Result<()> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("'{name}' has a negative or invalid weight")))
    }
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidSignatures {
        message: message.into(),
    }
}

/// Repository part of an image reference, without tag or digest
///
/// - "registry.suse.com/suse/sles:15.6" -> "registry.suse.com/suse/sles"
/// - "localhost:5000/app@sha256:ab" -> "localhost:5000/app"
pub(crate) fn image_repository(image: &str) -> &str {
    let image = image.split('@').next().unwrap_or(image);
    match image.rfind(':') {
        Some(colon) if !image[colon..].contains('/') => &image[..colon],
        _ => image,
    }
}

/// Tag of an image when it looks like a release version (`v1.2.3`)
pub(crate) fn image_version(image: &str) -> Option<&str> {
    let image = image.split('@').next().unwrap_or(image);
    let colon = image.rfind(':')?;
    let tag = &image[colon + 1..];
    (tag.starts_with('v') && tag.contains('.') && !tag.contains('/')).then_some(tag)
}

/// Match an image against a pattern from the table
pub(crate) fn image_matches(pattern: &str, image: &str) -> bool {
    let repository = image_repository(image);
    match pattern.strip_suffix('*') {
        Some(prefix) => {
            repository.starts_with(prefix) || repository.contains(&format!("/{prefix}"))
        }
        None => repository == pattern || repository.ends_with(&format!("/{pattern}")),
    }
}

/// Match a CRD group: exact, or `*.suffix`
pub(crate) fn group_matches(pattern: &str, group: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => group.ends_with(&format!(".{suffix}")),
        None => pattern == group,
    }
}

/// Match a label key: exact, or `prefix*`
pub(crate) fn key_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}
