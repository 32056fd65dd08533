//! Platform fingerprinting
//!
//! Collected records are fed one at a time into a [`DetectionAccumulator`],
//! which keeps only the facts the signature table can match on (images,
//! namespaces, label keys, CRD groups, workloads and node markers). Once
//! enumeration is over, [`DetectionAccumulator::finish`] scores those facts
//! against a [`SignatureTable`] and produces a single [`DetectionResult`].
//!
//! Detection reads raw bodies only and never fails a run: a table that matches
//! nothing yields `Unknown`/`Minimal`.

mod engine;
mod signatures;

pub use engine::DetectionAccumulator;
pub use signatures::{
    ComponentSignature, DistributionSignature, EMBEDDED_SIGNATURES, SignatureTable,
    WorkloadMarker,
};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::summary::TOOL_NAME;

/// Kubernetes distribution running the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Distribution {
    K3s,
    #[serde(rename = "RKE2")]
    Rke2,
    /// Nodes were seen but carry no distribution marker
    Standard,
    /// Nothing to decide from
    Unknown,
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::K3s => write!(f, "K3s"),
            Self::Rke2 => write!(f, "RKE2"),
            Self::Standard => write!(f, "Standard"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Step function over the confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    Minimal,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    /// Thresholds: 0.10 / 0.25 / 0.45 / 0.70
    pub fn from_score(score: f64) -> Self {
        if score >= 0.70 {
            Self::VeryHigh
        } else if score >= 0.45 {
            Self::High
        } else if score >= 0.25 {
            Self::Medium
        } else if score >= 0.10 {
            Self::Low
        } else {
            Self::Minimal
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "Minimal"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::VeryHigh => write!(f, "Very High"),
        }
    }
}

/// What part the cluster plays in a fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentClass {
    /// Runs a management component (Rancher, Fleet controller)
    Management,
    /// Managed from elsewhere (cluster agent)
    Downstream,
    /// Has resources but no fleet components
    Standalone,
    Unknown,
}

impl fmt::Display for DeploymentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Management => write!(f, "Management"),
            Self::Downstream => write!(f, "Downstream"),
            Self::Standalone => write!(f, "Standalone"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Fleet role a component implies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentRole {
    Management,
    Downstream,
    #[default]
    None,
}

/// A signature that fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedComponent {
    pub name: String,
    pub category: String,
    pub role: ComponentRole,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human readable reasons, one per fired rule
    pub evidence: Vec<String>,
}

/// Outcome of analysis for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub distribution: Distribution,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distribution_evidence: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
    pub matched_components: Vec<MatchedComponent>,
    pub raw_score: f64,
    pub max_score: f64,
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    pub deployment_class: DeploymentClass,
    /// Records the accumulator saw
    pub observed_records: usize,
}

impl DetectionResult {
    /// Result for a run with nothing to look at
    pub fn empty(max_score: f64) -> Self {
        Self {
            distribution: Distribution::Unknown,
            distribution_evidence: Vec::new(),
            kubernetes_version: None,
            matched_components: Vec::new(),
            raw_score: 0.0,
            max_score,
            confidence_score: 0.0,
            confidence_level: ConfidenceLevel::Minimal,
            deployment_class: DeploymentClass::Unknown,
            observed_records: 0,
        }
    }

    pub fn component(&self, name: &str) -> Option<&MatchedComponent> {
        self.matched_components.iter().find(|c| c.name == name)
    }
}

/// Header of the analysis document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisInfo {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub version: String,
    /// `embedded` or the path of the signature file
    pub signatures: String,
}

/// Document written next to the collection summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub analysis_info: AnalysisInfo,
    #[serde(flatten)]
    pub result: DetectionResult,
}

impl AnalysisReport {
    pub fn new(result: DetectionResult, signatures: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            analysis_info: AnalysisInfo {
                timestamp,
                tool: TOOL_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                signatures: signatures.into(),
            },
            result,
        }
    }

    /// Parse an analysis document (YAML or JSON)
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}
