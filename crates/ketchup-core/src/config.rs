//! Collector configuration
//!
//! Read from `--config` or `~/.config/ketchup/config.yaml`. Every field has a
//! default, so an empty file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Tunables for a collection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorConfig {
    /// Maximum number of list requests in flight
    pub concurrency: usize,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Whole-run deadline; pending requests are cancelled when it passes
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub run_deadline: Option<Duration>,

    /// Items requested per list page
    pub page_size: u32,

    pub sanitize: SanitizeConfig,

    /// Replacement for the embedded signature table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures_file: Option<PathBuf>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            fetch_timeout: Duration::from_secs(30),
            run_deadline: None,
            page_size: 500,
            sanitize: SanitizeConfig::default(),
            signatures_file: None,
        }
    }
}

impl CollectorConfig {
    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/ketchup/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ketchup").join("config.yaml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(CoreError::InvalidConfig {
                message: "concurrency must be at least 1".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(CoreError::InvalidConfig {
                message: "pageSize must be at least 1".to_string(),
            });
        }
        if self.fetch_timeout.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: "fetchTimeout must be greater than zero".to_string(),
            });
        }
        let range = &self.sanitize.node_port_range;
        if range.min > range.max {
            return Err(CoreError::InvalidConfig {
                message: format!(
                    "nodePortRange min ({}) is greater than max ({})",
                    range.min, range.max
                ),
            });
        }
        Ok(())
    }
}

/// Sanitizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SanitizeConfig {
    /// Ports the API server assigns automatically
    pub node_port_range: NodePortRange,

    /// Annotation keys to drop: exact keys or `prefix*`
    pub annotation_denylist: Vec<String>,

    /// Finalizers to drop: exact names or `prefix*`
    pub finalizer_denylist: Vec<String>,

    pub on_failure: SanitizeFailurePolicy,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            node_port_range: NodePortRange::default(),
            annotation_denylist: vec![
                "kubectl.kubernetes.io/last-applied-configuration".to_string(),
                "deployment.kubernetes.io/revision".to_string(),
                "control-plane.alpha.kubernetes.io/leader".to_string(),
                "pv.kubernetes.io/*".to_string(),
                "volume.kubernetes.io/*".to_string(),
                "volume.beta.kubernetes.io/storage-provisioner".to_string(),
                "kubernetes.io/service-account.uid".to_string(),
                "field.cattle.io/publicEndpoints".to_string(),
            ],
            finalizer_denylist: vec![
                "kubernetes.io/pv-protection".to_string(),
                "kubernetes.io/pvc-protection".to_string(),
                "foregroundDeletion".to_string(),
                "orphan".to_string(),
            ],
            on_failure: SanitizeFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePortRange {
    pub min: u16,
    pub max: u16,
}

impl Default for NodePortRange {
    fn default() -> Self {
        Self {
            min: 30000,
            max: 32767,
        }
    }
}

impl NodePortRange {
    pub fn contains(&self, port: u16) -> bool {
        port >= self.min && port <= self.max
    }
}

/// What happens to a record whose sanitization fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SanitizeFailurePolicy {
    /// Write the unsanitized body, marked with an annotation
    #[default]
    IncludeRaw,
    /// Do not write the record
    Omit,
}

impl std::fmt::Display for SanitizeFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncludeRaw => write!(f, "includeRaw"),
            Self::Omit => write!(f, "omit"),
        }
    }
}

/// Match a key against a denylist of exact names and `prefix*` patterns
pub fn denylist_matches(patterns: &[String], key: &str) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    })
}
