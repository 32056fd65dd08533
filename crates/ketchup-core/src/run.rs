//! Run configuration
//!
//! A [`CollectionRun`] is built once from CLI flags and configuration, then
//! shared read-only by every stage of the pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Timestamp layout of run identifiers (millisecond precision)
pub const RUN_ID_FORMAT: &str = "%Y-%m-%d-%H-%M-%S-%3f";

/// Prefix shared by every run directory
pub const RUN_ID_PREFIX: &str = "ketchup";

/// Which namespaces to collect
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl NamespaceFilter {
    /// Parse a comma separated list; empty input means all namespaces
    pub fn from_list(list: &str) -> Self {
        let names: BTreeSet<String> = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if names.is_empty() {
            Self::All
        } else {
            Self::Only(names)
        }
    }

    /// Restrict the visible namespaces to this filter
    ///
    /// Returns `(targets, missing)`: the namespaces to collect and the
    /// requested names that are not visible.
    pub fn resolve(&self, visible: &BTreeSet<String>) -> (BTreeSet<String>, BTreeSet<String>) {
        match self {
            Self::All => (visible.clone(), BTreeSet::new()),
            Self::Only(requested) => {
                let targets = requested.intersection(visible).cloned().collect();
                let missing = requested.difference(visible).cloned().collect();
                (targets, missing)
            }
        }
    }
}

impl fmt::Display for NamespaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Only(names) => {
                let joined: Vec<&str> = names.iter().map(String::as_str).collect();
                write!(f, "{}", joined.join(","))
            }
        }
    }
}

/// Serialization format of resource files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
    Both,
}

/// A single on-disk encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Json,
    Yaml,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

impl OutputFormat {
    /// Encodings to write, in write order
    pub fn file_formats(self) -> &'static [FileFormat] {
        match self {
            Self::Json => &[FileFormat::Json],
            Self::Yaml => &[FileFormat::Yaml],
            Self::Both => &[FileFormat::Yaml, FileFormat::Json],
        }
    }

    /// Encoding used for the summary and analysis documents
    pub fn document_format(self) -> FileFormat {
        match self {
            Self::Json => FileFormat::Json,
            Self::Yaml | Self::Both => FileFormat::Yaml,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "both" => Ok(Self::Both),
            _ => Err(CoreError::InvalidOption {
                option: "format",
                value: s.to_string(),
                expected: "json, yaml, both",
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Yaml => write!(f, "yaml"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// What to do with the run tree once it is complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// Archive, then remove the tree
    Compressed,
    /// Leave the tree, no archive
    Uncompressed,
    /// Archive and keep the tree
    #[default]
    Both,
}

impl CompressionMode {
    pub fn creates_archive(self) -> bool {
        !matches!(self, Self::Uncompressed)
    }

    pub fn keeps_tree(self) -> bool {
        !matches!(self, Self::Compressed)
    }
}

impl FromStr for CompressionMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compressed" => Ok(Self::Compressed),
            "uncompressed" => Ok(Self::Uncompressed),
            "both" => Ok(Self::Both),
            _ => Err(CoreError::InvalidOption {
                option: "compression",
                value: s.to_string(),
                expected: "compressed, uncompressed, both",
            }),
        }
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compressed => write!(f, "compressed"),
            Self::Uncompressed => write!(f, "uncompressed"),
            Self::Both => write!(f, "both"),
        }
    }
}

/// Immutable description of one collection run
#[derive(Debug, Clone)]
pub struct CollectionRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Parent directory; the run directory is created inside it
    pub output_dir: PathBuf,
    pub namespace_filter: NamespaceFilter,
    pub output_format: OutputFormat,
    pub compression: CompressionMode,
    pub include_custom_resources: bool,
    pub raw_mode: bool,
    pub detection_enabled: bool,
}

impl CollectionRun {
    /// Start a run now with default options
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::started_at(output_dir, Utc::now())
    }

    /// Start a run at a fixed instant
    pub fn started_at(output_dir: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id_for(started_at),
            started_at,
            output_dir: output_dir.into(),
            namespace_filter: NamespaceFilter::All,
            output_format: OutputFormat::default(),
            compression: CompressionMode::default(),
            include_custom_resources: false,
            raw_mode: false,
            detection_enabled: true,
        }
    }

    pub fn with_namespaces(mut self, filter: NamespaceFilter) -> Self {
        self.namespace_filter = filter;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_compression(mut self, compression: CompressionMode) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_custom_resources(mut self, include: bool) -> Self {
        self.include_custom_resources = include;
        self
    }

    pub fn with_raw_mode(mut self, raw: bool) -> Self {
        self.raw_mode = raw;
        self
    }

    pub fn with_detection(mut self, enabled: bool) -> Self {
        self.detection_enabled = enabled;
        self
    }

    /// `<output>/<run-id>`
    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(&self.run_id)
    }

    /// `<output>/<run-id>.tar.gz`
    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.tar.gz", self.run_id))
    }
}

/// Run identifier for an instant: `ketchup-YYYY-MM-DD-HH-MM-SS-mmm`
pub fn run_id_for(instant: DateTime<Utc>) -> String {
    format!("{}-{}", RUN_ID_PREFIX, instant.format(RUN_ID_FORMAT))
}

/// Default parent directory for runs
pub fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join(RUN_ID_PREFIX)
}
