//! Collection summary
//!
//! One [`CollectionSummary`] is owned by the aggregation loop of a run and
//! updated as outcomes arrive. Resource counts only move when every file of a
//! record has been written, so the summary always agrees with the tree.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SanitizeFailurePolicy;
use crate::output::OutputOrganizer;
use crate::record::{ResourceCategory, ResourceRecord, ResourceScope};
use crate::run::CollectionRun;
use crate::sanitize::{SANITIZATION_ANNOTATION, SANITIZATION_FAILED};

/// Name reported in `collectionInfo.tool`
pub const TOOL_NAME: &str = "ketchup";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub collection_info: CollectionInfo,
    pub options: OptionsEcho,
    pub totals: Totals,
    /// Written records per type name
    pub kinds: BTreeMap<String, usize>,
    /// Written records per namespace, then per type name
    pub namespaces: BTreeMap<String, BTreeMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_namespaces: Vec<String>,
    pub highlights: Vec<CategoryHighlight>,
    pub fetch: FetchStats,
    pub sanitization: SanitizationStats,
    pub writes: WriteStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedObject>,
    pub reapply_hints: Vec<String>,
    pub outputs: Outputs,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub version: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionsEcho {
    pub namespaces: String,
    pub output_format: String,
    pub compression: String,
    pub include_custom_resources: bool,
    pub raw_mode: bool,
    pub detection_enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub total: usize,
    /// Includes cluster-scoped custom resources
    pub cluster_scoped: usize,
    /// Includes namespaced custom resources
    pub namespaced: usize,
    pub custom: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryHighlight {
    pub category: String,
    pub count: usize,
    pub kinds: BTreeMap<String, usize>,
    /// Directories holding this category, relative to the run directory
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub paths: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    pub requests: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FetchFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchFailure {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Short machine-friendly reason (`forbidden`, `timeout`, ...)
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizationStats {
    /// `sanitized` or `raw`
    pub mode: String,
    pub on_failure: String,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub omitted: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStats {
    pub files: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecordFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFailure {
    pub resource: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedObject {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outputs {
    pub run_directory: String,
    /// Whether the directory is kept once the archive exists
    pub directory_kept: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    pub summary_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_file: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// No resource file was written
    pub empty: bool,
    pub deadline_exceeded: bool,
    /// Something was not collected or written
    pub partial: bool,
}

impl CollectionSummary {
    /// Fresh summary for a run, with nothing counted yet
    pub fn new(run: &CollectionRun, on_failure: SanitizeFailurePolicy) -> Self {
        let document_ext = run.output_format.document_format().extension();
        Self {
            collection_info: CollectionInfo {
                timestamp: run.started_at,
                tool: TOOL_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                run_id: run.run_id.clone(),
                server_version: None,
                duration_ms: None,
            },
            options: OptionsEcho {
                namespaces: run.namespace_filter.to_string(),
                output_format: run.output_format.to_string(),
                compression: run.compression.to_string(),
                include_custom_resources: run.include_custom_resources,
                raw_mode: run.raw_mode,
                detection_enabled: run.detection_enabled,
            },
            totals: Totals::default(),
            kinds: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            missing_namespaces: Vec::new(),
            highlights: Vec::new(),
            fetch: FetchStats::default(),
            sanitization: SanitizationStats {
                mode: if run.raw_mode { "raw" } else { "sanitized" }.to_string(),
                on_failure: on_failure.to_string(),
                processed: 0,
                succeeded: 0,
                failed: 0,
                omitted: 0,
                failures: Vec::new(),
            },
            writes: WriteStats::default(),
            skipped: Vec::new(),
            reapply_hints: Vec::new(),
            outputs: Outputs {
                run_directory: run.run_dir().display().to_string(),
                directory_kept: run.compression.keeps_tree(),
                archive: run
                    .compression
                    .creates_archive()
                    .then(|| run.archive_path().display().to_string()),
                summary_file: format!("collection-summary.{document_ext}"),
                analysis_file: run
                    .detection_enabled
                    .then(|| format!("suse-edge-analysis.{document_ext}")),
            },
            status: RunStatus::default(),
        }
    }

    pub fn set_server_version(&mut self, version: impl Into<String>) {
        self.collection_info.server_version = Some(version.into());
    }

    pub fn set_missing_namespaces<I: IntoIterator<Item = String>>(&mut self, missing: I) {
        self.missing_namespaces = missing.into_iter().collect();
        self.missing_namespaces.sort();
    }

    /// A list request completed successfully
    pub fn record_fetch_success(&mut self) {
        self.fetch.requests += 1;
        self.fetch.succeeded += 1;
    }

    /// A list request failed or was cancelled
    pub fn record_fetch_failure(
        &mut self,
        type_name: &str,
        namespace: Option<&str>,
        reason: &str,
        message: impl Into<String>,
        cancelled: bool,
    ) {
        self.fetch.requests += 1;
        if cancelled {
            self.fetch.cancelled += 1;
        } else {
            self.fetch.failed += 1;
        }
        self.fetch.failures.push(FetchFailure {
            type_name: type_name.to_string(),
            namespace: namespace.map(String::from),
            reason: reason.to_string(),
            message: message.into(),
        });
    }

    /// An object was returned but could not become a record
    pub fn record_skipped(&mut self, type_name: &str, namespace: Option<&str>, reason: impl Into<String>) {
        self.skipped.push(SkippedObject {
            type_name: type_name.to_string(),
            namespace: namespace.map(String::from),
            reason: reason.into(),
        });
    }

    pub fn record_sanitized(&mut self) {
        self.sanitization.processed += 1;
        self.sanitization.succeeded += 1;
    }

    /// Sanitization failed; `omitted` tells whether the record was dropped
    pub fn record_sanitize_failure(&mut self, record: &ResourceRecord, message: impl Into<String>, omitted: bool) {
        self.sanitization.processed += 1;
        self.sanitization.failed += 1;
        if omitted {
            self.sanitization.omitted += 1;
        }
        self.sanitization.failures.push(RecordFailure {
            resource: record.display_name(),
            message: message.into(),
        });
    }

    /// All files of a record were written
    pub fn record_written(&mut self, record: &ResourceRecord, files: usize) {
        self.writes.files += files;
        self.totals.total += 1;
        match record.scope {
            ResourceScope::Cluster => self.totals.cluster_scoped += 1,
            ResourceScope::Namespaced => {
                self.totals.namespaced += 1;
                *self
                    .namespaces
                    .entry(record.namespace.clone())
                    .or_default()
                    .entry(record.type_name.clone())
                    .or_default() += 1;
            }
        }
        if record.custom {
            self.totals.custom += 1;
        }
        *self.kinds.entry(record.type_name.clone()).or_default() += 1;

        let label = record.category().label();
        let path = slash_path(&OutputOrganizer::relative_dir(record));
        match self.highlights.iter_mut().find(|h| h.category == label) {
            Some(highlight) => {
                highlight.count += 1;
                *highlight.kinds.entry(record.kind.clone()).or_default() += 1;
                highlight.paths.insert(path);
            }
            None => {
                self.highlights.push(CategoryHighlight {
                    category: label.to_string(),
                    count: 1,
                    kinds: BTreeMap::from([(record.kind.clone(), 1)]),
                    paths: BTreeSet::from([path]),
                });
            }
        }
    }

    /// A record could not be written; no file of it remains
    pub fn record_write_failure(&mut self, record: &ResourceRecord, message: impl Into<String>) {
        self.writes.failed += 1;
        self.writes.failures.push(RecordFailure {
            resource: record.display_name(),
            message: message.into(),
        });
    }

    pub fn mark_deadline_exceeded(&mut self) {
        self.status.deadline_exceeded = true;
    }

    /// Compute derived fields; call once after the last record
    pub fn finalize(&mut self, finished_at: DateTime<Utc>) {
        let elapsed = finished_at - self.collection_info.timestamp;
        self.collection_info.duration_ms = elapsed.num_milliseconds().try_into().ok();

        self.highlights.sort_by_key(|h| category_rank(&h.category));
        self.status.empty = self.totals.total == 0;
        self.status.partial = self.status.deadline_exceeded
            || self.fetch.failed > 0
            || self.fetch.cancelled > 0
            || self.writes.failed > 0
            || self.sanitization.omitted > 0
            || !self.skipped.is_empty();
        self.reapply_hints = self.build_reapply_hints();
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a summary document (YAML or JSON)
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    fn build_reapply_hints(&self) -> Vec<String> {
        let mut hints = Vec::new();
        if self.status.empty {
            return hints;
        }

        if self.options.raw_mode {
            hints.push(
                "Collected in raw mode: objects still carry server-assigned fields and status; \
                 remove them before reapplying."
                    .to_string(),
            );
        }

        // Highlights are already in apply order
        let run_id = &self.collection_info.run_id;
        for highlight in &self.highlights {
            if highlight.paths.is_empty() {
                continue;
            }
            let targets: Vec<String> = highlight
                .paths
                .iter()
                .map(|path| format!("-f {run_id}/{path}"))
                .collect();
            hints.push(format!("kubectl apply -R {}", targets.join(" ")));
            if highlight.category == ResourceCategory::Crd.label() {
                hints.push(
                    "kubectl wait --for condition=established --timeout=60s \
                     customresourcedefinitions --all"
                        .to_string(),
                );
            }
        }

        if self.kinds.contains_key("persistentvolumeclaims") && !self.options.raw_mode {
            hints.push(
                "PersistentVolumeClaims were unbound from their volumes; make storage available \
                 before applying workloads."
                    .to_string(),
            );
        }
        if self.kinds.contains_key("secrets") {
            hints.push("Secrets are stored verbatim; treat this output as sensitive.".to_string());
        }
        let unsanitized = self.sanitization.failed - self.sanitization.omitted;
        if unsanitized > 0 {
            hints.push(format!(
                "{unsanitized} objects were written unsanitized and annotated \
                 {SANITIZATION_ANNOTATION}={SANITIZATION_FAILED}; review them by hand."
            ));
        }
        hints
    }
}

/// Relative path with `/` separators, as used in hints
fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn category_rank(label: &str) -> ResourceCategory {
    const ALL: &[ResourceCategory] = &[
        ResourceCategory::Crd,
        ResourceCategory::Namespace,
        ResourceCategory::NamespaceConfig,
        ResourceCategory::Rbac,
        ResourceCategory::Config,
        ResourceCategory::Storage,
        ResourceCategory::Network,
        ResourceCategory::Workload,
        ResourceCategory::Autoscaling,
        ResourceCategory::Infrastructure,
        ResourceCategory::CustomResource,
    ];
    ALL.iter()
        .copied()
        .find(|c| c.label() == label)
        .unwrap_or(ResourceCategory::Other)
}
