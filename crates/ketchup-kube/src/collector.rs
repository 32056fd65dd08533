//! Collection runs
//!
//! [`Collector::run`] drives one run end to end: plan and list, turn each
//! returned object into a record, sanitize it, write it, feed it to
//! detection, then write the analysis and summary documents and package the
//! tree. Outcomes are consumed by a single aggregation loop, so the summary
//! and the output tree are only ever touched from one place.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use ketchup_core::detection::AnalysisReport;
use ketchup_core::output::{ANALYSIS_STEM, SUMMARY_STEM};
use ketchup_core::sanitize::mark_sanitization_failed;
use ketchup_core::{
    ArchiveInfo, CollectionRun, CollectionSummary, CollectorConfig, DetectionAccumulator,
    DetectionResult, OutputOrganizer, ResourceRecord, SanitizeFailurePolicy, Sanitizer,
    SignatureTable, create_archive,
};
use tracing::{debug, info, warn};

use crate::enumerator::{Enumerator, FetchOutcome};
use crate::error::Result;
use crate::source::ClusterSource;

/// Label used for the built-in signature table
pub const EMBEDDED_SIGNATURES_LABEL: &str = "embedded";

/// What a finished run produced
#[derive(Debug)]
pub struct RunReport {
    pub run_dir: PathBuf,
    /// False when the tree was removed after archiving
    pub directory_kept: bool,
    pub summary: CollectionSummary,
    pub summary_path: PathBuf,
    pub detection: Option<DetectionResult>,
    pub analysis_path: Option<PathBuf>,
    pub archive: Option<ArchiveInfo>,
}

/// Runs collections against one cluster source
pub struct Collector<S> {
    source: Arc<S>,
    config: CollectorConfig,
    signatures: SignatureTable,
    signatures_label: String,
}

impl<S: ClusterSource> Collector<S> {
    /// Collector using the embedded signature table
    pub fn new(source: S, config: CollectorConfig) -> Result<Self> {
        Ok(Self {
            source: Arc::new(source),
            config,
            signatures: SignatureTable::embedded()?,
            signatures_label: EMBEDDED_SIGNATURES_LABEL.to_string(),
        })
    }

    /// Replace the signature table; `label` is echoed in the analysis
    pub fn with_signatures(mut self, table: SignatureTable, label: impl Into<String>) -> Self {
        self.signatures = table;
        self.signatures_label = label.into();
        self
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Execute one collection run
    ///
    /// List failures, unusable objects and per-record write failures are
    /// recorded in the summary. Only a missing run directory, an unwritable
    /// summary or a failed archive abort the run.
    pub async fn run(&self, run: &CollectionRun) -> Result<RunReport> {
        info!(
            run_id = %run.run_id,
            namespaces = %run.namespace_filter,
            format = %run.output_format,
            compression = %run.compression,
            "starting collection"
        );

        let mut organizer = OutputOrganizer::create(run)?;
        let mut ingest = Ingest {
            run,
            sanitizer: Sanitizer::new(self.config.sanitize.clone()),
            organizer: &mut organizer,
            summary: CollectionSummary::new(run, self.config.sanitize.on_failure),
            detector: DetectionAccumulator::new(),
        };

        let server_version = match self.source.server_version().await {
            Ok(version) => {
                ingest.summary.set_server_version(version.clone());
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "could not read server version");
                None
            }
        };

        let enumerator = Enumerator::new(Arc::clone(&self.source), &self.config);
        let plan = enumerator.plan(run).await;
        ingest.summary.set_missing_namespaces(plan.missing.iter().cloned());
        for outcome in plan.bootstrap {
            ingest.accept(outcome);
        }

        let stats = enumerator
            .execute(plan.items, |outcome| ingest.accept(outcome))
            .await;
        if stats.deadline_exceeded || enumerator.deadline_passed() {
            ingest.summary.mark_deadline_exceeded();
        }

        let Ingest {
            mut summary,
            detector,
            ..
        } = ingest;

        let mut detection = None;
        let mut analysis_path = None;
        if run.detection_enabled {
            let result = detector.finish(&self.signatures, server_version.as_deref());
            info!(
                distribution = %result.distribution,
                confidence = %result.confidence_level,
                components = result.matched_components.len(),
                "platform analysis complete"
            );
            let report = AnalysisReport::new(result.clone(), self.signatures_label.clone(), Utc::now());
            match organizer.write_document(ANALYSIS_STEM, &report) {
                Ok(path) => analysis_path = Some(path),
                Err(e) => {
                    warn!(error = %e, "could not write analysis");
                    summary.outputs.analysis_file = None;
                    summary.writes.failed += 1;
                }
            }
            detection = Some(result);
        }

        summary.finalize(Utc::now());
        let summary_path = organizer.write_document(SUMMARY_STEM, &summary)?;
        info!(
            resources = summary.totals.total,
            files = summary.writes.files,
            failed_requests = summary.fetch.failed,
            "collection finished"
        );

        let archive = if run.compression.creates_archive() {
            let info = create_archive(organizer.run_dir(), &run.archive_path())?;
            info!(path = %info.path.display(), size = info.size, "archive written");
            Some(info)
        } else {
            None
        };

        let mut directory_kept = true;
        if !run.compression.keeps_tree() {
            match organizer.remove_tree() {
                Ok(()) => directory_kept = false,
                Err(e) => warn!(error = %e, "could not remove run directory after archiving"),
            }
        }

        Ok(RunReport {
            run_dir: organizer.run_dir().to_path_buf(),
            directory_kept,
            summary,
            summary_path,
            detection,
            analysis_path,
            archive,
        })
    }
}

/// State owned by the aggregation loop
struct Ingest<'a> {
    run: &'a CollectionRun,
    sanitizer: Sanitizer,
    organizer: &'a mut OutputOrganizer,
    summary: CollectionSummary,
    detector: DetectionAccumulator,
}

impl Ingest<'_> {
    fn accept(&mut self, outcome: FetchOutcome) {
        let FetchOutcome { item, result } = outcome;
        let type_name = item.type_name();
        let namespace = item.namespace.as_deref();

        let objects = match result {
            Ok(objects) => {
                self.summary.record_fetch_success();
                objects
            }
            Err(e) => {
                self.summary.record_fetch_failure(
                    &type_name,
                    namespace,
                    e.reason(),
                    e.to_string(),
                    e.is_cancelled(),
                );
                return;
            }
        };

        for object in objects {
            match ResourceRecord::from_object(&item.kind, namespace, object) {
                Ok(record) => self.handle(record),
                Err(e) => {
                    debug!(kind = %type_name, error = %e, "skipping object");
                    self.summary.record_skipped(&type_name, namespace, e.to_string());
                }
            }
        }
    }

    fn handle(&mut self, mut record: ResourceRecord) {
        if self.run.detection_enabled {
            self.detector.observe(&record);
        }

        if !self.run.raw_mode {
            match self.sanitizer.sanitize(&record) {
                Ok(body) => {
                    record.sanitized = Some(body);
                    self.summary.record_sanitized();
                }
                Err(e) => {
                    let omit = self.sanitizer.config().on_failure == SanitizeFailurePolicy::Omit;
                    warn!(resource = %record.display_name(), error = %e, omitted = omit, "sanitization failed");
                    self.summary.record_sanitize_failure(&record, e.to_string(), omit);
                    if omit {
                        return;
                    }
                    record.sanitized = mark_sanitization_failed(&record.raw);
                }
            }
        }

        match self.organizer.persist(&record, record.output_body()) {
            Ok(files) => self.summary.record_written(&record, files.len()),
            Err(e) => {
                warn!(resource = %record.display_name(), error = %e, "could not write resource");
                self.summary.record_write_failure(&record, e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CollectError, FetchError};
    use crate::source::MockClusterSource;
    use ketchup_core::detection::{ConfidenceLevel, DeploymentClass, Distribution};
    use ketchup_core::{CompressionMode, NamespaceFilter, OutputFormat, list_archive};
    use serde_json::{Value, json};
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|x| x == ext))
            .collect()
    }

    fn resource_files(root: &Path, ext: &str) -> usize {
        files_with_extension(root, ext)
            .iter()
            .filter(|p| p.parent() != Some(root))
            .count()
    }

    fn run_in(dir: &TempDir) -> CollectionRun {
        CollectionRun::new(dir.path()).with_compression(CompressionMode::Uncompressed)
    }

    fn service() -> Value {
        json!({
            "metadata": {
                "name": "web",
                "namespace": "shop",
                "uid": "0d3c",
                "resourceVersion": "42",
                "annotations": {
                    "kubectl.kubernetes.io/last-applied-configuration": "{}",
                    "team": "storefront"
                }
            },
            "spec": {
                "type": "NodePort",
                "clusterIP": "10.0.0.5",
                "clusterIPs": ["10.0.0.5"],
                "ports": [{"port": 80, "nodePort": 31999}]
            },
            "status": {"loadBalancer": {}}
        })
    }

    fn cluster() -> MockClusterSource {
        MockClusterSource::new()
            .with_namespace("shop")
            .with_namespace("kube-system")
            .with_object("nodes", None, json!({"metadata": {"name": "node-1"}}))
            .with_object("services", Some("shop"), service())
            .with_object(
                "configmaps",
                Some("kube-system"),
                json!({"metadata": {"name": "coredns"}, "data": {"Corefile": "."}}),
            )
    }

    #[tokio::test]
    async fn test_empty_cluster() {
        let dir = TempDir::new().unwrap();
        let source = MockClusterSource::new();
        let collector = Collector::new(source, CollectorConfig::default()).unwrap();

        let report = collector.run(&run_in(&dir)).await.unwrap();

        assert_eq!(report.summary.totals.total, 0);
        assert!(report.summary.status.empty);
        assert!(!report.summary.status.partial);
        let detection = report.detection.unwrap();
        assert_eq!(detection.distribution, Distribution::Unknown);
        assert_eq!(detection.confidence_level, ConfidenceLevel::Minimal);
        assert!(report.summary_path.exists());
        assert_eq!(resource_files(&report.run_dir, "yaml"), 0);
    }

    #[tokio::test]
    async fn test_counts_match_files_for_both_formats() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();
        let run = run_in(&dir).with_format(OutputFormat::Both);

        let report = collector.run(&run).await.unwrap();
        let totals = &report.summary.totals;

        // 2 namespaces + 1 node cluster-wide; 1 service + 1 configmap namespaced
        assert_eq!(totals.cluster_scoped, 3);
        assert_eq!(totals.namespaced, 2);
        assert_eq!(totals.total, totals.cluster_scoped + totals.namespaced);
        assert_eq!(resource_files(&report.run_dir, "yaml"), totals.total);
        assert_eq!(resource_files(&report.run_dir, "json"), totals.total);
        assert_eq!(report.summary.writes.files, 2 * totals.total);
        assert_eq!(report.summary.namespaces["shop"]["services"], 1);
    }

    #[tokio::test]
    async fn test_service_is_sanitized() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();
        let run = run_in(&dir).with_format(OutputFormat::Json);

        let report = collector.run(&run).await.unwrap();
        let path = report.run_dir.join("namespaced-resources/shop/services/web.json");
        let body: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(body["apiVersion"], "v1");
        assert_eq!(body["kind"], "Service");
        assert!(body.get("status").is_none());
        assert!(body["metadata"].get("uid").is_none());
        assert!(body["spec"].get("clusterIP").is_none());
        assert!(body["spec"]["ports"][0].get("nodePort").is_none());
        assert_eq!(body["metadata"]["annotations"]["team"], "storefront");
        assert_eq!(report.summary.sanitization.succeeded, report.summary.totals.total);
    }

    #[tokio::test]
    async fn test_raw_mode_keeps_server_fields() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();
        let run = run_in(&dir).with_format(OutputFormat::Json).with_raw_mode(true);

        let report = collector.run(&run).await.unwrap();
        let path = report.run_dir.join("namespaced-resources/shop/services/web.json");
        let body: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        let mut expected = service();
        expected["apiVersion"] = json!("v1");
        expected["kind"] = json!("Service");
        assert_eq!(body, expected);
        assert_eq!(report.summary.sanitization.processed, 0);
    }

    #[tokio::test]
    async fn test_sanitize_failure_policies() {
        let broken = json!({
            "metadata": {"name": "odd", "namespace": "shop"},
            "spec": {"ports": ["not-a-port"]}
        });
        let source = cluster().with_object("services", Some("shop"), broken);

        let dir = TempDir::new().unwrap();
        let collector = Collector::new(source.clone(), CollectorConfig::default()).unwrap();
        let run = run_in(&dir).with_format(OutputFormat::Json);
        let report = collector.run(&run).await.unwrap();

        let path = report.run_dir.join("namespaced-resources/shop/services/odd.json");
        let body: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(body["metadata"]["annotations"]["ketchup.io/sanitization"], "failed");
        assert_eq!(report.summary.sanitization.failed, 1);
        assert!(!report.summary.status.partial);

        let mut config = CollectorConfig::default();
        config.sanitize.on_failure = SanitizeFailurePolicy::Omit;
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(source, config).unwrap();
        let report = collector.run(&run_in(&dir)).await.unwrap();

        assert!(!report.run_dir.join("namespaced-resources/shop/services/odd.yaml").exists());
        assert_eq!(report.summary.sanitization.omitted, 1);
        assert!(report.summary.status.partial);
    }

    #[tokio::test]
    async fn test_failed_listing_is_partial() {
        let forbidden = FetchError::Forbidden {
            message: "secrets is forbidden".to_string(),
        };
        let source = cluster().with_failure("secrets", Some("shop"), forbidden);
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(source, CollectorConfig::default()).unwrap();

        let report = collector.run(&run_in(&dir)).await.unwrap();

        assert_eq!(report.summary.fetch.failed, 1);
        assert_eq!(report.summary.fetch.failures[0].reason, "forbidden");
        assert!(report.summary.status.partial);
        assert_eq!(report.summary.totals.total, 5);
    }

    #[tokio::test]
    async fn test_missing_namespace_is_reported() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();
        let run = run_in(&dir).with_namespaces(NamespaceFilter::from_list("shop,gone"));

        let report = collector.run(&run).await.unwrap();

        assert_eq!(report.summary.missing_namespaces, vec!["gone".to_string()]);
        assert!(report.summary.namespaces.contains_key("shop"));
        assert!(!report.summary.namespaces.contains_key("kube-system"));
    }

    #[tokio::test]
    async fn test_compressed_mode_removes_tree() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();
        let run = CollectionRun::new(dir.path()).with_compression(CompressionMode::Compressed);

        let report = collector.run(&run).await.unwrap();

        assert!(!report.directory_kept);
        assert!(!report.run_dir.exists());
        let archive = report.archive.unwrap();
        assert_eq!(archive.path, run.archive_path());
        let entries = list_archive(&archive.path).unwrap();
        assert!(entries
            .iter()
            .any(|e| e.path.ends_with("namespaced-resources/shop/services/web.yaml")));
    }

    #[tokio::test]
    async fn test_both_compression_keeps_tree() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();
        let run = CollectionRun::new(dir.path());

        let report = collector.run(&run).await.unwrap();

        assert!(report.directory_kept);
        assert!(report.run_dir.exists());
        assert!(report.archive.unwrap().path.exists());
    }

    #[tokio::test]
    async fn test_deadline_marks_run() {
        let source = cluster().with_delay("pods", Some("shop"), Duration::from_secs(10));
        let config = CollectorConfig {
            run_deadline: Some(Duration::from_millis(300)),
            ..CollectorConfig::default()
        };
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(source, config).unwrap();

        let report = collector.run(&run_in(&dir)).await.unwrap();

        assert!(report.summary.status.deadline_exceeded);
        assert!(report.summary.status.partial);
        assert!(report.summary.fetch.cancelled >= 1);
        assert!(report.summary_path.exists());
    }

    #[tokio::test]
    async fn test_management_cluster_detection() {
        let rancher = json!({
            "metadata": {"name": "rancher", "namespace": "cattle-system"},
            "spec": {"template": {"spec": {"containers": [
                {"name": "rancher", "image": "registry.rancher.com/rancher/rancher:v2.9.2"}
            ]}}}
        });
        let node = json!({
            "metadata": {"name": "server-0"},
            "status": {"nodeInfo": {"kubeletVersion": "v1.30.4+rke2r1"}}
        });
        let source = MockClusterSource::new()
            .with_version("v1.30.4+rke2r1")
            .with_namespace("cattle-system")
            .with_object("nodes", None, node)
            .with_object("deployments", Some("cattle-system"), rancher);

        let dir = TempDir::new().unwrap();
        let collector = Collector::new(source, CollectorConfig::default()).unwrap();
        let report = collector.run(&run_in(&dir)).await.unwrap();

        let detection = report.detection.unwrap();
        assert_eq!(detection.distribution, Distribution::Rke2);
        assert_eq!(detection.deployment_class, DeploymentClass::Management);
        assert!(detection.component("SUSE Rancher Prime").is_some());
        let analysis = std::fs::read_to_string(report.analysis_path.unwrap()).unwrap();
        assert!(analysis.contains("analysisInfo"));
    }

    #[tokio::test]
    async fn test_unreadable_server_version_is_not_fatal() {
        let pods = ["api", "worker"].map(|name| json!({"metadata": {"name": name}}));
        let source = MockClusterSource::new()
            .with_version_error(FetchError::Forbidden {
                message: "version is forbidden".to_string(),
            })
            .with_namespace("shop")
            .with_object(
                "nodes",
                None,
                json!({
                    "metadata": {"name": "node-1"},
                    "status": {"nodeInfo": {"kubeletVersion": "v1.31.1"}}
                }),
            )
            .with_objects("pods", Some("shop"), pods);

        let dir = TempDir::new().unwrap();
        let collector = Collector::new(source, CollectorConfig::default()).unwrap();
        let report = collector.run(&run_in(&dir)).await.unwrap();

        assert!(report.summary.collection_info.server_version.is_none());
        assert_eq!(report.summary.namespaces["shop"]["pods"], 2);
        let detection = report.detection.unwrap();
        assert_eq!(detection.kubernetes_version.as_deref(), Some("v1.31.1"));
    }

    #[tokio::test]
    async fn test_detection_disabled() {
        let dir = TempDir::new().unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();
        let run = run_in(&dir).with_detection(false);

        let report = collector.run(&run).await.unwrap();

        assert!(report.detection.is_none());
        assert!(report.analysis_path.is_none());
        assert!(!report.run_dir.join("suse-edge-analysis.yaml").exists());
    }

    #[tokio::test]
    async fn test_existing_run_directory_is_fatal() {
        let dir = TempDir::new().unwrap();
        let run = run_in(&dir);
        std::fs::create_dir_all(run.run_dir()).unwrap();
        let collector = Collector::new(cluster(), CollectorConfig::default()).unwrap();

        let err = collector.run(&run).await.unwrap_err();
        assert!(matches!(err, CollectError::Output(_)));
    }
}
