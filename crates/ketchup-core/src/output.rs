//! On-disk layout of a run
//!
//! ```text
//! <output>/<run-id>/
//!   collection-summary.<fmt>
//!   suse-edge-analysis.<fmt>
//!   cluster-wide-resources/<type>/<name>.<fmt>
//!   cluster-wide-resources/custom-resources/<type>/<name>.<fmt>
//!   namespaced-resources/<namespace>/<type>/<name>.<fmt>
//!   namespaced-resources/<namespace>/custom-resources/<type>/<name>.<fmt>
//! ```

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{OutputError, WriteError};
use crate::record::{ResourceRecord, ResourceScope};
use crate::run::{CollectionRun, FileFormat, OutputFormat};

pub const CLUSTER_DIR: &str = "cluster-wide-resources";
pub const NAMESPACED_DIR: &str = "namespaced-resources";
pub const CUSTOM_DIR: &str = "custom-resources";
pub const SUMMARY_STEM: &str = "collection-summary";
pub const ANALYSIS_STEM: &str = "suse-edge-analysis";

/// Length of the digest suffix added to rewritten file stems
const STEM_DIGEST_LEN: usize = 8;

/// Owns the run directory and every file written into it
#[derive(Debug)]
pub struct OutputOrganizer {
    run_dir: PathBuf,
    format: OutputFormat,
    written: HashSet<PathBuf>,
}

impl OutputOrganizer {
    /// Create the run directory
    ///
    /// The parent is created if needed; the run directory itself must not
    /// exist yet.
    pub fn create(run: &CollectionRun) -> Result<Self, OutputError> {
        std::fs::create_dir_all(&run.output_dir).map_err(|source| OutputError {
            path: run.output_dir.clone(),
            source,
        })?;

        let run_dir = run.run_dir();
        std::fs::create_dir(&run_dir).map_err(|source| OutputError {
            path: run_dir.clone(),
            source,
        })?;
        debug!(path = %run_dir.display(), "created run directory");

        Ok(Self {
            run_dir,
            format: run.output_format,
            written: HashSet::new(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Number of resource files written so far
    pub fn files_written(&self) -> usize {
        self.written.len()
    }

    /// Directory of a record relative to the run directory
    pub fn relative_dir(record: &ResourceRecord) -> PathBuf {
        let mut dir = match record.scope {
            ResourceScope::Cluster => PathBuf::from(CLUSTER_DIR),
            ResourceScope::Namespaced => {
                PathBuf::from(NAMESPACED_DIR).join(safe_file_stem(&record.namespace))
            }
        };
        if record.custom {
            dir.push(CUSTOM_DIR);
        }
        dir.push(safe_file_stem(&record.type_name));
        dir
    }

    /// Write one file per requested format for `body`
    ///
    /// Either every file is written or none is: if a later format fails, the
    /// files already written for this record are removed.
    pub fn persist(&mut self, record: &ResourceRecord, body: &serde_json::Value) -> Result<Vec<PathBuf>, WriteError> {
        let dir = self.run_dir.join(Self::relative_dir(record));
        std::fs::create_dir_all(&dir).map_err(|source| WriteError::Io {
            path: dir.clone(),
            source,
        })?;

        let stem = safe_file_stem(&record.name);
        let mut created: Vec<PathBuf> = Vec::new();

        for format in self.format.file_formats() {
            let path = dir.join(format!("{stem}.{}", format.extension()));
            if let Err(e) = self.write_new(&path, body, *format) {
                rollback(&created);
                return Err(e);
            }
            created.push(path);
        }

        self.written.extend(created.iter().cloned());
        Ok(created)
    }

    /// Write a run-level document such as the summary
    pub fn write_document<T: Serialize>(&self, stem: &str, value: &T) -> Result<PathBuf, WriteError> {
        let format = self.format.document_format();
        let path = self.run_dir.join(format!("{stem}.{}", format.extension()));
        let content = serialize(value, format).map_err(|message| WriteError::Serialize {
            path: path.clone(),
            message,
        })?;
        std::fs::write(&path, content).map_err(|source| WriteError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Delete the run directory and everything in it
    pub fn remove_tree(&self) -> std::io::Result<()> {
        std::fs::remove_dir_all(&self.run_dir)
    }

    fn write_new(&self, path: &Path, body: &serde_json::Value, format: FileFormat) -> Result<(), WriteError> {
        if self.written.contains(path) {
            return Err(WriteError::Collision {
                path: path.to_path_buf(),
            });
        }
        let content = serialize(body, format).map_err(|message| WriteError::Serialize {
            path: path.to_path_buf(),
            message,
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::AlreadyExists {
                    WriteError::Collision {
                        path: path.to_path_buf(),
                    }
                } else {
                    WriteError::Io {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;

        if let Err(source) = file.write_all(content.as_bytes()) {
            drop(file);
            remove_partial(path);
            return Err(WriteError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(())
    }
}

fn rollback(created: &[PathBuf]) {
    for path in created {
        remove_partial(path);
    }
}

/// Best-effort removal of a file left behind by a failed write
fn remove_partial(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "failed to remove partially written file");
            false
        }
    }
}

/// Serialize a value in one of the file formats
pub fn serialize<T: Serialize>(value: &T, format: FileFormat) -> Result<String, String> {
    match format {
        FileFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        FileFormat::Json => serde_json::to_string_pretty(value)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .map_err(|e| e.to_string()),
    }
}

/// File stem for a resource name
///
/// Names made only of `[A-Za-z0-9._-]` are used as is. Anything else is
/// replaced with `_` and a short digest of the original name is appended so
/// distinct names cannot end up on the same stem.
pub fn safe_file_stem(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let needs_suffix = replaced != name || name.is_empty() || name.starts_with('.');
    if !needs_suffix {
        return replaced;
    }

    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let base = replaced.trim_start_matches('.');
    if base.is_empty() {
        format!("_-{}", &digest[..STEM_DIGEST_LEN])
    } else {
        format!("{base}-{}", &digest[..STEM_DIGEST_LEN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::KindDescriptor;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn run(dir: &Path, format: OutputFormat) -> CollectionRun {
        let started = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        CollectionRun::started_at(dir, started).with_format(format)
    }

    fn record(group: &str, kind: &str, plural: &str, namespace: Option<&str>, name: &str) -> ResourceRecord {
        let scope = if namespace.is_some() {
            ResourceScope::Namespaced
        } else {
            ResourceScope::Cluster
        };
        let mut descriptor = KindDescriptor::builtin(group, "v1", kind, plural, scope);
        descriptor.custom = !group.is_empty() && group.contains('.');
        ResourceRecord::from_object(&descriptor, namespace, json!({"metadata": {"name": name}})).unwrap()
    }

    fn listing(root: &Path) -> String {
        let mut files: Vec<String> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(root).unwrap().display().to_string())
            .collect();
        files.sort();
        files.join("\n")
    }

    #[test]
    fn test_layout() {
        let temp = TempDir::new().unwrap();
        let mut organizer = OutputOrganizer::create(&run(temp.path(), OutputFormat::Yaml)).unwrap();

        for r in [
            record("", "Node", "nodes", None, "node-1"),
            record("", "Pod", "pods", Some("web"), "frontend-abc"),
            record("longhorn.io", "Volume", "volumes", Some("longhorn-system"), "pvc-1"),
            record("metal3.io", "BareMetalHost", "baremetalhosts", None, "host-0"),
        ] {
            organizer.persist(&r, &r.raw).unwrap();
        }

        insta::assert_snapshot!(listing(organizer.run_dir()), @r"
        cluster-wide-resources/custom-resources/baremetalhosts.metal3.io/host-0.yaml
        cluster-wide-resources/nodes/node-1.yaml
        namespaced-resources/longhorn-system/custom-resources/volumes.longhorn.io/pvc-1.yaml
        namespaced-resources/web/pods/frontend-abc.yaml
        ");
        assert_eq!(organizer.files_written(), 4);
    }

    #[test]
    fn test_run_directory_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let run = run(temp.path(), OutputFormat::Json);
        OutputOrganizer::create(&run).unwrap();

        let err = OutputOrganizer::create(&run).unwrap_err();
        assert_eq!(err.path, run.run_dir());
        assert_eq!(err.source.kind(), std::io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_output_parent_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        assert!(OutputOrganizer::create(&run(&blocker, OutputFormat::Yaml)).is_err());
    }

    #[test]
    fn test_both_formats_written() {
        let temp = TempDir::new().unwrap();
        let mut organizer = OutputOrganizer::create(&run(temp.path(), OutputFormat::Both)).unwrap();
        let r = record("", "ConfigMap", "configmaps", Some("web"), "settings");

        let paths = organizer.persist(&r, &r.raw).unwrap();
        assert_eq!(paths.len(), 2);

        let yaml = std::fs::read_to_string(&paths[0]).unwrap();
        let json = std::fs::read_to_string(&paths[1]).unwrap();
        assert!(yaml.contains("name: settings"));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, r.raw);
    }

    #[test]
    fn test_collision_is_write_error() {
        let temp = TempDir::new().unwrap();
        let mut organizer = OutputOrganizer::create(&run(temp.path(), OutputFormat::Yaml)).unwrap();
        let r = record("", "Pod", "pods", Some("web"), "dup");

        organizer.persist(&r, &r.raw).unwrap();
        let err = organizer.persist(&r, &r.raw).unwrap_err();
        assert!(matches!(err, WriteError::Collision { .. }));
        assert_eq!(organizer.files_written(), 1);
    }

    #[test]
    fn test_both_format_rollback() {
        let temp = TempDir::new().unwrap();
        let mut organizer = OutputOrganizer::create(&run(temp.path(), OutputFormat::Both)).unwrap();
        let r = record("", "Pod", "pods", Some("web"), "half");

        // Occupy the JSON path so the second write fails
        let dir = organizer.run_dir().join(OutputOrganizer::relative_dir(&r));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("half.json"), "{}").unwrap();

        let err = organizer.persist(&r, &r.raw).unwrap_err();
        assert!(matches!(err, WriteError::Collision { .. }));
        assert!(!dir.join("half.yaml").exists());
        assert_eq!(organizer.files_written(), 0);
    }

    #[test]
    fn test_remove_partial_reports_cleanup() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.yaml");
        std::fs::write(&path, "kind: Pod").unwrap();

        assert!(remove_partial(&path));
        assert!(!path.exists());
        assert!(!remove_partial(&path));
    }

    #[test]
    fn test_write_document_uses_document_format() {
        let temp = TempDir::new().unwrap();
        let organizer = OutputOrganizer::create(&run(temp.path(), OutputFormat::Both)).unwrap();

        let path = organizer
            .write_document(SUMMARY_STEM, &json!({"collectionInfo": {"tool": "ketchup"}}))
            .unwrap();
        assert_eq!(path.file_name().unwrap(), "collection-summary.yaml");
    }

    #[test]
    fn test_safe_file_stem() {
        assert_eq!(safe_file_stem("frontend-7d9f.abc_1"), "frontend-7d9f.abc_1");

        let colon = safe_file_stem("system:controller:job");
        assert!(colon.starts_with("system_controller_job-"));
        assert_eq!(colon.len(), "system_controller_job-".len() + 8);

        // Names that only differ in the replaced character stay distinct
        assert_ne!(safe_file_stem("a:b"), safe_file_stem("a/b"));
        assert_ne!(safe_file_stem("a:b"), "a_b");

        assert!(safe_file_stem("..").starts_with("_-"));
        assert!(!safe_file_stem(".hidden").starts_with('.'));
    }
}
