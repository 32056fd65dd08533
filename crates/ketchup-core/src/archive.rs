//! Archive creation and extraction for collection runs
//!
//! A run directory is packed into `<run-id>.tar.gz` with the run id as the
//! top-level entry. Entries are sorted and their metadata normalized so the
//! same tree always produces the same bytes.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// A finished archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// Hex SHA-256 of the archive file
    pub sha256: String,
}

/// Information about an entry in an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Relative path within the archive
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Pack `run_dir` into a gzip tar at `dest`
///
/// The archive is written to `<dest>.partial` and renamed once complete, so
/// `dest` either holds a whole archive or does not exist.
pub fn create_archive(run_dir: &Path, dest: &Path) -> Result<ArchiveInfo, ArchiveError> {
    let root_name = run_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| ArchiveError::Walk {
            path: run_dir.to_path_buf(),
            message: "run directory has no name".to_string(),
        })?;

    let partial = partial_path(dest);
    let result = write_archive(run_dir, &root_name, &partial);
    if let Err(e) = result {
        let _ = std::fs::remove_file(&partial);
        return Err(e);
    }

    std::fs::rename(&partial, dest).map_err(|source| ArchiveError::Create {
        path: dest.to_path_buf(),
        source,
    })?;

    let (size, sha256) = digest_file(dest)?;
    debug!(path = %dest.display(), size, sha256 = %sha256, "archive created");

    Ok(ArchiveInfo {
        path: dest.to_path_buf(),
        size,
        sha256,
    })
}

fn write_archive(run_dir: &Path, root_name: &str, partial: &Path) -> Result<(), ArchiveError> {
    let file = File::create(partial).map_err(|source| ArchiveError::Create {
        path: partial.to_path_buf(),
        source,
    })?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);

    let walker = WalkDir::new(run_dir).sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| ArchiveError::Walk {
            path: run_dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let relative = entry.path().strip_prefix(run_dir).map_err(|e| ArchiveError::Walk {
            path: entry.path().to_path_buf(),
            message: e.to_string(),
        })?;

        let mut name = PathBuf::from(root_name);
        name.push(relative);
        let name = name.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            add_dir_to_archive(&mut builder, &name)?;
        } else if entry.file_type().is_file() {
            let content = std::fs::read(entry.path()).map_err(|source| ArchiveError::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;
            add_bytes_to_archive(&mut builder, &name, &content)?;
        }
    }

    let encoder = builder.into_inner().map_err(|source| ArchiveError::Create {
        path: partial.to_path_buf(),
        source,
    })?;
    let mut file = encoder.finish().map_err(|source| ArchiveError::Create {
        path: partial.to_path_buf(),
        source,
    })?;
    file.flush()
        .and_then(|_| file.sync_all())
        .map_err(|source| ArchiveError::Create {
            path: partial.to_path_buf(),
            source,
        })?;
    Ok(())
}

/// Add bytes to a tar archive with normalized metadata
fn add_bytes_to_archive<W: Write>(
    builder: &mut Builder<W>,
    archive_path: &str,
    content: &[u8],
) -> Result<(), ArchiveError> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();

    builder
        .append_data(&mut header, archive_path, content)
        .map_err(|source| ArchiveError::Append {
            entry: archive_path.to_string(),
            source,
        })
}

fn add_dir_to_archive<W: Write>(builder: &mut Builder<W>, archive_path: &str) -> Result<(), ArchiveError> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();

    builder
        .append_data(&mut header, archive_path, std::io::empty())
        .map_err(|source| ArchiveError::Append {
            entry: archive_path.to_string(),
            source,
        })
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Size and hex SHA-256 of a file
pub fn digest_file(path: &Path) -> Result<(u64, String), ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(read_err)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buffer).map_err(read_err)?;
        if n == 0 {
            break;
        }
        size += n as u64;
        hasher.update(&buffer[..n]);
    }
    Ok((size, hex::encode(hasher.finalize())))
}

fn open_archive(archive_path: &Path) -> Result<Archive<GzDecoder<File>>, ArchiveError> {
    let file = File::open(archive_path).map_err(|source| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        source,
    })?;
    Ok(Archive::new(GzDecoder::new(file)))
}

/// Extract an archive to a destination directory
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let mut archive = open_archive(archive_path)?;
    std::fs::create_dir_all(dest).map_err(|source| ArchiveError::Create {
        path: dest.to_path_buf(),
        source,
    })?;
    archive.unpack(dest).map_err(|source| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        source,
    })
}

/// List entries in an archive
pub fn list_archive(archive_path: &Path) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut archive = open_archive(archive_path)?;
    let mut entries = Vec::new();

    for entry in archive.entries().map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path().map_err(read_err)?.to_string_lossy().to_string();
        let size = entry.header().size().map_err(read_err)?;
        let is_dir = entry.header().entry_type().is_dir();

        entries.push(ArchiveEntry { path, size, is_dir });
    }

    Ok(entries)
}

/// Read a file whose archive path ends with `suffix`
///
/// Run archives hold a single top-level directory, so callers usually ask for
/// `collection-summary.yaml` rather than the full path.
pub fn read_file_from_archive(archive_path: &Path, suffix: &str) -> Result<(String, Vec<u8>), ArchiveError> {
    let read_err = |source| ArchiveError::Read {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut archive = open_archive(archive_path)?;

    for entry in archive.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;
        let path = entry.path().map_err(read_err)?.to_string_lossy().to_string();

        if path == suffix || path.ends_with(&format!("/{suffix}")) {
            let mut content = Vec::new();
            entry.read_to_end(&mut content).map_err(read_err)?;
            return Ok((path, content));
        }
    }

    Err(ArchiveError::EntryNotFound(suffix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_run_tree(root: &Path) -> PathBuf {
        let run_dir = root.join("ketchup-2024-01-01-00-00-00-000");
        let pods = run_dir.join("namespaced-resources/web/pods");
        std::fs::create_dir_all(&pods).unwrap();
        std::fs::create_dir_all(run_dir.join("cluster-wide-resources/nodes")).unwrap();
        std::fs::write(pods.join("frontend.yaml"), "kind: Pod\n").unwrap();
        std::fs::write(
            run_dir.join("cluster-wide-resources/nodes/node-1.yaml"),
            "kind: Node\n",
        )
        .unwrap();
        std::fs::write(run_dir.join("collection-summary.yaml"), "collectionInfo: {}\n").unwrap();
        run_dir
    }

    #[test]
    fn test_create_and_extract_archive() {
        let temp = TempDir::new().unwrap();
        let run_dir = create_run_tree(temp.path());
        let dest = temp.path().join("run.tar.gz");

        let info = create_archive(&run_dir, &dest).unwrap();
        assert!(dest.exists());
        assert!(!partial_path(&dest).exists());
        assert_eq!(info.size, std::fs::metadata(&dest).unwrap().len());
        assert_eq!(info.sha256.len(), 64);

        let extract_dir = temp.path().join("extracted");
        extract_archive(&dest, &extract_dir).unwrap();

        for relative in [
            "collection-summary.yaml",
            "namespaced-resources/web/pods/frontend.yaml",
            "cluster-wide-resources/nodes/node-1.yaml",
        ] {
            let original = std::fs::read(run_dir.join(relative)).unwrap();
            let extracted =
                std::fs::read(extract_dir.join("ketchup-2024-01-01-00-00-00-000").join(relative)).unwrap();
            assert_eq!(original, extracted);
        }
    }

    #[test]
    fn test_archive_is_reproducible() {
        let temp = TempDir::new().unwrap();
        let run_dir = create_run_tree(temp.path());

        let first = create_archive(&run_dir, &temp.path().join("a.tar.gz")).unwrap();
        let second = create_archive(&run_dir, &temp.path().join("b.tar.gz")).unwrap();
        assert_eq!(first.sha256, second.sha256);
    }

    #[test]
    fn test_entries_sorted() {
        let temp = TempDir::new().unwrap();
        let run_dir = create_run_tree(temp.path());
        let dest = temp.path().join("run.tar.gz");
        create_archive(&run_dir, &dest).unwrap();

        let paths: Vec<String> = list_archive(&dest)
            .unwrap()
            .into_iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.path)
            .collect();
        assert_eq!(
            paths,
            vec![
                "ketchup-2024-01-01-00-00-00-000/cluster-wide-resources/nodes/node-1.yaml",
                "ketchup-2024-01-01-00-00-00-000/collection-summary.yaml",
                "ketchup-2024-01-01-00-00-00-000/namespaced-resources/web/pods/frontend.yaml",
            ]
        );
    }

    #[test]
    fn test_read_file_by_suffix() {
        let temp = TempDir::new().unwrap();
        let run_dir = create_run_tree(temp.path());
        let dest = temp.path().join("run.tar.gz");
        create_archive(&run_dir, &dest).unwrap();

        let (path, content) = read_file_from_archive(&dest, "collection-summary.yaml").unwrap();
        assert!(path.ends_with("/collection-summary.yaml"));
        assert_eq!(content, b"collectionInfo: {}\n");

        assert!(matches!(
            read_file_from_archive(&dest, "missing.yaml"),
            Err(ArchiveError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_missing_run_dir_fails_without_output() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("run.tar.gz");

        let err = create_archive(&temp.path().join("nope"), &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::Walk { .. }));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }
}
