//! Inspect command - view a run archive without extracting it

use std::path::Path;

use console::style;
use ketchup_core::archive::read_file_from_archive;
use ketchup_core::detection::AnalysisReport;
use ketchup_core::output::{ANALYSIS_STEM, SUMMARY_STEM};
use ketchup_core::{ArchiveEntry, CollectionSummary, list_archive};

use crate::display::{display_detection, display_summary};
use crate::error::{CliError, Result};
use crate::util::format_size;

pub fn run(archive_path: &Path, show_files: bool, raw: bool) -> Result<()> {
    let entries = list_archive(archive_path)?;

    let summary_entry = top_level_document(&entries, SUMMARY_STEM).ok_or_else(|| CliError::Archive {
        message: format!("{} holds no collection summary", archive_path.display()),
    })?;
    let text = read_text(archive_path, &summary_entry.path)?;

    if raw {
        print!("{text}");
        return Ok(());
    }

    let summary = CollectionSummary::parse(&text).map_err(|e| CliError::Archive {
        message: format!("invalid collection summary {}: {e}", summary_entry.path),
    })?;

    let files: Vec<&ArchiveEntry> = entries.iter().filter(|e| !e.is_dir).collect();
    let total_size: u64 = files.iter().map(|e| e.size).sum();
    println!(
        "{} {} ({} files, {})",
        style("Archive").cyan().bold(),
        archive_path.display(),
        files.len(),
        format_size(total_size)
    );
    if show_files {
        for entry in &files {
            println!("  {:60} {:>10}", entry.path, format_size(entry.size));
        }
    }
    println!();

    display_summary(&summary);

    if let Some(entry) = top_level_document(&entries, ANALYSIS_STEM) {
        let text = read_text(archive_path, &entry.path)?;
        match AnalysisReport::parse(&text) {
            Ok(report) => display_detection(&report.result),
            Err(e) => println!(
                "{} Could not read {}: {}",
                style("⚠").yellow(),
                entry.path,
                e
            ),
        }
    }

    Ok(())
}

/// A run document sits directly under the archive's top-level directory
fn top_level_document<'a>(entries: &'a [ArchiveEntry], stem: &str) -> Option<&'a ArchiveEntry> {
    entries.iter().filter(|e| !e.is_dir).find(|e| {
        let mut parts = e.path.split('/');
        let _run_dir = parts.next();
        let is_document = parts
            .next()
            .and_then(|name| name.strip_prefix(stem))
            .is_some_and(|ext| ext == ".yaml" || ext == ".json");
        is_document && parts.next().is_none()
    })
}

fn read_text(archive_path: &Path, entry: &str) -> Result<String> {
    let (_, bytes) = read_file_from_archive(archive_path, entry)?;
    String::from_utf8(bytes).map_err(|e| CliError::Archive {
        message: format!("{entry} is not valid UTF-8: {e}"),
    })
}
