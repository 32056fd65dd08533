//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - Collection summaries (after a run and from `inspect`)
//! - Platform analysis results
//! - Output locations of a finished run

use console::style;
use ketchup_core::{CollectionSummary, DetectionResult};
use ketchup_kube::RunReport;

use crate::util::{format_size, truncate_hash};

/// Show how many failure lines are printed before truncating
const MAX_LISTED_FAILURES: usize = 10;

/// Print the counts and failures of a summary
pub fn display_summary(summary: &CollectionSummary) {
    let info = &summary.collection_info;
    println!(
        "{} {} ({})",
        style("Run").cyan().bold(),
        info.run_id,
        info.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(version) = &info.server_version {
        println!("  {}: {}", style("Server").dim(), version);
    }
    println!("  {}: {}", style("Namespaces").dim(), summary.options.namespaces);
    println!();

    let totals = &summary.totals;
    println!(
        "{} {} resources ({} cluster-wide, {} namespaced, {} custom)",
        style("✓").green().bold(),
        style(totals.total).bold(),
        totals.cluster_scoped,
        totals.namespaced,
        totals.custom
    );
    for highlight in &summary.highlights {
        println!("  {:24} {:>6}", highlight.category, highlight.count);
    }

    if !summary.missing_namespaces.is_empty() {
        println!(
            "{} Requested namespaces not found: {}",
            style("⚠").yellow(),
            summary.missing_namespaces.join(", ")
        );
    }

    let fetch = &summary.fetch;
    if fetch.failed > 0 || fetch.cancelled > 0 {
        println!(
            "{} {} of {} list requests failed, {} cancelled",
            style("⚠").yellow(),
            fetch.failed,
            fetch.requests,
            fetch.cancelled
        );
        for failure in fetch.failures.iter().take(MAX_LISTED_FAILURES) {
            let scope = failure.namespace.as_deref().unwrap_or("cluster");
            println!(
                "  {} {} in {}: {}",
                style("✗").red(),
                failure.type_name,
                scope,
                style(&failure.message).dim()
            );
        }
        print_truncation(fetch.failures.len());
    }

    let sanitization = &summary.sanitization;
    if sanitization.failed > 0 {
        println!(
            "{} {} objects failed sanitization ({} omitted)",
            style("⚠").yellow(),
            sanitization.failed,
            sanitization.omitted
        );
        for failure in sanitization.failures.iter().take(MAX_LISTED_FAILURES) {
            println!("  {} {}: {}", style("✗").red(), failure.resource, style(&failure.message).dim());
        }
        print_truncation(sanitization.failures.len());
    }

    if summary.writes.failed > 0 {
        println!("{} {} writes failed", style("⚠").yellow(), summary.writes.failed);
        for failure in summary.writes.failures.iter().take(MAX_LISTED_FAILURES) {
            println!("  {} {}: {}", style("✗").red(), failure.resource, style(&failure.message).dim());
        }
        print_truncation(summary.writes.failures.len());
    }

    if !summary.skipped.is_empty() {
        println!(
            "{} {} returned objects could not be recorded",
            style("⚠").yellow(),
            summary.skipped.len()
        );
    }

    if summary.status.deadline_exceeded {
        println!(
            "{} Run deadline exceeded; the collection is partial",
            style("⚠").yellow().bold()
        );
    }

    if !summary.reapply_hints.is_empty() {
        println!();
        println!("{}:", style("Reapply hints").bold());
        for hint in &summary.reapply_hints {
            println!("  {} {}", style("hint:").blue(), hint);
        }
    }
}

/// Print the platform analysis
pub fn display_detection(result: &DetectionResult) {
    println!();
    println!(
        "{} {} ({} confidence, {:.0}%)",
        style("Platform").cyan().bold(),
        style(result.distribution).bold(),
        result.confidence_level,
        result.confidence_score * 100.0
    );
    if let Some(version) = &result.kubernetes_version {
        println!("  {}: {}", style("Kubernetes").dim(), version);
    }
    println!("  {}: {}", style("Deployment").dim(), result.deployment_class);

    for component in &result.matched_components {
        let version = component
            .version
            .as_deref()
            .map(|v| format!(" {v}"))
            .unwrap_or_default();
        println!(
            "  {} {}{} {}",
            style("→").blue(),
            component.name,
            style(version).yellow(),
            style(format!("[{}]", component.category)).dim()
        );
    }
}

/// Print where the run left its artifacts
pub fn display_outputs(report: &RunReport) {
    println!();
    if report.directory_kept {
        println!(
            "{} Output directory: {}",
            style("✓").green().bold(),
            report.run_dir.display()
        );
    }
    if let Some(archive) = &report.archive {
        println!(
            "{} Archive: {} ({}, sha256:{}...)",
            style("✓").green().bold(),
            archive.path.display(),
            format_size(archive.size),
            truncate_hash(&archive.sha256, 12)
        );
    }
}

fn print_truncation(total: usize) {
    if total > MAX_LISTED_FAILURES {
        println!(
            "  {} and {} more (see the summary file)",
            style("…").dim(),
            total - MAX_LISTED_FAILURES
        );
    }
}
