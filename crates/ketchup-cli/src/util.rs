//! Shared utility functions for CLI commands

use std::time::Duration;

/// Format a byte size as a human-readable string
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a run duration as seconds with millisecond precision
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

/// Safely truncate a hash string to a maximum length
#[must_use]
pub fn truncate_hash(hash: &str, max_len: usize) -> &str {
    let end = hash.len().min(max_len);
    &hash[..end]
}
