//! Logging utilities for formatted output.
//!
//! Number, duration, and rate formatting shared by the node and the CLI, and
//! the end-of-search summary.

use std::time::{Duration, Instant};

use crate::worker_node::SearchResults;

/// Formats a count with thousands separators.
///
/// # Examples
///
/// ```
/// use hmmnode_lib::logging::format_count;
///
/// assert_eq!(format_count(0), "0");
/// assert_eq!(format_count(1_234_567), "1,234,567");
/// ```
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats a percentage with specified decimal places.
///
/// # Arguments
///
/// * `value` - The fraction (0.0-1.0) to format as percentage
/// * `decimals` - Number of decimal places to include
///
/// # Examples
///
/// ```
/// use hmmnode_lib::logging::format_percent;
///
/// assert_eq!(format_percent(0.9543, 2), "95.43%");
/// assert_eq!(format_percent(1.0, 0), "100%");
/// ```
#[must_use]
pub fn format_percent(value: f64, decimals: usize) -> String {
    format!("{:.decimals$}%", value * 100.0, decimals = decimals)
}

/// Formats a duration in human-readable form ("45s", "2m 15s", "1h 30m").
///
/// Durations under a second are shown in milliseconds.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 { format!("{mins}m") } else { format!("{mins}m {remaining_secs}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a rate (items per second) with appropriate units.
///
/// # Examples
///
/// ```
/// use hmmnode_lib::logging::format_rate;
/// use std::time::Duration;
///
/// assert_eq!(format_rate(1000, Duration::from_secs(1)), "1,000 records/s");
/// assert_eq!(format_rate(30, Duration::from_secs(60)), "30.0 records/min");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} records/s", format_count(count));
    }

    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} records/s", format_count(rate as u64))
    } else {
        let per_min = count as f64 / (secs / 60.0);
        format!("{per_min:.1} records/min")
    }
}

/// Logs a formatted summary of one search.
#[allow(clippy::cast_precision_loss)]
pub fn log_search_summary(results: &SearchResults) {
    log::info!("Search Summary ({} on database {}):", results.kind, results.database);
    log::info!("  Records filtered: {}", format_count(results.records_processed));
    log::info!("  Back-end comparisons: {}", format_count(results.comparisons_queued));
    if results.records_processed > 0 {
        let pass_rate = results.comparisons_queued as f64 / results.records_processed as f64;
        log::info!("  Filter pass rate: {}", format_percent(pass_rate, 2));
    }
    log::info!("  Hits: {}", format_count(results.hit_count() as u64));
    log::info!(
        "  Elapsed: {} ({})",
        format_duration(results.elapsed),
        format_rate(results.records_processed, results.elapsed)
    );
    log::debug!(
        "  Steals: {}, peak back-end depth: {}",
        results.steals,
        results.backend_peak_depth
    );
    for (thread_id, stats) in results.thread_stats.iter().enumerate() {
        log::debug!(
            "  Thread {thread_id}: filtered={} queued={} scored={} hits={} chunks={} \
             steals={} promotions={}",
            stats.records_filtered,
            stats.comparisons_queued,
            stats.backend_scored,
            stats.hits,
            stats.chunks_taken,
            stats.steals,
            stats.promotions
        );
    }
    if let Some(coverage) = &results.coverage {
        if coverage.is_exact() {
            log::debug!("  Coverage: exact");
        } else {
            log::warn!(
                "  Coverage: {} missing, {} duplicated, {} unexpected record(s)",
                coverage.missing.len(),
                coverage.duplicated.len(),
                coverage.unexpected.len()
            );
        }
    }
}

/// Operation timing and summary helper.
///
/// # Examples
///
/// ```no_run
/// use hmmnode_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Generating shard");
/// // ... do work ...
/// timer.log_completion(10_000);
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with item count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}
