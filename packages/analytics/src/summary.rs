//! Read-only views over [`RunningStatistics`] and the Markdown report.

use std::collections::BTreeMap;

use active_calls_models::RunningStatistics;

/// Heading of the rendered report.
pub const SUMMARY_TITLE: &str = "## Active Calls Tracker - Statistics";

/// The `n` largest entries, by count descending then name ascending.
#[must_use]
pub fn top_n(counts: &BTreeMap<String, u64>, n: usize) -> Vec<(&str, u64)> {
    let mut entries: Vec<(&str, u64)> = counts
        .iter()
        .map(|(name, count)| (name.as_str(), *count))
        .collect();
    // BTreeMap iteration is already name-ascending; a stable sort keeps it.
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(n);
    entries
}

/// Median resolution time in seconds.
///
/// For an even number of samples this is the mean of the two middle
/// values, rounded down.
#[must_use]
pub fn median_resolution(stats: &RunningStatistics) -> Option<u64> {
    let mut samples = stats.resolution_time_samples.clone();
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();

    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some(samples[mid - 1].midpoint(samples[mid]))
    } else {
        Some(samples[mid])
    }
}

/// Mean resolution time in seconds, rounded down.
#[must_use]
pub fn mean_resolution(stats: &RunningStatistics) -> Option<u64> {
    let samples = &stats.resolution_time_samples;
    if samples.is_empty() {
        return None;
    }
    let total: u128 = samples.iter().map(|&s| u128::from(s)).sum();
    u64::try_from(total / samples.len() as u128).ok()
}

/// Hour of day with the most new incidents, and its count.
///
/// Ties go to the earliest hour. `None` until something was counted.
#[must_use]
pub fn busiest_hour(stats: &RunningStatistics) -> Option<(usize, u64)> {
    stats
        .hourly_histogram
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, count)| count > 0)
        .fold(None, |best: Option<(usize, u64)>, (hour, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((hour, count)),
        })
}

/// Human-readable duration such as `1h 30m`, `12m 5s`, or `40s`.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Renders the statistics as a Markdown report.
#[must_use]
pub fn render_summary(stats: &RunningStatistics, top: usize) -> String {
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
    };
    let duration = |d: Option<u64>| d.map_or_else(|| "n/a".to_string(), format_duration);

    let mut lines = vec![
        SUMMARY_TITLE.to_string(),
        String::new(),
        format!("**Last Updated:** {}", timestamp(stats.last_updated)),
        format!("**Tracking Since:** {}", timestamp(stats.first_tracked)),
        format!("**Total Snapshots:** {}", stats.total_snapshots_processed),
        format!("**Total Calls Tracked:** {}", stats.total_calls_tracked),
        format!("**Total Resolved:** {}", stats.total_resolved),
        format!("**Peak Active Calls:** {}", stats.peak_concurrent_calls),
        format!(
            "**Median Resolution Time:** {}",
            duration(median_resolution(stats))
        ),
        format!(
            "**Mean Resolution Time:** {}",
            duration(mean_resolution(stats))
        ),
    ];

    if let Some((hour, count)) = busiest_hour(stats) {
        lines.push(format!("**Busiest Hour:** {hour:02}:00 ({count} calls)"));
    }

    for (heading, counts) in [
        ("Call Types", &stats.call_type_counts),
        ("Addresses", &stats.address_counts),
    ] {
        lines.push(String::new());
        lines.push(format!("### Top {top} {heading}"));
        lines.push(String::new());
        let entries = top_n(counts, top);
        if entries.is_empty() {
            lines.push("- none yet".to_string());
        }
        for (name, count) in entries {
            lines.push(format!("- {name}: {count}"));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
