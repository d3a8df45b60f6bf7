//! Incremental statistics update.
//!
//! Each run folds exactly one [`DiffResult`] into the running totals.
//! Calling [`update`] twice with the same diff counts it twice; the
//! pipeline guarantees one call per run.

use active_calls_models::{DiffResult, IncidentRecord, RunningStatistics};
use chrono::{DateTime, Utc};

/// Folds one run's diff into the cumulative statistics.
///
/// - every new incident bumps its call type, address, and local dispatch
///   hour;
/// - every resolved incident appends `now - dispatched_at` (in seconds,
///   clamped at zero) to the resolution samples;
/// - the peak concurrency becomes `max(peak, snapshot_size)`;
/// - the processed-snapshot count goes up by one.
///
/// `now` is the capture time of the run that observed the resolutions.
pub fn update(
    stats: &mut RunningStatistics,
    diff: &DiffResult,
    snapshot_size: usize,
    now: DateTime<Utc>,
) {
    for record in &diff.new_incidents {
        *stats
            .call_type_counts
            .entry(record.call_type.clone())
            .or_insert(0) += 1;
        *stats
            .address_counts
            .entry(record.address.clone())
            .or_insert(0) += 1;
        stats.hourly_histogram[record.dispatch_hour()] += 1;
    }

    stats.resolution_time_samples.extend(
        diff.resolved_incidents
            .iter()
            .map(|record| resolution_seconds(record, now)),
    );

    stats.total_calls_tracked += diff.new_incidents.len() as u64;
    stats.total_resolved += diff.resolved_incidents.len() as u64;
    stats.peak_concurrent_calls = stats.peak_concurrent_calls.max(snapshot_size as u64);
    stats.total_snapshots_processed += 1;

    if stats.first_tracked.is_none() {
        stats.first_tracked = Some(now);
    }
    stats.last_updated = Some(now);

    log::debug!(
        "Statistics updated: {} new, {} resolved, peak {}, {} snapshots",
        diff.new_incidents.len(),
        diff.resolved_incidents.len(),
        stats.peak_concurrent_calls,
        stats.total_snapshots_processed
    );
}

/// Seconds between dispatch and `resolved_at`, clamped at zero.
#[must_use]
pub fn resolution_seconds(record: &IncidentRecord, resolved_at: DateTime<Utc>) -> u64 {
    let elapsed = resolved_at.signed_duration_since(record.dispatched_at);
    u64::try_from(elapsed.num_seconds()).unwrap_or(0)
}
