//! One end-to-end tracker run.

use active_calls_analytics::{aggregate, diff::diff};
use active_calls_models::Snapshot;
use active_calls_source::CallSource;
use active_calls_store::{SnapshotStore, StoreError};
use chrono::{DateTime, Utc};

use crate::activity_log;
use crate::config::{EmptyResultPolicy, TrackerConfig};
use crate::{PipelineError, RunReport};

/// Runs one fetch, diff, aggregate, and persist cycle.
///
/// `now` is the capture time of the new snapshot. It timestamps the
/// snapshot, the resolution samples, and the log block, and its date in
/// the source's timezone picks the archive day.
///
/// Snapshot and statistics are committed together, and only once fetch,
/// diff, and aggregation have succeeded. A fetch failure or a refused
/// empty result leaves the snapshot, statistics, and archive untouched.
/// The archive entry and log block are written after the commit, so they
/// only ever describe committed runs.
///
/// # Errors
///
/// * [`PipelineError::Fetch`] if the source is unreachable or its records
///   are unusable
/// * [`PipelineError::EmptyResultAmbiguity`] if the source listed nothing
///   while calls were active and the policy is
///   [`EmptyResultPolicy::Reject`]
/// * [`PipelineError::Persistence`] if the lock is held or any read or
///   write of persisted state fails
pub async fn run(
    source: &dyn CallSource,
    store: &impl SnapshotStore,
    config: &TrackerConfig,
    now: DateTime<Utc>,
) -> Result<RunReport, PipelineError> {
    let _lock = store.lock()?;

    let fetched = source
        .fetch_records(config.max_malformed_fraction)
        .await
        .inspect_err(|e| log::error!("[{}] Fetch failed: {e}", source.id()))?;
    let rejected = fetched.rejected;

    let (current, duplicates) = Snapshot::from_records(now, fetched.records);
    if duplicates > 0 {
        log::warn!(
            "[{}] {duplicates} records repeated an incident number; kept the last occurrence",
            source.id()
        );
    }
    log::info!("[{}] Fetched {} active calls", source.id(), current.len());

    let previous = store.load_current()?;
    let mut stats = store.load_statistics()?;
    let tz = source.timezone();

    let changes = diff(&previous, &current);

    let ambiguous_empty =
        current.is_empty() && previous.len() >= config.ambiguity_threshold;
    if ambiguous_empty {
        match config.empty_result_policy {
            EmptyResultPolicy::Reject => {
                log::error!(
                    "[{}] Upstream listed no calls while {} were active; rejecting the empty result",
                    source.id(),
                    previous.len()
                );
                let block = activity_log::rejected_block(now, tz, previous.len());
                if let Err(e) = append_log_block(store, now, block) {
                    log::error!("Failed to record the rejected empty result: {e}");
                }
                return Err(PipelineError::EmptyResultAmbiguity {
                    previous: previous.len(),
                });
            }
            EmptyResultPolicy::Accept => {
                log::warn!(
                    "[{}] Upstream listed no calls while {} were active; accepting and resolving all",
                    source.id(),
                    previous.len()
                );
            }
        }
    }

    log::info!(
        "New calls: {}, resolved calls: {}, still active: {}",
        changes.new_incidents.len(),
        changes.resolved_incidents.len(),
        changes.still_active.len()
    );

    aggregate::update(&mut stats, &changes, current.len(), now);

    store.commit(&current, &stats)?;

    store
        .append_archive(now.with_timezone(&tz).date_naive(), &current)
        .inspect_err(|e| log::error!("State committed but archiving failed: {e}"))?;

    let block = activity_log::run_block(
        now,
        tz,
        current.len(),
        &changes,
        ambiguous_empty.then_some(previous.len()),
    );
    append_log_block(store, now, block)
        .inspect_err(|e| log::error!("State committed but the log append failed: {e}"))?;

    Ok(RunReport {
        total_active: current.len(),
        new_calls: changes.new_incidents.len(),
        resolved_calls: changes.resolved_incidents.len(),
        duplicates,
        rejected,
        empty_accepted: ambiguous_empty,
        statistics: stats,
    })
}

/// Appends `block`, preceded by the log header when the log is new.
fn append_log_block(
    store: &impl SnapshotStore,
    now: DateTime<Utc>,
    block: Vec<String>,
) -> Result<(), StoreError> {
    let mut lines = if store.has_log()? {
        Vec::new()
    } else {
        activity_log::header(now)
    };
    lines.extend(block);
    store.append_log(&lines)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use active_calls_source::normalize::{FieldMapping, normalize_calls};
    use active_calls_source::{NormalizeReport, SourceError};
    use active_calls_store::FsSnapshotStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Tz;
    use serde_json::{Value, json};

    use super::*;
    use crate::RunOutcome;

    /// Serves a fixed payload, or fails like an outage when `None`.
    struct StaticSource {
        raw: Option<Vec<Value>>,
    }

    impl StaticSource {
        fn calls(ids: &[&str]) -> Self {
            Self {
                raw: Some(ids.iter().map(|id| call(id, "Traffic Stop", "1 MAIN ST")).collect()),
            }
        }

        fn raw(raw: Vec<Value>) -> Self {
            Self { raw: Some(raw) }
        }

        const fn down() -> Self {
            Self { raw: None }
        }
    }

    #[async_trait]
    impl CallSource for StaticSource {
        fn id(&self) -> &str {
            "static"
        }

        fn name(&self) -> &str {
            "Static Test Source"
        }

        fn timezone(&self) -> Tz {
            chrono_tz::America::New_York
        }

        async fn fetch_raw(&self) -> Result<Vec<Value>, SourceError> {
            self.raw
                .clone()
                .ok_or(SourceError::Status { status: 503 })
        }

        fn normalize(&self, raw: &[Value]) -> NormalizeReport {
            normalize_calls(raw, &FieldMapping::default(), self.timezone())
        }
    }

    fn call(id: &str, call_type: &str, address: &str) -> Value {
        json!({
            "Master_Incident_Number": id,
            "Online_Description": call_type,
            "Address": address,
            "Response_Date": "2024-01-15T13:00:00",
        })
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("active_calls_pipeline_{name}"));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    /// 14:00 EST on 2024-01-15, plus `minutes`.
    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 19, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    fn read_log(store: &FsSnapshotStore) -> String {
        fs::read_to_string(store.paths().historical_log()).unwrap()
    }

    #[tokio::test]
    async fn first_run_records_everything_as_new() {
        let dir = scratch("first_run");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();

        let report = run(&StaticSource::calls(&["A", "B"]), &store, &config, at(0))
            .await
            .unwrap();

        assert_eq!(report.total_active, 2);
        assert_eq!(report.new_calls, 2);
        assert_eq!(report.resolved_calls, 0);
        assert_eq!(report.statistics.total_snapshots_processed, 1);
        assert_eq!(report.statistics.hourly_histogram[13], 2);
        assert_eq!(store.load_current().unwrap().len(), 2);
        assert_eq!(store.load_statistics().unwrap(), report.statistics);

        let log = read_log(&store);
        assert!(log.starts_with(activity_log::LOG_TITLE));
        assert!(log.contains("2024-01-15 14:00 EST: NEW Traffic Stop at 1 MAIN ST [A]"));

        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(store.load_archive(day).unwrap().unwrap().snapshots.len(), 1);
        assert!(!store.paths().lock().exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn example_scenario_across_two_runs() {
        let dir = scratch("scenario");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();

        let first = StaticSource::raw(vec![
            call("A", "Traffic Stop", "1 Main St"),
            call("B", "Disturbance", "2 Oak St"),
        ]);
        run(&first, &store, &config, at(0)).await.unwrap();

        let second = StaticSource::raw(vec![
            call("B", "Disturbance", "2 Oak St"),
            call("C", "Traffic Stop", "1 Main St"),
        ]);
        let report = run(&second, &store, &config, at(30)).await.unwrap();

        assert_eq!(report.new_calls, 1);
        assert_eq!(report.resolved_calls, 1);
        assert_eq!(report.statistics.call_type_counts["Traffic Stop"], 2);
        assert_eq!(report.statistics.address_counts["1 Main St"], 2);
        // A was dispatched at 13:00 local and first seen gone at 14:30.
        assert_eq!(report.statistics.resolution_time_samples, vec![90 * 60]);

        let log = read_log(&store);
        assert_eq!(log.matches(activity_log::LOG_TITLE).count(), 1);
        assert!(log.contains("RESOLVED Traffic Stop at 1 Main St [A]"));
        assert!(log.contains("NEW Traffic Stop at 1 Main St [C]"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn empty_fetch_is_rejected_without_touching_state() {
        let dir = scratch("empty_reject");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();

        run(&StaticSource::calls(&["A", "B", "C", "D", "E"]), &store, &config, at(0))
            .await
            .unwrap();
        let snapshot_before = fs::read(store.paths().current_calls()).unwrap();
        let stats_before = fs::read(store.paths().stats()).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();

        let result = run(&StaticSource::raw(Vec::new()), &store, &config, at(5)).await;

        assert!(matches!(
            result,
            Err(PipelineError::EmptyResultAmbiguity { previous: 5 })
        ));
        assert_eq!(fs::read(store.paths().current_calls()).unwrap(), snapshot_before);
        assert_eq!(fs::read(store.paths().stats()).unwrap(), stats_before);
        assert_eq!(store.load_archive(day).unwrap().unwrap().snapshots.len(), 1);
        assert!(read_log(&store).contains(activity_log::EMPTY_REJECTED));
        assert!(!read_log(&store).contains("RESOLVED"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn empty_fetch_is_accepted_when_configured() {
        let dir = scratch("empty_accept");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig {
            empty_result_policy: EmptyResultPolicy::Accept,
            ..TrackerConfig::default()
        };

        run(&StaticSource::calls(&["A", "B", "C", "D", "E"]), &store, &config, at(0))
            .await
            .unwrap();
        let report = run(&StaticSource::raw(Vec::new()), &store, &config, at(5))
            .await
            .unwrap();

        assert!(report.empty_accepted);
        assert_eq!(report.resolved_calls, 5);
        assert_eq!(report.statistics.resolution_time_samples.len(), 5);
        assert_eq!(report.statistics.peak_concurrent_calls, 5);
        assert!(store.load_current().unwrap().is_empty());
        assert!(read_log(&store).contains(activity_log::EMPTY_ACCEPTED));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn empty_fetch_below_threshold_is_trusted() {
        let dir = scratch("empty_threshold");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig {
            ambiguity_threshold: 3,
            ..TrackerConfig::default()
        };

        run(&StaticSource::calls(&["A", "B"]), &store, &config, at(0))
            .await
            .unwrap();
        let report = run(&StaticSource::raw(Vec::new()), &store, &config, at(5))
            .await
            .unwrap();

        assert_eq!(report.resolved_calls, 2);
        assert!(!report.empty_accepted);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn fetch_failure_leaves_state_untouched() {
        let dir = scratch("fetch_failure");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();

        run(&StaticSource::calls(&["A"]), &store, &config, at(0))
            .await
            .unwrap();
        let snapshot_before = fs::read(store.paths().current_calls()).unwrap();
        let log_before = read_log(&store);

        let result = run(&StaticSource::down(), &store, &config, at(5)).await;

        assert!(matches!(
            result,
            Err(PipelineError::Fetch(SourceError::Status { status: 503 }))
        ));
        assert_eq!(fs::read(store.paths().current_calls()).unwrap(), snapshot_before);
        assert_eq!(read_log(&store), log_before);
        assert!(!store.paths().lock().exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn all_malformed_fetch_fails() {
        let dir = scratch("all_malformed");
        let store = FsSnapshotStore::new(&dir);

        let source = StaticSource::raw(vec![json!({"Address": "1 MAIN ST"}), json!("junk")]);
        let result = run(&source, &store, &TrackerConfig::default(), at(0)).await;

        assert!(matches!(
            result,
            Err(PipelineError::Fetch(SourceError::TooManyMalformed {
                rejected: 2,
                total: 2
            }))
        ));
        assert!(!store.paths().current_calls().exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn partially_malformed_fetch_keeps_valid_records() {
        let dir = scratch("partially_malformed");
        let store = FsSnapshotStore::new(&dir);

        let source = StaticSource::raw(vec![
            call("A", "Alarm", "3 ELM ST"),
            json!({"Master_Incident_Number": "B", "Response_Date": "not a date"}),
        ]);
        let report = run(&source, &store, &TrackerConfig::default(), at(0))
            .await
            .unwrap();

        assert_eq!(report.total_active, 1);
        assert_eq!(report.rejected, 1);
        assert!(
            RunOutcome::from_result(&Ok(report))
                .summary
                .contains("1 malformed records skipped")
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn duplicate_ids_keep_last_occurrence() {
        let dir = scratch("duplicates");
        let store = FsSnapshotStore::new(&dir);

        let source = StaticSource::raw(vec![
            call("A", "Suspicious Person", "1 MAIN ST"),
            call("A", "Disturbance", "1 MAIN ST"),
        ]);
        let report = run(&source, &store, &TrackerConfig::default(), at(0))
            .await
            .unwrap();

        assert_eq!(report.duplicates, 1);
        assert_eq!(report.total_active, 1);
        assert_eq!(report.statistics.call_type_counts.get("Disturbance"), Some(&1));
        assert!(!report.statistics.call_type_counts.contains_key("Suspicious Person"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn resolution_sampled_when_first_absent() {
        let dir = scratch("resolution");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();

        for (minutes, ids) in [
            (0, vec!["X", "Y"]),
            (5, vec!["X", "Y"]),
            (10, vec!["X", "Y"]),
            (15, vec!["Y"]),
            (20, vec!["Y"]),
        ] {
            run(&StaticSource::calls(&ids), &store, &config, at(minutes))
                .await
                .unwrap();
        }

        let stats = store.load_statistics().unwrap();
        assert_eq!(stats.total_snapshots_processed, 5);
        assert_eq!(stats.resolution_time_samples, vec![75 * 60]);
        assert_eq!(stats.total_resolved, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn held_lock_fails_before_fetching() {
        let dir = scratch("locked");
        let store = FsSnapshotStore::new(&dir);
        let guard = store.lock().unwrap();

        let result = run(
            &StaticSource::calls(&["A"]),
            &store,
            &TrackerConfig::default(),
            at(0),
        )
        .await;

        assert!(matches!(
            result,
            Err(PipelineError::Persistence(StoreError::Locked { .. }))
        ));
        assert!(!store.paths().current_calls().exists());

        drop(guard);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn persistence_failure_keeps_previous_state() {
        let dir = scratch("persistence_failure");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();

        run(&StaticSource::calls(&["A"]), &store, &config, at(0))
            .await
            .unwrap();
        let snapshot_before = fs::read(store.paths().current_calls()).unwrap();
        let stats_before = fs::read(store.paths().stats()).unwrap();

        let log_before = read_log(&store);
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let archive_before = store.load_archive(day).unwrap();

        fs::create_dir_all(store.paths().analysis_dir().join("stats.json.tmp")).unwrap();
        let result = run(&StaticSource::calls(&["B"]), &store, &config, at(5)).await;

        assert!(matches!(result, Err(PipelineError::Persistence(_))));
        assert_eq!(fs::read(store.paths().current_calls()).unwrap(), snapshot_before);
        assert_eq!(fs::read(store.paths().stats()).unwrap(), stats_before);
        assert_eq!(read_log(&store), log_before);
        assert_eq!(store.load_archive(day).unwrap(), archive_before);
        assert!(!read_log(&store).contains("[B]"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn failed_stats_rename_keeps_snapshot_and_log() {
        let dir = scratch("failed_rename");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();

        run(&StaticSource::calls(&["A"]), &store, &config, at(0))
            .await
            .unwrap();
        let log_before = read_log(&store);

        fs::remove_file(store.paths().stats()).unwrap();
        fs::create_dir_all(store.paths().stats()).unwrap();
        fs::write(store.paths().stats().join("keep"), "x").unwrap();

        let result = run(&StaticSource::calls(&["B"]), &store, &config, at(5)).await;

        assert!(matches!(result, Err(PipelineError::Persistence(_))));
        let current = store.load_current().unwrap();
        assert!(current.records.contains_key("A"));
        assert!(!current.records.contains_key("B"));
        assert_eq!(read_log(&store), log_before);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn header_written_once_after_failed_first_commit() {
        let dir = scratch("header_once");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();
        let squat = store.paths().analysis_dir().join("stats.json.tmp");

        fs::create_dir_all(&squat).unwrap();
        let result = run(&StaticSource::calls(&["A"]), &store, &config, at(0)).await;
        assert!(matches!(result, Err(PipelineError::Persistence(_))));
        assert!(!store.paths().historical_log().exists());

        fs::remove_dir_all(&squat).unwrap();
        run(&StaticSource::calls(&["A"]), &store, &config, at(5))
            .await
            .unwrap();
        run(&StaticSource::calls(&["A", "B"]), &store, &config, at(10))
            .await
            .unwrap();

        let log = read_log(&store);
        assert!(log.starts_with(activity_log::LOG_TITLE));
        assert_eq!(log.matches(activity_log::LOG_TITLE).count(), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn rejected_empty_result_starts_log_with_header() {
        let dir = scratch("rejected_header");
        let store = FsSnapshotStore::new(&dir);
        let config = TrackerConfig::default();
        store
            .commit(
                &Snapshot::from_records(
                    at(0),
                    normalize_calls(
                        &["A", "B", "C", "D", "E"].map(|id| call(id, "Alarm", "3 ELM ST")),
                        &FieldMapping::default(),
                        chrono_tz::America::New_York,
                    )
                    .records,
                )
                .0,
                &active_calls_models::RunningStatistics::default(),
            )
            .unwrap();

        let result = run(&StaticSource::raw(Vec::new()), &store, &config, at(5)).await;

        assert!(matches!(
            result,
            Err(PipelineError::EmptyResultAmbiguity { previous: 5 })
        ));
        let log = read_log(&store);
        assert!(log.starts_with(activity_log::LOG_TITLE));
        assert!(log.contains(activity_log::EMPTY_REJECTED));

        fs::remove_dir_all(&dir).unwrap();
    }
}
