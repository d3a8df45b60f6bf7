//! Human-readable activity log blocks.
//!
//! The store only appends lines; this module decides what they say.

use active_calls_models::{DiffResult, IncidentRecord, IncidentStatus};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

const RULE_WIDTH: usize = 80;

/// Title line written once when the log is created.
pub const LOG_TITLE: &str = "ACTIVE CALLS - HISTORICAL LOG";

/// Marker for an empty fetch that was trusted.
pub const EMPTY_ACCEPTED: &str = "EMPTY RESULT ACCEPTED";

/// Marker for an empty fetch that was refused.
pub const EMPTY_REJECTED: &str = "EMPTY RESULT REJECTED";

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Local time label used on incident lines.
fn local_time(captured_at: DateTime<Utc>, tz: Tz) -> String {
    captured_at
        .with_timezone(&tz)
        .format("%Y-%m-%d %H:%M %Z")
        .to_string()
}

/// Lines that open a brand new log.
#[must_use]
pub fn header(started: DateTime<Utc>) -> Vec<String> {
    vec![
        LOG_TITLE.to_string(),
        format!("Tracking started: {}", started.to_rfc3339()),
        rule(),
    ]
}

/// `<time>: NEW Traffic Stop at 1 MAIN ST [CLW24-001]`
#[must_use]
pub fn incident_line(time: &str, status: IncidentStatus, record: &IncidentRecord) -> String {
    format!(
        "{time}: {status} {} at {} [{}]",
        record.call_type, record.address, record.incident_id
    )
}

fn block_start(captured_at: DateTime<Utc>, total_active: usize) -> Vec<String> {
    vec![
        String::new(),
        rule(),
        format!("TIMESTAMP: {}", captured_at.to_rfc3339()),
        format!("TOTAL ACTIVE CALLS: {total_active}"),
        rule(),
    ]
}

/// The block appended by a run that committed a snapshot.
///
/// `empty_previous` is set when an empty fetch was accepted while that
/// many calls were active, and adds an [`EMPTY_ACCEPTED`] line.
#[must_use]
pub fn run_block(
    captured_at: DateTime<Utc>,
    tz: Tz,
    total_active: usize,
    diff: &DiffResult,
    empty_previous: Option<usize>,
) -> Vec<String> {
    let time = local_time(captured_at, tz);
    let mut lines = block_start(captured_at, total_active);

    if let Some(previous) = empty_previous {
        lines.push(format!(
            "{time}: {EMPTY_ACCEPTED} (upstream listed no calls; {previous} previously active calls resolved)"
        ));
    }

    for (status, records) in [
        (IncidentStatus::New, &diff.new_incidents),
        (IncidentStatus::Resolved, &diff.resolved_incidents),
    ] {
        if records.is_empty() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("--- {status} CALLS ({}) ---", records.len()));
        lines.extend(
            records
                .iter()
                .map(|record| incident_line(&time, status, record)),
        );
    }

    if diff.is_unchanged() {
        lines.push(String::new());
        lines.push("No changes since last check.".to_string());
    }

    lines
}

/// The block appended when an empty fetch was refused.
#[must_use]
pub fn rejected_block(captured_at: DateTime<Utc>, tz: Tz, previous: usize) -> Vec<String> {
    let mut lines = block_start(captured_at, previous);
    lines.push(format!(
        "{}: {EMPTY_REJECTED} (upstream listed no calls while {previous} were active; state left unchanged)",
        local_time(captured_at, tz)
    ));
    lines
}
