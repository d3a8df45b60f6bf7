#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical active-call types shared across the tracker.
//!
//! Every upstream payload is validated into [`IncidentRecord`]s, grouped
//! into a [`Snapshot`] keyed by incident number, compared into a
//! [`DiffResult`], and folded into the cumulative [`RunningStatistics`].
//!
//! Records serialize with the upstream field names so that persisted
//! snapshots stay readable next to the raw API output.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of buckets in the hour-of-day histogram.
pub const HOURS_PER_DAY: usize = 24;

/// One currently active call for service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentRecord {
    /// Upstream incident number. Unique within a snapshot and stable for
    /// as long as the call stays active.
    #[serde(rename = "Master_Incident_Number")]
    pub incident_id: String,
    /// Call category label (e.g. "Traffic Stop").
    #[serde(rename = "Online_Description")]
    pub call_type: String,
    /// Location text, used verbatim for hotspot counting.
    #[serde(rename = "Address")]
    pub address: String,
    /// When the call was dispatched, in the source's local offset.
    #[serde(rename = "Response_Date")]
    pub dispatched_at: DateTime<FixedOffset>,
}

impl IncidentRecord {
    /// Local hour of day (0-23) the call was dispatched in.
    #[must_use]
    pub fn dispatch_hour(&self) -> usize {
        self.dispatched_at.hour() as usize
    }
}

/// Whether a logged incident appeared or disappeared in a run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentStatus {
    /// Present now, absent in the previous snapshot.
    New,
    /// Present in the previous snapshot, absent now.
    Resolved,
}

/// The full set of active incidents observed at one fetch instant.
///
/// Persisted as `{ "calls": [...], "timestamp": ..., "count": n }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SnapshotFile", into = "SnapshotFile")]
pub struct Snapshot {
    /// When the snapshot was fetched. `None` for the empty first-run
    /// snapshot.
    pub captured_at: Option<DateTime<Utc>>,
    /// Records keyed by incident number.
    pub records: BTreeMap<String, IncidentRecord>,
}

impl Snapshot {
    /// Builds a snapshot from records in upstream order.
    ///
    /// When an incident number repeats, the last occurrence wins. Returns
    /// the snapshot together with the number of records that were
    /// overwritten that way.
    #[must_use]
    pub fn from_records(
        captured_at: DateTime<Utc>,
        records: impl IntoIterator<Item = IncidentRecord>,
    ) -> (Self, usize) {
        let mut map = BTreeMap::new();
        let mut duplicates = 0;

        for record in records {
            if map.insert(record.incident_id.clone(), record).is_some() {
                duplicates += 1;
            }
        }

        (
            Self {
                captured_at: Some(captured_at),
                records: map,
            },
            duplicates,
        )
    }

    /// Number of active incidents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no incidents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the given incident number is active in this snapshot.
    #[must_use]
    pub fn contains(&self, incident_id: &str) -> bool {
        self.records.contains_key(incident_id)
    }

    /// Iterates over the incident numbers in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

/// On-disk shape of a [`Snapshot`].
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    calls: Vec<IncidentRecord>,
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    count: usize,
}

impl From<SnapshotFile> for Snapshot {
    fn from(file: SnapshotFile) -> Self {
        Self {
            captured_at: file.timestamp,
            records: file
                .calls
                .into_iter()
                .map(|record| (record.incident_id.clone(), record))
                .collect(),
        }
    }
}

impl From<Snapshot> for SnapshotFile {
    fn from(snapshot: Snapshot) -> Self {
        let calls: Vec<IncidentRecord> = snapshot.records.into_values().collect();
        Self {
            count: calls.len(),
            calls,
            timestamp: snapshot.captured_at,
        }
    }
}

/// Classification of incidents between two consecutive snapshots.
///
/// Each list is ordered by incident number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Present now, absent previously.
    pub new_incidents: Vec<IncidentRecord>,
    /// Present previously, absent now. Carries the previous record.
    pub resolved_incidents: Vec<IncidentRecord>,
    /// Present in both. Carries the current record.
    pub still_active: Vec<IncidentRecord>,
}

impl DiffResult {
    /// Whether nothing appeared or disappeared.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.new_incidents.is_empty() && self.resolved_incidents.is_empty()
    }
}

/// Cumulative statistics carried across every run.
///
/// Counts only grow, the peak only rises, and resolution samples are
/// append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunningStatistics {
    /// Number of snapshots folded in so far.
    #[serde(alias = "total_snapshots")]
    pub total_snapshots_processed: u64,
    /// Number of new-incident observations.
    pub total_calls_tracked: u64,
    /// Number of resolved-incident observations.
    pub total_resolved: u64,
    /// New-incident count per call type.
    #[serde(alias = "call_types")]
    pub call_type_counts: BTreeMap<String, u64>,
    /// New-incident count per address.
    #[serde(alias = "addresses")]
    pub address_counts: BTreeMap<String, u64>,
    /// New-incident count per local dispatch hour. Also read from an
    /// object keyed by hour (`{"0": 3, "13": 1}`).
    #[serde(alias = "hourly_distribution", deserialize_with = "hourly::deserialize")]
    pub hourly_histogram: [u64; HOURS_PER_DAY],
    /// Seconds from dispatch until the run that first saw the incident
    /// gone, one entry per resolved incident in observation order.
    pub resolution_time_samples: Vec<u64>,
    /// Largest snapshot size seen.
    #[serde(alias = "peak_active_calls")]
    pub peak_concurrent_calls: u64,
    /// Time of the first processed run.
    pub first_tracked: Option<DateTime<Utc>>,
    /// Time of the most recent processed run.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for RunningStatistics {
    fn default() -> Self {
        Self {
            total_snapshots_processed: 0,
            total_calls_tracked: 0,
            total_resolved: 0,
            call_type_counts: BTreeMap::new(),
            address_counts: BTreeMap::new(),
            hourly_histogram: [0; HOURS_PER_DAY],
            resolution_time_samples: Vec::new(),
            peak_concurrent_calls: 0,
            first_tracked: None,
            last_updated: None,
        }
    }
}

mod hourly {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    use crate::HOURS_PER_DAY;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Histogram {
        Buckets([u64; HOURS_PER_DAY]),
        ByHour(BTreeMap<String, u64>),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u64; HOURS_PER_DAY], D::Error> {
        match Histogram::deserialize(deserializer)? {
            Histogram::Buckets(buckets) => Ok(buckets),
            Histogram::ByHour(counts) => {
                let mut buckets = [0; HOURS_PER_DAY];
                for (key, count) in counts {
                    let hour = key
                        .trim()
                        .parse::<usize>()
                        .ok()
                        .filter(|hour| *hour < HOURS_PER_DAY)
                        .ok_or_else(|| D::Error::custom(format!("invalid hour key {key:?}")))?;
                    buckets[hour] += count;
                }
                Ok(buckets)
            }
        }
    }
}
