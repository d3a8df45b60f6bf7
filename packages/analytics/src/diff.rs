//! Set difference between consecutive snapshots, keyed by incident number.

use active_calls_models::{DiffResult, Snapshot};

/// Classifies incidents as new, resolved, or still active.
///
/// - `new` = current − previous (current record)
/// - `resolved` = previous − current (previous record)
/// - `still_active` = current ∩ previous (current record)
///
/// An empty `previous` makes every current incident new. Whether an empty
/// `current` can be trusted is the caller's decision; here it simply
/// resolves everything.
#[must_use]
pub fn diff(previous: &Snapshot, current: &Snapshot) -> DiffResult {
    let mut result = DiffResult::default();

    for (id, record) in &current.records {
        if previous.contains(id) {
            result.still_active.push(record.clone());
        } else {
            result.new_incidents.push(record.clone());
        }
    }

    result.resolved_incidents = previous
        .records
        .iter()
        .filter(|(id, _)| !current.contains(id))
        .map(|(_, record)| record.clone())
        .collect();

    result
}
