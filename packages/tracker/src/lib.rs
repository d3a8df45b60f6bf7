#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-run orchestration of the active calls tracker.
//!
//! [`pipeline::run`] drives one fetch, diff, aggregate, and persist cycle
//! against a [`active_calls_source::CallSource`] and an
//! [`active_calls_store::SnapshotStore`], and [`outcome`] turns its result
//! into the status the scheduler sees.

pub mod activity_log;
pub mod config;
pub mod github_output;
pub mod outcome;
pub mod pipeline;

use active_calls_models::RunningStatistics;
use active_calls_source::SourceError;
use active_calls_store::StoreError;

pub use config::{ConfigError, EmptyResultPolicy, TrackerConfig};
pub use outcome::{RunOutcome, RunStatus};

/// Errors that end a run unsuccessfully.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The upstream could not be fetched or its records were unusable.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] SourceError),

    /// The upstream listed no calls while the previous snapshot still
    /// held some, and the configured policy refuses to trust that.
    #[error("Upstream returned no calls while {previous} were active; refusing to resolve them")]
    EmptyResultAmbiguity {
        /// Size of the previous snapshot.
        previous: usize,
    },

    /// Reading or writing persisted state failed. Snapshot and statistics
    /// are left as they were unless the commit itself succeeded and only
    /// the archive or log write after it failed.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

/// What a committed run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Calls active in the new snapshot.
    pub total_active: usize,
    /// Calls that appeared this run.
    pub new_calls: usize,
    /// Calls that disappeared this run.
    pub resolved_calls: usize,
    /// Records dropped because their incident number repeated.
    pub duplicates: usize,
    /// Malformed records skipped during validation.
    pub rejected: usize,
    /// Whether an empty fetch was accepted over a non-empty previous
    /// snapshot.
    pub empty_accepted: bool,
    /// Statistics as committed.
    pub statistics: RunningStatistics,
}
