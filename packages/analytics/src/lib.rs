#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Snapshot diffing and incremental statistics for active calls.
//!
//! [`diff::diff`] classifies incidents between two snapshots;
//! [`aggregate::update`] folds one diff into the cumulative
//! [`active_calls_models::RunningStatistics`] without revisiting history;
//! [`summary`] derives read-only views and the Markdown report.

pub mod aggregate;
pub mod diff;
pub mod summary;
