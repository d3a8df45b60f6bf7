//! Run-level status reported to the scheduler.

use strum_macros::{AsRefStr, Display};

use crate::{PipelineError, RunReport};

/// Final status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum RunStatus {
    /// New state was committed.
    Success,
    /// The upstream could not be trusted; nothing was committed.
    FetchFailed,
    /// Persisted state could not be read or written.
    PersistenceFailed,
}

impl RunStatus {
    /// Process exit code for this status.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::FetchFailed => 1,
            Self::PersistenceFailed => 2,
        }
    }
}

impl From<&PipelineError> for RunStatus {
    fn from(error: &PipelineError) -> Self {
        match error {
            PipelineError::Fetch(_) | PipelineError::EmptyResultAmbiguity { .. } => {
                Self::FetchFailed
            }
            PipelineError::Persistence(_) => Self::PersistenceFailed,
        }
    }
}

/// Status plus a one-line human-readable summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Run-level status.
    pub status: RunStatus,
    /// What happened, in one line.
    pub summary: String,
}

impl RunOutcome {
    /// Summarizes the result of [`crate::pipeline::run`].
    #[must_use]
    pub fn from_result(result: &Result<RunReport, PipelineError>) -> Self {
        match result {
            Ok(report) => {
                let mut summary = format!(
                    "{} active calls ({} new, {} resolved)",
                    report.total_active, report.new_calls, report.resolved_calls
                );
                if report.empty_accepted {
                    summary.push_str("; empty result accepted");
                }
                if report.duplicates > 0 {
                    summary.push_str(&format!("; {} duplicate records dropped", report.duplicates));
                }
                if report.rejected > 0 {
                    summary.push_str(&format!("; {} malformed records skipped", report.rejected));
                }
                Self {
                    status: RunStatus::Success,
                    summary,
                }
            }
            Err(e) => Self {
                status: RunStatus::from(e),
                summary: e.to_string(),
            },
        }
    }
}
