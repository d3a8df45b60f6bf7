//! Step outputs for GitHub Actions.

use std::io::Write as _;
use std::path::Path;

use crate::RunReport;

/// Environment variable naming the step output file.
pub const GITHUB_OUTPUT_ENV: &str = "GITHUB_OUTPUT";

/// `key=value` lines describing a committed run.
#[must_use]
pub fn output_lines(report: &RunReport) -> Vec<String> {
    vec![
        format!("total_active={}", report.total_active),
        format!("new_calls={}", report.new_calls),
        format!("resolved_calls={}", report.resolved_calls),
    ]
}

/// Appends the run's outputs to `path`.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or written.
pub fn append_outputs(path: &Path, report: &RunReport) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    for line in output_lines(report) {
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Appends the run's outputs when `GITHUB_OUTPUT` is set. Failures are
/// logged and otherwise ignored.
pub fn write_if_configured(report: &RunReport) {
    let Some(path) = std::env::var_os(GITHUB_OUTPUT_ENV) else {
        return;
    };
    let path = Path::new(&path);
    match append_outputs(path, report) {
        Ok(()) => log::debug!("Wrote step outputs to {}", path.display()),
        Err(e) => log::warn!("Failed to write step outputs to {}: {e}", path.display()),
    }
}
