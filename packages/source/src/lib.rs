#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Active call data sources.
//!
//! Each upstream "active calls" endpoint implements the [`CallSource`]
//! trait: it knows how to fetch the raw JSON records and how to validate
//! them into [`active_calls_models::IncidentRecord`]s. The built-in
//! implementation is the config-driven [`source_def::SourceDefinition`].

pub mod normalize;
pub mod parsing;
pub mod registry;
pub mod retry;
pub mod source_def;

use async_trait::async_trait;
use chrono_tz::Tz;

pub use normalize::NormalizeReport;

/// Errors that can occur while fetching or validating upstream data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (connection, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}")]
    Status {
        /// Numeric HTTP status code.
        status: u16,
    },

    /// The response body did not have the expected shape.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },

    /// Too many records failed validation for the fetch to be trusted.
    #[error("{rejected} of {total} records were malformed")]
    TooManyMalformed {
        /// Records that failed validation.
        rejected: usize,
        /// Records received.
        total: usize,
    },

    /// No source definition has the requested id.
    #[error("Unknown source: {id}")]
    UnknownSource {
        /// The id that was requested.
        id: String,
    },

    /// A source definition could not be parsed.
    #[error("Invalid source definition {name}: {source}")]
    Definition {
        /// Name of the definition file.
        name: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
}

/// Trait that every active call source must implement.
#[async_trait]
pub trait CallSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"clearwater_pd"`).
    fn id(&self) -> &str;

    /// Returns the human-readable name of this source.
    fn name(&self) -> &str;

    /// Timezone the upstream reports naive timestamps in.
    fn timezone(&self) -> Tz;

    /// Fetches the raw records currently listed by the source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the source is unreachable, times out, or
    /// returns a body that is not a list of records.
    async fn fetch_raw(&self) -> Result<Vec<serde_json::Value>, SourceError>;

    /// Validates raw records into incident records, counting rejects.
    fn normalize(&self, raw: &[serde_json::Value]) -> NormalizeReport;

    /// Fetches and validates in one step. The report keeps the reject
    /// count so callers can surface it.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the fetch fails or the malformed share
    /// exceeds `max_malformed_fraction`.
    async fn fetch_records(
        &self,
        max_malformed_fraction: f64,
    ) -> Result<NormalizeReport, SourceError> {
        let raw = self.fetch_raw().await?;
        let report = self.normalize(&raw);

        if report.rejected > 0 {
            log::warn!(
                "[{}] rejected {} of {} malformed records",
                self.id(),
                report.rejected,
                report.total
            );
        }

        report.checked(max_malformed_fraction)
    }
}
