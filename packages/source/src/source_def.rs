//! Config-driven active call source definition.
//!
//! [`SourceDefinition`] captures everything unique about an agency's
//! active-calls endpoint in a serializable config struct, so a single
//! generic [`CallSource`] implementation serves every agency.

use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::normalize::{FieldMapping, NormalizeReport, normalize_calls};
use crate::parsing::extract_records;
use crate::{CallSource, SourceError, retry};

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of retries for transient HTTP failures.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// A complete, config-driven active call source definition.
///
/// Loaded from TOML files embedded at compile time.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"clearwater_pd"`).
    pub id: String,
    /// Human-readable name (e.g., `"Clearwater Police Department"`).
    pub name: String,
    /// City the agency serves.
    pub city: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// Endpoint returning the active call list as JSON.
    pub api_url: String,
    /// IANA timezone naive upstream timestamps are expressed in.
    pub timezone: Tz,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient HTTP failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Dot-separated path to the record array when the response wraps it
    /// in an object. Defaults to `"data"`.
    #[serde(default)]
    pub records_path: Option<String>,
    /// Upstream field names.
    #[serde(default)]
    pub fields: FieldMapping,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl SourceDefinition {
    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn build_client(&self) -> Result<reqwest::Client, SourceError> {
        Ok(reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent(concat!("active_calls/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}

#[async_trait]
impl CallSource for SourceDefinition {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn timezone(&self) -> Tz {
        self.timezone
    }

    async fn fetch_raw(&self) -> Result<Vec<serde_json::Value>, SourceError> {
        let client = self.build_client()?;

        log::info!("[{}] Fetching active calls from {}", self.id, self.api_url);

        let body = retry::send_json(
            || {
                client
                    .get(&self.api_url)
                    .header(reqwest::header::ACCEPT, "application/json")
            },
            self.max_retries,
        )
        .await?;

        let records = extract_records(body, self.records_path.as_deref())?;
        log::info!("[{}] Received {} raw records", self.id, records.len());

        Ok(records)
    }

    fn normalize(&self, raw: &[serde_json::Value]) -> NormalizeReport {
        normalize_calls(raw, &self.fields, self.timezone)
    }
}

/// Parses a TOML string into a [`SourceDefinition`].
///
/// # Errors
///
/// Returns an error if the TOML is malformed or does not match the
/// expected schema.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, toml::de::Error> {
    toml::de::from_str(toml_str)
}
