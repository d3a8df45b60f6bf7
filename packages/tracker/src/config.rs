//! Tracker configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `ACTIVE_CALLS_*` environment variables, then command-line flags. The
//! result is checked once with [`TrackerConfig::validate`].

use std::path::{Path, PathBuf};

use active_calls_source::registry::DEFAULT_SOURCE_ID;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// Overrides [`TrackerConfig::storage_root`].
pub const STORAGE_ROOT_ENV: &str = "ACTIVE_CALLS_STORAGE_ROOT";

/// Overrides [`TrackerConfig::source`].
pub const SOURCE_ENV: &str = "ACTIVE_CALLS_SOURCE";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config file path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`TrackerConfig`].
    #[error("Invalid config {path}: {source}")]
    Toml {
        /// Config file path.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Which value and why.
        message: String,
    },
}

/// What to do when a fetch succeeds with zero records while the previous
/// snapshot still holds calls.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EmptyResultPolicy {
    /// Fail the run and leave state untouched.
    #[default]
    Reject,
    /// Treat the empty snapshot as genuine and resolve everything.
    Accept,
}

/// Settings for one tracker run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Directory holding `data/` and `analysis/`.
    pub storage_root: PathBuf,
    /// Id of the source definition to fetch from.
    pub source: String,
    /// Handling of ambiguous empty fetches.
    pub empty_result_policy: EmptyResultPolicy,
    /// Previous-snapshot size at or above which an empty fetch is
    /// ambiguous.
    pub ambiguity_threshold: usize,
    /// Largest share of malformed records (0.0 to 1.0) a fetch may contain.
    /// A fetch where every record is malformed always fails.
    pub max_malformed_fraction: f64,
    /// Entries per ranking in the statistics report.
    pub summary_top_n: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("."),
            source: DEFAULT_SOURCE_ID.to_string(),
            empty_result_policy: EmptyResultPolicy::Reject,
            ambiguity_threshold: 1,
            max_malformed_fraction: 1.0,
            summary_top_n: 10,
        }
    }
}

impl TrackerConfig {
    /// Loads the config file at `path`, or the defaults when `path` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.display().to_string(),
            source,
        })?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Applies `ACTIVE_CALLS_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value: &String| !value.trim().is_empty());

        if let Some(root) = lookup(STORAGE_ROOT_ENV) {
            log::debug!("{STORAGE_ROOT_ENV} overrides storage root: {root}");
            self.storage_root = PathBuf::from(root);
        }
        if let Some(source) = lookup(SOURCE_ENV) {
            log::debug!("{SOURCE_ENV} overrides source: {source}");
            self.source = source;
        }
    }

    /// Checks that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_malformed_fraction) {
            return Err(invalid(format!(
                "max_malformed_fraction must be between 0.0 and 1.0, got {}",
                self.max_malformed_fraction
            )));
        }
        if self.summary_top_n == 0 {
            return Err(invalid("summary_top_n must be at least 1".to_string()));
        }
        if self.ambiguity_threshold == 0 {
            return Err(invalid(
                "ambiguity_threshold must be at least 1".to_string(),
            ));
        }
        if self.source.trim().is_empty() {
            return Err(invalid("source must not be empty".to_string()));
        }
        Ok(())
    }
}

const fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TrackerConfig::load(None).unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.source, "clearwater_pd");
        assert_eq!(config.empty_result_policy, EmptyResultPolicy::Reject);
        config.validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let config: TrackerConfig = toml::from_str(
            r#"
storage_root = "/var/lib/active-calls"
empty_result_policy = "accept"
ambiguity_threshold = 3
"#,
        )
        .unwrap();

        assert_eq!(config.storage_root, PathBuf::from("/var/lib/active-calls"));
        assert_eq!(config.empty_result_policy, EmptyResultPolicy::Accept);
        assert_eq!(config.ambiguity_threshold, 3);
        assert!((config.max_malformed_fraction - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.summary_top_n, 10);
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(toml::from_str::<TrackerConfig>("storage = \"x\"").is_err());
    }

    #[test]
    fn loads_file_and_reports_missing_file() {
        let dir = std::env::temp_dir().join("active_calls_config_load");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tracker.toml");
        std::fs::write(&path, "summary_top_n = 5\n").unwrap();

        assert_eq!(TrackerConfig::load(Some(&path)).unwrap().summary_top_n, 5);
        assert!(matches!(
            TrackerConfig::load(Some(&dir.join("missing.toml"))),
            Err(ConfigError::Io { .. })
        ));

        std::fs::write(&path, "summary_top_n = \"five\"\n").unwrap();
        assert!(matches!(
            TrackerConfig::load(Some(&path)),
            Err(ConfigError::Toml { .. })
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn overrides_replace_non_empty_values() {
        let env: BTreeMap<&str, &str> =
            BTreeMap::from([(STORAGE_ROOT_ENV, "/srv/calls"), (SOURCE_ENV, "  ")]);
        let mut config = TrackerConfig::default();

        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.storage_root, PathBuf::from("/srv/calls"));
        assert_eq!(config.source, DEFAULT_SOURCE_ID);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let bad_fraction = TrackerConfig {
            max_malformed_fraction: 1.5,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            bad_fraction.validate(),
            Err(ConfigError::Invalid { .. })
        ));

        let zero_top = TrackerConfig {
            summary_top_n: 0,
            ..TrackerConfig::default()
        };
        assert!(zero_top.validate().is_err());

        let zero_threshold = TrackerConfig {
            ambiguity_threshold: 0,
            ..TrackerConfig::default()
        };
        assert!(zero_threshold.validate().is_err());
    }

    #[test]
    fn policy_parses_from_flag_text() {
        assert_eq!(
            EmptyResultPolicy::from_str("accept").unwrap(),
            EmptyResultPolicy::Accept
        );
        assert_eq!(EmptyResultPolicy::Reject.to_string(), "reject");
    }
}
