//! Source registry: loads all source definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a new agency is as simple
//! as creating a new TOML file and adding it to the list below.

use crate::SourceError;
use crate::source_def::{SourceDefinition, parse_source_toml};

/// Id of the source used when none is configured.
pub const DEFAULT_SOURCE_ID: &str = "clearwater_pd";

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[("clearwater", include_str!("../sources/clearwater.toml"))];

/// Returns all configured source definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a source definition by id.
///
/// # Errors
///
/// Returns [`SourceError::UnknownSource`] if no definition has that id,
/// or [`SourceError::Definition`] if the matching config fails to parse.
pub fn find_source(id: &str) -> Result<SourceDefinition, SourceError> {
    for (name, toml) in SOURCE_TOMLS {
        let def = parse_source_toml(toml).map_err(|source| SourceError::Definition {
            name: (*name).to_string(),
            source,
        })?;
        if def.id == id {
            return Ok(def);
        }
    }

    Err(SourceError::UnknownSource { id: id.to_string() })
}
