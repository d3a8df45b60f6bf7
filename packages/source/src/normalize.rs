//! Validation of raw upstream records into [`IncidentRecord`]s.
//!
//! Only the incident number and dispatch time are mandatory; a missing
//! call type or address falls back to a placeholder so the call is still
//! tracked. Anything else malformed is counted and skipped.

use active_calls_models::IncidentRecord;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::SourceError;
use crate::parsing::parse_response_date;

/// Placeholder for a record without a call type.
pub const UNKNOWN_CALL_TYPE: &str = "Unknown Call Type";

/// Placeholder for a record without an address.
pub const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Upstream field names for each record field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Field holding the incident number.
    pub incident_id: String,
    /// Field holding the call type.
    pub call_type: String,
    /// Field holding the address.
    pub address: String,
    /// Field holding the dispatch timestamp.
    pub dispatched_at: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            incident_id: "Master_Incident_Number".to_string(),
            call_type: "Online_Description".to_string(),
            address: "Address".to_string(),
            dispatched_at: "Response_Date".to_string(),
        }
    }
}

/// Outcome of validating one fetch worth of raw records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Records that passed validation, in upstream order.
    pub records: Vec<IncidentRecord>,
    /// Records that failed validation.
    pub rejected: usize,
    /// Records received.
    pub total: usize,
}

impl NormalizeReport {
    /// Share of received records that failed validation (0.0 when nothing
    /// was received).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn malformed_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.rejected as f64 / self.total as f64
        }
    }

    /// Whether records were received but none of them were usable.
    #[must_use]
    pub const fn all_malformed(&self) -> bool {
        self.total > 0 && self.records.is_empty()
    }

    /// Returns the report unless the fetch is too degraded to trust.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::TooManyMalformed`] when every received record
    /// was malformed, or when the malformed share exceeds
    /// `max_malformed_fraction`.
    pub fn checked(self, max_malformed_fraction: f64) -> Result<Self, SourceError> {
        if self.all_malformed() || self.malformed_fraction() > max_malformed_fraction {
            return Err(SourceError::TooManyMalformed {
                rejected: self.rejected,
                total: self.total,
            });
        }
        Ok(self)
    }
}

/// Validates raw records using the given field mapping, interpreting naive
/// timestamps in `tz`.
#[must_use]
pub fn normalize_calls(
    raw: &[serde_json::Value],
    fields: &FieldMapping,
    tz: Tz,
) -> NormalizeReport {
    let mut report = NormalizeReport {
        records: Vec::with_capacity(raw.len()),
        rejected: 0,
        total: raw.len(),
    };

    for (index, value) in raw.iter().enumerate() {
        match normalize_call(value, fields, tz) {
            Some(record) => report.records.push(record),
            None => {
                log::debug!("Rejected record {index}: {value}");
                report.rejected += 1;
            }
        }
    }

    report
}

fn normalize_call(
    value: &serde_json::Value,
    fields: &FieldMapping,
    tz: Tz,
) -> Option<IncidentRecord> {
    let obj = value.as_object()?;

    let incident_id = field_text(obj, &fields.incident_id)?;
    let dispatched_at = obj
        .get(&fields.dispatched_at)
        .and_then(serde_json::Value::as_str)
        .and_then(|s| parse_response_date(s, tz))?;

    Some(IncidentRecord {
        incident_id,
        call_type: field_text(obj, &fields.call_type)
            .unwrap_or_else(|| UNKNOWN_CALL_TYPE.to_string()),
        address: field_text(obj, &fields.address).unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        dispatched_at,
    })
}

/// Reads a non-empty text field, accepting numbers as their decimal form.
fn field_text(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn normalize(raw: &[serde_json::Value]) -> NormalizeReport {
        normalize_calls(raw, &FieldMapping::default(), chrono_tz::America::New_York)
    }

    #[test]
    fn maps_upstream_fields() {
        let report = normalize(&[json!({
            "Master_Incident_Number": "CPD24-001",
            "Online_Description": "Traffic Stop",
            "Address": "1 MAIN ST",
            "Response_Date": "2024-01-15T14:30:00",
        })]);

        assert_eq!(report.rejected, 0);
        let record = &report.records[0];
        assert_eq!(record.incident_id, "CPD24-001");
        assert_eq!(record.call_type, "Traffic Stop");
        assert_eq!(record.address, "1 MAIN ST");
        assert_eq!(record.dispatch_hour(), 14);
    }

    #[test]
    fn accepts_numeric_incident_number() {
        let report = normalize(&[json!({
            "Master_Incident_Number": 240015,
            "Response_Date": "2024-01-15T14:30:00",
        })]);

        assert_eq!(report.records[0].incident_id, "240015");
        assert_eq!(report.records[0].call_type, UNKNOWN_CALL_TYPE);
        assert_eq!(report.records[0].address, UNKNOWN_LOCATION);
    }

    #[test]
    fn rejects_missing_id_or_date() {
        let report = normalize(&[
            json!({"Response_Date": "2024-01-15T14:30:00"}),
            json!({"Master_Incident_Number": "  ", "Response_Date": "2024-01-15T14:30:00"}),
            json!({"Master_Incident_Number": "A"}),
            json!({"Master_Incident_Number": "B", "Response_Date": "yesterday"}),
            json!("not an object"),
        ]);

        assert_eq!(report.total, 5);
        assert_eq!(report.rejected, 5);
        assert!(report.all_malformed());
    }

    #[test]
    fn all_malformed_fails_even_at_full_tolerance() {
        let report = normalize(&[json!({"Address": "1 MAIN ST"})]);
        assert!(matches!(
            report.checked(1.0),
            Err(SourceError::TooManyMalformed {
                rejected: 1,
                total: 1
            })
        ));
    }

    #[test]
    fn partial_rejects_respect_threshold() {
        let raw = [
            json!({"Master_Incident_Number": "A", "Response_Date": "2024-01-15T14:30:00"}),
            json!({"Master_Incident_Number": "B"}),
        ];

        let report = normalize(&raw).checked(1.0).unwrap();
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.rejected, 1);
        assert!(normalize(&raw).checked(0.25).is_err());
    }

    #[test]
    fn empty_fetch_is_not_malformed() {
        let report = normalize(&[]);
        assert!(!report.all_malformed());
        assert!(report.checked(0.0).unwrap().records.is_empty());
    }
}
