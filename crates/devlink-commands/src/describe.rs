//! Device description merging.
//!
//! Validates the aggregated (directory record, describe reply) pair and
//! reshapes it into the caller-facing device-state view. Encodes the
//! domain rule for connected vs. disconnected: a device counts as
//! connected exactly when a state payload was extracted from the
//! describe exchange.

use semver::Version;
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use devlink_core::{DeviceId, DeviceRecord};

use crate::aggregate::AggregatedResult;

/// Merge error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    /// Aggregation arity mismatch. A composition defect, not a device
    /// condition.
    #[error("aggregated result had arity {0}, expected 2")]
    MalformedAggregate(usize),

    /// The directory has no record for the device.
    #[error("unknown device")]
    UnknownDevice,
}

/// Caller-facing device-state view.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DeviceDescription {
    /// Device identifier.
    pub id: DeviceId,
    /// Display name.
    pub name: Option<String>,
    /// Last firmware flashed to the device.
    pub last_flashed: Option<String>,
    /// Whether the describe exchange produced a state payload.
    pub connected: bool,
    /// Exposed variables, name to type. Populated only when connected.
    pub variables: Option<Map<String, Value>>,
    /// Callable function names. Populated only when connected.
    pub functions: Option<Vec<String>>,
    /// Driver version recorded in the directory.
    pub driver_version: Option<String>,
    /// Whether the recorded driver version is below the configured
    /// minimum.
    pub requires_deep_update: bool,
}

/// Merges aggregated describe results into a [`DeviceDescription`].
pub struct DescriptionMerger {
    min_driver_version: Option<Version>,
}

impl DescriptionMerger {
    /// Create a merger. `min_driver_version` is the version floor below
    /// which devices are flagged for a deep update; an unparsable value
    /// disables the check.
    pub fn new(min_driver_version: Option<&str>) -> Self {
        let min_driver_version = min_driver_version.and_then(|raw| {
            let parsed = lenient_version(raw);
            if parsed.is_none() {
                warn!(version = raw, "unparsable minimum driver version, update check disabled");
            }
            parsed
        });

        Self { min_driver_version }
    }

    /// Validate and merge an aggregated (record, describe reply) pair.
    ///
    /// Only two conditions fail hard: wrong arity and a missing or
    /// id-less directory record. A present-but-malformed describe reply
    /// degrades to "no state" and the merge still succeeds.
    pub fn merge(&self, aggregated: &AggregatedResult) -> Result<DeviceDescription, MergeError> {
        if aggregated.len() != 2 {
            error!(
                arity = aggregated.len(),
                "describe aggregate had the wrong arity"
            );
            return Err(MergeError::MalformedAggregate(aggregated.len()));
        }

        let record = match aggregated.slot(0) {
            Some(value) => parse_record(value).ok_or(MergeError::UnknownDevice)?,
            None => {
                debug!("no directory record in describe aggregate");
                return Err(MergeError::UnknownDevice);
            }
        };

        let state = aggregated.slot(1).and_then(|reply| {
            let state = extract_state(reply);
            if state.is_none() {
                warn!(device = %record.device_id, payload = %reply, "describe reply carried no usable state");
            }
            state
        });

        let requires_deep_update =
            requires_update(record.driver_version.as_deref(), self.min_driver_version.as_ref());

        Ok(DeviceDescription {
            id: record.device_id,
            name: record.name,
            last_flashed: record.last_flashed,
            connected: state.is_some(),
            variables: state
                .as_ref()
                .and_then(|s| s.get("v"))
                .and_then(Value::as_object)
                .cloned(),
            functions: state
                .as_ref()
                .and_then(|s| s.get("f"))
                .and_then(Value::as_array)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                }),
            driver_version: record.driver_version,
            requires_deep_update,
        })
    }
}

/// Parse the directory slot. A record without a device id counts as
/// absent.
fn parse_record(value: &Value) -> Option<DeviceRecord> {
    let record: DeviceRecord = serde_json::from_value(value.clone()).ok()?;
    if record.device_id.is_empty() {
        return None;
    }
    Some(record)
}

/// Extract the state object out of a `[sender, payload]` describe reply.
fn extract_state(reply: &Value) -> Option<Map<String, Value>> {
    let parts = reply.as_array()?;
    if parts.len() < 2 {
        return None;
    }
    parts[1].get("state")?.as_object().cloned()
}

/// Whether a recorded driver version falls below the configured minimum.
/// Missing or unparsable versions never flag an update.
fn requires_update(recorded: Option<&str>, minimum: Option<&Version>) -> bool {
    match (recorded.and_then(lenient_version), minimum) {
        (Some(recorded), Some(minimum)) => recorded < *minimum,
        _ => false,
    }
}

/// Parse a version string, padding missing components so short device
/// versions like `1.28` compare as `1.28.0`.
fn lenient_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    let padded = match raw.matches('.').count() {
        0 => format!("{raw}.0.0"),
        1 => format!("{raw}.0"),
        _ => raw.to_string(),
    };
    Version::parse(&padded).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_slot() -> Value {
        json!({
            "device_id": "device1",
            "name": "kitchen-sensor",
            "last_flashed": "blink-v2",
            "driver_version": "1.28"
        })
    }

    fn reply_slot() -> Value {
        json!([
            "device1",
            {
                "cmd": "DescribeReturn",
                "state": {
                    "v": {"temperature": "double", "uptime": "int32"},
                    "f": ["reset", "calibrate"]
                }
            }
        ])
    }

    #[test]
    fn test_merge_connected() {
        let merger = DescriptionMerger::new(None);
        let aggregated =
            AggregatedResult::from_slots(vec![Some(record_slot()), Some(reply_slot())]);

        let description = merger.merge(&aggregated).unwrap();

        assert_eq!(description.id, "device1");
        assert_eq!(description.name.as_deref(), Some("kitchen-sensor"));
        assert_eq!(description.last_flashed.as_deref(), Some("blink-v2"));
        assert!(description.connected);
        assert_eq!(
            description.variables.as_ref().unwrap()["temperature"],
            "double"
        );
        assert_eq!(
            description.functions.as_deref(),
            Some(&["reset".to_string(), "calibrate".to_string()][..])
        );
        assert!(!description.requires_deep_update);
    }

    #[test]
    fn test_merge_offline_device() {
        let merger = DescriptionMerger::new(None);
        let aggregated = AggregatedResult::from_slots(vec![Some(record_slot()), None]);

        let description = merger.merge(&aggregated).unwrap();

        assert!(!description.connected);
        assert!(description.variables.is_none());
        assert!(description.functions.is_none());
    }

    #[test]
    fn test_merge_unknown_device() {
        let merger = DescriptionMerger::new(None);
        let aggregated = AggregatedResult::from_slots(vec![None, Some(reply_slot())]);

        assert_eq!(merger.merge(&aggregated), Err(MergeError::UnknownDevice));
    }

    #[test]
    fn test_merge_record_without_id() {
        let merger = DescriptionMerger::new(None);
        let aggregated = AggregatedResult::from_slots(vec![
            Some(json!({"device_id": ""})),
            Some(reply_slot()),
        ]);

        assert_eq!(merger.merge(&aggregated), Err(MergeError::UnknownDevice));
    }

    #[test]
    fn test_merge_wrong_arity() {
        let merger = DescriptionMerger::new(None);
        let aggregated = AggregatedResult::from_slots(vec![Some(record_slot())]);

        assert_eq!(merger.merge(&aggregated), Err(MergeError::MalformedAggregate(1)));
    }

    #[test]
    fn test_merge_malformed_reply_degrades() {
        let merger = DescriptionMerger::new(None);

        for malformed in [
            json!("not an array"),
            json!(["device1"]),
            json!(["device1", {"cmd": "DescribeReturn"}]),
            json!(["device1", {"state": "not an object"}]),
        ] {
            let aggregated =
                AggregatedResult::from_slots(vec![Some(record_slot()), Some(malformed)]);
            let description = merger.merge(&aggregated).unwrap();

            assert!(!description.connected);
            assert!(description.variables.is_none());
        }
    }

    #[test]
    fn test_requires_deep_update_below_minimum() {
        let merger = DescriptionMerger::new(Some("1.29"));
        let aggregated = AggregatedResult::from_slots(vec![Some(record_slot()), None]);

        let description = merger.merge(&aggregated).unwrap();

        assert!(description.requires_deep_update);
        assert_eq!(description.driver_version.as_deref(), Some("1.28"));
    }

    #[test]
    fn test_requires_deep_update_at_minimum() {
        let merger = DescriptionMerger::new(Some("1.28"));
        let aggregated = AggregatedResult::from_slots(vec![Some(record_slot()), None]);

        assert!(!merger.merge(&aggregated).unwrap().requires_deep_update);
    }

    #[test]
    fn test_requires_deep_update_unknown_version() {
        let merger = DescriptionMerger::new(Some("1.29"));
        let aggregated = AggregatedResult::from_slots(vec![
            Some(json!({"device_id": "device1"})),
            None,
        ]);

        assert!(!merger.merge(&aggregated).unwrap().requires_deep_update);
    }

    #[test]
    fn test_lenient_version_padding() {
        assert_eq!(lenient_version("1"), Version::parse("1.0.0").ok());
        assert_eq!(lenient_version("1.28"), Version::parse("1.28.0").ok());
        assert_eq!(lenient_version("1.28.3"), Version::parse("1.28.3").ok());
        assert_eq!(lenient_version("not a version"), None);
    }
}
