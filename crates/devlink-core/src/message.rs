//! Message envelope and matcher shapes.
//!
//! Device traffic is multiplexed: many logical exchanges share one
//! transport, identified only by command name and device id. A
//! [`MatcherShape`] is the partial template a listener uses to pick the
//! inbound message that belongs to it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device identifier.
pub type DeviceId = String;

/// Well-known command names carried in the `cmd` field.
pub mod cmd {
    /// Request the device's current state description.
    pub const DESCRIBE: &str = "Describe";
    /// Reply to [`DESCRIBE`].
    pub const DESCRIBE_RETURN: &str = "DescribeReturn";
    /// Request a named variable's value.
    pub const GET_VAR: &str = "GetVar";
    /// Reply to [`GET_VAR`].
    pub const VAR_RETURN: &str = "VarReturn";
    /// Push a firmware image to the device.
    pub const UFLASH: &str = "UFlash";
    /// Unsolicited event pushed by the device service.
    pub const EVENT: &str = "Event";
}

/// Well-known event names carried in the `name` field of [`cmd::EVENT`].
pub mod event {
    /// Firmware update progress event.
    pub const UPDATE: &str = "Update";
}

/// Identifier for one logical exchange.
///
/// Strictly increasing per process lifetime, never reused, never
/// persisted. Used only for routing and diagnostics; it carries no
/// business meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeId(u64);

impl ExchangeId {
    /// Wrap a raw id value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A matched inbound message together with its sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Device that sent the message.
    pub sender: DeviceId,
    /// Raw message body.
    pub message: Value,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(sender: impl Into<DeviceId>, message: Value) -> Self {
        Self {
            sender: sender.into(),
            message,
        }
    }

    /// Convert into the `[sender, message]` pair shape used by
    /// aggregation slots.
    pub fn into_value(self) -> Value {
        Value::Array(vec![Value::String(self.sender), self.message])
    }
}

/// Partial message template used to route inbound messages to listeners.
///
/// Matches on the `cmd` field, and on the `name` field when one is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatcherShape {
    /// Command name to match.
    pub cmd: String,
    /// Optional named field to match (e.g. a variable name).
    pub name: Option<String>,
}

impl MatcherShape {
    /// Match any message with the given command name.
    pub fn command(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            name: None,
        }
    }

    /// Additionally require the `name` field to equal the given value.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Check whether an inbound message body matches this shape.
    pub fn matches(&self, message: &Value) -> bool {
        if message.get("cmd").and_then(Value::as_str) != Some(self.cmd.as_str()) {
            return false;
        }

        if let Some(ref name) = self.name
            && message.get("name").and_then(Value::as_str) != Some(name.as_str())
        {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exchange_id_display() {
        let id = ExchangeId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn test_matcher_cmd_only() {
        let shape = MatcherShape::command(cmd::DESCRIBE_RETURN);

        assert!(shape.matches(&json!({"cmd": "DescribeReturn"})));
        assert!(shape.matches(&json!({"cmd": "DescribeReturn", "name": "extra"})));
        assert!(!shape.matches(&json!({"cmd": "VarReturn"})));
        assert!(!shape.matches(&json!({"name": "DescribeReturn"})));
    }

    #[test]
    fn test_matcher_with_name() {
        let shape = MatcherShape::command(cmd::VAR_RETURN).with_name("temperature");

        assert!(shape.matches(&json!({"cmd": "VarReturn", "name": "temperature"})));
        assert!(!shape.matches(&json!({"cmd": "VarReturn", "name": "humidity"})));
        assert!(!shape.matches(&json!({"cmd": "VarReturn"})));
    }

    #[test]
    fn test_matcher_non_string_fields() {
        let shape = MatcherShape::command(cmd::EVENT).with_name(event::UPDATE);

        assert!(!shape.matches(&json!({"cmd": 1, "name": "Update"})));
        assert!(!shape.matches(&json!({"cmd": "Event", "name": 7})));
        assert!(!shape.matches(&json!("Event")));
    }

    #[test]
    fn test_envelope_into_value() {
        let envelope = Envelope::new("device1", json!({"cmd": "DescribeReturn", "state": {}}));
        let value = envelope.into_value();

        assert_eq!(value[0], "device1");
        assert_eq!(value[1]["cmd"], "DescribeReturn");
    }
}
