//! Variable fetch flow.
//!
//! One correlated exchange plus reply-shape validation: ask the device
//! for a named variable and return its value tagged with the name that
//! was asked for.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::warn;

use devlink_core::{ChannelError, MatcherShape, cmd};

use crate::exchange::{ExchangeCoordinator, ExchangeError};

/// Variable fetch error types.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No matching reply within the timeout window.
    #[error("timed out waiting for variable reply")]
    TimedOut,

    /// The device returned an error payload. Surfaced verbatim.
    #[error("device reported an error: {0}")]
    DeviceReported(Value),

    /// A reply arrived but did not carry a result field.
    #[error("malformed variable reply: {0}")]
    Malformed(Value),

    /// Transport-level failure below the correlation layer.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// A device value tagged with the variable name that was requested.
///
/// The tag is set from the request, not the reply, so it always equals
/// the originally requested name.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NamedValue {
    /// Requested variable name.
    pub name: String,
    /// Raw value returned by the device.
    pub value: Value,
}

/// Issue one `GetVar` exchange and validate the reply.
pub(crate) async fn fetch_variable(
    coordinator: &ExchangeCoordinator,
    device_id: &str,
    name: &str,
    timeout: Duration,
) -> Result<NamedValue, FetchError> {
    let outbound = json!({"cmd": cmd::GET_VAR, "name": name});
    let matcher = MatcherShape::command(cmd::VAR_RETURN).with_name(name);

    let envelope = coordinator
        .send_and_await(device_id, outbound, matcher, Some(timeout))
        .await
        .map_err(|error| match error {
            ExchangeError::Timeout => FetchError::TimedOut,
            ExchangeError::Channel(inner) => FetchError::Channel(inner),
        })?;

    parse_reply(envelope.message, name)
}

/// Validate a `VarReturn` reply body and tag the result.
pub(crate) fn parse_reply(reply: Value, requested_name: &str) -> Result<NamedValue, FetchError> {
    if let Some(error) = reply.get("error") {
        return Err(FetchError::DeviceReported(error.clone()));
    }

    match reply.get("result") {
        Some(result) => Ok(NamedValue {
            name: requested_name.to_string(),
            value: result.clone(),
        }),
        None => {
            warn!(device_reply = %reply, "variable reply lacked a result field");
            Err(FetchError::Malformed(reply))
        }
    }
}
