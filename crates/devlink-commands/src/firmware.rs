//! Firmware push flow.
//!
//! A short state progression rather than a request/reply exchange: send
//! the flash command, then wait a bounded time for the device service to
//! push a single qualifying update event. The first terminal transition
//! wins; a late timer or late event is a no-op.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::{debug, error};

use devlink_core::{ChannelError, DeviceId, Envelope, MatcherShape, cmd, event};

use crate::exchange::Exchange;

/// Event text the device service sends when it accepts an update.
pub const UPDATE_STARTED: &str = "Update started";

/// Firmware push state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FlashState {
    /// Flow created, nothing sent yet.
    Created,
    /// Flash command sent, waiting for the update event.
    Sent,
    /// Device accepted the update.
    Accepted,
    /// Device refused the update.
    Rejected,
    /// No qualifying event before the deadline.
    TimedOut,
}

impl FlashState {
    /// Whether no further transition can occur from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlashState::Accepted | FlashState::Rejected | FlashState::TimedOut
        )
    }
}

/// Terminal outcome of one firmware push.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FirmwareOutcome {
    /// The device started the update.
    Accepted {
        /// Target device.
        device_id: DeviceId,
    },
    /// The device refused the update.
    Rejected {
        /// Target device.
        device_id: DeviceId,
        /// Device-supplied message text.
        reason: String,
    },
    /// No qualifying event arrived before the deadline.
    TimedOut {
        /// Target device.
        device_id: DeviceId,
    },
}

/// Drives one firmware push to its terminal state.
pub(crate) struct FirmwarePushFlow {
    exchange: Exchange,
    state: FlashState,
}

impl FirmwarePushFlow {
    pub(crate) fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            state: FlashState::Created,
        }
    }

    /// Run the flow to completion. The channel is closed exactly once
    /// before the outcome is returned, on every path.
    pub(crate) async fn run(
        mut self,
        firmware: &[u8],
        access_token: &str,
        timeout: Duration,
    ) -> Result<FirmwareOutcome, ChannelError> {
        let result = self.drive(firmware, access_token, timeout).await;
        self.exchange.close().await;
        result
    }

    async fn drive(
        &mut self,
        firmware: &[u8],
        access_token: &str,
        timeout: Duration,
    ) -> Result<FirmwareOutcome, ChannelError> {
        let device_id = self.exchange.device_id().to_string();

        // Listener before send: the event could fire before the flash
        // command's send() even returns.
        let mut events = self
            .exchange
            .channel()
            .listen_for(
                &device_id,
                MatcherShape::command(cmd::EVENT).with_name(event::UPDATE),
                true,
            )
            .await?;

        let outbound = json!({
            "cmd": cmd::UFLASH,
            "args": {
                "data": BASE64.encode(firmware),
                "access_token": access_token,
            }
        });
        self.exchange.channel().send(&device_id, outbound).await?;
        self.transition(FlashState::Sent);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        // Biased select: an event that arrived strictly before the
        // timer fires must win the race. Dropping the select cancels
        // the loser, so only the first terminal signal is observed.
        let outcome = tokio::select! {
            biased;
            received = events.recv() => match received {
                Some(envelope) => self.settle_event(&device_id, &envelope),
                None => self.settle_timeout(&device_id),
            },
            () = &mut deadline => self.settle_timeout(&device_id),
        };

        Ok(outcome)
    }

    fn settle_event(&mut self, device_id: &str, envelope: &Envelope) -> FirmwareOutcome {
        let text = message_text(&envelope.message);

        if text == UPDATE_STARTED {
            self.transition(FlashState::Accepted);
            debug!(device = device_id, "firmware update accepted");
            FirmwareOutcome::Accepted {
                device_id: device_id.to_string(),
            }
        } else {
            self.transition(FlashState::Rejected);
            error!(device = device_id, reason = text, "firmware update rejected");
            FirmwareOutcome::Rejected {
                device_id: device_id.to_string(),
                reason: text.to_string(),
            }
        }
    }

    fn settle_timeout(&mut self, device_id: &str) -> FirmwareOutcome {
        self.transition(FlashState::TimedOut);
        debug!(device = device_id, "firmware update timed out");
        FirmwareOutcome::TimedOut {
            device_id: device_id.to_string(),
        }
    }

    /// Apply a transition unless a terminal state was already reached.
    /// Returns whether the transition was applied.
    fn transition(&mut self, next: FlashState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = next;
        true
    }

    #[cfg(test)]
    fn state(&self) -> FlashState {
        self.state
    }
}

/// Extract the human-readable text out of an update event body.
fn message_text(message: &Value) -> &str {
    message
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
}
