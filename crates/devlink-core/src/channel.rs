//! Device channel capability.
//!
//! The physical connection multiplexer lives outside this core. What the
//! core consumes is a per-exchange capability: send a message, register a
//! listener matched by shape, and close. One channel instance is opened
//! per logical exchange and is exclusively owned by the flow that opened
//! it.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::message::{Envelope, ExchangeId, MatcherShape};

/// Channel-level transport error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("listener registration failed: {0}")]
    ListenFailed(String),

    #[error("channel closed")]
    Closed,
}

/// One device-scoped channel instance.
///
/// Implementations route inbound messages for the device to registered
/// listeners by [`MatcherShape`]. `close` must be idempotent: closing an
/// already-closed channel is a no-op, never an error.
#[async_trait]
pub trait DeviceChannel: Send + Sync {
    /// Enqueue a message onto the device's transport. Fire-and-forget:
    /// success means accepted for delivery, not delivered.
    async fn send(&self, device_id: &str, message: Value) -> Result<(), ChannelError>;

    /// Register a listener for inbound messages matching `shape`.
    ///
    /// Matches are delivered on the returned receiver. When `once` is
    /// true the listener deregisters itself after the first match.
    async fn listen_for(
        &self,
        device_id: &str,
        shape: MatcherShape,
        once: bool,
    ) -> Result<mpsc::Receiver<Envelope>, ChannelError>;

    /// Release the channel instance. Idempotent.
    async fn close(&self);
}

/// Opens one fresh channel instance per logical exchange.
///
/// The exchange id is for routing and diagnostics on the multiplexer
/// side; the returned channel is exclusively owned by the caller.
pub trait ChannelFactory: Send + Sync {
    /// Open a channel for a new exchange.
    fn open(&self, exchange_id: ExchangeId) -> Arc<dyn DeviceChannel>;
}
