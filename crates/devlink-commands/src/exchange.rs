//! Exchange coordination.
//!
//! Implements the basic correlation primitive every higher flow builds
//! on: open a fresh channel, register a one-shot listener, send, and
//! await exactly the matching reply or a timeout, releasing the channel
//! exactly once on every path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use devlink_core::{
    ChannelError, ChannelFactory, DeviceChannel, DeviceId, Envelope, ExchangeId, MatcherShape,
};

use crate::sequencer::RequestSequencer;

/// Exchange error types.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("no matching reply arrived in time")]
    Timeout,

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// One open send/await cycle against one device.
///
/// Owns exactly one channel instance for its entire lifetime. The
/// channel is released at most once through [`Exchange::close`]; a late
/// second close is a no-op.
pub struct Exchange {
    id: ExchangeId,
    device_id: DeviceId,
    channel: Arc<dyn DeviceChannel>,
    closed: AtomicBool,
}

impl Exchange {
    fn new(id: ExchangeId, device_id: DeviceId, channel: Arc<dyn DeviceChannel>) -> Self {
        Self {
            id,
            device_id,
            channel,
            closed: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        id: ExchangeId,
        device_id: DeviceId,
        channel: Arc<dyn DeviceChannel>,
    ) -> Self {
        Self::new(id, device_id, channel)
    }

    /// Exchange id.
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// Target device id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The owned channel instance.
    pub fn channel(&self) -> &Arc<dyn DeviceChannel> {
        &self.channel
    }

    /// Release the channel. Forwards to the channel at most once, no
    /// matter how many exit paths reach this.
    pub async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.channel.close().await;
            debug!(exchange = %self.id, device = %self.device_id, "exchange closed");
        }
    }

    /// Whether the exchange has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Opens exchanges and drives send-and-await cycles.
pub struct ExchangeCoordinator {
    sequencer: Arc<RequestSequencer>,
    channels: Arc<dyn ChannelFactory>,
}

impl ExchangeCoordinator {
    /// Create a new coordinator.
    pub fn new(sequencer: Arc<RequestSequencer>, channels: Arc<dyn ChannelFactory>) -> Self {
        Self {
            sequencer,
            channels,
        }
    }

    /// Open a fresh exchange for a device.
    ///
    /// Allocates the next exchange id and a new channel instance. The
    /// caller owns the returned exchange and is responsible for closing
    /// it on every exit path.
    pub fn open(&self, device_id: &str) -> Exchange {
        let id = self.sequencer.next();
        let channel = self.channels.open(id);
        debug!(exchange = %id, device = device_id, "exchange opened");
        Exchange::new(id, device_id.to_string(), channel)
    }

    /// Send a message and await exactly one reply matching `matcher`.
    ///
    /// The listener is registered before the send so a reply cannot slip
    /// past between the two. With a timeout the wait is bounded and
    /// resolves to [`ExchangeError::Timeout`]; without one it waits
    /// indefinitely. The channel is closed exactly once on every path.
    /// Never retries; retry policy belongs to the caller.
    pub async fn send_and_await(
        &self,
        device_id: &str,
        outbound: Value,
        matcher: MatcherShape,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ExchangeError> {
        let exchange = self.open(device_id);
        let result = Self::drive(&exchange, outbound, matcher, timeout).await;
        exchange.close().await;

        if let Err(ref error) = result {
            debug!(exchange = %exchange.id(), device = device_id, %error, "exchange failed");
        }
        result
    }

    async fn drive(
        exchange: &Exchange,
        outbound: Value,
        matcher: MatcherShape,
        timeout: Option<Duration>,
    ) -> Result<Envelope, ExchangeError> {
        // Listener first: the reply may plausibly arrive before send()
        // returns.
        let mut replies = exchange
            .channel()
            .listen_for(exchange.device_id(), matcher, true)
            .await?;
        exchange.channel().send(exchange.device_id(), outbound).await?;

        let matched = match timeout {
            Some(window) => tokio::time::timeout(window, replies.recv())
                .await
                .map_err(|_| ExchangeError::Timeout)?,
            None => replies.recv().await,
        };

        matched.ok_or(ExchangeError::Channel(ChannelError::Closed))
    }
}
