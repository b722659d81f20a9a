//! Scripted fake channel and factory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use devlink_core::{
    ChannelError, ChannelFactory, DeviceChannel, Envelope, ExchangeId, MatcherShape,
};

/// One pre-programmed inbound message.
#[derive(Debug, Clone)]
pub struct ScriptedReply {
    /// Delay before delivery, measured from listener registration.
    pub delay: Duration,
    /// Envelope to deliver.
    pub envelope: Envelope,
}

/// Fake channel driven by a script.
///
/// Scripted envelopes are delivered to listeners whose shape matches
/// the envelope's message, after the scripted delay. Sends are recorded
/// and closes counted, so tests can assert exactly-once cleanup.
#[derive(Default)]
pub struct FakeChannel {
    scripted: Mutex<Vec<ScriptedReply>>,
    sent: Mutex<Vec<(String, Value)>>,
    // Keeps registered listeners alive until close, like a real
    // multiplexer keeps registrations until deregistration.
    listeners: Mutex<Vec<mpsc::Sender<Envelope>>>,
    close_count: AtomicUsize,
}

impl FakeChannel {
    /// Create a fake channel with an empty script.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script an envelope delivered as soon as a matching listener
    /// registers.
    pub fn reply_with(&self, envelope: Envelope) {
        self.reply_after(Duration::ZERO, envelope);
    }

    /// Script an envelope delivered after a delay.
    pub fn reply_after(&self, delay: Duration, envelope: Envelope) {
        self.scripted
            .lock()
            .unwrap()
            .push(ScriptedReply { delay, envelope });
    }

    /// Messages sent through this channel, in order.
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceChannel for FakeChannel {
    async fn send(&self, device_id: &str, message: Value) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((device_id.to_string(), message));
        Ok(())
    }

    async fn listen_for(
        &self,
        _device_id: &str,
        shape: MatcherShape,
        once: bool,
    ) -> Result<mpsc::Receiver<Envelope>, ChannelError> {
        let (tx, rx) = mpsc::channel(8);
        self.listeners.lock().unwrap().push(tx.clone());

        let mut matching: Vec<ScriptedReply> = self
            .scripted
            .lock()
            .unwrap()
            .iter()
            .filter(|reply| shape.matches(&reply.envelope.message))
            .cloned()
            .collect();
        if once {
            matching.truncate(1);
        }

        for reply in matching {
            let tx = tx.clone();
            tokio::spawn(async move {
                if !reply.delay.is_zero() {
                    tokio::time::sleep(reply.delay).await;
                }
                let _ = tx.send(reply.envelope).await;
            });
        }

        Ok(rx)
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().clear();
    }
}

/// Channel factory handing out prepared fake channels.
///
/// Prepared channels are dispensed in order; once they run out, fresh
/// silent fakes are created. Every opened channel stays reachable via
/// [`FakeChannelFactory::opened`].
#[derive(Default)]
pub struct FakeChannelFactory {
    prepared: Mutex<VecDeque<Arc<FakeChannel>>>,
    opened: Mutex<Vec<Arc<FakeChannel>>>,
}

impl FakeChannelFactory {
    /// Create a factory that opens fresh silent channels.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a factory preloaded with one channel.
    pub fn with_channel(channel: Arc<FakeChannel>) -> Arc<Self> {
        let factory = Self::new();
        factory.push(channel);
        factory
    }

    /// Queue a prepared channel for the next open.
    pub fn push(&self, channel: Arc<FakeChannel>) {
        self.prepared.lock().unwrap().push_back(channel);
    }

    /// Channels opened so far, in open order.
    pub fn opened(&self) -> Vec<Arc<FakeChannel>> {
        self.opened.lock().unwrap().clone()
    }
}

impl ChannelFactory for FakeChannelFactory {
    fn open(&self, _exchange_id: ExchangeId) -> Arc<dyn DeviceChannel> {
        let channel = self
            .prepared
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(FakeChannel::new);
        self.opened.lock().unwrap().push(channel.clone());
        channel
    }
}
