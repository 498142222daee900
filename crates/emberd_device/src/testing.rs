//! In-memory transport for tests.
//!
//! Enabled for this crate's own tests and for downstream crates via the
//! `test-util` feature.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::codec::DEFAULT_PREFIX;
use crate::device::Capabilities;
use crate::device::Device;
use crate::device::DeviceInfo;
use crate::error::DeviceError;
use crate::transport::Transport;
use crate::transport::TransportMessage;

/// Injects messages into a [`ChannelTransport`] and inspects what it sent.
#[derive(Clone)]
pub struct TransportProbe {
    incoming: mpsc::UnboundedSender<TransportMessage>,
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl TransportProbe {
    /// Deliver a raw message as if the broker pushed it.
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        let _ = self.incoming.send(TransportMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Everything the transport has published so far.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    /// Topic filters the transport has subscribed to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

/// Transport backed by channels instead of a broker.
pub struct ChannelTransport {
    rx: mpsc::UnboundedReceiver<TransportMessage>,
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    connected: bool,
}

/// Create a transport and its probe.
pub fn channel_transport() -> (ChannelTransport, TransportProbe) {
    let (incoming, rx) = mpsc::unbounded_channel();
    let published = Arc::new(Mutex::new(Vec::new()));
    let subscriptions = Arc::new(Mutex::new(Vec::new()));
    let transport = ChannelTransport {
        rx,
        published: Arc::clone(&published),
        subscriptions: Arc::clone(&subscriptions),
        connected: false,
    };
    let probe = TransportProbe {
        incoming,
        published,
        subscriptions,
    };
    (transport, probe)
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self) -> Result<(), DeviceError> {
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn poll_message(&mut self) -> Option<TransportMessage> {
        self.rx.recv().await
    }
}

/// Connect a [`Device`] over an in-memory transport, using the default topic
/// prefix. Returns the device and the probe controlling its wire.
pub async fn mock_device(
    info: DeviceInfo,
    capabilities: Capabilities,
) -> Result<(Device, TransportProbe), DeviceError> {
    let (transport, probe) = channel_transport();
    let device = Device::connect(transport, DEFAULT_PREFIX, info, capabilities).await?;
    Ok((device, probe))
}
