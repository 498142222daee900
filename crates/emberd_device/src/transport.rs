use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::DeviceError;

/// Raw message received from the device connection.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Connection to a device broker.
///
/// Abstracted so the device task can run against an in-memory transport in
/// tests (see the `testing` module).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the connection.
    async fn connect(&mut self) -> Result<(), DeviceError>;

    /// Subscribe to a topic filter.
    async fn subscribe(&mut self, topic: &str) -> Result<(), DeviceError>;

    /// Publish a message.
    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), DeviceError>;

    /// Next message from subscribed topics, or None once the connection is gone.
    async fn poll_message(&mut self) -> Option<TransportMessage>;
}

/// Broker settings for the MQTT transport.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// MQTT transport over rumqttc.
///
/// The client and event loop are created lazily in `connect()`; a background
/// task drains the event loop into an unbounded channel that `poll_message`
/// reads from.
pub struct MqttTransport {
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Message receiver (created in connect())
    message_rx: Option<mpsc::UnboundedReceiver<TransportMessage>>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl MqttTransport {
    /// Build a transport from broker settings. Does not connect yet.
    pub fn new(settings: &MqttSettings) -> Self {
        let mut mqtt_options = MqttOptions::new(
            settings.client_id.clone(),
            settings.broker.clone(),
            settings.port,
        );
        mqtt_options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            message_rx: None,
            event_loop_task: None,
        }
    }

    fn client(&self) -> Result<&AsyncClient, DeviceError> {
        self.client.as_ref().ok_or(DeviceError::NotConnected)
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), DeviceError> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = TransportMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        // Receiver dropped means the device is gone.
                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {
                        // Ignore other events (connack, suback, pings).
                    }
                    Err(e) => {
                        tracing::warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            tracing::info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.message_rx = Some(message_rx);
        self.event_loop_task = Some(task);

        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), DeviceError> {
        self.client()?
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }

    async fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), DeviceError> {
        self.client()?
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| DeviceError::Transport(e.to_string()))
    }

    async fn poll_message(&mut self) -> Option<TransportMessage> {
        match &mut self.message_rx {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
