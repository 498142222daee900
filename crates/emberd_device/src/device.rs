use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::bus::EventBus;
use crate::codec;
use crate::error::DeviceError;
use crate::event::DeviceEvent;
use crate::event::EventKind;
use crate::transport::Transport;
use crate::transport::TransportMessage;

/// Identity fields reported by a device.
///
/// Only `did` is mandatory. Everything else is optional and stays absent if
/// the device does not report it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device id, unique on the broker.
    pub did: String,
    pub manufacturer: Option<String>,
    pub serial: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub fw_version: Option<String>,
    pub mac: Option<String>,
}

/// Battery reporting capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryCapability;

/// Activity reporting capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCapability;

/// Camera endpoint capability.
///
/// `stream_profile` and `video_source` left at None mean the device defaults;
/// consumers omit them from generated URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraCapability {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub stream_profile: Option<String>,
    pub video_source: Option<String>,
}

/// The capability set a device exposes.
///
/// A capability the device does not support is simply absent.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub battery: Option<BatteryCapability>,
    pub status: Option<StatusCapability>,
    pub camera: Option<CameraCapability>,
}

struct DeviceInner {
    info: DeviceInfo,
    capabilities: Capabilities,
    events: EventBus,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to one connected device. Cheap to clone.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Connect a device over `transport` and start its event loop.
    ///
    /// Subscribes to the device's event topics; incoming messages are decoded
    /// and dispatched on the device's [`EventBus`]. Refresh requests flow the
    /// other way, published to the device's `get` topics.
    pub async fn connect<T: Transport + 'static>(
        mut transport: T,
        prefix: impl Into<String>,
        info: DeviceInfo,
        capabilities: Capabilities,
    ) -> Result<Self, DeviceError> {
        let prefix = prefix.into();
        transport.connect().await?;
        transport
            .subscribe(&codec::event_topic_filter(&prefix, &info.did))
            .await?;

        let (events, refresh_rx) = EventBus::new();
        let task = tokio::spawn(run_device_task(
            transport,
            prefix,
            info.did.clone(),
            events.clone(),
            refresh_rx,
        ));
        info!(did = %info.did, "device connected");

        Ok(Self {
            inner: Arc::new(DeviceInner {
                info,
                capabilities,
                events,
                task: Mutex::new(Some(task)),
            }),
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.inner.capabilities
    }

    /// Event bus carrying this device's typed events.
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Stop event delivery and the transport task.
    pub async fn shutdown(&self) {
        self.inner.events.close().await;
        if let Some(task) = self.inner.task.lock().await.take() {
            task.abort();
        }
        debug!(did = %self.inner.info.did, "device shut down");
    }
}

async fn run_device_task<T: Transport>(
    mut transport: T,
    prefix: String,
    did: String,
    events: EventBus,
    mut refresh_rx: mpsc::UnboundedReceiver<EventKind>,
) {
    loop {
        tokio::select! {
            msg = transport.poll_message() => {
                let Some(msg) = msg else {
                    info!(%did, "transport closed, device task exiting");
                    break;
                };
                match decode(&prefix, &did, &msg) {
                    Ok(Some(event)) => events.dispatch(event).await,
                    Ok(None) => debug!(%did, topic = %msg.topic, "ignoring message outside event scheme"),
                    Err(e) => warn!(%did, topic = %msg.topic, "failed to decode event: {}", e),
                }
            }
            kind = refresh_rx.recv() => {
                let Some(kind) = kind else { break };
                let topic = codec::refresh_topic(&prefix, &did, kind);
                if let Err(e) = transport.publish(&topic, b"{}").await {
                    warn!(%did, %kind, "refresh request failed: {}", e);
                }
            }
        }
    }
}

fn decode(
    prefix: &str,
    did: &str,
    msg: &TransportMessage,
) -> Result<Option<DeviceEvent>, DeviceError> {
    let Some(kind) = codec::parse_event_topic(&msg.topic, prefix, did) else {
        return Ok(None);
    };
    codec::decode_event(kind, &msg.topic, &msg.payload).map(Some)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::event::VacuumStatus;
    use crate::testing;

    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    fn info(did: &str) -> DeviceInfo {
        DeviceInfo {
            did: did.to_string(),
            ..DeviceInfo::default()
        }
    }

    #[tokio::test]
    async fn connect_subscribes_to_event_topics() {
        let (device, probe) = testing::mock_device(info("bot-1"), Capabilities::default())
            .await
            .unwrap();
        assert_eq!(probe.subscriptions(), vec!["emberd/bot-1/event/+".to_string()]);
        device.shutdown().await;
    }

    #[tokio::test]
    async fn incoming_messages_are_decoded_and_dispatched() {
        let (device, probe) = testing::mock_device(info("bot-1"), Capabilities::default())
            .await
            .unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        device
            .events()
            .subscribe(
                EventKind::Status,
                Arc::new(move |event| {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move {
                        assert_eq!(
                            event,
                            DeviceEvent::Status {
                                status: VacuumStatus::Docked
                            }
                        );
                        seen.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        probe.inject("emberd/bot-1/event/status", br#"{"status": "docked"}"#);
        wait_until(|| hits.load(Ordering::SeqCst) == 1).await;
        device.shutdown().await;
    }

    #[tokio::test]
    async fn refresh_request_publishes_get_topic() {
        let (device, probe) = testing::mock_device(info("bot-1"), Capabilities::default())
            .await
            .unwrap();

        device.events().request_refresh(EventKind::Battery).unwrap();
        wait_until(|| {
            probe
                .published()
                .iter()
                .any(|(topic, _)| topic == "emberd/bot-1/get/battery")
        })
        .await;
        device.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_delivery() {
        let (device, probe) = testing::mock_device(info("bot-1"), Capabilities::default())
            .await
            .unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        device
            .events()
            .subscribe(
                EventKind::Battery,
                Arc::new(move |_| {
                    let counter = Arc::clone(&counter);
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        device.shutdown().await;
        probe.inject("emberd/bot-1/event/battery", br#"{"level": 10}"#);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
