//! Device-management layer for emberd.
//!
//! Owns the connection to physical devices (vacuum robots, network cameras)
//! and exposes each one as a [`Device`] handle: identity metadata, a
//! capability set, and an [`EventBus`] delivering typed events with
//! cancellable subscriptions. The hub crate builds entities on top of these
//! handles; nothing in here knows about entities.

mod bus;
mod codec;
mod device;
mod error;
mod event;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use bus::EventBus;
pub use bus::EventHandler;
pub use bus::HandlerFuture;
pub use bus::Subscription;
pub use codec::event_topic_filter;
pub use codec::parse_event_topic;
pub use codec::refresh_topic;
pub use codec::DEFAULT_PREFIX;
pub use device::BatteryCapability;
pub use device::Capabilities;
pub use device::CameraCapability;
pub use device::Device;
pub use device::DeviceInfo;
pub use device::StatusCapability;
pub use error::DeviceError;
pub use event::DeviceEvent;
pub use event::EventKind;
pub use event::VacuumStatus;
pub use transport::MqttSettings;
pub use transport::MqttTransport;
pub use transport::Transport;
pub use transport::TransportMessage;
