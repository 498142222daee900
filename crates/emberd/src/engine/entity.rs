//! Entity abstraction for emberd.
//!
//! All entities (vacuum sensors, cameras, etc.) implement the Entity trait;
//! the engine drives their lifecycle and reads their state into the snapshot.

use async_trait::async_trait;
use serde::Serialize;

use super::adapter::EntityError;
use super::message::Notifier;

/// Display metadata for the device backing an entity.
///
/// Fields the device does not report are omitted from serialized output
/// rather than defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,

    /// Firmware version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// Base trait that all entities must implement.
#[async_trait]
pub trait Entity: Send + Sync {
    /// Stable identifier, unique across the hub.
    fn unique_id(&self) -> &str;

    /// Platform that produced this entity (e.g. "vacuum", "camera").
    fn platform(&self) -> &'static str;

    /// Display metadata read off the backing device.
    fn metadata(&self) -> DeviceMetadata;

    /// Whether the backing device currently reports the entity reachable.
    fn is_available(&self) -> bool;

    /// Serialize current state to JSON for the engine snapshot.
    fn state_json(&self) -> serde_json::Value;

    /// Wire up event subscriptions. Called once by the engine after
    /// discovery; a failure here means the entity is dropped.
    async fn attach(&mut self, notifier: Notifier) -> Result<(), EntityError>;

    /// Release every subscription. Called by the engine on teardown.
    async fn detach(&mut self);

    /// Ask the device to re-emit current values for every subscribed event
    /// kind. Used by poll-driven consumers.
    async fn request_refresh(&self);
}
