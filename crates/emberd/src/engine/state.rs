use std::collections::HashMap;

use serde::Serialize;

use super::entity::DeviceMetadata;

/// Snapshot of one entity as exposed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityState {
    /// Platform that produced the entity.
    pub platform: String,

    /// Display metadata for the backing device.
    pub metadata: DeviceMetadata,

    /// Whether the backing device currently reports the entity reachable.
    pub available: bool,

    /// Platform-specific state payload.
    pub state: serde_json::Value,
}

/// Centralized snapshot of every entity the engine owns.
///
/// Readers load the Arc; the engine writer stores a new one per change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub entities: HashMap<String, EntityState>,
}
