use serde::Deserialize;
use serde::Serialize;

/// Activity reported by a vacuum device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VacuumStatus {
    Idle,
    Cleaning,
    Returning,
    Docked,
    Error,
}

/// A typed event published by a device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The device came online or went offline.
    Availability { available: bool },

    /// Battery level in percent.
    Battery { level: u8 },

    /// Vacuum activity changed.
    Status { status: VacuumStatus },

    /// The device moved to a new network address.
    Network { host: String },
}

impl DeviceEvent {
    /// The kind tag for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            DeviceEvent::Availability { .. } => EventKind::Availability,
            DeviceEvent::Battery { .. } => EventKind::Battery,
            DeviceEvent::Status { .. } => EventKind::Status,
            DeviceEvent::Network { .. } => EventKind::Network,
        }
    }
}

/// Tag identifying one event type.
///
/// Used as the subscription key on the event bus and as the last topic
/// segment on the wire (snake_case via strum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Availability,
    Battery,
    Status,
    Network,
}
