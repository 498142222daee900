//! Message types between entities, the engine, and API consumers.
//!
//! Split by direction to enforce correct usage at compile time:
//! - `EngineMessage`: notifications from entities to the engine
//! - `EngineCommand`: requests from consumers (HTTP API) to the engine

use tokio::sync::mpsc;
use tracing::warn;

/// Notifications FROM entities TO the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineMessage {
    /// Entity state or availability changed; the engine re-reads the entity.
    StateChanged { entity_id: String },
}

/// Requests FROM consumers TO the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Ask an entity to re-request its subscribed event kinds from the device.
    Refresh { entity_id: String },
}

/// Bounded channel for entity→engine notifications (backpressure against
/// chatty devices).
pub type EngineMessageSender = mpsc::Sender<EngineMessage>;
pub type EngineMessageReceiver = mpsc::Receiver<EngineMessage>;

/// Unbounded channel for consumer→engine commands (consumers must not block).
pub type EngineCommandSender = mpsc::UnboundedSender<EngineCommand>;
pub type EngineCommandReceiver = mpsc::UnboundedReceiver<EngineCommand>;

/// Handle entities use to tell the engine to re-read their state.
///
/// Handed to an entity at attach time; event handlers clone it into their
/// closures.
#[derive(Clone)]
pub struct Notifier {
    tx: EngineMessageSender,
}

impl Notifier {
    pub(crate) fn new(tx: EngineMessageSender) -> Self {
        Self { tx }
    }

    /// Signal that `entity_id` should be re-read.
    ///
    /// Delivery failure (engine gone) is logged, not fatal: the entity is
    /// about to be torn down anyway.
    pub async fn state_changed(&self, entity_id: &str) {
        let msg = EngineMessage::StateChanged {
            entity_id: entity_id.to_string(),
        };
        if let Err(e) = self.tx.send(msg).await {
            warn!("failed to notify engine of state change: {}", e);
        }
    }
}
