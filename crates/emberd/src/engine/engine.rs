use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use emberd_device::Device;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::info;
use tracing::warn;

use super::entity::Entity;
use super::message::EngineCommand;
use super::message::EngineCommandReceiver;
use super::message::EngineCommandSender;
use super::message::EngineMessage;
use super::message::EngineMessageReceiver;
use super::message::EngineMessageSender;
use super::message::Notifier;
use super::platform::PlatformContext;
use super::platform::PLATFORM_REGISTRY;
use super::state::EntityState;
use super::state::State;

/// Capacity for the entity→engine notification channel.
/// Provides backpressure when devices emit faster than the engine reads.
const MESSAGE_CHANNEL_SIZE: usize = 1024;

/// emberd engine
///
/// The host framework: discovers entities for connected devices via the
/// platform registry, drives their attach/detach lifecycle, and maintains a
/// snapshot of their state for consumers.
pub struct Engine {
    /// Centralized state snapshot (readers load the Arc, the engine stores a
    /// new one per change).
    state: Arc<ArcSwap<State>>,

    /// Entities keyed by unique id. Owned exclusively by the engine.
    entities: HashMap<String, Box<dyn Entity>>,

    /// Devices connected at startup, shut down with the engine.
    devices: Vec<Device>,

    message_rx: EngineMessageReceiver,
    message_tx: EngineMessageSender,
    command_rx: EngineCommandReceiver,
    command_tx: EngineCommandSender,
}

impl Engine {
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_CHANNEL_SIZE);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(ArcSwap::new(Arc::default())),
            entities: HashMap::new(),
            devices: Vec::new(),
            message_rx,
            message_tx,
            command_rx,
            command_tx,
        }
    }

    /// Shared handle to the state snapshot, for the HTTP API.
    pub fn state_handle(&self) -> Arc<ArcSwap<State>> {
        Arc::clone(&self.state)
    }

    /// Sender consumers use to enqueue commands.
    pub fn command_sender(&self) -> EngineCommandSender {
        self.command_tx.clone()
    }

    fn notifier(&self) -> Notifier {
        Notifier::new(self.message_tx.clone())
    }

    /// Register a connected device: run every platform factory over it and
    /// attach the entities they produce.
    ///
    /// An entity whose attach fails is logged and dropped; the rest of the
    /// device's entities still come up.
    pub async fn add_device(&mut self, device: Device) {
        let ctx = PlatformContext { device: &device };
        let mut discovered: Vec<Box<dyn Entity>> = Vec::new();
        for factory in PLATFORM_REGISTRY {
            discovered.extend(factory(&ctx));
        }

        for mut entity in discovered {
            let entity_id = entity.unique_id().to_string();
            match entity.attach(self.notifier()).await {
                Ok(()) => {
                    info!(
                        "entity attached: {} (platform {})",
                        entity_id,
                        entity.platform()
                    );
                    self.write_entity_state(entity.as_ref());
                    self.entities.insert(entity_id, entity);
                }
                Err(e) => {
                    warn!("entity {} attach failed, dropping it: {}", entity_id, e);
                }
            }
        }

        self.devices.push(device);
    }

    /// Run the engine's event loop until `shutdown_rx` fires, then detach
    /// every entity and shut the devices down.
    pub async fn run(&mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        info!("engine starting with {} entities", self.entities.len());

        loop {
            tokio::select! {
                msg = self.message_rx.recv() => {
                    let Some(msg) = msg else { break };
                    self.handle_message(msg);
                }
                cmd = self.command_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    self.handle_command(cmd).await;
                }
                _ = &mut shutdown_rx => {
                    info!("engine received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        info!("engine shut down");
    }

    fn handle_message(&self, msg: EngineMessage) {
        match msg {
            EngineMessage::StateChanged { entity_id } => match self.entities.get(&entity_id) {
                Some(entity) => self.write_entity_state(entity.as_ref()),
                None => warn!("state change for unknown entity: {}", entity_id),
            },
        }
    }

    async fn handle_command(&self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::Refresh { entity_id } => match self.entities.get(&entity_id) {
                Some(entity) => entity.request_refresh().await,
                None => warn!("refresh requested for unknown entity: {}", entity_id),
            },
        }
    }

    /// Re-read one entity into the snapshot.
    fn write_entity_state(&self, entity: &dyn Entity) {
        let entity_state = EntityState {
            platform: entity.platform().to_string(),
            metadata: entity.metadata(),
            available: entity.is_available(),
            state: entity.state_json(),
        };

        let mut state = State::clone(&self.state.load());
        state
            .entities
            .insert(entity.unique_id().to_string(), entity_state);
        self.state.store(Arc::new(state));
    }

    async fn shutdown(&mut self) {
        // Stop accepting notifications first: a handler mid-dispatch blocked
        // sending on a full channel holds the bus lock, and detach needs that
        // lock. Closing the receiver fails those sends immediately.
        self.message_rx.close();

        for (entity_id, mut entity) in self.entities.drain() {
            entity.detach().await;
            info!("entity detached: {}", entity_id);
        }
        for device in self.devices.drain(..) {
            device.shutdown().await;
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
