use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use emberd_device::Capabilities;
use emberd_device::Device;
use emberd_device::DeviceError;
use emberd_device::DeviceEvent;
use emberd_device::EventHandler;
use emberd_device::EventKind;
use emberd_device::Subscription;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use super::entity::DeviceMetadata;
use super::message::Notifier;

/// Errors surfaced by entity construction and attachment.
#[derive(Debug, thiserror::Error)]
pub enum EntityError {
    /// Missing identity metadata at construction. Fatal, surfaced to the
    /// platform setup caller.
    #[error("entity requires a descriptor: none passed and no default bound")]
    MissingDescriptor,

    /// Event-bus registration failed. Surfaced to the engine's attach
    /// contract, not retried.
    #[error("event subscription failed: {0}")]
    Subscription(#[from] DeviceError),
}

/// Immutable description of one entity a platform can expose for a device.
///
/// Defined once as a const in the platform module; never mutated.
pub struct EntityDescriptor<C> {
    /// Key unique within the device; suffixes the entity's unique id.
    pub key: &'static str,

    /// Skip availability tracking for entities that are always reachable.
    pub always_available: bool,

    /// Projects the device's capability set onto this entity's capability.
    /// None means the device does not support the entity.
    pub capability: fn(&Capabilities) -> Option<C>,
}

impl<C> Clone for EntityDescriptor<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for EntityDescriptor<C> {}

/// Bridges one device capability to the engine's entity contract.
///
/// Owns the plumbing shared by every platform entity: the unique id, the
/// availability flag, the set of subscribed event kinds (refresh
/// bookkeeping), and the cancellation tokens released on detach.
pub struct EntityAdapter<C> {
    device: Device,
    capability: C,
    descriptor: EntityDescriptor<C>,
    unique_id: String,
    available: Arc<AtomicBool>,
    attached: bool,
    subscribed_kinds: Mutex<HashSet<EventKind>>,
    tokens: Mutex<Vec<Subscription>>,
}

impl<C> EntityAdapter<C> {
    /// Build an adapter for `capability` on `device`.
    ///
    /// The descriptor carries the entity's identity metadata; constructing
    /// without one is a configuration error. Platform entities with a
    /// default descriptor pass it explicitly.
    pub fn new(
        device: Device,
        capability: C,
        descriptor: Option<EntityDescriptor<C>>,
    ) -> Result<Self, EntityError> {
        let descriptor = descriptor.ok_or(EntityError::MissingDescriptor)?;
        let unique_id = format!("{}_{}", device.info().did, descriptor.key);
        Ok(Self {
            device,
            capability,
            descriptor,
            unique_id,
            available: Arc::new(AtomicBool::new(true)),
            attached: false,
            subscribed_kinds: Mutex::new(HashSet::new()),
            tokens: Mutex::new(Vec::new()),
        })
    }

    /// Stable across the adapter's lifetime: `<did>_<descriptor key>`.
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn capability(&self) -> &C {
        &self.capability
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Display metadata read off the device handle. Fields the device lacks
    /// stay absent.
    pub fn metadata(&self) -> DeviceMetadata {
        let info = self.device.info();
        DeviceMetadata {
            manufacturer: info.manufacturer.clone(),
            sw_version: info.fw_version.clone(),
            serial: info.serial.clone(),
            name: info.name.clone(),
            model: info.model.clone(),
            mac: info.mac.clone(),
        }
    }

    /// Wire availability tracking.
    ///
    /// Intended to run exactly once, from the entity's `attach` hook; a
    /// second call is ignored with a warning. Subscription failures propagate
    /// to the engine's attach contract.
    pub async fn attach(&mut self, notifier: Notifier) -> Result<(), EntityError> {
        if self.attached {
            warn!(entity = %self.unique_id, "attach called twice, ignoring");
            return Ok(());
        }
        self.attached = true;

        if !self.descriptor.always_available {
            let available = Arc::clone(&self.available);
            let entity_id = self.unique_id.clone();
            let handler: EventHandler = Arc::new(move |event| {
                let available = Arc::clone(&available);
                let notifier = notifier.clone();
                let entity_id = entity_id.clone();
                Box::pin(async move {
                    if let DeviceEvent::Availability { available: value } = event {
                        // Idempotent store: safe under redundant delivery.
                        available.store(value, Ordering::SeqCst);
                        notifier.state_changed(&entity_id).await;
                    }
                })
            });
            self.subscribe(EventKind::Availability, handler).await?;
        }
        Ok(())
    }

    /// Record the kind, register the handler, and keep the token for
    /// teardown.
    ///
    /// The kind set has set semantics for refresh bookkeeping only: each call
    /// still registers its own live callback with an independent token.
    pub async fn subscribe(
        &self,
        kind: EventKind,
        handler: EventHandler,
    ) -> Result<(), EntityError> {
        self.subscribed_kinds.lock().await.insert(kind);
        let token = self.device.events().subscribe(kind, handler).await?;
        self.tokens.lock().await.push(token);
        Ok(())
    }

    /// Release every subscription issued since attach, exactly once each.
    /// Order is unspecified; tokens are independent.
    pub async fn detach(&self) {
        let tokens: Vec<Subscription> = self.tokens.lock().await.drain(..).collect();
        for token in tokens {
            debug!(entity = %self.unique_id, kind = %token.kind(), "releasing subscription");
            self.device.events().unsubscribe(token).await;
        }
        debug!(entity = %self.unique_id, "detached");
    }

    /// Ask the device to re-emit current values, one request per distinct
    /// subscribed kind. A failing kind does not block the others.
    pub async fn request_refresh(&self) {
        let kinds: Vec<EventKind> = self.subscribed_kinds.lock().await.iter().copied().collect();
        for kind in kinds {
            if let Err(e) = self.device.events().request_refresh(kind) {
                warn!(entity = %self.unique_id, %kind, "refresh request failed: {}", e);
            }
        }
    }
}
