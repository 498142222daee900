//! Vacuum platform: battery and activity sensors for robot vacuums.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use emberd_device::BatteryCapability;
use emberd_device::Capabilities;
use emberd_device::Device;
use emberd_device::DeviceEvent;
use emberd_device::EventHandler;
use emberd_device::EventKind;
use emberd_device::StatusCapability;
use emberd_device::VacuumStatus;
use linkme::distributed_slice;
use serde_json::json;
use tracing::warn;

use crate::engine::DeviceMetadata;
use crate::engine::Entity;
use crate::engine::EntityAdapter;
use crate::engine::EntityDescriptor;
use crate::engine::EntityError;
use crate::engine::Notifier;
use crate::engine::PlatformContext;
use crate::engine::PLATFORM_REGISTRY;

const BATTERY_DESCRIPTOR: EntityDescriptor<BatteryCapability> = EntityDescriptor {
    key: "battery",
    always_available: false,
    capability: battery_capability,
};

const STATUS_DESCRIPTOR: EntityDescriptor<StatusCapability> = EntityDescriptor {
    key: "status",
    always_available: false,
    capability: status_capability,
};

fn battery_capability(caps: &Capabilities) -> Option<BatteryCapability> {
    caps.battery
}

fn status_capability(caps: &Capabilities) -> Option<StatusCapability> {
    caps.status
}

#[distributed_slice(PLATFORM_REGISTRY)]
static VACUUM_PLATFORM: fn(&PlatformContext) -> Vec<Box<dyn Entity>> = build_entities;

/// Build vacuum entities for every capability the device supports.
fn build_entities(ctx: &PlatformContext) -> Vec<Box<dyn Entity>> {
    let mut entities: Vec<Box<dyn Entity>> = Vec::new();

    match BatterySensor::new(ctx.device.clone()) {
        Ok(Some(sensor)) => entities.push(Box::new(sensor)),
        Ok(None) => {}
        Err(e) => warn!("failed to build battery sensor: {}", e),
    }
    match StatusSensor::new(ctx.device.clone()) {
        Ok(Some(sensor)) => entities.push(Box::new(sensor)),
        Ok(None) => {}
        Err(e) => warn!("failed to build status sensor: {}", e),
    }

    entities
}

/// Battery level sensor for a vacuum device.
pub struct BatterySensor {
    adapter: EntityAdapter<BatteryCapability>,
    level: Arc<Mutex<Option<u8>>>,
}

impl BatterySensor {
    /// Returns None when the device does not report battery level.
    pub fn new(device: Device) -> Result<Option<Self>, EntityError> {
        let Some(capability) = (BATTERY_DESCRIPTOR.capability)(device.capabilities()) else {
            return Ok(None);
        };
        Ok(Some(Self {
            adapter: EntityAdapter::new(device, capability, Some(BATTERY_DESCRIPTOR))?,
            level: Arc::new(Mutex::new(None)),
        }))
    }
}

#[async_trait]
impl Entity for BatterySensor {
    fn unique_id(&self) -> &str {
        self.adapter.unique_id()
    }

    fn platform(&self) -> &'static str {
        "vacuum"
    }

    fn metadata(&self) -> DeviceMetadata {
        self.adapter.metadata()
    }

    fn is_available(&self) -> bool {
        self.adapter.is_available()
    }

    fn state_json(&self) -> serde_json::Value {
        let level = self.level.lock().ok().and_then(|guard| *guard);
        json!({ "level": level })
    }

    async fn attach(&mut self, notifier: Notifier) -> Result<(), EntityError> {
        self.adapter.attach(notifier.clone()).await?;

        let level = Arc::clone(&self.level);
        let entity_id = self.adapter.unique_id().to_string();
        let handler: EventHandler = Arc::new(move |event| {
            let level = Arc::clone(&level);
            let notifier = notifier.clone();
            let entity_id = entity_id.clone();
            Box::pin(async move {
                if let DeviceEvent::Battery { level: value } = event {
                    if let Ok(mut guard) = level.lock() {
                        *guard = Some(value);
                    }
                    notifier.state_changed(&entity_id).await;
                }
            })
        });
        self.adapter.subscribe(EventKind::Battery, handler).await
    }

    async fn detach(&mut self) {
        self.adapter.detach().await;
    }

    async fn request_refresh(&self) {
        self.adapter.request_refresh().await;
    }
}

/// Activity sensor for a vacuum device (idle, cleaning, docked, ...).
pub struct StatusSensor {
    adapter: EntityAdapter<StatusCapability>,
    status: Arc<Mutex<Option<VacuumStatus>>>,
}

impl StatusSensor {
    /// Returns None when the device does not report activity.
    pub fn new(device: Device) -> Result<Option<Self>, EntityError> {
        let Some(capability) = (STATUS_DESCRIPTOR.capability)(device.capabilities()) else {
            return Ok(None);
        };
        Ok(Some(Self {
            adapter: EntityAdapter::new(device, capability, Some(STATUS_DESCRIPTOR))?,
            status: Arc::new(Mutex::new(None)),
        }))
    }
}

#[async_trait]
impl Entity for StatusSensor {
    fn unique_id(&self) -> &str {
        self.adapter.unique_id()
    }

    fn platform(&self) -> &'static str {
        "vacuum"
    }

    fn metadata(&self) -> DeviceMetadata {
        self.adapter.metadata()
    }

    fn is_available(&self) -> bool {
        self.adapter.is_available()
    }

    fn state_json(&self) -> serde_json::Value {
        let status = self.status.lock().ok().and_then(|guard| *guard);
        json!({ "status": status })
    }

    async fn attach(&mut self, notifier: Notifier) -> Result<(), EntityError> {
        self.adapter.attach(notifier.clone()).await?;

        let status = Arc::clone(&self.status);
        let entity_id = self.adapter.unique_id().to_string();
        let handler: EventHandler = Arc::new(move |event| {
            let status = Arc::clone(&status);
            let notifier = notifier.clone();
            let entity_id = entity_id.clone();
            Box::pin(async move {
                if let DeviceEvent::Status { status: value } = event {
                    if let Ok(mut guard) = status.lock() {
                        *guard = Some(value);
                    }
                    notifier.state_changed(&entity_id).await;
                }
            })
        });
        self.adapter.subscribe(EventKind::Status, handler).await
    }

    async fn detach(&mut self) {
        self.adapter.detach().await;
    }

    async fn request_refresh(&self) {
        self.adapter.request_refresh().await;
    }
}
