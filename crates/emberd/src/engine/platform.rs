use emberd_device::Device;
use linkme::distributed_slice;

use super::entity::Entity;

/// Context handed to platform factories during device discovery.
pub struct PlatformContext<'a> {
    pub device: &'a Device,
}

/// Registry of platform entity factories.
///
/// Each platform contributes one factory that inspects the device's
/// capability set and returns the entities it can expose for it (possibly
/// none). The engine runs every factory for every connected device.
#[distributed_slice]
pub static PLATFORM_REGISTRY: [fn(&PlatformContext) -> Vec<Box<dyn Entity>>];
