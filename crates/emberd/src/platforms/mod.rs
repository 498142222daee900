//! Entity platforms. Each platform registers a factory in
//! [`crate::engine::PLATFORM_REGISTRY`] and builds entities for the
//! capabilities a device actually exposes.

pub mod camera;
pub mod vacuum;
