mod adapter;
mod engine;
mod entity;
mod message;
mod platform;
mod state;

pub use adapter::EntityAdapter;
pub use adapter::EntityDescriptor;
pub use adapter::EntityError;
pub use engine::Engine;
pub use entity::DeviceMetadata;
pub use entity::Entity;
pub use message::EngineCommand;
pub use message::EngineCommandSender;
pub use message::EngineMessage;
pub use message::Notifier;
pub use platform::PlatformContext;
pub use platform::PLATFORM_REGISTRY;
pub use state::EntityState;
pub use state::State;
