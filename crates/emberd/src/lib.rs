//! emberd: a small home-automation hub.
//!
//! emberd connects MQTT devices (vacuum robots, network cameras), projects
//! their capabilities onto entities via registered platforms, and serves the
//! resulting state over an HTTP API.

pub mod api;
pub mod config;
pub mod engine;
pub mod platforms;

pub use config::Config;
pub use engine::Engine;
