/// Errors surfaced by the device layer.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("transport not connected, call connect() first")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("event bus is closed")]
    BusClosed,

    #[error("failed to decode event on topic {topic}: {source}")]
    Decode {
        topic: String,
        #[source]
        source: serde_json::Error,
    },
}
