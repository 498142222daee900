//! Wire scheme for device events.
//!
//! Devices publish JSON event payloads on `<prefix>/<did>/event/<kind>` and
//! accept refresh requests on `<prefix>/<did>/get/<kind>`.

use std::str::FromStr;

use serde::Deserialize;

use crate::error::DeviceError;
use crate::event::DeviceEvent;
use crate::event::EventKind;
use crate::event::VacuumStatus;

/// Default topic prefix shared by every device on a broker.
pub const DEFAULT_PREFIX: &str = "emberd";

/// Wildcard filter matching every event topic of one device.
pub fn event_topic_filter(prefix: &str, did: &str) -> String {
    format!("{}/{}/event/+", prefix, did)
}

/// Topic the hub publishes refresh requests on.
pub fn refresh_topic(prefix: &str, did: &str, kind: EventKind) -> String {
    format!("{}/{}/get/{}", prefix, did, kind)
}

/// Parse an event topic into its kind.
///
/// Returns None for topics outside the event scheme (other devices, `get`
/// topics, unknown kinds).
pub fn parse_event_topic(topic: &str, prefix: &str, did: &str) -> Option<EventKind> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let kind = rest.strip_prefix(did)?.strip_prefix("/event/")?;
    EventKind::from_str(kind).ok()
}

/// Decode the JSON payload for an event of the given kind.
pub fn decode_event(
    kind: EventKind,
    topic: &str,
    payload: &[u8],
) -> Result<DeviceEvent, DeviceError> {
    match kind {
        EventKind::Availability => {
            #[derive(Deserialize)]
            struct Payload {
                available: bool,
            }
            let p: Payload = decode(topic, payload)?;
            Ok(DeviceEvent::Availability {
                available: p.available,
            })
        }
        EventKind::Battery => {
            #[derive(Deserialize)]
            struct Payload {
                level: u8,
            }
            let p: Payload = decode(topic, payload)?;
            Ok(DeviceEvent::Battery { level: p.level })
        }
        EventKind::Status => {
            #[derive(Deserialize)]
            struct Payload {
                status: VacuumStatus,
            }
            let p: Payload = decode(topic, payload)?;
            Ok(DeviceEvent::Status { status: p.status })
        }
        EventKind::Network => {
            #[derive(Deserialize)]
            struct Payload {
                host: String,
            }
            let p: Payload = decode(topic, payload)?;
            Ok(DeviceEvent::Network { host: p.host })
        }
    }
}

fn decode<'a, T: Deserialize<'a>>(topic: &str, payload: &'a [u8]) -> Result<T, DeviceError> {
    serde_json::from_slice(payload).map_err(|source| DeviceError::Decode {
        topic: topic.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_topics() {
        assert_eq!(
            parse_event_topic("emberd/bot-1/event/battery", "emberd", "bot-1"),
            Some(EventKind::Battery)
        );
        assert_eq!(
            parse_event_topic("emberd/bot-1/event/availability", "emberd", "bot-1"),
            Some(EventKind::Availability)
        );
    }

    #[test]
    fn rejects_foreign_topics() {
        // Wrong device.
        assert_eq!(parse_event_topic("emberd/bot-2/event/battery", "emberd", "bot-1"), None);
        // Refresh direction, not an event.
        assert_eq!(parse_event_topic("emberd/bot-1/get/battery", "emberd", "bot-1"), None);
        // Unknown kind.
        assert_eq!(parse_event_topic("emberd/bot-1/event/warp", "emberd", "bot-1"), None);
        // Wrong prefix.
        assert_eq!(parse_event_topic("other/bot-1/event/battery", "emberd", "bot-1"), None);
    }

    #[test]
    fn decodes_payloads() {
        let event = decode_event(EventKind::Battery, "t", br#"{"level": 73}"#).unwrap();
        assert_eq!(event, DeviceEvent::Battery { level: 73 });

        let event = decode_event(EventKind::Status, "t", br#"{"status": "cleaning"}"#).unwrap();
        assert_eq!(
            event,
            DeviceEvent::Status {
                status: VacuumStatus::Cleaning
            }
        );

        let event =
            decode_event(EventKind::Availability, "t", br#"{"available": false}"#).unwrap();
        assert_eq!(event, DeviceEvent::Availability { available: false });
    }

    #[test]
    fn decode_failure_names_the_topic() {
        let err = decode_event(EventKind::Battery, "emberd/bot-1/event/battery", b"nope")
            .unwrap_err();
        assert!(err.to_string().contains("emberd/bot-1/event/battery"));
    }

    #[test]
    fn refresh_topic_uses_kind_segment() {
        assert_eq!(
            refresh_topic("emberd", "bot-1", EventKind::Battery),
            "emberd/bot-1/get/battery"
        );
    }
}
