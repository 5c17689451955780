//! Core event type for the hub-event system
//!
//! An [`Event`] is an immutable, typed message. The `kind` tag is the
//! dispatch key the bus uses to look up subscribers; the payload is
//! arbitrary JSON owned by the event type that defines it.

use serde::{Deserialize, Serialize};

/// Kind of a validated schedule command carried over the bus
pub const SCHEDULE_COMMAND_KIND: &str = "scheduler.schedule";

/// Kind of a validated unschedule command carried over the bus
pub const UNSCHEDULE_COMMAND_KIND: &str = "scheduler.unschedule";

/// Kind of a push-notification update (named channel + data pair)
///
/// The transport that turns these into a live client stream (SSE,
/// websocket, ...) is an external collaborator; the bus dispatches them
/// like any other event.
pub const PUSH_UPDATE_KIND: &str = "push.update";

/// Payload field that identifies a schedulable event type
pub const EVENT_ID_FIELD: &str = "event_id";

/// A single event in the system
///
/// Ownership is transient: created by a publisher, cloned into each
/// subscriber's queue, then discarded. Equality is by value, which is
/// what unschedule-by-value relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Type tag used as the dispatch key
    pub kind: String,

    /// Event payload — arbitrary JSON data
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    /// Create a new event
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Create a payload-free event
    pub fn signal(kind: impl Into<String>) -> Self {
        Self::new(kind, serde_json::Value::Null)
    }

    /// Create a schedulable event carrying only its identifier
    ///
    /// The payload embeds the `event_id` discriminator so the event can be
    /// persisted and decoded again on restart.
    pub fn schedulable(event_id: impl Into<String>) -> Self {
        let id = event_id.into();
        let payload = serde_json::json!({ EVENT_ID_FIELD: id });
        Self::new(id, payload)
    }

    /// Create a schedulable event with additional payload fields
    ///
    /// `fields` should be a JSON object; the `event_id` discriminator is
    /// inserted into it. A non-object value is wrapped under a `data` key.
    pub fn schedulable_with(event_id: impl Into<String>, fields: serde_json::Value) -> Self {
        let id = event_id.into();
        let mut payload = match fields {
            serde_json::Value::Object(map) => serde_json::Value::Object(map),
            other => serde_json::json!({ "data": other }),
        };
        if let Some(map) = payload.as_object_mut() {
            map.insert(
                EVENT_ID_FIELD.to_string(),
                serde_json::Value::String(id.clone()),
            );
        }
        Self::new(id, payload)
    }

    /// Create a push-notification event for a named channel
    pub fn push(channel: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(
            PUSH_UPDATE_KIND,
            serde_json::json!({ "name": channel.into(), "data": data }),
        )
    }

    /// The payload serialized as a JSON string (durable record form)
    pub fn payload_json(&self) -> String {
        self.payload.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_new() {
        let event = Event::new("weather.refresh", serde_json::json!({"city": "Berlin"}));
        assert_eq!(event.kind, "weather.refresh");
        assert_eq!(event.payload["city"], "Berlin");
    }

    #[test]
    fn test_signal_has_null_payload() {
        let event = Event::signal("hue.toggle");
        assert!(event.payload.is_null());
    }

    #[test]
    fn test_schedulable_embeds_event_id() {
        let event = Event::schedulable("CalendarRefreshEvent");
        assert_eq!(event.kind, "CalendarRefreshEvent");
        assert_eq!(event.payload[EVENT_ID_FIELD], "CalendarRefreshEvent");
    }

    #[test]
    fn test_schedulable_with_fields() {
        let event = Event::schedulable_with("SoundEvent", serde_json::json!({"sound": "gong"}));
        assert_eq!(event.payload[EVENT_ID_FIELD], "SoundEvent");
        assert_eq!(event.payload["sound"], "gong");
    }

    #[test]
    fn test_schedulable_with_non_object_fields() {
        let event = Event::schedulable_with("RawEvent", serde_json::json!([1, 2, 3]));
        assert_eq!(event.payload[EVENT_ID_FIELD], "RawEvent");
        assert_eq!(event.payload["data"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn test_push_event_shape() {
        let event = Event::push("calendar/update", serde_json::Value::String("".into()));
        assert_eq!(event.kind, PUSH_UPDATE_KIND);
        assert_eq!(event.payload["name"], "calendar/update");
    }

    #[test]
    fn test_event_equality_by_value() {
        let a = Event::schedulable("X");
        let b = Event::schedulable("X");
        let c = Event::schedulable("Y");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_event_serialization_roundtrip() {
        let event = Event::schedulable_with("E", serde_json::json!({"n": 1}));
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
