//! Schedulable event contract
//!
//! An event is schedulable when it has a stable identifier and a JSON
//! decode function, which makes it eligible for the persistent scheduler.
//! Codecs are collected in a [`SchedulableRegistry`] populated at startup;
//! resolution probes each currently registered kind in turn and treats a
//! typed [`DecodeError::NotThisVariant`] as a miss, never as a failure.

use crate::error::{HubError, Result};
use crate::event::{Event, EVENT_ID_FIELD};
use serde_json::Value;
use std::collections::HashMap;

/// Typed decode failure for schedulable payload probing
#[derive(Debug)]
pub enum DecodeError {
    /// The payload belongs to some other event type; try the next candidate
    NotThisVariant,
    /// The payload names this type but its fields are malformed
    Invalid(String),
}

/// Outcome of probing one codec against a payload
pub type DecodeResult = std::result::Result<Event, DecodeError>;

type DecodeFn = Box<dyn Fn(&Value) -> DecodeResult + Send + Sync>;

/// Identifier plus decode function for one schedulable event type
pub struct SchedulableCodec {
    event_id: String,
    decode_fn: DecodeFn,
}

impl SchedulableCodec {
    /// Create a codec with a custom decode function
    pub fn new(
        event_id: impl Into<String>,
        decode: impl Fn(&Value) -> DecodeResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            decode_fn: Box::new(decode),
        }
    }

    /// Codec for events that carry no data beyond their identifier
    ///
    /// Accepts any payload whose `event_id` field matches; the decoded
    /// event keeps the payload as-is so encode/decode round trips.
    pub fn simple(event_id: impl Into<String>) -> Self {
        let id = event_id.into();
        let expected = id.clone();
        Self::new(id, move |payload| {
            match payload.get(EVENT_ID_FIELD).and_then(Value::as_str) {
                Some(found) if found == expected => {
                    Ok(Event::new(expected.clone(), payload.clone()))
                }
                _ => Err(DecodeError::NotThisVariant),
            }
        })
    }

    /// The stable identifier of the event type this codec decodes
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Probe a payload against this codec
    pub fn decode(&self, payload: &Value) -> DecodeResult {
        (self.decode_fn)(payload)
    }
}

impl std::fmt::Debug for SchedulableCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulableCodec")
            .field("event_id", &self.event_id)
            .finish()
    }
}

/// Registry of schedulable event codecs, keyed by event kind
#[derive(Debug, Default)]
pub struct SchedulableRegistry {
    codecs: HashMap<String, SchedulableCodec>,
}

impl SchedulableRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a codec; a later codec for the same kind replaces the earlier one
    pub fn register(&mut self, codec: SchedulableCodec) {
        tracing::debug!(event_id = %codec.event_id(), "Registering schedulable codec");
        self.codecs.insert(codec.event_id().to_string(), codec);
    }

    /// Builder-style registration
    pub fn with(mut self, codec: SchedulableCodec) -> Self {
        self.register(codec);
        self
    }

    /// Whether a codec exists for the given kind
    pub fn contains(&self, kind: &str) -> bool {
        self.codecs.contains_key(kind)
    }

    /// Resolve a generic JSON payload against the given candidate kinds
    ///
    /// Only kinds that have a codec are probed. Returns the first
    /// successful decode; `NotThisVariant` moves on to the next candidate,
    /// a malformed payload for a matching type is a client error, and an
    /// exhausted candidate list is [`HubError::UnknownEventKind`].
    pub fn resolve(&self, kinds: &[String], payload: &Value) -> Result<Event> {
        for kind in kinds {
            let Some(codec) = self.codecs.get(kind) else {
                continue;
            };
            match codec.decode(payload) {
                Ok(event) => return Ok(event),
                Err(DecodeError::NotThisVariant) => continue,
                Err(DecodeError::Invalid(reason)) => return Err(HubError::InvalidPayload(reason)),
            }
        }
        Err(HubError::UnknownEventKind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_simple_codec_roundtrip() {
        let codec = SchedulableCodec::simple("RefreshEvent");
        let event = Event::schedulable("RefreshEvent");

        let json = event.payload_json();
        let payload: Value = serde_json::from_str(&json).unwrap();
        let decoded = codec.decode(&payload).unwrap();

        assert_eq!(decoded, event);
        assert_eq!(decoded.payload_json(), json);
    }

    #[test]
    fn test_simple_codec_rejects_other_ids() {
        let codec = SchedulableCodec::simple("A");
        let payload = serde_json::json!({ EVENT_ID_FIELD: "B" });
        assert!(matches!(
            codec.decode(&payload),
            Err(DecodeError::NotThisVariant)
        ));
    }

    #[test]
    fn test_resolve_picks_matching_kind() {
        let registry = SchedulableRegistry::new()
            .with(SchedulableCodec::simple("A"))
            .with(SchedulableCodec::simple("B"));

        let payload = serde_json::json!({ EVENT_ID_FIELD: "B" });
        let event = registry.resolve(&kinds(&["A", "B"]), &payload).unwrap();
        assert_eq!(event.kind, "B");
    }

    #[test]
    fn test_resolve_skips_unregistered_kinds() {
        let registry = SchedulableRegistry::new().with(SchedulableCodec::simple("B"));

        // "A" has no codec and must be skipped, not fail resolution
        let payload = serde_json::json!({ EVENT_ID_FIELD: "B" });
        let event = registry.resolve(&kinds(&["A", "B"]), &payload).unwrap();
        assert_eq!(event.kind, "B");
    }

    #[test]
    fn test_resolve_unknown_kind_is_error() {
        let registry = SchedulableRegistry::new().with(SchedulableCodec::simple("A"));
        let payload = serde_json::json!({ EVENT_ID_FIELD: "Z" });
        let err = registry.resolve(&kinds(&["A"]), &payload).unwrap_err();
        assert!(matches!(err, HubError::UnknownEventKind));
    }

    #[test]
    fn test_resolve_invalid_fields_is_client_error() {
        let registry = SchedulableRegistry::new().with(SchedulableCodec::new("T", |payload| {
            match payload.get(EVENT_ID_FIELD).and_then(Value::as_str) {
                Some("T") => match payload.get("volume").and_then(Value::as_u64) {
                    Some(volume) => Ok(Event::schedulable_with(
                        "T",
                        serde_json::json!({ "volume": volume }),
                    )),
                    None => Err(DecodeError::Invalid("missing field 'volume'".into())),
                },
                _ => Err(DecodeError::NotThisVariant),
            }
        }));

        let payload = serde_json::json!({ EVENT_ID_FIELD: "T" });
        let err = registry.resolve(&kinds(&["T"]), &payload).unwrap_err();
        assert!(matches!(err, HubError::InvalidPayload(_)));
    }

    #[test]
    fn test_typed_codec_decodes_fields() {
        let codec = SchedulableCodec::new("SoundEvent", |payload| {
            match payload.get(EVENT_ID_FIELD).and_then(Value::as_str) {
                Some("SoundEvent") => Ok(Event::new("SoundEvent", payload.clone())),
                _ => Err(DecodeError::NotThisVariant),
            }
        });

        let payload = serde_json::json!({ EVENT_ID_FIELD: "SoundEvent", "sound": "gong" });
        let event = codec.decode(&payload).unwrap();
        assert_eq!(event.payload["sound"], "gong");
    }
}
