//! Event envelope parsing.
//!
//! A delivery carries one of two schemas: a single CloudEvents v1.0 object, or
//! an array of Event Grid schema events. Decoding is strict; a malformed body
//! is reported separately from a well-formed but empty one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use gridhook_core::{ValidationError, ValidationResult};

use crate::signature::{CLOUD_EVENT_SIGNATURE_HEADER, EVENT_GRID_SIGNATURE_HEADER};

/// Content type of a structured-mode CloudEvent.
pub const CLOUD_EVENTS_CONTENT_TYPE: &str = "application/cloudevents+json";

/// A single CloudEvents v1.0 event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    /// Event ID.
    pub id: String,
    /// Origin of the event; checked against the topic allow-list.
    pub source: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// CloudEvents version.
    #[serde(default = "default_spec_version")]
    pub specversion: String,
    /// Timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Content type of `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacontenttype: Option<String>,
    /// Schema reference for `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataschema: Option<String>,
    /// Event data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Binary event data, base64 encoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_base64: Option<String>,
    /// Extension attributes.
    #[serde(flatten)]
    pub extensions: HashMap<String, Value>,
}

fn default_spec_version() -> String {
    "1.0".to_string()
}

/// One element of an Event Grid schema batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridEvent {
    /// Event ID.
    pub id: String,
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Event data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Event type.
    pub event_type: String,
    /// Schema version of `data`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
    /// Schema version of the event metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_version: Option<String>,
    /// Timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    /// Full resource path of the publishing topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Which schema the front end expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeHint {
    /// Decide from the shape of the body.
    #[default]
    Auto,
    /// Expect one CloudEvent object.
    Single,
    /// Expect an array of Event Grid events.
    Batch,
}

impl EnvelopeHint {
    /// Derives a hint from a `Content-Type` header value.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return EnvelopeHint::Auto;
        };
        let media_type = content_type.split(';').next().unwrap_or("").trim();
        if media_type.eq_ignore_ascii_case(CLOUD_EVENTS_CONTENT_TYPE) {
            EnvelopeHint::Single
        } else {
            EnvelopeHint::Auto
        }
    }
}

/// Envelope variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Single,
    Batch,
}

impl EnvelopeKind {
    /// The header carrying this variant's signature.
    pub fn signature_header(self) -> &'static str {
        match self {
            EnvelopeKind::Single => CLOUD_EVENT_SIGNATURE_HEADER,
            EnvelopeKind::Batch => EVENT_GRID_SIGNATURE_HEADER,
        }
    }

    /// Short name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Single => "single",
            EnvelopeKind::Batch => "batch",
        }
    }
}

/// A parsed delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// One CloudEvent.
    Single(CloudEvent),
    /// Event Grid events in delivery order. Never empty.
    Batch(Vec<GridEvent>),
}

impl Envelope {
    /// Returns the variant.
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Single(_) => EnvelopeKind::Single,
            Envelope::Batch(_) => EnvelopeKind::Batch,
        }
    }

    /// Number of events carried.
    pub fn len(&self) -> usize {
        match self {
            Envelope::Single(_) => 1,
            Envelope::Batch(events) => events.len(),
        }
    }

    /// Always false: empty deliveries are rejected while parsing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(event id, topic)` for each event, in delivery order.
    pub fn origins(&self) -> Vec<(&str, &str)> {
        match self {
            Envelope::Single(event) => vec![(event.id.as_str(), event.source.as_str())],
            Envelope::Batch(events) => events
                .iter()
                .map(|e| (e.id.as_str(), e.topic.as_deref().unwrap_or_default()))
                .collect(),
        }
    }
}

/// Decodes the body as JSON without interpreting it.
pub fn decode_document(body: &[u8]) -> ValidationResult<Value> {
    serde_json::from_slice(body).map_err(ValidationError::from)
}

/// Decodes and parses a raw body.
pub fn parse_envelope(body: &[u8], hint: EnvelopeHint) -> ValidationResult<Envelope> {
    envelope_from_document(decode_document(body)?, hint)
}

/// Parses an already decoded body.
pub fn envelope_from_document(document: Value, hint: EnvelopeHint) -> ValidationResult<Envelope> {
    match (document, hint) {
        (Value::Null, _) => Err(ValidationError::EmptyOrInvalidEnvelope),
        (Value::Array(items), EnvelopeHint::Auto | EnvelopeHint::Batch) => {
            let events = grid_events_from_items(items)?;
            for (index, event) in events.iter().enumerate() {
                if event.topic.as_deref().is_none_or(|t| t.trim().is_empty()) {
                    return Err(ValidationError::malformed(format!(
                        "event {} ({}) is missing required field `topic`",
                        index, event.id
                    )));
                }
            }
            Ok(Envelope::Batch(events))
        }
        (Value::Array(_), EnvelopeHint::Single) => Err(ValidationError::malformed(
            "expected a single event object, found an array",
        )),
        (document @ Value::Object(_), EnvelopeHint::Auto | EnvelopeHint::Single) => {
            let event: CloudEvent = serde_json::from_value(document)?;
            require("id", &event.id)?;
            require("source", &event.source)?;
            require("type", &event.event_type)?;
            Ok(Envelope::Single(event))
        }
        (Value::Object(_), EnvelopeHint::Batch) => Err(ValidationError::malformed(
            "expected an array of events, found an object",
        )),
        (other, _) => Err(ValidationError::malformed(format!(
            "expected an object or array, found {}",
            json_kind(&other)
        ))),
    }
}

fn grid_events_from_items(items: Vec<Value>) -> ValidationResult<Vec<GridEvent>> {
    if items.is_empty() {
        return Err(ValidationError::EmptyOrInvalidEnvelope);
    }

    let events: Vec<GridEvent> = serde_json::from_value(Value::Array(items))?;
    for event in &events {
        require("id", &event.id)?;
        require("eventType", &event.event_type)?;
    }
    Ok(events)
}

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        Err(ValidationError::malformed(format!(
            "required field `{}` is empty",
            field
        )))
    } else {
        Ok(())
    }
}

/// Name of a JSON value's type, for diagnostics.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SINGLE: &str = r#"{"id":"1","source":"/a/b","type":"x","specversion":"1.0"}"#;

    const BATCH: &str = r#"[
        {
            "id": "e1",
            "topic": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.EventGrid/topics/t",
            "subject": "orders/1",
            "eventType": "Contoso.Orders.Created",
            "eventTime": "2025-04-21T12:00:00Z",
            "data": {"orderId": 1},
            "dataVersion": "1.0",
            "metadataVersion": "1"
        },
        {
            "id": "e2",
            "topic": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.EventGrid/topics/t",
            "subject": "orders/2",
            "eventType": "Contoso.Orders.Created",
            "eventTime": "2025-04-21T12:00:01Z",
            "data": {"orderId": 2},
            "dataVersion": "1.0"
        }
    ]"#;

    #[test]
    fn test_parse_single() {
        let envelope = parse_envelope(SINGLE.as_bytes(), EnvelopeHint::Auto).unwrap();
        let Envelope::Single(event) = envelope else {
            panic!("expected single envelope");
        };
        assert_eq!(event.id, "1");
        assert_eq!(event.source, "/a/b");
        assert_eq!(event.event_type, "x");
        assert!(event.time.is_none());
        assert!(event.data.is_none());
    }

    #[test]
    fn test_spec_version_defaults() {
        let body = r#"{"id":"1","source":"/a/b","type":"x"}"#;
        let Envelope::Single(event) = parse_envelope(body.as_bytes(), EnvelopeHint::Auto).unwrap()
        else {
            panic!("expected single envelope");
        };
        assert_eq!(event.specversion, "1.0");
    }

    #[test]
    fn test_single_extensions_are_kept() {
        let body = r#"{"id":"1","source":"/a/b","type":"x","traceparent":"00-abc"}"#;
        let Envelope::Single(event) = parse_envelope(body.as_bytes(), EnvelopeHint::Auto).unwrap()
        else {
            panic!("expected single envelope");
        };
        assert_eq!(event.extensions["traceparent"], "00-abc");
    }

    #[test]
    fn test_parse_batch_preserves_order() {
        let envelope = parse_envelope(BATCH.as_bytes(), EnvelopeHint::Auto).unwrap();
        assert_eq!(envelope.kind(), EnvelopeKind::Batch);
        assert_eq!(envelope.len(), 2);

        let ids: Vec<&str> = envelope.origins().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        let Envelope::Batch(events) = envelope else {
            unreachable!()
        };
        assert_eq!(events[0].metadata_version.as_deref(), Some("1"));
        assert!(events[1].metadata_version.is_none());
        assert!(events[0].event_time.is_some());
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_envelope(b"not json", EnvelopeHint::Auto).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");
    }

    #[test]
    fn test_json_scalar_is_malformed() {
        let err = parse_envelope(br#""not json""#, EnvelopeHint::Auto).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");

        let err = parse_envelope(b"42", EnvelopeHint::Auto).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");
    }

    #[test]
    fn test_null_and_empty_are_invalid() {
        assert_eq!(
            parse_envelope(b"null", EnvelopeHint::Auto),
            Err(ValidationError::EmptyOrInvalidEnvelope)
        );
        assert_eq!(
            parse_envelope(b"[]", EnvelopeHint::Auto),
            Err(ValidationError::EmptyOrInvalidEnvelope)
        );
        assert_eq!(
            parse_envelope(b"[]", EnvelopeHint::Batch),
            Err(ValidationError::EmptyOrInvalidEnvelope)
        );
    }

    #[test]
    fn test_missing_required_fields() {
        let no_source = r#"{"id":"1","type":"x"}"#;
        let err = parse_envelope(no_source.as_bytes(), EnvelopeHint::Auto).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");
        assert!(err.to_string().contains("source"));

        let empty_id = r#"{"id":"","source":"/a","type":"x"}"#;
        let err = parse_envelope(empty_id.as_bytes(), EnvelopeHint::Auto).unwrap_err();
        assert!(err.to_string().contains("`id`"));

        let no_event_type = r#"[{"id":"1","topic":"/a"}]"#;
        let err = parse_envelope(no_event_type.as_bytes(), EnvelopeHint::Auto).unwrap_err();
        assert!(err.to_string().contains("eventType"));
    }

    #[test]
    fn test_batch_without_topic_is_malformed() {
        let body = r#"[{"id":"1","eventType":"x","subject":"s","dataVersion":"1"}]"#;
        let err = parse_envelope(body.as_bytes(), EnvelopeHint::Auto).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");
        assert!(err.to_string().contains("topic"));
    }

    #[test]
    fn test_null_optional_batch_fields() {
        let body = r#"[{"id":"1","eventType":"x","topic":"/a","subject":null,"dataVersion":null,"metadataVersion":null,"eventTime":null,"data":null}]"#;
        let Envelope::Batch(events) = parse_envelope(body.as_bytes(), EnvelopeHint::Auto).unwrap()
        else {
            panic!("expected a batch");
        };
        assert!(events[0].subject.is_none());
        assert!(events[0].data_version.is_none());
        assert!(events[0].data.is_none());
    }

    #[test]
    fn test_hint_mismatch() {
        let err = parse_envelope(SINGLE.as_bytes(), EnvelopeHint::Batch).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");

        let err = parse_envelope(BATCH.as_bytes(), EnvelopeHint::Single).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");
    }

    #[test]
    fn test_bad_timestamp_is_malformed() {
        let body = r#"{"id":"1","source":"/a","type":"x","time":"yesterday"}"#;
        let err = parse_envelope(body.as_bytes(), EnvelopeHint::Auto).unwrap_err();
        assert_eq!(err.reason(), "MalformedEnvelope");
    }

    #[test]
    fn test_hint_from_content_type() {
        assert_eq!(EnvelopeHint::from_content_type(None), EnvelopeHint::Auto);
        assert_eq!(
            EnvelopeHint::from_content_type(Some("application/json")),
            EnvelopeHint::Auto
        );
        assert_eq!(
            EnvelopeHint::from_content_type(Some("Application/CloudEvents+JSON; charset=utf-8")),
            EnvelopeHint::Single
        );
    }

    #[test]
    fn test_signature_header_per_kind() {
        assert_eq!(EnvelopeKind::Single.signature_header(), "ce-signature");
        assert_eq!(EnvelopeKind::Batch.signature_header(), "aeg-signature");
    }
}
