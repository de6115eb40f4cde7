//! Tagged event model and wait predicates.
//!
//! Any producer can inject events into the stream, including out-of-band
//! error diagnostics flagged by a reserved kind prefix. The tag is decided
//! once, when a wire-level [`RawEvent`] is classified; downstream code
//! matches on the variant instead of re-inspecting strings.

use serde_json::Value;

use crate::proto::RawEvent;

/// Reserved kind prefix marking an out-of-band error diagnostic.
pub const ERROR_EVENT_PREFIX: &str = "_MD_ERR";

/// A classified event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A normal producer event, candidate for predicate matching.
    Signal(SignalEvent),
    /// An error diagnostic injected by a peer producer.
    Diagnostic(DiagnosticEvent),
}

impl Event {
    /// Classifies a wire-level event, decoding its value once.
    #[must_use]
    pub fn classify(raw: RawEvent) -> Self {
        if raw.kind.starts_with(ERROR_EVENT_PREFIX) {
            Self::Diagnostic(DiagnosticEvent {
                seq: raw.seq,
                message: decode_diagnostic(&raw.value),
            })
        } else {
            Self::Signal(SignalEvent {
                seq: raw.seq,
                kind: raw.kind,
                value: EventValue::decode(&raw.value),
            })
        }
    }

    /// The server-assigned sequence index.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        match self {
            Self::Signal(e) => e.seq,
            Self::Diagnostic(e) => e.seq,
        }
    }
}

/// A normal event with its decoded value.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEvent {
    /// Server-assigned sequence index.
    pub seq: u64,
    /// Event kind.
    pub kind: String,
    /// Decoded payload.
    pub value: EventValue,
}

/// An error diagnostic from a peer producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// Server-assigned sequence index.
    pub seq: u64,
    /// Human-readable diagnostic text.
    pub message: String,
}

/// An event value after the decode attempt: structured JSON, or the raw
/// text when the payload is not JSON. Two cases, no silent cast.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    /// Payload parsed as JSON.
    Json(Value),
    /// Payload kept as raw text.
    Raw(String),
}

impl EventValue {
    /// Decodes payload bytes, falling back to raw text.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes).into_owned();
        match serde_json::from_str(&text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(text),
        }
    }

    /// Value-equality against an expected JSON value. A raw text value
    /// equals a JSON string with the same content.
    #[must_use]
    pub fn equals(&self, expected: &Value) -> bool {
        match self {
            Self::Json(value) => value == expected,
            Self::Raw(text) => expected.as_str() == Some(text.as_str()),
        }
    }
}

fn decode_diagnostic(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes).into_owned();
    match serde_json::from_str::<Value>(&text) {
        Ok(Value::String(message)) => message,
        Ok(value) => value.to_string(),
        Err(_) => text,
    }
}

/// Selects one event among many: kind equality plus an optional
/// value-equality check.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    kind: String,
    value: Option<Value>,
}

impl Predicate {
    /// Creates a predicate matching any event of the given kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: None,
        }
    }

    /// Builder-style setter requiring the decoded value to equal `value`.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// The kind this predicate selects.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The expected value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether `event` satisfies this predicate.
    #[must_use]
    pub fn matches(&self, event: &SignalEvent) -> bool {
        if event.kind != self.kind {
            return false;
        }
        match &self.value {
            None => true,
            Some(expected) => event.value.equals(expected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(seq: u64, kind: &str, value: &[u8]) -> RawEvent {
        RawEvent {
            seq,
            kind: kind.to_string(),
            value: value.to_vec(),
        }
    }

    #[test]
    fn classify_signal() {
        let event = Event::classify(raw(3, "trial_start", b"1"));
        match event {
            Event::Signal(e) => {
                assert_eq!(e.seq, 3);
                assert_eq!(e.kind, "trial_start");
                assert_eq!(e.value, EventValue::Json(json!(1)));
            }
            Event::Diagnostic(_) => panic!("expected Signal"),
        }
    }

    #[test]
    fn classify_diagnostic_string_payload() {
        let event = Event::classify(raw(9, "_MD_ERR.acquisition", b"\"serial device lost\""));
        match event {
            Event::Diagnostic(e) => {
                assert_eq!(e.seq, 9);
                assert_eq!(e.message, "serial device lost");
            }
            Event::Signal(_) => panic!("expected Diagnostic"),
        }
    }

    #[test]
    fn classify_diagnostic_non_json_payload() {
        let event = Event::classify(raw(0, "_MD_ERR", b"not json at all"));
        match event {
            Event::Diagnostic(e) => assert_eq!(e.message, "not json at all"),
            Event::Signal(_) => panic!("expected Diagnostic"),
        }
    }

    #[test]
    fn decode_falls_back_to_raw() {
        assert_eq!(
            EventValue::decode(b"{broken"),
            EventValue::Raw("{broken".to_string())
        );
        assert_eq!(EventValue::decode(b"2.5"), EventValue::Json(json!(2.5)));
    }

    #[test]
    fn raw_text_equals_json_string() {
        let value = EventValue::Raw("left".to_string());
        assert!(value.equals(&json!("left")));
        assert!(!value.equals(&json!("right")));
        assert!(!value.equals(&json!(1)));
    }

    #[test]
    fn predicate_kind_only() {
        let pred = Predicate::new("button");
        let event = SignalEvent {
            seq: 0,
            kind: "button".to_string(),
            value: EventValue::Json(json!("left")),
        };
        assert!(pred.matches(&event));
    }

    #[test]
    fn predicate_with_value() {
        let pred = Predicate::new("button").with_value(json!("left"));
        let hit = SignalEvent {
            seq: 0,
            kind: "button".to_string(),
            value: EventValue::Json(json!("left")),
        };
        let miss = SignalEvent {
            seq: 1,
            kind: "button".to_string(),
            value: EventValue::Json(json!("right")),
        };
        assert!(pred.matches(&hit));
        assert!(!pred.matches(&miss));
    }

    #[test]
    fn predicate_kind_mismatch() {
        let pred = Predicate::new("button").with_value(json!("left"));
        let event = SignalEvent {
            seq: 0,
            kind: "trial_start".to_string(),
            value: EventValue::Json(json!("left")),
        };
        assert!(!pred.matches(&event));
    }

    #[test]
    fn numeric_values_compare_by_value() {
        let pred = Predicate::new("level").with_value(json!(400));
        let event = SignalEvent {
            seq: 0,
            kind: "level".to_string(),
            value: EventValue::decode(b"400"),
        };
        assert!(pred.matches(&event));
    }
}
