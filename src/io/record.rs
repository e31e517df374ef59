//! Canonical serialized form of a classified message.
//!
//! Export writes every field. Import accepts any subset as long as `subject`
//! is present, and tolerates the looser shapes older captures used: naive
//! timestamps, `null` headers, numeric strings for latency, unknown type
//! tokens and non-string payloads.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::message::{
    latency_from_ms, latency_to_ms, ClassifiedMessage, Direction, MessageKind, MessageSource, RawMessage,
    ReceivedAt,
};

/// How `payload` is encoded in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Payload is the UTF-8 text itself.
    #[default]
    Utf8,
    /// Payload is lowercase hex of arbitrary bytes.
    Hex,
}

impl PayloadEncoding {
    fn is_utf8(&self) -> bool {
        *self == Self::Utf8
    }
}

/// One message as exported and imported.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub seq: Option<u64>,
    #[serde(
        default,
        serialize_with = "serialize_timestamp",
        deserialize_with = "deserialize_timestamp"
    )]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type", default, deserialize_with = "deserialize_kind")]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, deserialize_with = "deserialize_payload")]
    pub payload: String,
    #[serde(default, skip_serializing_if = "PayloadEncoding::is_utf8")]
    pub payload_encoding: PayloadEncoding,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "deserialize_latency")]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    #[serde(default)]
    pub request_subject: Option<String>,
    #[serde(default)]
    pub matched_seq: Option<u64>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub source: Option<MessageSource>,
    #[serde(default)]
    pub bookmarked: bool,
}

/// Values recorded in an imported record that re-classification may not
/// be able to reproduce on its own.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordedHints {
    /// Sequence number in the exporting session.
    pub seq: Option<u64>,
    pub kind: Option<MessageKind>,
    pub latency: Option<Duration>,
    pub correlation_id: Option<Uuid>,
    pub request_subject: Option<String>,
    /// Counterpart's sequence number in the exporting session.
    pub matched_seq: Option<u64>,
    pub bookmarked: bool,
}

impl MessageRecord {
    /// A record carrying only a subject and text payload.
    #[must_use]
    pub fn new(subject: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            seq: None,
            timestamp: None,
            kind: None,
            subject: subject.into(),
            payload: payload.into(),
            payload_encoding: PayloadEncoding::Utf8,
            reply_to: None,
            headers: BTreeMap::new(),
            latency_ms: None,
            correlation_id: None,
            request_subject: None,
            matched_seq: None,
            direction: Direction::Inbound,
            source: None,
            bookmarked: false,
        }
    }

    /// Serializable form of a stored message.
    #[must_use]
    pub fn from_message(msg: &ClassifiedMessage, bookmarked: bool) -> Self {
        let (payload, payload_encoding) = match std::str::from_utf8(&msg.payload) {
            Ok(text) => (text.to_string(), PayloadEncoding::Utf8),
            Err(_) => (hex::encode(&msg.payload), PayloadEncoding::Hex),
        };
        let correlation = msg.correlation.as_ref();

        Self {
            seq: Some(msg.id.seq()),
            timestamp: Some(msg.received_at.wall),
            kind: Some(msg.kind),
            subject: msg.subject.clone(),
            payload,
            payload_encoding,
            reply_to: msg.reply_to.clone(),
            headers: msg.headers.clone(),
            latency_ms: correlation.map(|c| latency_to_ms(c.latency)),
            correlation_id: correlation.map(|c| c.correlation_id),
            request_subject: correlation.map(|c| c.request_subject.clone()),
            matched_seq: msg.matched_ref().map(|id| id.seq()),
            direction: msg.direction,
            source: Some(msg.source),
            bookmarked,
        }
    }

    /// Splits the record into an ingestable message and its recorded hints.
    ///
    /// The message is marked [`MessageSource::Imported`]. A missing timestamp
    /// leaves `received_at` unset, so the session stamps it on ingestion.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MalformedRecord`] for an empty subject or a
    /// hex payload that does not decode.
    pub fn into_parts(self, index: usize) -> Result<(RawMessage, RecordedHints), ValidationError> {
        if self.subject.trim().is_empty() {
            return Err(ValidationError::MalformedRecord {
                index,
                reason: "missing subject".to_string(),
            });
        }

        let payload = match self.payload_encoding {
            PayloadEncoding::Utf8 => self.payload.into_bytes(),
            PayloadEncoding::Hex => hex::decode(&self.payload).map_err(|e| ValidationError::MalformedRecord {
                index,
                reason: format!("invalid hex payload: {e}"),
            })?,
        };

        let mut raw = RawMessage::new(self.subject, payload)
            .with_direction(self.direction)
            .with_source(MessageSource::Imported);
        raw.headers = self.headers;
        raw.reply_to = self.reply_to.filter(|r| !r.is_empty());
        raw.received_at = self.timestamp.map(ReceivedAt::wall);

        let hints = RecordedHints {
            seq: self.seq,
            kind: self.kind,
            latency: self.latency_ms.and_then(latency_from_ms),
            correlation_id: self.correlation_id,
            request_subject: self.request_subject.filter(|s| !s.is_empty()),
            matched_seq: self.matched_seq,
            bookmarked: self.bookmarked,
        };

        Ok((raw, hints))
    }
}

fn serialize_timestamp<S: Serializer>(ts: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match ts {
        Some(ts) => s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        None => s.serialize_none(),
    }
}

/// RFC 3339, or a naive ISO 8601 date-time taken as UTC.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(text)) => parse_timestamp(&text),
        _ => None,
    })
}

fn deserialize_kind<'de, D: Deserializer<'de>>(d: D) -> Result<Option<MessageKind>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(token)) => token.parse().ok(),
        _ => None,
    })
}

fn deserialize_payload<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
    })
}

fn deserialize_headers<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect(),
        _ => BTreeMap::new(),
    })
}

fn deserialize_latency<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::message::{Correlation, MessageId};

    fn classified(payload: Vec<u8>) -> ClassifiedMessage {
        ClassifiedMessage {
            id: MessageId::new(7),
            subject: "svc.add".to_string(),
            payload,
            headers: BTreeMap::from([("Nats-Msg-Id".to_string(), "abc".to_string())]),
            reply_to: Some("_INBOX.1".to_string()),
            received_at: ReceivedAt::wall(Utc::now()),
            direction: Direction::Outbound,
            source: MessageSource::Live,
            kind: MessageKind::Request,
            correlation: Some(Correlation {
                correlation_id: Uuid::nil(),
                latency: Duration::from_micros(5_250),
                matched_ref: Some(MessageId::new(8)),
                request_subject: "svc.add".to_string(),
            }),
        }
    }

    #[test]
    fn record_from_message_carries_correlation() {
        let record = MessageRecord::from_message(&classified(b"{}".to_vec()), true);
        assert_eq!(record.seq, Some(7));
        assert_eq!(record.kind, Some(MessageKind::Request));
        assert_eq!(record.latency_ms, Some(5.25));
        assert_eq!(record.matched_seq, Some(8));
        assert_eq!(record.payload_encoding, PayloadEncoding::Utf8);
        assert!(record.bookmarked);
    }

    #[test]
    fn serialized_record_uses_canonical_names() {
        let record = MessageRecord::from_message(&classified(b"hi".to_vec()), false);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "REQ");
        assert_eq!(value["direction"], "outbound");
        assert_eq!(value["source"], "live");
        assert!(value.get("payload_encoding").is_none());
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn binary_payload_is_hex_encoded() {
        let bytes = vec![0xff, 0x00, 0x9c];
        let record = MessageRecord::from_message(&classified(bytes.clone()), false);
        assert_eq!(record.payload_encoding, PayloadEncoding::Hex);
        assert_eq!(record.payload, "ff009c");

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"payload_encoding\":\"hex\""));
        let back: MessageRecord = serde_json::from_str(&json).unwrap();
        let (raw, _) = back.into_parts(0).unwrap();
        assert_eq!(raw.payload, bytes);
    }

    #[test]
    fn timestamp_keeps_nanoseconds() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.123456789Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut record = MessageRecord::new("a", "");
        record.timestamp = Some(ts);
        let back: MessageRecord = serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(back.timestamp, Some(ts));
    }

    #[test]
    fn tolerates_loose_shapes() {
        let record: MessageRecord = serde_json::from_str(
            r#"{
                "timestamp": "2024-05-01T10:00:00.250000",
                "type": "RPC",
                "subject": "svc.add",
                "payload": {"a": 1},
                "headers": null,
                "latency_ms": "4.5"
            }"#,
        )
        .unwrap();
        assert!(record.timestamp.is_some());
        assert_eq!(record.kind, None);
        assert_eq!(record.payload, "{\"a\":1}");
        assert!(record.headers.is_empty());
        assert_eq!(record.latency_ms, Some(4.5));
    }

    #[test]
    fn into_parts_marks_imported_and_keeps_hints() {
        let mut record = MessageRecord::new("_INBOX.1", "{\"sum\":3}");
        record.kind = Some(MessageKind::Response);
        record.latency_ms = Some(5.0);
        record.correlation_id = Some(Uuid::nil());
        record.reply_to = Some(String::new());
        record.bookmarked = true;

        let (raw, hints) = record.into_parts(0).unwrap();
        assert_eq!(raw.source, MessageSource::Imported);
        assert!(raw.reply_to.is_none());
        assert!(raw.received_at.is_none());
        assert_eq!(hints.kind, Some(MessageKind::Response));
        assert_eq!(hints.latency, Some(Duration::from_millis(5)));
        assert!(hints.bookmarked);
    }

    #[test]
    fn missing_subject_is_malformed() {
        let record: MessageRecord = serde_json::from_str(r#"{"payload": "x"}"#).unwrap();
        assert!(matches!(
            record.into_parts(3),
            Err(ValidationError::MalformedRecord { index: 3, .. })
        ));
    }

    #[test]
    fn bad_hex_is_malformed() {
        let mut record = MessageRecord::new("a", "zz");
        record.payload_encoding = PayloadEncoding::Hex;
        assert!(record.into_parts(0).is_err());
    }
}
