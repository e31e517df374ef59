//! Message types.
//!
//! Every inbound record, live or imported, is unified into a [`RawMessage`]
//! at the ingestion boundary. The session stamps it with a [`MessageId`],
//! classifies it and stores it as a [`ClassifiedMessage`]. Downstream code
//! never branches on where a message came from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Arrival sequence number of a message within a session.
///
/// Sequence numbers are assigned in ingestion order and never reused, so they
/// stay valid as weak references after older messages are evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Wraps a raw sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// The raw sequence number.
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Inferred message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MessageKind {
    /// Plain publish.
    #[default]
    #[serde(rename = "PUB")]
    Publish,
    /// Request carrying a reply-to address.
    #[serde(rename = "REQ")]
    Request,
    /// Response published on a tracked reply address.
    #[serde(rename = "RES")]
    Response,
}

impl MessageKind {
    /// Wire token (`PUB`, `REQ`, `RES`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "PUB",
            Self::Request => "REQ",
            Self::Response => "RES",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUB" => Ok(Self::Publish),
            "REQ" => Ok(Self::Request),
            "RES" => Ok(Self::Response),
            _ => Err(ValidationError::UnknownMessageKind {
                value: s.to_string(),
            }),
        }
    }
}

/// Whether a message was observed on the wire or published by the user.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Inbound,
    Outbound,
}

/// Where a message entered the session.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSource {
    #[default]
    Live,
    Imported,
}

/// Receipt timestamp: wall clock plus an optional monotonic reading.
///
/// The monotonic part is an offset from the owning [`SessionClock`]'s origin
/// and is only present for live messages. Elapsed time between two stamps
/// uses the monotonic readings when both have one, otherwise the wall clock.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedAt {
    pub wall: DateTime<Utc>,
    pub monotonic: Option<Duration>,
}

impl ReceivedAt {
    /// A wall-clock-only stamp, as used for imported records.
    #[must_use]
    pub const fn wall(wall: DateTime<Utc>) -> Self {
        Self {
            wall,
            monotonic: None,
        }
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    #[must_use]
    pub fn elapsed_since(&self, earlier: &Self) -> Duration {
        match (self.monotonic, earlier.monotonic) {
            (Some(now), Some(then)) => now.saturating_sub(then),
            _ => (self.wall - earlier.wall).to_std().unwrap_or(Duration::ZERO),
        }
    }
}

/// Clock used to stamp live messages.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    /// Starts the clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current wall and monotonic time.
    #[must_use]
    pub fn now(&self) -> ReceivedAt {
        ReceivedAt {
            wall: Utc::now(),
            monotonic: Some(self.origin.elapsed()),
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// An inbound record before classification.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    pub reply_to: Option<String>,
    /// Stamped by the session at ingestion when absent.
    pub received_at: Option<ReceivedAt>,
    pub direction: Direction,
    pub source: MessageSource,
}

impl RawMessage {
    /// Creates an inbound live message with no reply address.
    #[must_use]
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            headers: BTreeMap::new(),
            reply_to: None,
            received_at: None,
            direction: Direction::Inbound,
            source: MessageSource::Live,
        }
    }

    /// Sets the reply address.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the receive time.
    #[must_use]
    pub const fn with_received_at(mut self, received_at: ReceivedAt) -> Self {
        self.received_at = Some(received_at);
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn with_source(mut self, source: MessageSource) -> Self {
        self.source = source;
        self
    }
}

/// Correlation between a request and its response.
///
/// Both sides carry the same `correlation_id` and `latency`; `matched_ref`
/// points at the counterpart.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub correlation_id: Uuid,
    pub latency: Duration,
    /// Counterpart message. `None` when restored from a recorded hint whose
    /// counterpart was not part of the import.
    pub matched_ref: Option<MessageId>,
    /// Subject of the request this correlation belongs to.
    pub request_subject: String,
}

/// A stored, classified message.
///
/// Immutable after creation apart from the write-once correlation of a
/// request, which is filled in when its response arrives.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedMessage {
    pub id: MessageId,
    pub subject: String,
    pub payload: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    pub reply_to: Option<String>,
    pub received_at: ReceivedAt,
    pub direction: Direction,
    pub source: MessageSource,
    pub kind: MessageKind,
    pub correlation: Option<Correlation>,
}

impl ClassifiedMessage {
    /// Payload as text, replacing invalid UTF-8 sequences.
    #[must_use]
    pub fn payload_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Latency of the correlated round trip, if any.
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.correlation.as_ref().map(|c| c.latency)
    }

    /// Identity of the correlated counterpart, if any.
    #[must_use]
    pub fn matched_ref(&self) -> Option<MessageId> {
        self.correlation.as_ref().and_then(|c| c.matched_ref)
    }

    /// Whether this message has been correlated.
    #[must_use]
    pub const fn is_correlated(&self) -> bool {
        self.correlation.is_some()
    }
}

/// Namespace for deterministic correlation ids.
const CORRELATION_NAMESPACE: Uuid = Uuid::from_u128(0x6e6e_6176_2d63_6f72_7265_6c61_7469_6f6e);

/// Deterministic correlation id for a request.
///
/// Derived from the request's subject, reply address and wall timestamp so
/// re-importing an export reproduces the same id.
#[must_use]
pub fn correlation_id_for(subject: &str, reply_to: &str, issued: &ReceivedAt) -> Uuid {
    let name = format!(
        "{subject}\n{reply_to}\n{}",
        issued.wall.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
    );
    Uuid::new_v5(&CORRELATION_NAMESPACE, name.as_bytes())
}

/// Latency in fractional milliseconds, as exported.
#[must_use]
pub fn latency_to_ms(latency: Duration) -> f64 {
    latency.as_nanos() as f64 / 1_000_000.0
}

/// Inverse of [`latency_to_ms`]; negative or non-finite input yields `None`.
#[must_use]
pub fn latency_from_ms(ms: f64) -> Option<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = (ms * 1_000_000.0).round() as u64;
    Some(Duration::from_nanos(nanos))
}
