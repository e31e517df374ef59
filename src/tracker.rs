//! Request/response correlation.
//!
//! The tracker classifies each message as `PUB`, `REQ` or `RES` and pairs
//! responses with the requests whose reply address they were published on.
//! It holds only [`MessageId`]s, never the messages themselves.
//!
//! Reply addresses are literal subjects. A reply-to carrying `*` or `>` is
//! malformed and the message is classified `PUB`.
//!
//! Matching order for an inbound subject:
//!
//! 1. A pending request registered with exactly that reply address.
//! 2. Otherwise the pending request whose address is the longest token
//!    prefix of the subject, for clients sharing one inbox
//!    (`_INBOX.abc` answers `_INBOX.abc.7`).
//!
//! Addresses are unique keys, so each prefix length names at most one
//! candidate and the longest (most specific) one wins. This is a heuristic;
//! the transport does not define which request a shared-inbox reply
//! belongs to.
//!
//! A reply address is consumed by its first reply. Later messages on it are
//! `PUB`. Requests that see no reply within the timeout are dropped from the
//! pending set and stay unmatched. Expiry is lazy: it runs on every
//! [`RpcTracker::classify`] call and on explicit [`RpcTracker::sweep`] calls,
//! and only touches the requests that actually expired.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::message::{correlation_id_for, MessageId, ReceivedAt};
use crate::subject::{SubjectPattern, DELIMITER};

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// How long a request may wait for its reply.
    pub timeout: Duration,
    /// Max pending requests; the earliest issued is dropped beyond this.
    pub max_pending: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_pending: 10_000,
        }
    }
}

/// Result of classifying one message.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Publish,
    Request,
    Response(ResponseMatch),
}

/// A response paired with its pending request.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatch {
    pub request: MessageId,
    pub request_subject: String,
    pub correlation_id: Uuid,
    pub latency: Duration,
}

#[derive(Debug, Clone)]
struct PendingRequest {
    request: MessageId,
    subject: String,
    reply_to: String,
    issued: ReceivedAt,
    registration: u64,
}

impl PendingRequest {
    fn expiry_key(&self) -> (DateTime<Utc>, u64) {
        (self.issued.wall, self.registration)
    }
}

/// Classifies messages and tracks in-flight requests.
#[derive(Debug)]
pub struct RpcTracker {
    cfg: TrackerConfig,
    pending: HashMap<String, PendingRequest>,
    /// Reply addresses ordered by issue time, for expiry and eviction.
    by_issue: BTreeMap<(DateTime<Utc>, u64), String>,
    registrations: u64,
    matched_total: u64,
    expired_total: u64,
}

impl RpcTracker {
    /// Empty tracker.
    #[must_use]
    pub fn new(cfg: TrackerConfig) -> Self {
        Self {
            cfg,
            pending: HashMap::new(),
            by_issue: BTreeMap::new(),
            registrations: 0,
            matched_total: 0,
            expired_total: 0,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn config(&self) -> &TrackerConfig {
        &self.cfg
    }

    /// Classifies a message and updates the pending set.
    ///
    /// Never fails: malformed or duplicate reply addresses yield
    /// [`Classification::Publish`].
    pub fn classify(
        &mut self,
        id: MessageId,
        subject: &str,
        reply_to: Option<&str>,
        received_at: &ReceivedAt,
    ) -> Classification {
        self.sweep(received_at);

        if let Some(pending) = self.take_match(subject) {
            let latency = received_at.elapsed_since(&pending.issued);
            let correlation_id = correlation_id_for(&pending.subject, &pending.reply_to, &pending.issued);
            self.matched_total += 1;
            debug!(
                request = %pending.request,
                response = %id,
                request_subject = %pending.subject,
                reply_to = %pending.reply_to,
                latency_us = latency.as_micros() as u64,
                "correlated response"
            );
            return Classification::Response(ResponseMatch {
                request: pending.request,
                request_subject: pending.subject,
                correlation_id,
                latency,
            });
        }

        let Some(reply_to) = reply_to.filter(|r| !r.is_empty()) else {
            return Classification::Publish;
        };

        match SubjectPattern::parse(reply_to) {
            Ok(p) if !p.is_wildcard() => {}
            Ok(_) => {
                debug!(%id, reply_to, "wildcard reply address, treating as publish");
                return Classification::Publish;
            }
            Err(err) => {
                debug!(%id, reply_to, error = %err, "malformed reply address, treating as publish");
                return Classification::Publish;
            }
        }

        if self.pending.contains_key(reply_to) {
            debug!(%id, reply_to, "reply address already pending, treating as publish");
            return Classification::Publish;
        }

        if self.pending.len() >= self.cfg.max_pending.max(1) {
            self.evict_oldest();
        }

        self.registrations += 1;
        let pending = PendingRequest {
            request: id,
            subject: subject.to_string(),
            reply_to: reply_to.to_string(),
            issued: *received_at,
            registration: self.registrations,
        };
        self.by_issue.insert(pending.expiry_key(), reply_to.to_string());
        self.pending.insert(reply_to.to_string(), pending);

        Classification::Request
    }

    /// Drops pending requests older than the timeout as of `now`.
    ///
    /// Returns the ids of the requests that expired.
    pub fn sweep(&mut self, now: &ReceivedAt) -> Vec<MessageId> {
        let timeout = self.cfg.timeout;
        let mut expired = Vec::new();
        while let Some(entry) = self.by_issue.first_entry() {
            let alive = self
                .pending
                .get(entry.get())
                .is_some_and(|p| now.elapsed_since(&p.issued) <= timeout);
            if alive {
                break;
            }
            let reply_to = entry.remove();
            if let Some(p) = self.pending.remove(&reply_to) {
                expired.push(p.request);
            }
        }

        if !expired.is_empty() {
            expired.sort_unstable();
            self.expired_total += expired.len() as u64;
            debug!(count = expired.len(), "expired pending requests");
        }
        expired
    }

    /// Number of requests currently awaiting a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a reply address is currently awaiting a reply.
    #[must_use]
    pub fn is_pending(&self, reply_to: &str) -> bool {
        self.pending.contains_key(reply_to)
    }

    /// Ids of all pending requests, oldest registration first.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<MessageId> {
        let mut entries: Vec<&PendingRequest> = self.pending.values().collect();
        entries.sort_by_key(|p| p.registration);
        entries.into_iter().map(|p| p.request).collect()
    }

    /// Responses matched since creation or the last reset.
    #[must_use]
    pub const fn matched_total(&self) -> u64 {
        self.matched_total
    }

    /// Requests expired unanswered.
    #[must_use]
    pub const fn expired_total(&self) -> u64 {
        self.expired_total
    }

    /// Clears all pending state and counters.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.by_issue.clear();
        self.registrations = 0;
        self.matched_total = 0;
        self.expired_total = 0;
    }

    /// Removes and returns the request answered by `subject`: the exact
    /// address first, then the longest token prefix.
    fn take_match(&mut self, subject: &str) -> Option<PendingRequest> {
        let key = std::iter::once(subject)
            .chain(subject.rmatch_indices(DELIMITER).map(|(i, _)| &subject[..i]))
            .find(|candidate| !candidate.is_empty() && self.pending.contains_key(*candidate))?;
        self.remove(key)
    }

    fn evict_oldest(&mut self) {
        let Some((_, key)) = self.by_issue.pop_first() else {
            return;
        };
        if let Some(p) = self.pending.remove(&key) {
            debug!(request = %p.request, reply_to = %p.reply_to, "pending set full, dropped oldest request");
        }
    }

    fn remove(&mut self, reply_to: &str) -> Option<PendingRequest> {
        let pending = self.pending.remove(reply_to)?;
        self.by_issue.remove(&pending.expiry_key());
        Some(pending)
    }
}

impl Default for RpcTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
