//! Append-only message log.
//!
//! The log is the single owner of classified messages. Entries are stored
//! behind `Arc`s so a snapshot is a cheap copy of pointers taken under a short
//! read lock; ingestion never waits on a running filter evaluation.
//!
//! The only in-place change is the write-once correlation of a request.
//! It is applied copy-on-write, so snapshots taken earlier keep seeing the
//! request as it was.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::message::{ClassifiedMessage, Correlation, MessageId, MessageKind, RawMessage, ReceivedAt};

/// Point-in-time view of the log.
#[derive(Debug, Clone, Default)]
pub struct LogSnapshot {
    /// Bumped on every append, link and clear.
    pub generation: u64,
    /// Messages in arrival order.
    pub messages: Vec<Arc<ClassifiedMessage>>,
}

impl LogSnapshot {
    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Debug, Default)]
struct LogState {
    entries: VecDeque<Arc<ClassifiedMessage>>,
    next_seq: u64,
    generation: u64,
    evicted: u64,
}

impl LogState {
    fn position(&self, id: MessageId) -> Option<usize> {
        let first = self.entries.front()?.id.seq();
        let pos = usize::try_from(id.seq().checked_sub(first)?).ok()?;
        (pos < self.entries.len()).then_some(pos)
    }

    fn link(&mut self, id: MessageId, correlation: Correlation) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        if self.entries[pos].correlation.is_some() {
            return false;
        }
        Arc::make_mut(&mut self.entries[pos]).correlation = Some(correlation);
        self.generation += 1;
        true
    }
}

/// Thread-safe, append-only store of classified messages.
#[derive(Debug, Default)]
pub struct MessageLog {
    state: RwLock<LogState>,
    retention: Option<usize>,
}

impl MessageLog {
    /// Creates a log keeping at most `retention` messages (`None` = unbounded).
    #[must_use]
    pub fn new(retention: Option<usize>) -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            retention: retention.map(|r| r.max(1)),
        }
    }

    /// Id the next appended message will receive.
    #[must_use]
    pub fn next_id(&self) -> MessageId {
        MessageId::new(self.read().next_seq)
    }

    /// Appends a message. Evicts the oldest entries beyond the retention limit.
    pub fn append(
        &self,
        raw: RawMessage,
        received_at: ReceivedAt,
        kind: MessageKind,
        correlation: Option<Correlation>,
    ) -> MessageId {
        self.append_linked(raw, received_at, kind, correlation, None)
    }

    /// Appends a message and, under the same write lock, attaches the
    /// write-once correlation of its counterpart. No snapshot ever sees one
    /// side of a pair without the other.
    pub fn append_linked(
        &self,
        raw: RawMessage,
        received_at: ReceivedAt,
        kind: MessageKind,
        correlation: Option<Correlation>,
        counterpart: Option<(MessageId, Correlation)>,
    ) -> MessageId {
        let mut state = self.write();
        if let Some((other, link)) = counterpart {
            state.link(other, link);
        }
        let id = MessageId::new(state.next_seq);
        state.next_seq += 1;
        state.generation += 1;

        state.entries.push_back(Arc::new(ClassifiedMessage {
            id,
            subject: raw.subject,
            payload: raw.payload,
            headers: raw.headers,
            reply_to: raw.reply_to,
            received_at,
            direction: raw.direction,
            source: raw.source,
            kind,
            correlation,
        }));

        if let Some(limit) = self.retention {
            while state.entries.len() > limit {
                if let Some(old) = state.entries.pop_front() {
                    state.evicted += 1;
                    debug!(evicted = %old.id, "retention limit reached, evicted oldest message");
                }
            }
        }

        id
    }

    /// Attaches a correlation to a stored message, once.
    ///
    /// Returns false if the message was evicted or is already correlated.
    pub fn link(&self, id: MessageId, correlation: Correlation) -> bool {
        self.write().link(id, correlation)
    }

    /// Id of the oldest stored message.
    #[must_use]
    pub fn first_id(&self) -> Option<MessageId> {
        self.read().entries.front().map(|m| m.id)
    }

    /// Looks up a message by id.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<Arc<ClassifiedMessage>> {
        let state = self.read();
        state.position(id).map(|pos| Arc::clone(&state.entries[pos]))
    }

    /// Copies the current contents.
    #[must_use]
    pub fn snapshot(&self) -> LogSnapshot {
        let state = self.read();
        LogSnapshot {
            generation: state.generation,
            messages: state.entries.iter().cloned().collect(),
        }
    }

    /// Current generation counter.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Number of stored messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages dropped by the retention policy.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.read().evicted
    }

    /// Removes every message. Sequence numbers keep increasing.
    pub fn clear(&self) {
        let mut state = self.write();
        state.entries.clear();
        state.generation += 1;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
