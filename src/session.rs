//! Session state.
//!
//! A [`Session`] owns everything one navigator session mutates: the message
//! log, the pending-request set, the subject tree, the active filter and the
//! bookmarks. It is an explicit value, shared as `Arc<Session>` between the
//! ingestion worker and readers; nothing is global.
//!
//! Writes go through [`Session::ingest`] (and the import helpers built on
//! it), which holds the tracker lock for the whole classify, append and link
//! step. That lock is the single-writer guarantee: messages are classified,
//! stored and counted in exactly the order they were ingested. Readers take
//! log snapshots and never wait for a running classification.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::info;

use crate::config::SessionConfig;
use crate::error::{NavResult, ValidationError};
use crate::filter::{FilterState, MessageFilter, TreeSelection};
use crate::io::{self, ExportFormat, MessageRecord, RecordedHints};
use crate::log::{LogSnapshot, MessageLog};
use crate::message::{
    ClassifiedMessage, Correlation, MessageId, MessageKind, RawMessage, ReceivedAt, SessionClock,
};
use crate::tracker::{Classification, RpcTracker};
use crate::tree::{SubjectNode, SubjectTree};

/// Counters exposed for display.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    /// Messages in the log.
    pub total: usize,
    /// Messages passing the active filter.
    pub filtered: usize,
    /// Requests awaiting a reply.
    pub pending: usize,
    /// Bookmarked messages still in the log.
    pub bookmarks: usize,
    pub paused: bool,
    /// Live messages not ingested: queue full, or discarded while paused.
    pub dropped: u64,
}

/// The messages passing a filter, taken from one log snapshot.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default)]
pub struct FilteredView {
    /// Generation of the snapshot the view was computed from.
    pub generation: u64,
    /// Size of that snapshot.
    pub total: usize,
    pub messages: Vec<Arc<ClassifiedMessage>>,
}

/// Which messages an export covers.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportScope {
    #[default]
    All,
    /// Only messages passing the active filter.
    Filtered,
    Bookmarked,
}

/// Result of importing a file into a session.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub format: io::ImportFormat,
    /// Ids assigned to the imported messages, in file order.
    pub ids: Vec<MessageId>,
    pub skipped: usize,
}

/// One navigator session.
#[derive(Debug)]
pub struct Session {
    cfg: SessionConfig,
    clock: SessionClock,
    log: MessageLog,
    tracker: Mutex<RpcTracker>,
    tree: RwLock<SubjectTree>,
    filter: MessageFilter,
    bookmarks: RwLock<BTreeSet<MessageId>>,
    pending: AtomicUsize,
    paused: AtomicBool,
    dropped: AtomicU64,
}

impl Session {
    /// Session with a normalized copy of `cfg`.
    #[must_use]
    pub fn new(cfg: SessionConfig) -> Self {
        let cfg = cfg.normalized();
        Self {
            clock: SessionClock::new(),
            log: MessageLog::new(cfg.retention),
            tracker: Mutex::new(RpcTracker::new(cfg.tracker.clone())),
            tree: RwLock::new(SubjectTree::new()),
            filter: MessageFilter::new(FilterState::new().with_hide(cfg.hide)),
            bookmarks: RwLock::new(BTreeSet::new()),
            pending: AtomicUsize::new(0),
            paused: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            cfg,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    /// Classifies, stores and counts one message.
    ///
    /// Stamps `received_at` from the session clock when the message has none.
    pub fn ingest(&self, raw: RawMessage) -> MessageId {
        self.ingest_with_hints(raw, &RecordedHints::default())
    }

    /// [`Session::ingest`] for an imported record.
    ///
    /// When the tracker classifies the message `PUB`, a recorded `REQ`/`RES`
    /// type is kept instead. When it correlates a response, a recorded
    /// latency takes precedence over the recomputed one so exported
    /// latencies survive re-import unchanged.
    pub fn ingest_with_hints(&self, mut raw: RawMessage, hints: &RecordedHints) -> MessageId {
        let mut tracker = self.lock_tracker();

        let received_at = raw.received_at.take().unwrap_or_else(|| self.clock.now());
        let id = self.log.next_id();
        let classification = tracker.classify(id, &raw.subject, raw.reply_to.as_deref(), &received_at);

        let (kind, correlation, link) = match classification {
            Classification::Publish => (hints.kind.unwrap_or(MessageKind::Publish), None, None),
            Classification::Request => (MessageKind::Request, None, None),
            Classification::Response(m) => {
                let latency = hints.latency.unwrap_or(m.latency);
                let request_side = Correlation {
                    correlation_id: m.correlation_id,
                    latency,
                    matched_ref: Some(id),
                    request_subject: m.request_subject.clone(),
                };
                let response_side = Correlation {
                    correlation_id: m.correlation_id,
                    latency,
                    matched_ref: Some(m.request),
                    request_subject: m.request_subject,
                };
                (MessageKind::Response, Some(response_side), Some((m.request, request_side)))
            }
        };

        let subject = raw.subject.clone();
        let appended = self.log.append_linked(raw, received_at, kind, correlation, link);
        debug_assert_eq!(appended, id);

        self.tree.write().unwrap_or_else(PoisonError::into_inner).observe(&subject);
        if hints.bookmarked {
            self.bookmarks.write().unwrap_or_else(PoisonError::into_inner).insert(id);
        }
        self.pending.store(tracker.pending_count(), Ordering::Relaxed);

        id
    }

    /// Feeds a finite sequence of messages through [`Session::ingest`].
    pub fn replay<I>(&self, messages: I) -> Vec<MessageId>
    where
        I: IntoIterator<Item = RawMessage>,
    {
        messages.into_iter().map(|m| self.ingest(m)).collect()
    }

    /// Replays imported records in order, then restores recorded
    /// correlations the tracker could not re-derive.
    ///
    /// A recorded correlation is attached only to a message that is still
    /// uncorrelated, and only when it carries both a correlation id and a
    /// latency. Its counterpart reference is resolved through the recorded
    /// sequence numbers when the counterpart was part of the same import.
    pub fn replay_records<I>(&self, records: I) -> Vec<MessageId>
    where
        I: IntoIterator<Item = (RawMessage, RecordedHints)>,
    {
        let mut ids = Vec::new();
        let mut restored = Vec::new();
        let mut seq_map: HashMap<u64, MessageId> = HashMap::new();

        for (raw, hints) in records {
            let subject = raw.subject.clone();
            let id = self.ingest_with_hints(raw, &hints);
            if let Some(seq) = hints.seq {
                seq_map.insert(seq, id);
            }
            ids.push(id);
            restored.push((id, subject, hints));
        }

        for (id, subject, hints) in restored {
            let (Some(correlation_id), Some(latency)) = (hints.correlation_id, hints.latency) else {
                continue;
            };
            let is_uncorrelated = self.log.get(id).is_some_and(|m| m.correlation.is_none());
            if !is_uncorrelated {
                continue;
            }
            let request_subject = hints.request_subject.unwrap_or_else(|| match hints.kind {
                Some(MessageKind::Request) => subject,
                _ => String::new(),
            });
            self.log.link(
                id,
                Correlation {
                    correlation_id,
                    latency,
                    matched_ref: hints.matched_seq.and_then(|s| seq_map.get(&s).copied()),
                    request_subject,
                },
            );
        }

        ids
    }

    /// Imports a file (JSON array, NDJSON or NATS CLI capture).
    ///
    /// # Errors
    ///
    /// Returns a resource error if the file cannot be read. Malformed records
    /// are skipped and counted instead.
    pub fn import_file(&self, path: &Path) -> NavResult<ImportSummary> {
        let outcome = io::load_file(path)?;
        let ids = self.replay_records(outcome.messages);
        Ok(ImportSummary {
            format: outcome.format,
            ids,
            skipped: outcome.skipped,
        })
    }

    /// Serializable records for the messages in `scope`, in arrival order.
    #[must_use]
    pub fn export_records(&self, scope: ExportScope) -> Vec<MessageRecord> {
        let messages = match scope {
            ExportScope::All => self.log.snapshot().messages,
            ExportScope::Filtered => self.filtered().messages,
            ExportScope::Bookmarked => {
                let marks = self.read_bookmarks().clone();
                self.log
                    .snapshot()
                    .messages
                    .into_iter()
                    .filter(|m| marks.contains(&m.id))
                    .collect()
            }
        };
        let marks = self.read_bookmarks();
        messages
            .iter()
            .map(|m| MessageRecord::from_message(m, marks.contains(&m.id)))
            .collect()
    }

    /// Writes the messages in `scope` to `path`. Returns the record count.
    ///
    /// # Errors
    ///
    /// Returns a resource error if the file cannot be written.
    pub fn export_file(&self, path: &Path, format: ExportFormat, scope: ExportScope) -> NavResult<usize> {
        let records = self.export_records(scope);
        Ok(io::export_file(path, &records, format)?)
    }

    /// Expires pending requests against the current time.
    pub fn sweep_expired(&self) -> Vec<MessageId> {
        let mut tracker = self.lock_tracker();
        let expired = tracker.sweep(&self.clock.now());
        self.pending.store(tracker.pending_count(), Ordering::Relaxed);
        expired
    }

    /// Expires pending requests as of `now`.
    pub fn sweep_expired_at(&self, now: &ReceivedAt) -> Vec<MessageId> {
        let mut tracker = self.lock_tracker();
        let expired = tracker.sweep(now);
        self.pending.store(tracker.pending_count(), Ordering::Relaxed);
        expired
    }

    /// Point-in-time copy of the log.
    #[must_use]
    pub fn snapshot(&self) -> LogSnapshot {
        self.log.snapshot()
    }

    /// Looks up a message by id.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<Arc<ClassifiedMessage>> {
        self.log.get(id)
    }

    /// The correlated counterpart of a message, if it is still in the log.
    #[must_use]
    pub fn related(&self, id: MessageId) -> Option<Arc<ClassifiedMessage>> {
        self.log.get(id)?.matched_ref().and_then(|other| self.log.get(other))
    }

    /// The filter holder; changes apply to later evaluations.
    #[must_use]
    pub const fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    /// Messages passing the active filter.
    #[must_use]
    pub fn filtered(&self) -> FilteredView {
        self.filtered_with(&self.filter.current())
    }

    /// Messages passing `state`.
    #[must_use]
    pub fn filtered_with(&self, state: &FilterState) -> FilteredView {
        let snapshot = self.log.snapshot();
        let total = snapshot.len();
        let messages = snapshot.messages.into_iter().filter(|m| state.matches(m)).collect();
        FilteredView {
            generation: snapshot.generation,
            total,
            messages,
        }
    }

    /// Restricts the filter to a subtree, or clears the restriction.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::UnknownSubject`] if no observed subject
    /// passes through `path`.
    pub fn select_subtree(&self, path: Option<&str>) -> NavResult<()> {
        let Some(path) = path else {
            self.filter.set_tree(None);
            return Ok(());
        };

        let selection = {
            let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
            let node = tree.root().find(path).ok_or_else(|| ValidationError::UnknownSubject {
                path: path.to_string(),
            })?;
            TreeSelection::from_node(node)?
        };
        self.filter.set_tree(Some(selection));
        Ok(())
    }

    /// Read-only copy of the subject tree.
    #[must_use]
    pub fn subject_tree(&self) -> SubjectNode {
        self.tree.read().unwrap_or_else(PoisonError::into_inner).snapshot()
    }

    /// Rebuilds the subject tree from the messages currently in the log.
    ///
    /// Without retention eviction the result equals the incremental tree.
    pub fn rebuild_tree(&self) {
        let _writer = self.lock_tracker();
        let snapshot = self.log.snapshot();
        let rebuilt = SubjectTree::from_subjects(snapshot.messages.iter().map(|m| m.subject.as_str()));
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = rebuilt;
    }

    /// Toggles the bookmark on a message. Returns the new state, or `None`
    /// if the message is not in the log.
    pub fn toggle_bookmark(&self, id: MessageId) -> Option<bool> {
        self.log.get(id)?;
        let mut marks = self.bookmarks.write().unwrap_or_else(PoisonError::into_inner);
        if marks.remove(&id) {
            Some(false)
        } else {
            marks.insert(id);
            Some(true)
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_bookmarked(&self, id: MessageId) -> bool {
        self.read_bookmarks().contains(&id)
    }

    /// Bookmarked ids still in the log, in order.
    #[must_use]
    pub fn bookmarks(&self) -> Vec<MessageId> {
        let first = self.log.first_id();
        self.read_bookmarks()
            .iter()
            .copied()
            .filter(|id| first.is_some_and(|f| *id >= f))
            .collect()
    }

    /// First bookmark after `after` (or the first one), wrapping around.
    #[must_use]
    pub fn next_bookmark(&self, after: Option<MessageId>) -> Option<MessageId> {
        let marks = self.bookmarks();
        let next = after.and_then(|a| marks.iter().copied().find(|id| *id > a));
        next.or_else(|| marks.first().copied())
    }

    /// Last bookmark before `before` (or the last one), wrapping around.
    #[must_use]
    pub fn prev_bookmark(&self, before: Option<MessageId>) -> Option<MessageId> {
        let marks = self.bookmarks();
        let prev = before.and_then(|b| marks.iter().rev().copied().find(|id| *id < b));
        prev.or_else(|| marks.last().copied())
    }

    /// Stops accepting live messages; the idle sweep keeps running.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("ingestion paused");
    }

    /// Resumes ingestion.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("ingestion resumed");
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests awaiting a reply. Does not wait for ingestion.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Counters for the status line.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let view = self.filtered();
        SessionStatus {
            total: view.total,
            filtered: view.messages.len(),
            pending: self.pending_count(),
            bookmarks: self.bookmarks().len(),
            paused: self.is_paused(),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Drops every message, pending request, tree count and bookmark.
    /// The filter is kept.
    pub fn clear(&self) {
        let mut tracker = self.lock_tracker();
        tracker.reset();
        self.log.clear();
        self.tree.write().unwrap_or_else(PoisonError::into_inner).reset();
        self.bookmarks.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.pending.store(0, Ordering::Relaxed);
    }

    fn read_bookmarks(&self) -> std::sync::RwLockReadGuard<'_, BTreeSet<MessageId>> {
        self.bookmarks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tracker(&self) -> MutexGuard<'_, RpcTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
