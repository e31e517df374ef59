//! Live ingestion worker.
//!
//! A producer (the live subscription) hands messages to an [`Ingestor`],
//! which queues them on a bounded channel. A dedicated worker thread drains
//! the queue into the [`Session`] in order; when the queue stays empty for
//! `idle_sweep_interval` the worker expires stale pending requests instead.
//!
//! Pausing is a flag on the session checked by the producer side: while
//! paused, new messages are discarded before they reach the queue, and
//! messages already queued still drain. The idle sweep keeps running, so
//! requests issued before a pause can expire during it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IngestError, NavError, NavResult};
use crate::message::RawMessage;
use crate::session::Session;

/// Ingestion queue configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Max queued messages before [`Ingestor::try_submit`] drops.
    pub queue_capacity: usize,
    /// Idle time after which the worker sweeps expired requests.
    pub idle_sweep_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            idle_sweep_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug)]
enum IngestMsg {
    Message(RawMessage),
    Flush(Sender<()>),
}

/// Outcome of handing a message to the ingestor.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    Queued,
    /// Discarded because ingestion is paused.
    Paused,
}

/// Bounded, ordered ingestion path into a session.
#[derive(Debug)]
pub struct Ingestor {
    session: Arc<Session>,
    capacity: usize,
    tx: Option<Sender<IngestMsg>>,
    dropped: AtomicU64,
    join: Option<JoinHandle<()>>,
}

impl Ingestor {
    /// Starts the worker thread for `session`, configured by its
    /// [`crate::config::SessionConfig::ingest`].
    ///
    /// # Errors
    ///
    /// Returns an internal error if the worker thread cannot be spawned.
    pub fn spawn(session: Arc<Session>) -> NavResult<Self> {
        let cfg = session.config().ingest.clone();
        let capacity = cfg.queue_capacity.max(1);
        let (tx, rx) = bounded::<IngestMsg>(capacity);

        let worker_session = Arc::clone(&session);
        let join = thread::Builder::new()
            .name("nnav-ingest".to_string())
            .spawn(move || worker_loop(&worker_session, &rx, cfg.idle_sweep_interval))
            .map_err(|e| NavError::internal(format!("failed to spawn ingest worker: {e}")))?;

        Ok(Self {
            session,
            capacity,
            tx: Some(tx),
            dropped: AtomicU64::new(0),
            join: Some(join),
        })
    }

    /// The session this ingestor feeds.
    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Queues a message, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Disconnected`] if the worker has stopped.
    pub fn submit(&self, raw: RawMessage) -> Result<Submitted, IngestError> {
        if self.discard_if_paused() {
            return Ok(Submitted::Paused);
        }
        self.sender()?
            .send(IngestMsg::Message(raw))
            .map_err(|_| IngestError::Disconnected)?;
        Ok(Submitted::Queued)
    }

    /// Queues a message without waiting. A full queue drops the message.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::QueueFull`] when the message was dropped, or
    /// [`IngestError::Disconnected`] if the worker has stopped.
    pub fn try_submit(&self, raw: RawMessage) -> Result<Submitted, IngestError> {
        if self.discard_if_paused() {
            return Ok(Submitted::Paused);
        }
        match self.sender()?.try_send(IngestMsg::Message(raw)) {
            Ok(()) => Ok(Submitted::Queued),
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                self.session.record_dropped();
                if total == 1 || total % 1000 == 0 {
                    warn!(dropped = total, capacity = self.capacity, "ingest queue full, dropping messages");
                }
                Err(IngestError::QueueFull {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(IngestError::Disconnected),
        }
    }

    /// Waits until every message queued before this call has been ingested.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Disconnected`] if the worker has stopped.
    pub fn flush(&self) -> Result<(), IngestError> {
        let (ack_tx, ack_rx) = bounded::<()>(1);
        self.sender()?
            .send(IngestMsg::Flush(ack_tx))
            .map_err(|_| IngestError::Disconnected)?;
        ack_rx.recv().map_err(|_| IngestError::Disconnected)
    }

    /// Messages dropped because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Pauses the session; see [`Session::pause`].
    pub fn pause(&self) {
        self.session.pause();
    }

    #[allow(missing_docs)]
    pub fn resume(&self) {
        self.session.resume();
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.session.is_paused()
    }

    /// Closes the queue, lets the worker drain it, and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn sender(&self) -> Result<&Sender<IngestMsg>, IngestError> {
        self.tx.as_ref().ok_or(IngestError::Disconnected)
    }

    fn discard_if_paused(&self) -> bool {
        if self.session.is_paused() {
            self.session.record_dropped();
            true
        } else {
            false
        }
    }

    fn stop(&mut self) {
        // The worker exits once the last sender is gone and the queue is empty.
        drop(self.tx.take());
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                warn!("ingest worker panicked");
            }
        }
    }
}

impl Drop for Ingestor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(session: &Session, rx: &Receiver<IngestMsg>, idle_sweep_interval: Duration) {
    debug!("ingest worker started");
    loop {
        select! {
            recv(rx) -> msg => match msg {
                Ok(IngestMsg::Message(raw)) => {
                    session.ingest(raw);
                }
                Ok(IngestMsg::Flush(ack)) => {
                    let _ = ack.send(());
                }
                Err(_) => break,
            },
            default(idle_sweep_interval) => {
                session.sweep_expired();
            }
        }
    }
    debug!("ingest worker stopped");
}
