//! # nnav - NATS Navigator core
//!
//! nnav watches a publish/subscribe message stream and reconstructs what the
//! publishers never state explicitly: which messages are requests, which are
//! responses, which response answers which request, and how long each round
//! trip took. The same logic runs over live traffic and over captured files.
//!
//! ## Core Concepts
//!
//! - **Subject pattern**: dot-delimited subjects with `*` (one token) and `>`
//!   (one or more trailing tokens) wildcards
//! - **RPC tracker**: classifies messages as `PUB`/`REQ`/`RES` and correlates
//!   replies with their requests by reply address
//! - **Subject tree**: hierarchical per-token message counts
//! - **Filter state**: text, `/regex/`, `!exclude`, type, subject pattern and
//!   subtree constraints, ANDed
//! - **Session**: the owned state tying log, tracker, tree and filter together
//!
//! ## Usage
//!
//! ```rust
//! use nnav::{MessageKind, RawMessage, Session};
//!
//! let session = Session::default();
//! let req = session.ingest(RawMessage::new("svc.add", "{\"a\":1}").with_reply_to("_INBOX.1"));
//! let res = session.ingest(RawMessage::new("_INBOX.1", "{\"sum\":1}"));
//!
//! assert_eq!(session.get(req).unwrap().kind, MessageKind::Request);
//! assert_eq!(session.get(res).unwrap().matched_ref(), Some(req));
//!
//! session.filter().set_text("/add/").unwrap();
//! assert_eq!(session.filtered().messages.len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core model and matching
pub mod error;
pub mod message;
pub mod subject;
pub mod tracker;
pub mod tree;

// Filtering
pub mod filter;

// Session state and ingestion
pub mod config;
pub mod ingest;
pub mod log;
pub mod session;

// Import/export and batch mode
pub mod headless;
pub mod io;

pub use config::SessionConfig;
pub use error::{IngestError, NavError, NavResult, PatternError, ResourceError, ValidationError};
pub use filter::{FilterSpec, FilterState, HideConfig, MessageFilter, TreeSelection};
pub use headless::{HeadlessOptions, HeadlessReport};
pub use ingest::{IngestConfig, Ingestor, Submitted};
pub use io::{ExportFormat, ImportFormat, MessageRecord};
pub use log::{LogSnapshot, MessageLog};
pub use message::{
    ClassifiedMessage, Correlation, Direction, MessageId, MessageKind, MessageSource, RawMessage, ReceivedAt,
};
pub use session::{ExportScope, FilteredView, ImportSummary, Session, SessionStatus};
pub use subject::{matches, overlaps, SubjectPattern};
pub use tracker::{Classification, RpcTracker, TrackerConfig};
pub use tree::{SubjectNode, SubjectTree};
