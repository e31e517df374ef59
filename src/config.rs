//! Session configuration.
//!
//! Plain value types with defaults. Loading them from a file is left to the
//! embedding application; every struct deserializes with missing fields
//! falling back to their defaults.

use serde::{Deserialize, Serialize};

use crate::filter::HideConfig;
use crate::ingest::IngestConfig;
use crate::tracker::TrackerConfig;

/// Configuration for a [`crate::session::Session`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Request/response correlation.
    pub tracker: TrackerConfig,
    /// Live ingestion queue.
    pub ingest: IngestConfig,
    /// Max messages kept in the log; the oldest are evicted. `None` = unbounded.
    pub retention: Option<usize>,
    /// Internal subjects hidden from filtered views.
    pub hide: HideConfig,
}

impl SessionConfig {
    /// Copy with every capacity clamped to at least 1.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.tracker.max_pending = self.tracker.max_pending.max(1);
        self.ingest.queue_capacity = self.ingest.queue_capacity.max(1);
        self.retention = self.retention.map(|r| r.max(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.tracker.timeout, Duration::from_secs(30));
        assert_eq!(cfg.tracker.max_pending, 10_000);
        assert_eq!(cfg.ingest.queue_capacity, 4096);
        assert_eq!(cfg.ingest.idle_sweep_interval, Duration::from_millis(250));
        assert!(cfg.retention.is_none());
        assert_eq!(cfg.hide, HideConfig::default());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: SessionConfig =
            serde_json::from_str(r#"{"retention": 100, "hide": {"inbox": true}}"#).unwrap();
        assert_eq!(cfg.retention, Some(100));
        assert!(cfg.hide.inbox);
        assert!(!cfg.hide.jetstream);
        assert_eq!(cfg.tracker, TrackerConfig::default());
    }

    #[test]
    fn normalized_clamps_capacities() {
        let mut cfg = SessionConfig::default();
        cfg.tracker.max_pending = 0;
        cfg.ingest.queue_capacity = 0;
        cfg.retention = Some(0);
        let cfg = cfg.normalized();
        assert_eq!(cfg.tracker.max_pending, 1);
        assert_eq!(cfg.ingest.queue_capacity, 1);
        assert_eq!(cfg.retention, Some(1));
    }
}
