use std::fs;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;

use nnav::session::ExportScope;
use nnav::{ExportFormat, FilterState, MessageKind, RawMessage, ReceivedAt, Session, SessionConfig, TrackerConfig};

fn at(base: DateTime<Utc>, ms: i64) -> ReceivedAt {
    ReceivedAt::wall(base + chrono::Duration::milliseconds(ms))
}

fn stamp(base: DateTime<Utc>, ms: i64) -> String {
    (base + chrono::Duration::milliseconds(ms)).to_rfc3339()
}

#[test]
fn imported_scenario_filters_by_type_subject_and_regex() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.json");
    let base = Utc::now();
    let doc = json!([
        {"timestamp": stamp(base, 0), "type": "REQ", "subject": "svc.add", "reply_to": "_INBOX.1", "payload": "{\"a\":1,\"b\":2}"},
        {"timestamp": stamp(base, 5), "type": "RES", "subject": "_INBOX.1", "payload": "{\"sum\":3}"},
        {"timestamp": stamp(base, 6), "type": "PUB", "subject": "svc.log", "payload": "request handled"}
    ]);
    fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();

    let session = Session::default();
    let summary = session.import_file(&path).unwrap();
    assert_eq!(summary.ids.len(), 3);
    assert_eq!(summary.skipped, 0);

    let requests = session.filtered_with(&FilterState::new().with_kind(Some(MessageKind::Request)));
    assert_eq!(requests.messages.len(), 1);
    assert_eq!(requests.messages[0].subject, "svc.add");
    assert_eq!(requests.messages[0].latency(), Some(Duration::from_millis(5)));

    // The reply is kept in view through the subject of its request.
    let under_svc = session.filtered_with(&FilterState::new().with_subject_pattern("svc.>").unwrap());
    let subjects: Vec<&str> = under_svc.messages.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["svc.add", "_INBOX.1", "svc.log"]);

    let everything = session.filtered_with(&FilterState::new().with_subject_pattern(">").unwrap());
    assert_eq!(everything.messages.len(), 3);

    let add = session.filtered_with(&FilterState::new().with_text("/add/").unwrap());
    assert_eq!(add.messages.len(), 1);
    assert_eq!(add.messages[0].id, summary.ids[0]);
}

#[test]
fn request_and_reply_point_at_each_other() {
    let base = Utc::now();
    let session = Session::default();
    let req = session.ingest(
        RawMessage::new("svc.req", "{}")
            .with_reply_to("_INBOX.xyz")
            .with_received_at(at(base, 0)),
    );
    let res = session.ingest(RawMessage::new("_INBOX.xyz", "{}").with_received_at(at(base, 12)));
    let again = session.ingest(RawMessage::new("_INBOX.xyz", "{}").with_received_at(at(base, 13)));

    let req = session.get(req).unwrap();
    let res = session.get(res).unwrap();
    assert_eq!(req.matched_ref(), Some(res.id));
    assert_eq!(res.matched_ref(), Some(req.id));
    assert_eq!(req.latency(), res.latency());
    assert_eq!(res.latency(), Some(Duration::from_millis(12)));
    assert_eq!(session.get(again).unwrap().kind, MessageKind::Publish);
}

#[test]
fn live_latency_uses_monotonic_clock() {
    let session = Session::default();
    let req = session.ingest(RawMessage::new("svc.req", "").with_reply_to("_INBOX.live"));
    std::thread::sleep(Duration::from_millis(5));
    let res = session.ingest(RawMessage::new("_INBOX.live", ""));

    let latency = session.get(res).unwrap().latency().unwrap();
    assert!(latency >= Duration::from_millis(5));
    assert!(session.get(req).unwrap().received_at.monotonic.is_some());
}

#[test]
fn unanswered_request_expires() {
    let base = Utc::now();
    let session = Session::new(SessionConfig {
        tracker: TrackerConfig {
            timeout: Duration::from_secs(1),
            ..TrackerConfig::default()
        },
        ..SessionConfig::default()
    });
    let req = session.ingest(
        RawMessage::new("svc.slow", "")
            .with_reply_to("_INBOX.slow")
            .with_received_at(at(base, 0)),
    );
    assert_eq!(session.pending_count(), 1);

    // Unrelated traffic after the deadline runs the lazy sweep.
    session.ingest(RawMessage::new("svc.log", "").with_received_at(at(base, 1_001)));
    assert_eq!(session.pending_count(), 0);

    let late = session.ingest(RawMessage::new("_INBOX.slow", "").with_received_at(at(base, 1_500)));
    assert_eq!(session.get(late).unwrap().kind, MessageKind::Publish);
    assert!(session.get(req).unwrap().latency().is_none());
}

#[test]
fn shared_inbox_replies_prefer_longest_address() {
    let base = Utc::now();
    let session = Session::default();
    let broad = session.ingest(
        RawMessage::new("svc.a", "")
            .with_reply_to("_INBOX.client")
            .with_received_at(at(base, 0)),
    );
    let narrow = session.ingest(
        RawMessage::new("svc.b", "")
            .with_reply_to("_INBOX.client.req1")
            .with_received_at(at(base, 1)),
    );
    let reply = session.ingest(RawMessage::new("_INBOX.client.req1.part", "").with_received_at(at(base, 3)));

    assert_eq!(session.get(reply).unwrap().matched_ref(), Some(narrow));
    assert_eq!(session.pending_count(), 1);

    let other = session.ingest(RawMessage::new("_INBOX.client.other", "").with_received_at(at(base, 4)));
    assert_eq!(session.get(other).unwrap().matched_ref(), Some(broad));
}

#[test]
fn export_then_import_reproduces_correlation() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utc::now();
    let original = Session::default();
    original.replay([
        RawMessage::new("svc.add", "{\"a\":1}")
            .with_reply_to("_INBOX.1")
            .with_received_at(at(base, 0)),
        RawMessage::new("orders.created", "{}").with_received_at(at(base, 1)),
        RawMessage::new("_INBOX.1", "{\"sum\":1}").with_received_at(at(base, 3)),
        RawMessage::new("svc.bin", vec![0xde, 0xad, 0xbe, 0xef]).with_received_at(at(base, 4)),
        RawMessage::new("svc.sub", "")
            .with_reply_to("_INBOX.2")
            .with_received_at(at(base, 5)),
    ]);
    let first = original.snapshot().messages[0].id;
    original.toggle_bookmark(first);

    for format in [ExportFormat::Json, ExportFormat::JsonCompact, ExportFormat::Ndjson] {
        let path = dir.path().join(format!("export.{format}"));
        assert_eq!(original.export_file(&path, format, ExportScope::All).unwrap(), 5);

        let restored = Session::default();
        restored.import_file(&path).unwrap();

        let before = original.snapshot();
        let after = restored.snapshot();
        assert_eq!(before.len(), after.len());
        for (a, b) in before.messages.iter().zip(after.messages.iter()) {
            assert_eq!(a.subject, b.subject, "{format}");
            assert_eq!(a.payload, b.payload, "{format}");
            assert_eq!(a.kind, b.kind, "{format}");
            assert_eq!(a.latency(), b.latency(), "{format}");
            assert_eq!(a.received_at.wall, b.received_at.wall, "{format}");
            assert_eq!(
                a.correlation.as_ref().map(|c| c.correlation_id),
                b.correlation.as_ref().map(|c| c.correlation_id),
                "{format}"
            );
            assert_eq!(a.matched_ref(), b.matched_ref(), "{format}");
            assert_eq!(original.is_bookmarked(a.id), restored.is_bookmarked(b.id), "{format}");
        }
    }
}

#[test]
fn partial_export_keeps_recorded_correlation() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utc::now();
    let original = Session::default();
    original.replay([
        RawMessage::new("svc.add", "")
            .with_reply_to("_INBOX.1")
            .with_received_at(at(base, 0)),
        RawMessage::new("_INBOX.1", "").with_received_at(at(base, 8)),
    ]);
    original
        .filter()
        .set_kind(Some(MessageKind::Response));
    let path = dir.path().join("responses.json");
    assert_eq!(
        original
            .export_file(&path, ExportFormat::Json, ExportScope::Filtered)
            .unwrap(),
        1
    );

    let restored = Session::default();
    let summary = restored.import_file(&path).unwrap();
    let msg = restored.get(summary.ids[0]).unwrap();
    assert_eq!(msg.kind, MessageKind::Response);
    assert_eq!(msg.latency(), Some(Duration::from_millis(8)));
    assert_eq!(msg.correlation.as_ref().unwrap().request_subject, "svc.add");
    assert_eq!(msg.matched_ref(), None);
}

#[test]
fn text_filter_combines_include_and_exclude_terms() {
    let session = Session::default();
    let add = session.ingest(RawMessage::new("svc.add", "{}"));
    session.ingest(RawMessage::new("svc.heartbeat", "beat"));
    session.ingest(RawMessage::new("orders.created", "{}"));

    session.filter().set_text("svc !heartbeat").unwrap();
    let view = session.filtered();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].id, add);
}
