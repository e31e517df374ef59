//! NATS CLI capture text.
//!
//! ```text
//! [#1] Received on "svc.add" with reply "_INBOX.abc"
//! Nats-Msg-Id: 42
//!
//! {"a":1}
//!
//! [#2] Received JetStream message: consumer: ORDERS > c1 / subject: orders.created / delivered: 1
//! nil body
//! ```
//!
//! A block runs from its `Received` line to the next one. Header lines come
//! first, up to a blank line or the first line that is not `Key: Value`.
//! Blocks whose subject cannot be read are skipped. JetStream blocks keep
//! their stream name and stream sequence as `js_stream` and `js_sequence`
//! headers.

use tracing::warn;

use crate::message::{MessageSource, RawMessage};

use super::record::RecordedHints;
use super::{ImportFormat, ImportOutcome};

const NIL_BODY: &str = "nil body";

fn is_block_start(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("[#") && line.contains("] Received")
}

fn quoted_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let start = line.find(marker)? + marker.len();
    let rest = &line[start..];
    let end = rest.find('"')?;
    Some(&rest[..end]).filter(|s| !s.is_empty())
}

/// Header carrying the JetStream stream name of a captured delivery.
pub const JS_STREAM_HEADER: &str = "js_stream";
/// Header carrying the JetStream stream sequence of a captured delivery.
pub const JS_SEQUENCE_HEADER: &str = "js_sequence";

/// Value of a `key: value` field in a JetStream `Received` line.
fn field_after<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let start = line.find(marker)? + marker.len();
    let rest = &line[start..];
    let end = rest.find(|c: char| c.is_whitespace() || c == '/').unwrap_or(rest.len());
    Some(&rest[..end]).filter(|s| !s.is_empty())
}

/// Subject and reply address from a `Received` line.
fn parse_received(line: &str) -> (Option<&str>, Option<&str>) {
    if line.contains("Received on ") {
        return (
            quoted_after(line, "Received on \""),
            quoted_after(line, "with reply \""),
        );
    }
    if line.contains("Received JetStream message:") {
        return (field_after(line, "subject: "), None);
    }
    (None, None)
}

/// Stream name and stream sequence of a JetStream `Received` line.
fn jetstream_origin(line: &str) -> Vec<(&'static str, &str)> {
    if !line.contains("Received JetStream message:") {
        return Vec::new();
    }
    let mut origin = Vec::new();
    if let Some(stream) = field_after(line, "consumer: ") {
        origin.push((JS_STREAM_HEADER, stream));
    }
    if let Some(seq) = field_after(line, "stream seq: ").filter(|v| v.bytes().all(|b| b.is_ascii_digit())) {
        origin.push((JS_SEQUENCE_HEADER, seq));
    }
    origin
}

fn parse_header(line: &str) -> Option<(&str, &str)> {
    if line.starts_with('{') || line.starts_with('[') {
        return None;
    }
    line.split_once(": ")
}

/// Parses capture text. Never fails; unreadable blocks are counted as skipped.
pub(crate) fn parse(text: &str) -> ImportOutcome {
    let mut outcome = ImportOutcome::new(ImportFormat::Capture);
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;
    let mut block = 0;

    while i < lines.len() {
        if !is_block_start(lines[i]) {
            i += 1;
            continue;
        }

        let received = lines[i].trim();
        let (subject, reply_to) = parse_received(received);
        let index = block;
        block += 1;
        i += 1;

        let mut raw = RawMessage::new(subject.unwrap_or_default(), Vec::new()).with_source(MessageSource::Imported);
        raw.reply_to = reply_to.map(str::to_string);
        for (key, value) in jetstream_origin(received) {
            raw.headers.insert(key.to_string(), value.to_string());
        }

        while i < lines.len() && !lines[i].trim().is_empty() && !is_block_start(lines[i]) {
            let Some((key, value)) = parse_header(lines[i].trim()) else {
                break;
            };
            raw.headers.insert(key.to_string(), value.to_string());
            i += 1;
        }

        let body_start = i;
        while i < lines.len() && !is_block_start(lines[i]) {
            i += 1;
        }
        let body = lines[body_start..i].join("\n");
        let body = body.trim();
        if body != NIL_BODY {
            raw.payload = body.as_bytes().to_vec();
        }

        if subject.is_none() {
            warn!(index, "skipping capture block without a subject");
            outcome.skipped += 1;
            continue;
        }
        outcome.messages.push((raw, RecordedHints::default()));
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURE: &str = r#"
[#1] Received on "svc.add" with reply "_INBOX.abc"
Nats-Msg-Id: 42
Content-Type: application/json

{"a":1,
 "b":2}

[#2] Received on "_INBOX.abc"
{"sum":3}
[#3] Received JetStream message: consumer: ORDERS > c1 / subject: orders.created / delivered: 1 / stream seq: 5
nil body
[#4] Received on ""
garbage
"#;

    #[test]
    fn parses_blocks() {
        let outcome = parse(CAPTURE);
        assert_eq!(outcome.format, ImportFormat::Capture);
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.skipped, 1);

        let (req, _) = &outcome.messages[0];
        assert_eq!(req.subject, "svc.add");
        assert_eq!(req.reply_to.as_deref(), Some("_INBOX.abc"));
        assert_eq!(req.headers.get("Nats-Msg-Id").map(String::as_str), Some("42"));
        assert_eq!(req.headers.len(), 2);
        assert_eq!(req.payload, b"{\"a\":1,\n \"b\":2}");
        assert_eq!(req.source, MessageSource::Imported);

        let (res, _) = &outcome.messages[1];
        assert_eq!(res.subject, "_INBOX.abc");
        assert!(res.headers.is_empty());
        assert_eq!(res.payload, b"{\"sum\":3}");

        let (js, _) = &outcome.messages[2];
        assert_eq!(js.subject, "orders.created");
        assert!(js.payload.is_empty());
        assert_eq!(js.headers.get(JS_STREAM_HEADER).map(String::as_str), Some("ORDERS"));
        assert_eq!(js.headers.get(JS_SEQUENCE_HEADER).map(String::as_str), Some("5"));
    }

    #[test]
    fn jetstream_origin_keeps_stream_and_sequence() {
        let line = "[#3] Received JetStream message: consumer: ORDERS > c1 / subject: orders.created / delivered: 1 / stream seq: 812 / consumer seq: 4";
        assert_eq!(jetstream_origin(line), vec![(JS_STREAM_HEADER, "ORDERS"), (JS_SEQUENCE_HEADER, "812")]);

        let partial = "[#4] Received JetStream message: subject: orders.created / stream seq: n/a";
        assert!(jetstream_origin(partial).is_empty());

        assert!(jetstream_origin("[#5] Received on \"a.b\"").is_empty());
    }

    #[test]
    fn captured_headers_override_jetstream_origin() {
        let text = "[#1] Received JetStream message: consumer: ORDERS > c1 / subject: orders.created / stream seq: 7\njs_stream: MIRROR\n\n{}\n";
        let outcome = parse(text);
        let (js, _) = &outcome.messages[0];
        assert_eq!(js.headers.get(JS_STREAM_HEADER).map(String::as_str), Some("MIRROR"));
        assert_eq!(js.headers.get(JS_SEQUENCE_HEADER).map(String::as_str), Some("7"));
        assert_eq!(js.payload, b"{}");
    }

    #[test]
    fn text_without_blocks_yields_nothing() {
        let outcome = parse("hello\nworld\n");
        assert!(outcome.messages.is_empty());
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn received_line_variants() {
        assert_eq!(
            parse_received("[#9] Received on \"a.b\" with reply \"r.1\""),
            (Some("a.b"), Some("r.1"))
        );
        assert_eq!(parse_received("[#9] Received on \"a.b\""), (Some("a.b"), None));
        assert_eq!(parse_received("[#9] Received something else"), (None, None));
    }
}
