//! JSON array and newline-delimited JSON.

use serde_json::Value;
use tracing::warn;

use crate::error::ResourceError;

use super::record::MessageRecord;
use super::{ImportFormat, ImportOutcome};

/// Renders records as one JSON array.
pub(crate) fn render_array(records: &[MessageRecord], pretty: bool) -> Result<String, ResourceError> {
    let out = if pretty {
        serde_json::to_string_pretty(records)
    } else {
        serde_json::to_string(records)
    };
    out.map_err(|e| ResourceError::Serialize {
        message: e.to_string(),
    })
}

/// Renders records one per line, with a trailing newline.
pub(crate) fn render_lines(records: &[MessageRecord]) -> Result<String, ResourceError> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record).map_err(|e| ResourceError::Serialize {
            message: e.to_string(),
        })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Parses a JSON array document. `None` if `text` is not a JSON array.
pub(crate) fn parse_array(text: &str) -> Option<ImportOutcome> {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) else {
        return None;
    };

    let mut outcome = ImportOutcome::new(ImportFormat::Json);
    for (index, item) in items.into_iter().enumerate() {
        outcome.push_value(index, item);
    }
    Some(outcome)
}

/// Parses newline-delimited JSON. `None` unless the first non-empty line is
/// a JSON object; later lines that are not are skipped.
pub(crate) fn parse_lines(text: &str) -> Option<ImportOutcome> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
    let first = lines.peek()?;
    if !matches!(serde_json::from_str::<Value>(first), Ok(Value::Object(_))) {
        return None;
    }

    let mut outcome = ImportOutcome::new(ImportFormat::Ndjson);
    for (index, line) in lines.enumerate() {
        match serde_json::from_str::<Value>(line) {
            Ok(value) => outcome.push_value(index, value),
            Err(e) => {
                warn!(index, error = %e, "skipping malformed ndjson line");
                outcome.skipped += 1;
            }
        }
    }
    Some(outcome)
}

impl ImportOutcome {
    fn push_value(&mut self, index: usize, value: Value) {
        if !value.is_object() {
            warn!(index, "skipping import record that is not an object");
            self.skipped += 1;
            return;
        }

        let parsed = serde_json::from_value::<MessageRecord>(value)
            .map_err(|e| e.to_string())
            .and_then(|record| record.into_parts(index).map_err(|e| e.to_string()));

        match parsed {
            Ok(message) => self.messages.push(message),
            Err(reason) => {
                warn!(index, %reason, "skipping malformed import record");
                self.skipped += 1;
            }
        }
    }
}
