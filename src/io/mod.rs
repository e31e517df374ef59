//! Import and export of captured traffic.
//!
//! Export formats: a JSON array (pretty or compact) and newline-delimited
//! JSON. Import detects the format from the content: a JSON array, NDJSON
//! (first non-empty line is a JSON object), or otherwise NATS CLI capture
//! text. Malformed records are skipped and counted; only I/O failures abort
//! an import or export.

mod capture;
mod json;
/// Canonical record shape.
pub mod record;

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use tracing::{info, warn};

use crate::error::{ResourceError, ValidationError};
use crate::message::RawMessage;

pub use capture::{JS_SEQUENCE_HEADER, JS_STREAM_HEADER};
pub use record::{MessageRecord, PayloadEncoding, RecordedHints};

/// Output format for exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    #[default]
    Json,
    /// Single-line JSON array.
    JsonCompact,
    /// One JSON object per line.
    Ndjson,
}

impl ExportFormat {
    /// Name as accepted on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::JsonCompact => "json-compact",
            Self::Ndjson => "ndjson",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-compact" | "compact" => Ok(Self::JsonCompact),
            "ndjson" | "jsonl" => Ok(Self::Ndjson),
            _ => Err(ValidationError::UnknownExportFormat { value: s.to_string() }),
        }
    }
}

/// Detected import format.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Json,
    Ndjson,
    Capture,
}

/// Messages read from an import, in file order.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub format: ImportFormat,
    pub messages: Vec<(RawMessage, RecordedHints)>,
    /// Records or blocks that could not be read.
    pub skipped: usize,
}

impl ImportOutcome {
    fn new(format: ImportFormat) -> Self {
        Self {
            format,
            messages: Vec::new(),
            skipped: 0,
        }
    }
}

/// Parses import text, detecting its format.
#[must_use]
pub fn parse_import(text: &str) -> ImportOutcome {
    json::parse_array(text)
        .or_else(|| json::parse_lines(text))
        .unwrap_or_else(|| capture::parse(text))
}

/// Renders records in the given format.
///
/// # Errors
///
/// Returns [`ResourceError::Serialize`] if a record cannot be serialized.
pub fn render(records: &[MessageRecord], format: ExportFormat) -> Result<String, ResourceError> {
    match format {
        ExportFormat::Json => json::render_array(records, true),
        ExportFormat::JsonCompact => json::render_array(records, false),
        ExportFormat::Ndjson => json::render_lines(records),
    }
}

/// Reads and parses an import file.
///
/// Invalid UTF-8 in the file is replaced rather than rejected.
///
/// # Errors
///
/// Returns [`ResourceError::Read`] if the file cannot be read.
pub fn load_file(path: &Path) -> Result<ImportOutcome, ResourceError> {
    let bytes = fs::read(path).map_err(|source| ResourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let outcome = parse_import(&String::from_utf8_lossy(&bytes));

    if outcome.skipped > 0 {
        warn!(path = %path.display(), skipped = outcome.skipped, "import skipped malformed records");
    }
    info!(
        path = %path.display(),
        format = ?outcome.format,
        records = outcome.messages.len(),
        "import loaded"
    );
    Ok(outcome)
}

/// Writes records to `path`, replacing any existing file.
///
/// Returns the number of records written.
///
/// # Errors
///
/// Returns [`ResourceError::Write`] if the file cannot be written, or
/// [`ResourceError::Serialize`] if rendering fails.
pub fn export_file(path: &Path, records: &[MessageRecord], format: ExportFormat) -> Result<usize, ResourceError> {
    let text = render(records, format)?;
    fs::write(path, text).map_err(|source| ResourceError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), %format, records = records.len(), "export written");
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_format_tokens() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("compact".parse::<ExportFormat>().unwrap(), ExportFormat::JsonCompact);
        assert_eq!("jsonl".parse::<ExportFormat>().unwrap(), ExportFormat::Ndjson);
        assert!(matches!(
            "csv".parse::<ExportFormat>(),
            Err(ValidationError::UnknownExportFormat { .. })
        ));
    }

    #[test]
    fn detection_order() {
        assert_eq!(parse_import("[]").format, ImportFormat::Json);
        assert_eq!(parse_import("{\"subject\":\"a\"}\n").format, ImportFormat::Ndjson);
        assert_eq!(parse_import("[#1] Received on \"a\"\nx\n").format, ImportFormat::Capture);
        assert_eq!(parse_import("").format, ImportFormat::Capture);
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ndjson");
        let records = vec![MessageRecord::new("a.b", "{}"), MessageRecord::new("c", "x")];
        assert_eq!(export_file(&path, &records, ExportFormat::Ndjson).unwrap(), 2);

        let outcome = load_file(&path).unwrap();
        assert_eq!(outcome.format, ImportFormat::Ndjson);
        let subjects: Vec<&str> = outcome.messages.iter().map(|(m, _)| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["a.b", "c"]);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ResourceError::Read { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn unwritable_path_reports_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/out.json");
        let err = export_file(&path, &[], ExportFormat::Json).unwrap_err();
        assert!(matches!(err, ResourceError::Write { .. }));
    }
}
