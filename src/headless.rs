//! Headless batch mode: import a capture, filter it, export the result.
//!
//! The same filter syntax as the interactive filter applies, and imported
//! messages go through the same session ingestion path, so classification
//! and correlation match what an interactive session would show.

use std::path::PathBuf;

use tracing::info;

use crate::config::SessionConfig;
use crate::error::NavResult;
use crate::filter::FilterSpec;
use crate::io::{ExportFormat, ImportFormat};
use crate::session::{ExportScope, Session};

/// Inputs of a headless run.
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub input: PathBuf,
    pub output: PathBuf,
    pub filter: FilterSpec,
    pub format: ExportFormat,
    pub config: SessionConfig,
}

impl HeadlessOptions {
    /// Options with no filter, default format and default configuration.
    #[must_use]
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            filter: FilterSpec::default(),
            format: ExportFormat::default(),
            config: SessionConfig::default(),
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn with_format(mut self, format: ExportFormat) -> Self {
        self.format = format;
        self
    }
}

/// Counts from a headless run.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessReport {
    pub format: ImportFormat,
    /// Messages read from the input.
    pub loaded: usize,
    /// Input records or blocks that could not be read.
    pub skipped: usize,
    /// Messages that passed the filter and were exported.
    pub matched: usize,
    pub output: PathBuf,
}

/// Runs the import, filter, export pipeline.
///
/// The filter is validated before the input is read.
///
/// # Errors
///
/// Returns a validation error for bad filter syntax, or a resource error if
/// the input cannot be read or the output cannot be written.
pub fn run(options: &HeadlessOptions) -> NavResult<HeadlessReport> {
    let state = options.filter.build(options.config.hide)?;

    let session = Session::new(options.config.clone());
    let summary = session.import_file(&options.input)?;
    session.filter().replace(state);

    let matched = session.export_file(&options.output, options.format, ExportScope::Filtered)?;

    info!(
        input = %options.input.display(),
        output = %options.output.display(),
        loaded = summary.ids.len(),
        matched,
        "headless run complete"
    );

    Ok(HeadlessReport {
        format: summary.format,
        loaded: summary.ids.len(),
        skipped: summary.skipped,
        matched,
        output: options.output.clone(),
    })
}
