//! nnav-headless - filter and export captured NATS traffic without a UI
//!
//! # Usage
//!
//! ```bash
//! nnav-headless -i capture.json -e errors.json -f error
//! nnav-headless -i capture.txt -e requests.ndjson -t REQ --format ndjson
//! nnav-headless -i capture.json -e orders.json -S 'orders.>'
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nnav::headless::{self, HeadlessOptions};
use nnav::{ExportFormat, FilterSpec, SessionConfig};

/// Import a capture, apply filters, export the matching messages
#[derive(Parser, Debug)]
#[command(name = "nnav-headless")]
#[command(version, about, long_about = None)]
struct Args {
    /// File to import (JSON array, NDJSON or NATS CLI capture)
    #[arg(short, long = "import", value_name = "FILE")]
    input: PathBuf,

    /// File to export the matching messages to
    #[arg(short, long = "export", value_name = "FILE")]
    export: PathBuf,

    /// Text filter: space-separated terms, /regex/, prefix a term with ! to exclude
    #[arg(short, long, value_name = "TERM")]
    filter: Option<String>,

    /// Message type: PUB, REQ or RES
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    kind: Option<String>,

    /// Subject pattern (supports wildcards: *, >)
    #[arg(short = 'S', long, value_name = "PATTERN")]
    subject: Option<String>,

    /// Export format: json, json-compact or ndjson
    #[arg(long, default_value = "json")]
    format: ExportFormat,

    /// Seconds a request waits for its reply before it stays unmatched
    #[arg(long = "timeout", value_name = "SECS", default_value = "30")]
    timeout_secs: u64,

    /// Hide _INBOX. subjects
    #[arg(long)]
    hide_inbox: bool,

    /// Hide $JS. subjects
    #[arg(long)]
    hide_jetstream: bool,

    /// Hide messages replying to $JS.ACK.
    #[arg(long)]
    hide_acks: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = SessionConfig::default();
    config.tracker.timeout = Duration::from_secs(args.timeout_secs);
    config.hide.inbox = args.hide_inbox;
    config.hide.jetstream = args.hide_jetstream;
    config.hide.jetstream_ack = args.hide_acks;

    let options = HeadlessOptions {
        input: args.input,
        output: args.export,
        filter: FilterSpec {
            text: args.filter,
            kind: args.kind,
            subject: args.subject,
        },
        format: args.format,
        config,
    };

    let report = headless::run(&options).with_context(|| format!("headless run over {}", options.input.display()))?;

    println!("Loaded {} messages from {}", report.loaded, options.input.display());
    if report.skipped > 0 {
        println!("Skipped {} malformed records", report.skipped);
    }
    println!("After filtering: {} messages", report.matched);
    println!("Exported to {}", report.output.display());
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
