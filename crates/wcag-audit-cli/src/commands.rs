//! CLI argument definitions using clap

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Audit a local HTML file against WCAG success criteria
#[derive(Parser, Debug, Clone)]
#[command(name = "wcag-audit")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// HTML file to audit
    pub file: PathBuf,

    /// Live URL of the page; enables rules that need a browser session
    #[arg(long)]
    pub url: Option<String>,

    /// Conformance level (A, AA, AAA)
    #[arg(short, long, default_value = "A")]
    pub level: String,

    /// WCAG version the remediation text is drawn from
    #[arg(long, default_value = "2.0")]
    pub wcag_version: String,

    /// Directory of fix documents to use instead of the bundled ones
    #[arg(long, value_name = "DIR")]
    pub fixes: Option<PathBuf>,

    /// YAML engine configuration
    #[arg(short, long, value_name = "YAML")]
    pub config: Option<PathBuf>,

    /// Abandon the audit after this many milliseconds
    #[arg(long, value_name = "N")]
    pub timeout_ms: Option<u64>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pub pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Timeout override, if any
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
