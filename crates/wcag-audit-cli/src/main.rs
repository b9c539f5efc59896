//! wcag-audit: audit an HTML file against WCAG success criteria
//!
//! ## Usage
//!
//! ```bash
//! wcag-audit page.html                           # Level A, bundled fixes
//! wcag-audit page.html --level AA --pretty       # Pretty-printed AA report
//! wcag-audit page.html --url https://example.com # Include live-session rules
//! ```
//!
//! Exit status: 0 compliant, 2 non-compliant, 1 error.

use clap::Parser;
use std::process::ExitCode;
use wcag_audit_cli::{logging, Cli, CliResult};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e.chain());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> CliResult<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(wcag_audit_cli::audit(cli))?;
    println!("{}", wcag_audit_cli::render(&report, cli.pretty)?);
    Ok(wcag_audit_cli::exit_code(&report))
}
