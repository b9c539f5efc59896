//! One audit from the command line: load, run, render.

use crate::commands::Cli;
use crate::error::{CliError, CliResult};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use wcag_audit::{
    AggregateReport, AuditConfig, AuditRequest, Auditor, FixCatalog, JsonFixSource, ParsedPage,
};

/// Exit status for a completed audit with issues
pub const EXIT_NON_COMPLIANT: u8 = 2;

/// Engine configuration from `--config`, with `--timeout-ms` applied
pub fn load_config(cli: &Cli) -> CliResult<AuditConfig> {
    let mut config = match &cli.config {
        Some(path) => AuditConfig::load(path)?,
        None => AuditConfig::default(),
    };
    if let Some(timeout) = cli.timeout() {
        if timeout.is_zero() {
            return Err(CliError::invalid_argument("--timeout-ms must be positive"));
        }
        config = config.with_default_timeout(timeout);
    }
    config
        .validate()
        .map_err(|err| CliError::config(err.to_string()))?;
    Ok(config)
}

fn build_auditor(cli: &Cli, config: AuditConfig) -> CliResult<Auditor> {
    let browser = config.browser.clone();
    let mut auditor = Auditor::new(config);
    if let Some(dir) = &cli.fixes {
        auditor = auditor.with_fix_catalog(Arc::new(FixCatalog::new(Arc::new(JsonFixSource::new(dir)))));
    }
    if cli.url.is_some() {
        #[cfg(feature = "browser")]
        {
            auditor = auditor.with_session_factory(Arc::new(wcag_audit::CdpSessionFactory::new(browser)));
        }
        #[cfg(not(feature = "browser"))]
        {
            let _ = browser;
            return Err(CliError::invalid_argument(
                "--url needs a live browser; rebuild with the `browser` feature",
            ));
        }
    }
    Ok(auditor)
}

/// Audit the file named on the command line
pub async fn audit(cli: &Cli) -> CliResult<AggregateReport> {
    let config = load_config(cli)?;
    let html = tokio::fs::read_to_string(&cli.file)
        .await
        .map_err(|source| CliError::Input {
            path: cli.file.clone(),
            source,
        })?;
    let auditor = build_auditor(cli, config)?;

    let page = ParsedPage::parse(&html);
    let mut request = AuditRequest::new(page, cli.wcag_version.as_str(), cli.level.as_str());
    if let Some(url) = &cli.url {
        request = request.with_url(url.as_str());
    }

    info!(file = %cli.file.display(), "auditing");
    Ok(auditor.audit(request).await?)
}

/// Report as JSON text
pub fn render(report: &AggregateReport, pretty: bool) -> CliResult<String> {
    let text = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    Ok(text)
}

/// 0 when compliant, 2 when issues were found
#[must_use]
pub const fn exit_status(report: &AggregateReport) -> u8 {
    if report.compliant {
        0
    } else {
        EXIT_NON_COMPLIANT
    }
}

/// Process exit code for a completed audit
#[must_use]
pub fn exit_code(report: &AggregateReport) -> ExitCode {
    ExitCode::from(exit_status(report))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("wcag-audit").chain(args.iter().copied())).unwrap()
    }

    fn write(dir: &TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    mod config_tests {
        use super::*;

        #[test]
        fn test_timeout_override() {
            let config = load_config(&cli(&["page.html", "--timeout-ms", "1500"])).unwrap();
            assert_eq!(config.default_timeout_ms, 1500);
        }

        #[test]
        fn test_zero_timeout_rejected() {
            let err = load_config(&cli(&["page.html", "--timeout-ms", "0"])).unwrap_err();
            assert!(matches!(err, CliError::InvalidArgument { .. }));
        }

        #[test]
        fn test_yaml_config_is_validated() {
            let dir = TempDir::new().unwrap();
            let path = write(&dir, "audit.yaml", "worker_pool_size: 0\n");
            let err = load_config(&cli(&["page.html", "--config", &path])).unwrap_err();
            assert!(matches!(err, CliError::Config { .. } | CliError::Engine(_)));
        }
    }

    mod audit_tests {
        use super::*;

        #[tokio::test]
        async fn test_audit_file() {
            let dir = TempDir::new().unwrap();
            let page = write(&dir, "page.html", r#"<img src="logo.png">"#);
            let report = audit(&cli(&[&page])).await.unwrap();
            assert_eq!(report.total_issue_count, 1);
            assert!(!report.compliant);
            assert_eq!(exit_status(&report), EXIT_NON_COMPLIANT);
        }

        #[tokio::test]
        async fn test_missing_file() {
            let err = audit(&cli(&["/nonexistent/page.html"])).await.unwrap_err();
            assert!(matches!(err, CliError::Input { .. }));
        }

        #[tokio::test]
        async fn test_bad_level_is_audit_error() {
            let dir = TempDir::new().unwrap();
            let page = write(&dir, "page.html", "<p>x</p>");
            let err = audit(&cli(&[&page, "--level", "B"])).await.unwrap_err();
            assert!(matches!(err, CliError::Audit(_)));
        }

        #[tokio::test]
        async fn test_custom_fix_directory() {
            let dir = TempDir::new().unwrap();
            let page = write(&dir, "page.html", r#"<img src="logo.png">"#);
            let fixes = dir.path().join("fixes");
            fs::create_dir(&fixes).unwrap();
            fs::write(
                fixes.join(wcag_audit::fix_file_name("2.0", wcag_audit::ConformanceLevel::A)),
                r#"{"wcagVersion":"2.0","level":"A","data":{"Missing alt attribute":{"title":"Missing alt attribute","fix":"Describe the logo."}}}"#,
            )
            .unwrap();

            let report = audit(&cli(&[&page, "--fixes", &fixes.to_string_lossy()])).await.unwrap();
            let issue = report.issues().next().unwrap();
            assert_eq!(issue.remediation, "Describe the logo.");
        }
    }

    #[tokio::test]
    async fn test_render_compact_and_pretty() {
        let dir = TempDir::new().unwrap();
        let page = write(&dir, "page.html", "<button>Go</button>");
        let report = audit(&cli(&[&page])).await.unwrap();
        assert!(report.compliant);

        let compact = render(&report, false).unwrap();
        assert!(!compact.contains('\n'));
        assert!(compact.contains("\"totalIssueCount\":0"));
        assert!(render(&report, true).unwrap().contains('\n'));
        assert_eq!(exit_status(&report), 0);
    }
}
