//! wcag-audit: concurrent WCAG rule evaluation for parsed web pages.
//!
//! An audit takes one parsed page, the WCAG version and level to check
//! against, and optionally the live URL of the page. Rules that only read
//! markup run in parallel on a bounded pool; rules that need a real
//! browser share one session, one at a time. Their outcomes are merged
//! into a single report with remediation text attached.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────┐
//! │ AuditRequest │──►│ RuleCatalog  │──►│ ConcurrentRule       │
//! │ page, level, │   │ A ⊆ AA ⊆ AAA │   │ Executor             │
//! │ version, url │   └──────────────┘   │  DOM rules: pool     │
//! └──────────────┘                      │  session rules:      │
//!                                       │  SessionResource     │
//!                                       └──────────┬───────────┘
//!                   ┌──────────────┐    ┌──────────▼───────────┐
//!                   │ FixCatalog   │───►│ ReportAggregator     │──► AggregateReport
//!                   └──────────────┘    └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use wcag_audit::{AuditRequest, Auditor, ParsedPage};
//!
//! # async fn run() -> Result<(), wcag_audit::ServiceError> {
//! let page = ParsedPage::parse(r#"<img src="logo.png">"#);
//! let report = Auditor::default()
//!     .audit(AuditRequest::new(page, "2.0", "A"))
//!     .await?;
//! assert!(!report.compliant);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::too_many_lines)
)]

mod aggregate;
mod auditor;
mod browser;
mod catalog;
mod config;
mod context;
mod executor;
mod fixes;
mod level;
mod page;
mod result;
mod rule;

/// Built-in rule families
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
pub mod rules;

/// Browser session abstraction and test doubles
pub mod session;

pub use aggregate::{AggregateReport, ReportAggregator, RuleReport};
pub use auditor::{validate_url, AuditRequest, Auditor};
pub use browser::BrowserConfig;
#[cfg(feature = "browser")]
pub use browser::{CdpSession, CdpSessionFactory};
pub use catalog::{RuleCatalog, RuleSet};
pub use config::{AuditConfig, RetryConfig};
pub use context::{AuditContext, ContextSnapshot};
pub use executor::{ConcurrentRuleExecutor, ExecutedRule, ExecutionInput};
pub use fixes::{
    fix_file_name, normalize_title, BundledFixSource, FixCatalog, FixDocument, FixEntry,
    FixLookup, FixSource, FixTable, JsonFixSource, StaticFixSource,
};
pub use level::{validate_version, ConformanceLevel};
pub use page::{ElementId, ElementNode, ParsedPage};
pub use result::{AuditError, AuditResult, ServiceError};
pub use rule::{
    require_session, DomCheck, DomRule, IssueRecord, RuleDescriptor, RuleEvaluator, RuleInfo,
    RuleOutcome,
};
pub use session::{BrowserSession, SessionFactory, SessionHandle, SessionResource};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        AggregateReport, AuditConfig, AuditError, AuditRequest, AuditResult, Auditor,
        BrowserSession, ConformanceLevel, FixCatalog, IssueRecord, ParsedPage, RuleDescriptor,
        RuleEvaluator, RuleOutcome, ServiceError, SessionFactory,
    };
}
