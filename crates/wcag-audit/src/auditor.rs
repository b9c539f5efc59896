//! The audit entry point.
//!
//! [`Auditor::audit`] validates a request, plans the rule set for the
//! requested level, runs it and merges the outcomes. The browser session
//! of an audit is released before the call returns, whether the audit
//! succeeded, failed or timed out.

use crate::aggregate::{AggregateReport, ReportAggregator};
use crate::catalog::RuleCatalog;
use crate::config::AuditConfig;
use crate::context::AuditContext;
use crate::executor::{ConcurrentRuleExecutor, ExecutionInput};
use crate::fixes::FixCatalog;
use crate::level::{validate_version, ConformanceLevel};
use crate::page::ParsedPage;
use crate::result::{AuditError, AuditResult, ServiceError};
use crate::rule::RuleDescriptor;
use crate::session::{SessionFactory, SessionResource};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// One page to audit
#[derive(Debug, Clone)]
pub struct AuditRequest {
    /// Parsed markup
    pub page: ParsedPage,
    /// Live URL of the page; session rules only run when present
    pub url: Option<String>,
    /// WCAG version, e.g. "2.0"
    pub version: String,
    /// Level label, parsed when the audit starts
    pub level: String,
    /// Hard deadline; the configured default budget applies when absent
    pub deadline: Option<Instant>,
}

impl AuditRequest {
    /// Request for `page` at `level` against `version`
    #[must_use]
    pub fn new(page: ParsedPage, version: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            page,
            url: None,
            version: version.into(),
            level: level.into(),
            deadline: None,
        }
    }

    /// Attach the live URL
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Abandon the audit at `deadline`
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Abandon the audit `timeout` from now
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

/// Runs audits; cheap to share across concurrent requests
pub struct Auditor {
    config: AuditConfig,
    fixes: Arc<FixCatalog>,
    sessions: Option<Arc<dyn SessionFactory>>,
    executor: ConcurrentRuleExecutor,
}

impl fmt::Debug for Auditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auditor")
            .field("config", &self.config)
            .field("fixes", &self.fixes)
            .field("sessions", &self.sessions.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for Auditor {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

impl Auditor {
    /// Auditor using the bundled fix data and no live sessions
    #[must_use]
    pub fn new(config: AuditConfig) -> Self {
        let executor = ConcurrentRuleExecutor::from_config(&config);
        Self {
            config,
            fixes: Arc::new(FixCatalog::bundled()),
            sessions: None,
            executor,
        }
    }

    /// Resolve remediation through `fixes`
    #[must_use]
    pub fn with_fix_catalog(mut self, fixes: Arc<FixCatalog>) -> Self {
        self.fixes = fixes;
        self
    }

    /// Create browser sessions with `factory`
    #[must_use]
    pub fn with_session_factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.sessions = Some(factory);
        self
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Shared fix catalog
    #[must_use]
    pub fn fix_catalog(&self) -> &Arc<FixCatalog> {
        &self.fixes
    }

    /// Audit one page.
    ///
    /// Returns a complete report or a [`ServiceError`] wrapping the first
    /// failure; never a partial report.
    pub async fn audit(&self, request: AuditRequest) -> Result<AggregateReport, ServiceError> {
        let url = request.url.clone();
        let context = Arc::new(AuditContext::new(url.clone()));
        let span = info_span!("audit", audit_id = %context.audit_id());
        self.run(request, context)
            .instrument(span)
            .await
            .map_err(|source| ServiceError::new(url, source))
    }

    async fn run(&self, request: AuditRequest, context: Arc<AuditContext>) -> AuditResult<AggregateReport> {
        let level: ConformanceLevel = request.level.parse()?;
        let version = validate_version(&request.version)?.to_string();
        if let Some(url) = &request.url {
            validate_url(url)?;
        }
        let deadline = request
            .deadline
            .unwrap_or_else(|| Instant::now() + self.config.default_timeout());
        let budget_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64;

        let audit_id = context.audit_id();
        info!(%audit_id, %level, version = %version, url = ?request.url, "audit started");

        let plan = Self::plan(level, request.url.is_some(), &context);
        let session = plan
            .iter()
            .find(|rule| rule.requires_session)
            .map(|rule| {
                self.sessions
                    .clone()
                    .map(|factory| {
                        Arc::new(SessionResource::new(factory, self.config.session_retry.clone()))
                    })
                    .ok_or_else(|| AuditError::MissingSession {
                        rule: rule.name().to_string(),
                    })
            })
            .transpose()?;

        let page = match request.url {
            Some(url) => request.page.with_url(url),
            None => request.page,
        };
        let input = ExecutionInput {
            page: Arc::new(page),
            session: session.clone(),
            context: Arc::clone(&context),
            deadline,
        };

        let executed = self.executor.execute(&plan, &input).await;
        if let Some(session) = &session {
            if let Err(err) = session.release().await {
                warn!(%audit_id, error = %err, "browser session did not quit cleanly");
            }
        }
        let executed = executed?;

        let fixes = tokio::time::timeout_at(deadline, self.fixes.lookup(&version, level))
            .await
            .map_err(|_| {
                error!(%audit_id, budget_ms, "audit deadline exceeded while loading fixes");
                AuditError::Timeout { ms: budget_ms }
            })?;
        let report = ReportAggregator::new(fixes).merge(&executed, &version, level);

        let counters = context.snapshot();
        info!(
            %audit_id,
            rules = counters.rules_completed,
            issues = report.total_issue_count,
            successes = report.total_success_count,
            compliant = report.compliant,
            "audit finished"
        );
        Ok(report)
    }

    /// Rule set for `level`; session rules are dropped when there is no URL
    fn plan(level: ConformanceLevel, has_url: bool, context: &AuditContext) -> Vec<RuleDescriptor> {
        let rules = RuleCatalog::for_level(level);
        if has_url {
            return rules.to_vec();
        }
        let (kept, dropped): (Vec<_>, Vec<_>) =
            rules.iter().cloned().partition(|rule| !rule.requires_session);
        if !dropped.is_empty() {
            info!(
                audit_id = %context.audit_id(),
                skipped = dropped.len(),
                "no page URL, skipping rules that need a live session"
            );
        }
        kept
    }
}

#[allow(clippy::expect_used)]
fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(?i)https?://[^\s/?#]+[^\s]*$").expect("valid pattern"))
}

/// Accept only absolute http(s) URLs
pub fn validate_url(url: &str) -> AuditResult<()> {
    if url_pattern().is_match(url.trim()) {
        Ok(())
    } else {
        Err(AuditError::InvalidUrl {
            url: url.to_string(),
        })
    }
}
