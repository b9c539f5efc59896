//! Rule evaluator contract and the records rules produce.

use crate::level::ConformanceLevel;
use crate::page::{ElementId, ParsedPage};
use crate::result::{AuditError, AuditResult};
use crate::session::BrowserSession;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One detected violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    /// Issue title, also the remediation lookup key
    pub title: String,
    /// Tag of the offending element
    pub tag_name: String,
    /// Markup or value that locates the issue for a human
    pub snippet: String,
    /// CSS path to the element
    pub selector: String,
    /// Remediation text, filled in during aggregation
    pub remediation: String,
}

impl IssueRecord {
    /// Issue located at an element of `page`, with its outer HTML as snippet
    #[must_use]
    pub fn at(page: &ParsedPage, id: ElementId, title: impl Into<String>) -> Self {
        let node = page.element(id);
        Self {
            title: title.into(),
            tag_name: node.tag.clone(),
            snippet: node.outer_html().to_string(),
            selector: page.css_selector(id),
            remediation: String::new(),
        }
    }

    /// Issue not tied to a parsed element (found through the live session)
    #[must_use]
    pub fn detached(
        title: impl Into<String>,
        tag_name: impl Into<String>,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            tag_name: tag_name.into(),
            snippet: String::new(),
            selector: selector.into(),
            remediation: String::new(),
        }
    }

    /// Replace the snippet
    #[must_use]
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

/// Output of one rule invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleOutcome {
    /// Violations in detection order
    pub issues: Vec<IssueRecord>,
    /// Elements the rule inspected
    pub elements_checked: usize,
}

impl RuleOutcome {
    /// Create an outcome
    #[must_use]
    pub const fn new(issues: Vec<IssueRecord>, elements_checked: usize) -> Self {
        Self {
            issues,
            elements_checked,
        }
    }

    /// Number of issues
    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    /// Elements that passed; never negative
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.elements_checked.saturating_sub(self.issues.len())
    }
}

/// A single accessibility check.
///
/// Implementations must not retain the session after returning and must
/// report internal faults as errors instead of an empty outcome.
#[async_trait]
pub trait RuleEvaluator: Send + Sync {
    /// Evaluate the rule against `page`
    async fn evaluate(
        &self,
        page: &ParsedPage,
        session: Option<&mut dyn BrowserSession>,
    ) -> AuditResult<RuleOutcome>;
}

/// Signature of a markup-only check
pub type DomCheck = fn(&ParsedPage) -> AuditResult<RuleOutcome>;

/// Adapter running a markup-only check as a [`RuleEvaluator`]
#[derive(Clone, Copy)]
pub struct DomRule(pub DomCheck);

impl fmt::Debug for DomRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DomRule").finish()
    }
}

#[async_trait]
impl RuleEvaluator for DomRule {
    async fn evaluate(
        &self,
        page: &ParsedPage,
        _session: Option<&mut dyn BrowserSession>,
    ) -> AuditResult<RuleOutcome> {
        (self.0)(page)
    }
}

/// Borrow the session or fail with [`AuditError::MissingSession`]
pub fn require_session<'a>(
    rule: &str,
    session: Option<&'a mut dyn BrowserSession>,
) -> AuditResult<&'a mut dyn BrowserSession> {
    session.ok_or_else(|| AuditError::MissingSession {
        rule: rule.to_string(),
    })
}

/// Identity of a rule as it appears in reports
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleInfo {
    /// Rule name
    pub name: String,
    /// WCAG success criterion, e.g. "1.1.1 Non-text Content"
    pub guideline: String,
    /// Level the criterion belongs to
    pub level: ConformanceLevel,
}

/// Immutable, statically inspectable rule entry
#[derive(Clone)]
pub struct RuleDescriptor {
    /// Rule identity
    pub info: RuleInfo,
    /// Whether the rule drives a live browser session
    pub requires_session: bool,
    evaluator: Arc<dyn RuleEvaluator>,
}

impl fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("info", &self.info)
            .field("requires_session", &self.requires_session)
            .finish_non_exhaustive()
    }
}

impl RuleDescriptor {
    /// Descriptor for a rule that only reads the parsed page
    #[must_use]
    pub fn dom(
        name: impl Into<String>,
        guideline: impl Into<String>,
        level: ConformanceLevel,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Self {
        Self {
            info: RuleInfo {
                name: name.into(),
                guideline: guideline.into(),
                level,
            },
            requires_session: false,
            evaluator,
        }
    }

    /// Descriptor for a rule that needs a live session
    #[must_use]
    pub fn session(
        name: impl Into<String>,
        guideline: impl Into<String>,
        level: ConformanceLevel,
        evaluator: Arc<dyn RuleEvaluator>,
    ) -> Self {
        Self {
            requires_session: true,
            ..Self::dom(name, guideline, level, evaluator)
        }
    }

    /// Rule name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Run the evaluator, normalising its failures.
    ///
    /// A session-requiring rule without a session fails with
    /// [`AuditError::MissingSession`]. Other faults become
    /// [`AuditError::RuleEvaluation`] carrying the rule name.
    pub fn evaluate<'a>(
        &'a self,
        page: &'a ParsedPage,
        session: Option<&'a mut dyn BrowserSession>,
    ) -> BoxFuture<'a, AuditResult<RuleOutcome>> {
        Box::pin(async move {
            if self.requires_session && session.is_none() {
                return Err(AuditError::MissingSession {
                    rule: self.info.name.clone(),
                });
            }
            let session = if self.requires_session { session } else { None };
            self.evaluator
                .evaluate(page, session)
                .await
                .map_err(|err| match err {
                    AuditError::MissingSession { .. }
                    | AuditError::RuleEvaluation { .. }
                    | AuditError::Timeout { .. } => err,
                    other => AuditError::rule(&self.info.name, other),
                })
        })
    }
}
