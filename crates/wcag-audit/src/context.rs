//! Per-invocation audit state.

use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// State scoped to a single audit; never shared between audits
#[derive(Debug)]
pub struct AuditContext {
    audit_id: Uuid,
    url: Option<String>,
    rules_started: AtomicUsize,
    rules_completed: AtomicUsize,
    issues_found: AtomicUsize,
    elements_checked: AtomicUsize,
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextSnapshot {
    /// Rules dispatched
    pub rules_started: usize,
    /// Rules finished without error
    pub rules_completed: usize,
    /// Issues reported by finished rules
    pub issues_found: usize,
    /// Elements inspected by finished rules
    pub elements_checked: usize,
}

impl AuditContext {
    /// New context with a fresh audit id
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            url,
            rules_started: AtomicUsize::new(0),
            rules_completed: AtomicUsize::new(0),
            issues_found: AtomicUsize::new(0),
            elements_checked: AtomicUsize::new(0),
        }
    }

    /// Identifier attached to every log event of this audit
    #[must_use]
    pub const fn audit_id(&self) -> Uuid {
        self.audit_id
    }

    /// Target URL, when the audit drives a live session
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub(crate) fn rule_started(&self) {
        self.rules_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rule_completed(&self, issues: usize, elements_checked: usize) {
        self.rules_completed.fetch_add(1, Ordering::Relaxed);
        self.issues_found.fetch_add(issues, Ordering::Relaxed);
        self.elements_checked.fetch_add(elements_checked, Ordering::Relaxed);
    }

    /// Current counter values
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            rules_started: self.rules_started.load(Ordering::Relaxed),
            rules_completed: self.rules_completed.load(Ordering::Relaxed),
            issues_found: self.issues_found.load(Ordering::Relaxed),
            elements_checked: self.elements_checked.load(Ordering::Relaxed),
        }
    }
}
