//! Result and error types for the audit engine.

use thiserror::Error;

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors that can occur while planning or running an audit
#[derive(Debug, Error)]
pub enum AuditError {
    /// Conformance level string is not one of A, AA, AAA
    #[error("Unsupported conformance level: {level}")]
    UnsupportedLevel {
        /// Level as supplied by the caller
        level: String,
    },

    /// WCAG version identifier is empty or unknown
    #[error("Unsupported WCAG version: '{version}'")]
    UnsupportedVersion {
        /// Version as supplied by the caller
        version: String,
    },

    /// A session-requiring rule was evaluated without a session
    #[error("Rule '{rule}' requires a browser session but none was supplied")]
    MissingSession {
        /// Rule name
        rule: String,
    },

    /// A single rule failed internally
    #[error("Rule '{rule}' failed: {cause}")]
    RuleEvaluation {
        /// Rule name
        rule: String,
        /// Underlying fault
        cause: String,
    },

    /// Browser session could not be created
    #[error("Failed to acquire browser session after {attempts} attempt(s): {message}")]
    SessionAcquisition {
        /// Number of creation attempts made
        attempts: u32,
        /// Last creation error
        message: String,
    },

    /// Audit deadline exceeded
    #[error("Audit timed out after {ms}ms")]
    Timeout {
        /// Budget in milliseconds
        ms: u64,
    },

    /// Live session fault
    #[error("Browser session error: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// Navigation error on the live session
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// Target URL is not an absolute http(s) URL
    #[error("Invalid page URL: {url}")]
    InvalidUrl {
        /// URL as supplied
        url: String,
    },

    /// Fix data could not be loaded
    #[error("Fix data unavailable: {message}")]
    FixSource {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl AuditError {
    /// Create a rule evaluation error
    #[must_use]
    pub fn rule(rule: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::RuleEvaluation {
            rule: rule.into(),
            cause: cause.to_string(),
        }
    }

    /// Create a session error
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error came from the deadline rather than a fault
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Aggregate failure surfaced to callers of [`crate::Auditor::audit`].
///
/// Wraps the first error the audit hit. No report accompanies it.
#[derive(Debug, Error)]
#[error("Error occurred while executing accessibility guidelines.")]
pub struct ServiceError {
    /// Page URL, when one was supplied
    pub url: Option<String>,
    #[source]
    source: AuditError,
}

impl ServiceError {
    /// Wrap an audit error
    #[must_use]
    pub const fn new(url: Option<String>, source: AuditError) -> Self {
        Self { url, source }
    }

    /// The first failure of the audit
    #[must_use]
    pub const fn cause(&self) -> &AuditError {
        &self.source
    }

    /// Unwrap into the first failure
    #[must_use]
    pub fn into_cause(self) -> AuditError {
        self.source
    }
}
