//! Audit engine configuration.
//!
//! Every field has a default, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! worker_pool_size: 4
//! session_retry:
//!   max_attempts: 5
//! browser:
//!   sandbox: false
//! ```

use crate::browser::BrowserConfig;
use crate::result::{AuditError, AuditResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Backoff policy for creating the browser session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total creation attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay
    pub max_backoff_ms: u64,
    /// Growth factor between attempts
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 16_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Retry policy with no delay between attempts
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let raw = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Configuration for the [`crate::Auditor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum number of session-free rules in flight
    pub worker_pool_size: usize,
    /// Session creation retry policy
    pub session_retry: RetryConfig,
    /// Audit budget when the request carries no deadline
    pub default_timeout_ms: u64,
    /// Live browser settings
    pub browser: BrowserConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 10,
            session_retry: RetryConfig::default(),
            default_timeout_ms: 120_000,
            browser: BrowserConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Parse configuration from YAML text
    pub fn from_yaml(text: &str) -> AuditResult<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> AuditResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> AuditResult<()> {
        if self.worker_pool_size == 0 {
            return Err(AuditError::config("worker_pool_size must be at least 1"));
        }
        if self.session_retry.max_attempts == 0 {
            return Err(AuditError::config(
                "session_retry.max_attempts must be at least 1",
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(AuditError::config("default_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Set worker pool size
    #[must_use]
    pub const fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Set session retry policy
    #[must_use]
    pub fn with_session_retry(mut self, retry: RetryConfig) -> Self {
        self.session_retry = retry;
        self
    }

    /// Set default audit budget
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set browser settings
    #[must_use]
    pub fn with_browser(mut self, browser: BrowserConfig) -> Self {
        self.browser = browser;
        self
    }

    /// Default audit budget
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}
