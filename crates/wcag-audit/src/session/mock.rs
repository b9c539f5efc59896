//! Instrumented in-memory sessions for tests.

use super::{BrowserSession, SessionFactory};
use crate::result::{AuditError, AuditResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Call recorded by a [`MockSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was created
    Created {
        /// Session number, starting at 1
        session: usize,
    },
    /// Navigation started
    Navigate {
        /// Session number
        session: usize,
        /// Target URL
        url: String,
    },
    /// Title read
    Title {
        /// Session number
        session: usize,
    },
    /// Script evaluated
    Evaluate {
        /// Session number
        session: usize,
        /// Script text
        script: String,
    },
    /// Session quit
    Quit {
        /// Session number
        session: usize,
    },
}

type EventLog = Arc<Mutex<Vec<SessionEvent>>>;

fn record(log: &EventLog, event: SessionEvent) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(event);
}

/// Mock session with scripted responses
#[derive(Debug, Clone)]
pub struct MockSession {
    id: usize,
    current_url: Option<String>,
    title: Option<String>,
    responses: Vec<(String, serde_json::Value)>,
    failing_scripts: Vec<String>,
    navigation_delay: Duration,
    log: EventLog,
}

impl MockSession {
    /// Create a standalone mock session
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            current_url: None,
            title: None,
            responses: Vec::new(),
            failing_scripts: Vec::new(),
            navigation_delay: Duration::ZERO,
            log: Arc::default(),
        }
    }

    /// Set the document title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Answer scripts containing `marker` with `value`
    #[must_use]
    pub fn with_response(mut self, marker: impl Into<String>, value: serde_json::Value) -> Self {
        self.responses.push((marker.into(), value));
        self
    }

    /// Recorded calls
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.events().iter().any(|e| match (method, e) {
            ("navigate", SessionEvent::Navigate { .. })
            | ("title", SessionEvent::Title { .. })
            | ("evaluate", SessionEvent::Evaluate { .. })
            | ("quit", SessionEvent::Quit { .. }) => true,
            _ => false,
        })
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> AuditResult<()> {
        record(
            &self.log,
            SessionEvent::Navigate {
                session: self.id,
                url: url.to_string(),
            },
        );
        if !self.navigation_delay.is_zero() {
            tokio::time::sleep(self.navigation_delay).await;
        }
        self.current_url = Some(url.to_string());
        Ok(())
    }

    fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    async fn title(&mut self) -> AuditResult<Option<String>> {
        record(&self.log, SessionEvent::Title { session: self.id });
        Ok(self.title.clone())
    }

    async fn evaluate(&mut self, script: &str) -> AuditResult<serde_json::Value> {
        record(
            &self.log,
            SessionEvent::Evaluate {
                session: self.id,
                script: script.to_string(),
            },
        );
        if self.failing_scripts.iter().any(|m| script.contains(m.as_str())) {
            return Err(AuditError::session(format!("script failed: {script}")));
        }
        Ok(self
            .responses
            .iter()
            .find(|(marker, _)| script.contains(marker.as_str()))
            .map(|(_, value)| value.clone())
            .unwrap_or(serde_json::Value::Null))
    }

    async fn quit(&mut self) -> AuditResult<()> {
        record(&self.log, SessionEvent::Quit { session: self.id });
        Ok(())
    }
}

/// Factory producing [`MockSession`]s that share one event log
#[derive(Debug, Clone)]
pub struct MockSessionFactory {
    template: MockSession,
    fail_first: usize,
    attempts: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

impl Default for MockSessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSessionFactory {
    /// Create a factory whose sessions always succeed
    #[must_use]
    pub fn new() -> Self {
        Self {
            template: MockSession::new(0),
            fail_first: 0,
            attempts: Arc::default(),
            created: Arc::default(),
        }
    }

    /// Fail the first `n` creation attempts
    #[must_use]
    pub const fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    /// Title every session reports
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.template = self.template.with_title(title);
        self
    }

    /// Answer scripts containing `marker` with `value`
    #[must_use]
    pub fn with_response(mut self, marker: impl Into<String>, value: serde_json::Value) -> Self {
        self.template = self.template.with_response(marker, value);
        self
    }

    /// Fail scripts containing `marker`
    #[must_use]
    pub fn with_failing_script(mut self, marker: impl Into<String>) -> Self {
        self.template.failing_scripts.push(marker.into());
        self
    }

    /// Delay every navigation
    #[must_use]
    pub const fn with_navigation_delay(mut self, delay: Duration) -> Self {
        self.template.navigation_delay = delay;
        self
    }

    /// Sessions successfully created
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Calls recorded across every session of this factory
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.template.events()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn create(&self) -> AuditResult<Box<dyn BrowserSession>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(AuditError::session(format!(
                "mock launch failure {attempt}/{}",
                self.fail_first
            )));
        }
        let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let mut session = self.template.clone();
        session.id = id;
        record(&session.log, SessionEvent::Created { session: id });
        Ok(Box::new(session))
    }
}
