//! Guarded access to the live browser session of one audit.
//!
//! A [`SessionResource`] owns at most one [`BrowserSession`]. It is created
//! lazily on first [`SessionResource::acquire`] and quit by
//! [`SessionResource::release`]. Holding a [`SessionHandle`] is exclusive:
//! a second caller waits until the first handle is dropped, so navigation
//! performed by one rule can never be overwritten by another mid-flight.

mod mock;

pub use mock::{MockSession, MockSessionFactory, SessionEvent};

use crate::config::RetryConfig;
use crate::result::{AuditError, AuditResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::ops::DerefMut;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A stateful browser automation session
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to `url` and wait for the load to finish
    async fn navigate(&mut self, url: &str) -> AuditResult<()>;

    /// URL of the current document, if any
    fn current_url(&self) -> Option<&str>;

    /// Title of the current document
    async fn title(&mut self) -> AuditResult<Option<String>>;

    /// Evaluate a script in the current document
    async fn evaluate(&mut self, script: &str) -> AuditResult<serde_json::Value>;

    /// Close the session and free its native resources
    async fn quit(&mut self) -> AuditResult<()>;
}

/// Creates browser sessions
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Start a new session
    async fn create(&self) -> AuditResult<Box<dyn BrowserSession>>;
}

/// Exclusive borrow of the audit's session
pub type SessionHandle<'a> = MappedMutexGuard<'a, dyn BrowserSession>;

enum SessionSlot {
    Empty,
    Live(Box<dyn BrowserSession>),
    Released,
}

/// Lifecycle-scoped owner of one browser session
pub struct SessionResource {
    factory: Arc<dyn SessionFactory>,
    retry: RetryConfig,
    slot: Mutex<SessionSlot>,
    attempts: AtomicU32,
}

impl fmt::Debug for SessionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionResource")
            .field("retry", &self.retry)
            .field("attempts", &self.attempts.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionResource {
    /// Create an empty resource; no session is started yet
    #[must_use]
    pub fn new(factory: Arc<dyn SessionFactory>, retry: RetryConfig) -> Self {
        Self {
            factory,
            retry,
            slot: Mutex::new(SessionSlot::Empty),
            attempts: AtomicU32::new(0),
        }
    }

    /// Creation attempts made so far
    #[must_use]
    pub fn creation_attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Borrow the session exclusively, creating it on first use.
    ///
    /// Every call within one audit yields the same underlying session.
    /// Fails with [`AuditError::SessionAcquisition`] once the retry budget
    /// is spent, or with [`AuditError::Session`] after [`Self::release`].
    pub fn acquire(&self) -> BoxFuture<'_, AuditResult<SessionHandle<'_>>> {
        Box::pin(async move {
            let mut slot = self.slot.lock().await;
            if matches!(*slot, SessionSlot::Released) {
                return Err(AuditError::session("session already released"));
            }
            if matches!(*slot, SessionSlot::Empty) {
                let session = self.create_with_retry().await?;
                *slot = SessionSlot::Live(session);
            }
            MutexGuard::try_map(slot, |slot| match slot {
                SessionSlot::Live(session) => Some(session.as_mut()),
                _ => None,
            })
            .map_err(|_| AuditError::session("session slot is empty"))
        })
    }

    /// Run `scope` with exclusive access to the session.
    ///
    /// Access is released when `scope` finishes, fails, panics or is
    /// cancelled. The scope future may not borrow from its environment:
    /// move owned or `Arc` data into it.
    ///
    /// ```ignore
    /// resource
    ///     .with_exclusive_access(move |session| {
    ///         Box::pin(async move { session.navigate(&url).await })
    ///     })
    ///     .await?;
    /// ```
    pub fn with_exclusive_access<'a, T, F>(&'a self, scope: F) -> BoxFuture<'a, AuditResult<T>>
    where
        T: Send + 'a,
        F: for<'s> FnOnce(&'s mut dyn BrowserSession) -> BoxFuture<'s, AuditResult<T>> + Send + 'a,
    {
        Box::pin(async move {
            // Boxed as `Send` so the guard's lifetime-bounded `Send` impl is
            // proven here rather than against the async block's erased lifetimes.
            let mut handle: Box<dyn DerefMut<Target = dyn BrowserSession> + Send + 'a> =
                Box::new(self.acquire().await?);
            scope(&mut **handle).await
        })
    }

    /// Quit the session, if one was started.
    ///
    /// Later calls to [`Self::acquire`] fail. Releasing twice is a no-op.
    pub async fn release(&self) -> AuditResult<()> {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, SessionSlot::Released) {
            SessionSlot::Live(mut session) => {
                debug!("quitting browser session");
                session.quit().await
            }
            SessionSlot::Empty => Ok(()),
            SessionSlot::Released => {
                warn!("browser session released twice");
                Ok(())
            }
        }
    }

    async fn create_with_retry(&self) -> AuditResult<Box<dyn BrowserSession>> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.attempts.fetch_add(1, Ordering::Relaxed);
            match self.factory.create().await {
                Ok(session) => {
                    if attempt > 1 {
                        debug!(attempt, "browser session created after retry");
                    }
                    return Ok(session);
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "browser session creation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(AuditError::SessionAcquisition {
                        attempts: attempt,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

impl Drop for SessionResource {
    fn drop(&mut self) {
        if matches!(self.slot.get_mut(), SessionSlot::Live(_)) {
            warn!("session resource dropped without release; browser session leaked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(factory: &MockSessionFactory, attempts: u32) -> SessionResource {
        SessionResource::new(Arc::new(factory.clone()), RetryConfig::immediate(attempts))
    }

    mod acquire_tests {
        use super::*;

        #[tokio::test]
        async fn test_lazy_creation() {
            let factory = MockSessionFactory::new();
            let resource = resource(&factory, 3);
            assert_eq!(factory.created(), 0);
            drop(resource.acquire().await.unwrap());
            assert_eq!(factory.created(), 1);
        }

        #[tokio::test]
        async fn test_acquire_is_idempotent() {
            let factory = MockSessionFactory::new();
            let resource = resource(&factory, 3);
            {
                let mut handle = resource.acquire().await.unwrap();
                handle.navigate("https://example.com/a").await.unwrap();
            }
            let handle = resource.acquire().await.unwrap();
            assert_eq!(handle.current_url(), Some("https://example.com/a"));
            assert_eq!(factory.created(), 1);
        }

        #[tokio::test]
        async fn test_retries_then_succeeds() {
            let factory = MockSessionFactory::new().failing_first(2);
            let resource = resource(&factory, 3);
            assert!(resource.acquire().await.is_ok());
            assert_eq!(resource.creation_attempts(), 3);
            assert_eq!(factory.created(), 1);
        }

        #[tokio::test]
        async fn test_gives_up_after_budget() {
            let factory = MockSessionFactory::new().failing_first(5);
            let resource = resource(&factory, 3);
            let err = resource.acquire().await.map(|_| ()).unwrap_err();
            assert!(matches!(err, AuditError::SessionAcquisition { attempts: 3, .. }));
            assert_eq!(factory.created(), 0);
        }

        #[tokio::test(start_paused = true)]
        async fn test_backoff_between_attempts() {
            let factory = MockSessionFactory::new().failing_first(2);
            let resource = SessionResource::new(Arc::new(factory), RetryConfig::default());
            let start = tokio::time::Instant::now();
            assert!(resource.acquire().await.is_ok());
            // 2s after the first failure, 4s after the second
            assert!(start.elapsed() >= std::time::Duration::from_secs(6));
        }
    }

    mod release_tests {
        use super::*;

        #[tokio::test]
        async fn test_release_quits_once() {
            let factory = MockSessionFactory::new();
            let resource = resource(&factory, 1);
            drop(resource.acquire().await.unwrap());
            resource.release().await.unwrap();
            resource.release().await.unwrap();
            let quits = factory
                .events()
                .iter()
                .filter(|e| matches!(e, SessionEvent::Quit { .. }))
                .count();
            assert_eq!(quits, 1);
        }

        #[tokio::test]
        async fn test_release_without_session() {
            let factory = MockSessionFactory::new();
            let resource = resource(&factory, 1);
            resource.release().await.unwrap();
            assert_eq!(factory.created(), 0);
        }

        #[tokio::test]
        async fn test_acquire_after_release_fails() {
            let factory = MockSessionFactory::new();
            let resource = resource(&factory, 1);
            resource.release().await.unwrap();
            assert!(resource.acquire().await.is_err());
        }
    }

    mod exclusive_tests {
        use super::*;
        use std::time::Duration;

        #[tokio::test]
        async fn test_scope_result_is_returned() {
            let factory = MockSessionFactory::new().with_title("Docs");
            let resource = resource(&factory, 1);
            let title = resource
                .with_exclusive_access(|session| Box::pin(async move { session.title().await }))
                .await
                .unwrap();
            assert_eq!(title.as_deref(), Some("Docs"));
        }

        #[tokio::test]
        async fn test_scopes_do_not_interleave() {
            let factory = MockSessionFactory::new();
            let resource = Arc::new(resource(&factory, 1));
            let mut tasks = Vec::new();
            for i in 0..4 {
                let resource = Arc::clone(&resource);
                tasks.push(tokio::spawn(async move {
                    resource
                        .with_exclusive_access(move |session| {
                            Box::pin(async move {
                                session.navigate(&format!("https://example.com/{i}")).await?;
                                tokio::time::sleep(Duration::from_millis(5)).await;
                                session.evaluate(&format!("done {i}")).await?;
                                Ok(())
                            })
                        })
                        .await
                }));
            }
            for task in tasks {
                task.await.unwrap().unwrap();
            }

            let events = factory.events();
            let mut open: Option<String> = None;
            for event in events {
                match event {
                    SessionEvent::Navigate { url, .. } => {
                        assert!(open.is_none(), "navigation to {url} began inside another scope");
                        open = Some(url);
                    }
                    SessionEvent::Evaluate { script, .. } if script.starts_with("done") => {
                        let url = open.take().unwrap();
                        assert!(url.ends_with(script.trim_start_matches("done ")));
                    }
                    _ => {}
                }
            }
        }

        #[tokio::test]
        async fn test_panic_in_scope_releases_access() {
            use futures::FutureExt;
            use std::panic::AssertUnwindSafe;

            let factory = MockSessionFactory::new();
            let resource = resource(&factory, 1);
            let result = AssertUnwindSafe(resource.with_exclusive_access(|_session| {
                Box::pin(async move {
                    if true {
                        panic!("rule blew up");
                    }
                    Ok(())
                })
            }))
            .catch_unwind()
            .await;
            assert!(result.is_err());
            // Access is available again
            assert!(resource.acquire().await.is_ok());
        }
    }
}
