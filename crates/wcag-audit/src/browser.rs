//! Live browser sessions over the Chrome `DevTools` Protocol.
//!
//! With the `browser` feature, [`CdpSessionFactory`] launches headless
//! Chromium through chromiumoxide and hands out one [`CdpSession`] per
//! audit. Without it only [`BrowserConfig`] is available and callers
//! supply their own [`crate::session::SessionFactory`].

use serde::{Deserialize, Serialize};

/// Browser launch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 800,
            chromium_path: None,
            sandbox: true,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl BrowserConfig {
    /// Set viewport dimensions
    #[must_use]
    pub const fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

#[cfg(feature = "browser")]
#[allow(clippy::missing_errors_doc, clippy::significant_drop_tightening)]
mod cdp {
    use super::BrowserConfig;
    use crate::result::{AuditError, AuditResult};
    use crate::session::{BrowserSession, SessionFactory};
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::page::Page as CdpPage;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use tracing::{debug, warn};

    /// Launches one Chromium instance per session
    #[derive(Debug, Clone, Default)]
    pub struct CdpSessionFactory {
        config: BrowserConfig,
    }

    impl CdpSessionFactory {
        /// Factory launching browsers with `config`
        #[must_use]
        pub const fn new(config: BrowserConfig) -> Self {
            Self { config }
        }

        /// Launch settings
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }
    }

    #[async_trait]
    impl SessionFactory for CdpSessionFactory {
        async fn create(&self) -> AuditResult<Box<dyn BrowserSession>> {
            let mut builder = CdpConfig::builder()
                .window_size(self.config.viewport_width, self.config.viewport_height);

            if !self.config.headless {
                builder = builder.with_head();
            }

            if !self.config.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = self.config.chromium_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder.build().map_err(AuditError::session)?;

            let (browser, mut handler) = CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| AuditError::session(e.to_string()))?;

            // Drive the CDP event loop until the browser goes away
            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| AuditError::session(e.to_string()))?;
            debug!("chromium session launched");

            Ok(Box::new(CdpSession {
                browser: Mutex::new(browser),
                page,
                handle,
                current_url: None,
                navigation_timeout: Duration::from_millis(self.config.navigation_timeout_ms),
            }))
        }
    }

    /// One Chromium instance with a single page
    #[derive(Debug)]
    pub struct CdpSession {
        browser: Mutex<CdpBrowser>,
        page: CdpPage,
        handle: tokio::task::JoinHandle<()>,
        current_url: Option<String>,
        navigation_timeout: Duration,
    }

    #[async_trait]
    impl BrowserSession for CdpSession {
        async fn navigate(&mut self, url: &str) -> AuditResult<()> {
            let navigation = async {
                self.page.goto(url).await?;
                self.page.wait_for_navigation().await?;
                Ok::<_, chromiumoxide::error::CdpError>(())
            };
            match tokio::time::timeout(self.navigation_timeout, navigation).await {
                Ok(Ok(())) => {
                    self.current_url = Some(url.to_string());
                    Ok(())
                }
                Ok(Err(e)) => Err(AuditError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                }),
                Err(_) => Err(AuditError::Navigation {
                    url: url.to_string(),
                    message: format!(
                        "no load event within {}ms",
                        self.navigation_timeout.as_millis()
                    ),
                }),
            }
        }

        fn current_url(&self) -> Option<&str> {
            self.current_url.as_deref()
        }

        async fn title(&mut self) -> AuditResult<Option<String>> {
            self.page
                .get_title()
                .await
                .map_err(|e| AuditError::session(e.to_string()))
        }

        async fn evaluate(&mut self, script: &str) -> AuditResult<serde_json::Value> {
            let result = self
                .page
                .evaluate(script)
                .await
                .map_err(|e| AuditError::session(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
        }

        async fn quit(&mut self) -> AuditResult<()> {
            let mut browser = self.browser.lock().await;
            let closed = browser
                .close()
                .await
                .map_err(|e| AuditError::session(e.to_string()));
            if let Err(err) = browser.wait().await {
                warn!(error = %err, "chromium process was not reaped");
            }
            self.handle.abort();
            debug!("chromium session closed");
            closed.map(|_| ())
        }
    }
}

#[cfg(feature = "browser")]
pub use cdp::{CdpSession, CdpSessionFactory};
