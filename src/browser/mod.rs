//! Browser session for the anti-bot protected archive.
//!
//! Uses chromiumoxide (CDP) with stealth evasion so rendered search and
//! document pages can be fetched like a regular visitor. The engine itself is
//! a black box; this module only launches it, navigates, and returns HTML.

mod stealth;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;
use crate::error::ScrapeError;
use crate::walker::PageFetcher;
use stealth::STEALTH_SCRIPTS;

/// Default user agent for browser requests.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// JavaScript to wait for page ready state.
const WAIT_FOR_READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
            setTimeout(() => resolve('timeout'), 10000);
        }
    })
"#;

/// Common Chrome executable paths to check.
const CHROME_PATHS: &[&str] = &[
    // Linux
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    // macOS
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    // Common install locations
    "/opt/google/chrome/google-chrome",
];

/// A single headless browser driving all navigation for a run.
pub struct BrowserSession {
    config: BrowserSettings,
    browser: Option<Browser>,
}

impl BrowserSession {
    /// Create a session; the browser launches lazily on first fetch.
    pub fn new(config: BrowserSettings) -> Self {
        Self {
            config,
            browser: None,
        }
    }

    /// Find a Chrome/Chromium executable.
    fn find_chrome(&self) -> Result<PathBuf, ScrapeError> {
        if let Some(ref path) = self.config.chrome_executable {
            return Ok(path.clone());
        }

        for path in CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                info!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        info!("Found Chrome in PATH: {}", path);
                        return Ok(PathBuf::from(path));
                    }
                }
            }
        }

        Err(ScrapeError::Browser(
            "Chrome/Chromium not found. Install it or set browser.chrome_executable".to_string(),
        ))
    }

    /// Launch the browser if not already running.
    async fn ensure_browser(&mut self) -> Result<(), ScrapeError> {
        if self.browser.is_some() {
            return Ok(());
        }

        info!("Launching browser (headless={})", self.config.headless);
        let chrome_path = self.find_chrome()?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);

        // with_head means NOT headless, confusingly
        if !self.config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| ScrapeError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Browser(format!("Failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        self.browser = Some(browser);
        Ok(())
    }

    /// Close the browser.
    pub async fn close(&mut self) {
        self.browser = None;
    }

    async fn fetch_inner(
        &self,
        page: &Page,
        url: &str,
        settle: Duration,
    ) -> Result<String, ScrapeError> {
        // Realistic user agent before any navigation
        page.execute(SetUserAgentOverrideParams::new(
            BROWSER_USER_AGENT.to_string(),
        ))
        .await
        .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        self.navigate(page, url).await?;
        self.wait_for_page_ready(page).await;
        self.apply_stealth(page).await;

        // Fixed settle wait for client-side rendering
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        page.content().await.map_err(|e| ScrapeError::Navigation {
            url: url.to_string(),
            message: format!("failed to read page content: {}", e),
        })
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), ScrapeError> {
        info!("Navigating to {}", url);
        let nav_params =
            NavigateParams::builder()
                .url(url)
                .build()
                .map_err(|e| ScrapeError::Navigation {
                    url: url.to_string(),
                    message: format!("invalid URL: {}", e),
                })?;

        let nav_timeout = Duration::from_secs(self.config.timeout_secs);
        tokio::time::timeout(nav_timeout, page.execute(nav_params))
            .await
            .map_err(|_| ScrapeError::Navigation {
                url: url.to_string(),
                message: format!("timed out after {}s", self.config.timeout_secs),
            })?
            .map_err(|e| ScrapeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    /// Wait for the page to reach a ready state.
    async fn wait_for_page_ready(&self, page: &Page) {
        let ready_timeout = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(
            ready_timeout,
            page.evaluate(WAIT_FOR_READY_SCRIPT.to_string()),
        )
        .await
        {
            Ok(Ok(result)) => {
                let state: String = result
                    .into_value()
                    .unwrap_or_else(|_| "unknown".to_string());
                debug!("Page ready state: {}", state);
            }
            Ok(Err(e)) => {
                debug!("Could not check ready state: {}", e);
            }
            Err(_) => {
                warn!("Timeout waiting for page ready state");
            }
        }
    }

    /// Apply stealth evasion scripts to a page. Failures are non-fatal.
    async fn apply_stealth(&self, page: &Page) {
        for script in STEALTH_SCRIPTS {
            if let Err(e) = page.evaluate(script.to_string()).await {
                debug!("Stealth script injection skipped: {}", e);
            }
        }
    }
}

#[async_trait]
impl PageFetcher for BrowserSession {
    /// Fetch a URL and return the rendered HTML.
    async fn fetch(&mut self, url: &str, settle: Duration) -> Result<String, ScrapeError> {
        self.ensure_browser().await?;

        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| ScrapeError::Browser("browser not initialized".to_string()))?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScrapeError::Browser(e.to_string()))?;

        // Inner function so the page is always closed
        let result = self.fetch_inner(&page, url, settle).await;
        let _ = page.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_without_browser() {
        let session = BrowserSession::new(BrowserSettings::default());
        assert!(session.browser.is_none());
    }

    #[test]
    fn test_explicit_chrome_executable_wins() {
        let config = BrowserSettings {
            chrome_executable: Some(PathBuf::from("/opt/custom/chrome")),
            ..Default::default()
        };
        let session = BrowserSession::new(config);
        assert_eq!(
            session.find_chrome().unwrap(),
            PathBuf::from("/opt/custom/chrome")
        );
    }
}
