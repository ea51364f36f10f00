//! Headless browser page rendering.
//!
//! The target sites assemble their quote tables with JavaScript, so plain
//! HTTP fetches see empty shells. Rendering goes through chromiumoxide
//! (CDP) when the `browser` feature is enabled; without it a stub renderer
//! reports every render as unsupported.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::BrowserConfig;
use crate::error::{Error, Result};
use crate::scrape::anti_detection::ClientIdentity;

/// Renders a page to HTML under a given client identity.
///
/// The orchestrator only needs this one seam, which keeps parsers and the
/// scrape cycle testable with a fake renderer.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate to `url`, wait for `wait_selector` to appear (bounded by
    /// `timeout`), and return the rendered HTML.
    async fn render(
        &self,
        url: &str,
        wait_selector: &str,
        timeout: Duration,
        identity: &ClientIdentity,
    ) -> Result<String>;
}

/// Build the default renderer for this build.
#[cfg(feature = "browser")]
pub fn default_renderer(config: &BrowserConfig) -> std::sync::Arc<dyn PageRenderer> {
    std::sync::Arc::new(ChromiumRenderer::new(config.clone()))
}

#[cfg(not(feature = "browser"))]
pub fn default_renderer(_config: &BrowserConfig) -> std::sync::Arc<dyn PageRenderer> {
    std::sync::Arc::new(DisabledRenderer)
}

/// Renderer used when browser support is compiled out.
pub struct DisabledRenderer;

#[async_trait]
impl PageRenderer for DisabledRenderer {
    async fn render(
        &self,
        _url: &str,
        _wait_selector: &str,
        _timeout: Duration,
        _identity: &ClientIdentity,
    ) -> Result<String> {
        Err(Error::Browser(
            "browser support not compiled in (enable the `browser` feature)".to_string(),
        ))
    }
}

#[cfg(feature = "browser")]
pub use chromium::ChromiumRenderer;

#[cfg(feature = "browser")]
mod chromium {
    use std::time::Duration;

    use async_trait::async_trait;
    use chromiumoxide::cdp::browser_protocol::network::{
        Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
    };
    use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Page};
    use futures::StreamExt;
    use tokio::sync::Mutex;
    use tracing::{debug, info};

    use super::PageRenderer;
    use crate::config::BrowserConfig;
    use crate::error::{Error, Result};
    use crate::scrape::anti_detection::ClientIdentity;

    /// Shared Chromium session. Launched lazily on first render and reused
    /// for the rest of the cycle; each render gets its own page.
    pub struct ChromiumRenderer {
        config: BrowserConfig,
        browser: Mutex<Option<Browser>>,
    }

    impl ChromiumRenderer {
        /// Common Chrome executable paths to check.
        const CHROME_PATHS: &'static [&'static str] = &[
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

        pub fn new(config: BrowserConfig) -> Self {
            Self {
                config,
                browser: Mutex::new(None),
            }
        }

        fn find_chrome() -> Result<std::path::PathBuf> {
            for path in Self::CHROME_PATHS {
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
                            return Ok(std::path::PathBuf::from(path));
                        }
                    }
                }
            }

            Err(Error::Browser(
                "Chrome/Chromium not found; install chromium or google-chrome".to_string(),
            ))
        }

        async fn launch(&self) -> Result<Browser> {
            info!("Launching browser (headless={})", self.config.headless);

            let chrome_path = Self::find_chrome()?;
            let mut builder = ChromeConfig::builder().chrome_executable(chrome_path);

            // with_head means NOT headless, confusingly
            if !self.config.headless {
                builder = builder.with_head();
            }

            if let Some(ref proxy) = self.config.proxy {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }

            builder = builder
                .arg("--disable-blink-features=AutomationControlled")
                .arg("--disable-infobars")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--no-default-browser-check")
                .arg("--disable-background-networking")
                .arg("--disable-sync")
                .arg("--disable-translate")
                .arg("--metrics-recording-only")
                .arg("--safebrowsing-disable-auto-update")
                .arg("--no-sandbox") // Often needed for headless in containers
                .arg("--disable-gpu")
                .arg("--disable-software-rasterizer");

            for arg in &self.config.chrome_args {
                builder = builder.arg(arg.as_str());
            }

            let chrome_config = builder
                .build()
                .map_err(|e| Error::Browser(format!("invalid browser config: {}", e)))?;

            let (browser, mut handler) = Browser::launch(chrome_config)
                .await
                .map_err(|e| Error::Browser(format!("failed to launch browser: {}", e)))?;

            // Drive the CDP connection until it closes.
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(browser)
        }

        async fn new_page(&self, url: &str) -> Result<Page> {
            let mut guard = self.browser.lock().await;
            if guard.is_none() {
                *guard = Some(self.launch().await?);
            }
            let browser = guard
                .as_ref()
                .ok_or_else(|| Error::Browser("browser session unavailable".to_string()))?;

            browser
                .new_page(url)
                .await
                .map_err(|e| Error::Browser(format!("failed to open page: {}", e)))
        }

        /// Poll for a selector until it appears or the deadline passes.
        async fn wait_for_selector(page: &Page, selector: &str, timeout: Duration) -> bool {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if page.find_element(selector).await.is_ok() {
                    return true;
                }
                if tokio::time::Instant::now() >= deadline {
                    return false;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }
    }

    #[async_trait]
    impl PageRenderer for ChromiumRenderer {
        async fn render(
            &self,
            url: &str,
            wait_selector: &str,
            timeout: Duration,
            identity: &ClientIdentity,
        ) -> Result<String> {
            debug!("Rendering {} (wait for {:?})", url, wait_selector);

            let page = self.new_page("about:blank").await?;

            let result = async {
                page.execute(SetUserAgentOverrideParams::new(
                    identity.user_agent.clone(),
                ))
                .await
                .map_err(|e| Error::Browser(format!("failed to set user agent: {}", e)))?;

                let headers = serde_json::Map::from_iter(
                    identity
                        .headers
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v))),
                );
                page.execute(SetExtraHttpHeadersParams::new(Headers::new(
                    serde_json::Value::Object(headers),
                )))
                .await
                .map_err(|e| Error::Browser(format!("failed to set headers: {}", e)))?;

                page.goto(url)
                    .await
                    .map_err(|e| Error::Network(format!("navigation to {} failed: {}", url, e)))?;

                if !Self::wait_for_selector(&page, wait_selector, timeout).await {
                    return Err(Error::timeout(
                        format!("waiting for selector {:?} on {}", wait_selector, url),
                        timeout.as_secs(),
                    ));
                }

                page.content()
                    .await
                    .map_err(|e| Error::Browser(format!("failed to read page content: {}", e)))
            }
            .await;

            // Close the page regardless of outcome; the session is reused.
            if let Err(e) = page.close().await {
                debug!("page close failed: {}", e);
            }

            result
        }
    }
}

#[cfg(all(test, not(feature = "browser")))]
mod tests {
    use super::*;
    use crate::scrape::anti_detection::AntiDetection;

    #[tokio::test]
    async fn disabled_renderer_reports_unsupported() {
        let renderer = DisabledRenderer;
        let identity = AntiDetection::default().identity();
        let err = renderer
            .render(
                "https://example.com/",
                "table",
                Duration::from_secs(1),
                &identity,
            )
            .await;
        assert!(matches!(err, Err(Error::Browser(_))));
    }
}
