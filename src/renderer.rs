//! Browser abstraction for pages that render their content client-side.
//!
//! The pipeline only needs one capability from the browser: navigate to a
//! URL, wait until a selector matches in the DOM, and hand back the rendered
//! HTML. `PageRenderer` captures exactly that, so tests can substitute a
//! stub and the fetch logic stays independent of the engine.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::debug;

/// How often the DOM is re-checked while waiting for the stats table.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate to `url` and return the page HTML once `selector` matches,
    /// bounded by `timeout` for the whole navigate-and-wait step.
    async fn render(&self, url: &str, selector: &str, timeout: Duration) -> Result<String>;

    /// Shut down the underlying browser session.
    async fn shutdown(&self) -> Result<()>;
}

/// Headless-Chromium renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
}

impl ChromiumRenderer {
    /// Launch a headless Chromium instance. `chrome_path` overrides binary
    /// auto-detection.
    pub async fn launch(chrome_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");
        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Drive the CDP event loop for the life of the browser
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        debug!("Chromium launched");
        Ok(Self {
            browser: Mutex::new(browser),
        })
    }

    async fn render_on(page: &Page, url: &str, selector: &str) -> Result<String> {
        page.goto(url).await.context("navigation failed")?;

        // The table is injected by page scripts after load, so poll for it
        // rather than trusting the navigation event.
        loop {
            if page.find_element(selector).await.is_ok() {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        page.content().await.context("failed to read page HTML")
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, selector: &str, timeout: Duration) -> Result<String> {
        let start = Instant::now();
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .context("failed to open page")?
        };

        let result = match tokio::time::timeout(timeout, Self::render_on(&page, url, selector))
            .await
        {
            Ok(inner) => inner,
            Err(_) => Err(anyhow!(
                "page did not render within {}ms",
                timeout.as_millis()
            )),
        };

        // The tab is closed on every exit path so failed attempts do not
        // accumulate orphaned pages.
        let _ = page.close().await;

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "render finished");
        result
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        let _ = browser.close().await;
        let _ = browser.wait().await;
        Ok(())
    }
}
