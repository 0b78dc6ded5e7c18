//! A single supervised headless-browser process.
//!
//! Wraps a chromiumoxide [`Browser`] together with the task driving its
//! CDP connection. Dropping an instance aborts the handler task, which in
//! turn tears down the child process; [`BrowserInstance::close`] is the
//! graceful variant used during supervisor shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::content_saver::{ContentKind, ContentSaver};

/// Neutralize blocking JS dialogs before any page script runs; a modal
/// alert would otherwise stall capture until the page-load timeout.
const DISMISS_DIALOGS_JS: &str =
    "window.alert = () => {}; window.confirm = () => false; window.prompt = () => null;";

/// How long to let the DOM settle after navigation before capturing.
const DOM_SETTLE: Duration = Duration::from_secs(2);

/// Wrap a page operation with an explicit timeout so a hung renderer
/// cannot occupy a pool instance indefinitely.
async fn with_page_timeout<F, T>(operation: F, timeout: Duration, name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("{name} timed out after {timeout:?}")),
    }
}

pub struct BrowserInstance {
    pub id: u64,
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserInstance {
    /// Launch a headless browser routed through the configured SOCKS proxy.
    pub async fn launch(id: u64, config: &CrawlConfig) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .request_timeout(Duration::from_secs(config.page_load_timeout_secs().max(30)))
            .arg(format!("--user-agent={}", config.user_agent()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-notifications")
            .arg("--disable-background-networking")
            .arg("--no-sandbox");

        if let Some(proxy) = config.socks_proxy() {
            builder = builder.arg(format!("--proxy-server={}", chromium_proxy(proxy)));
        }

        let browser_config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        // Drive the CDP connection until the browser goes away.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {e}");
                }
            }
        });

        info!("Browser instance {id} launched");
        Ok(Self {
            id,
            browser,
            handler,
        })
    }

    /// Navigate to `url` and persist a PNG capture via the content saver.
    ///
    /// Navigation timeouts are soft: capture proceeds best-effort with
    /// whatever rendered. An `Err` from this method means the instance
    /// itself is suspect and should be discarded by the supervisor.
    pub async fn capture(&self, url: &str, saver: &Arc<ContentSaver>, config: &CrawlConfig) -> Result<()> {
        let page_timeout = Duration::from_secs(config.page_load_timeout_secs());

        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;

        if let Err(e) = page.evaluate_on_new_document(DISMISS_DIALOGS_JS).await {
            warn!("Failed to install dialog dismissal on instance {}: {e}", self.id);
        }

        if let Err(e) = with_page_timeout(
            async {
                page.goto(url).await.map_err(|e| anyhow::anyhow!("{e}"))
            },
            page_timeout,
            "Page navigation",
        )
        .await
        {
            // Timed-out pages often still have a useful partial render.
            warn!("Navigation incomplete for {url}: {e:#}");
        }

        if let Err(e) = with_page_timeout(
            async {
                page.wait_for_navigation()
                    .await
                    .map_err(|e| anyhow::anyhow!("{e}"))
            },
            page_timeout,
            "Page load",
        )
        .await
        {
            warn!("Load wait incomplete for {url}: {e:#}");
        }

        tokio::time::sleep(DOM_SETTLE).await;

        let bytes = page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .context("Screenshot capture failed")?;

        saver.save(url, ContentKind::Screenshot, &bytes).await;

        if let Err(e) = page.close().await {
            debug!("Failed to close page on instance {}: {e}", self.id);
        }
        Ok(())
    }

    /// Ask the browser process to exit, waiting up to `grace` before giving
    /// up and letting Drop tear it down.
    pub async fn close(mut self, grace: Duration) {
        let id = self.id;
        let shutdown = async {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser {id}: {e}");
            }
            if let Err(e) = self.browser.wait().await {
                warn!("Browser {id} did not exit cleanly: {e}");
            }
        };
        if tokio::time::timeout(grace, shutdown).await.is_err() {
            warn!("Browser {id} ignored graceful close, forcing termination");
        }
    }
}

impl Drop for BrowserInstance {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Chromium does not understand the `socks5h` scheme reqwest uses; remote
/// DNS is implied for socks5 proxies.
fn chromium_proxy(proxy: &str) -> String {
    proxy.replacen("socks5h://", "socks5://", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_scheme_is_rewritten_for_chromium() {
        assert_eq!(
            chromium_proxy("socks5h://127.0.0.1:9050"),
            "socks5://127.0.0.1:9050"
        );
        assert_eq!(
            chromium_proxy("socks5://127.0.0.1:9050"),
            "socks5://127.0.0.1:9050"
        );
    }
}
