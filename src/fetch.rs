//! Bounded-concurrency HTTP client routed through the SOCKS proxy.
//!
//! Concurrency is capped by a semaphore; each request additionally sleeps
//! `1/rate` after taking its slot, a token-less floor on inter-request
//! spacing within this process (not a global rate across worker
//! processes). Every failure mode — timeout, proxy error, non-2xx — is a
//! per-URL event: logged, `None` returned, crawl unaffected. There is no
//! retry here; a failed URL is only revisited if rediscovered.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::CrawlConfig;
use crate::content_saver::{ContentKind, ContentSaver};
use crate::urlnorm::NormalizedUrl;

pub struct FetchClient {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    rate_interval: Duration,
    saver: Arc<ContentSaver>,
}

impl FetchClient {
    pub fn new(config: &CrawlConfig, saver: Arc<ContentSaver>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(Duration::from_secs(config.request_timeout_secs()));

        if let Some(proxy_url) = config.socks_proxy() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .with_context(|| format!("Invalid SOCKS proxy address {proxy_url}"))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().context("Failed to build HTTP client")?;

        let rate = config.rate_limit_rps();
        let rate_interval = if rate > 0.0 {
            Duration::from_secs_f64(1.0 / rate)
        } else {
            Duration::ZERO
        };

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency())),
            rate_interval,
            saver,
        })
    }

    /// Fetch a URL.
    ///
    /// HTML/text responses come back decoded for link extraction. Binary
    /// responses are handed straight to the content saver and yield `None`,
    /// meaning "already handled, nothing to parse". Failures also yield
    /// `None`.
    pub async fn fetch(&self, url: &NormalizedUrl) -> Option<String> {
        let _permit = match self.semaphore.acquire().await {
            Ok(p) => p,
            Err(_) => {
                warn!("Fetch semaphore closed, dropping request for {url}");
                return None;
            }
        };
        if !self.rate_interval.is_zero() {
            tokio::time::sleep(self.rate_interval).await;
        }

        match self.fetch_inner(url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Request failed: {url} - {e:#}");
                None
            }
        }
    }

    async fn fetch_inner(&self, url: &NormalizedUrl) -> Result<Option<String>> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let bytes = response.bytes().await?;

        if content_type.contains("text/html") || content_type.starts_with("text/") {
            return Ok(Some(decode_text(&bytes)));
        }

        let kind = classify_binary(&content_type);
        debug!("Binary response ({content_type}) for {url}, saving as {kind:?}");
        self.saver.save(url.as_str(), kind, &bytes).await;
        Ok(None)
    }
}

/// Decode a response body as UTF-8, falling back to Latin-1 (every byte
/// maps to a char, so the fallback cannot fail).
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Decide the artifact kind for a non-text response, once, at the fetch
/// boundary.
fn classify_binary(content_type: &str) -> ContentKind {
    if content_type.starts_with("image") {
        ContentKind::Image
    } else if content_type.starts_with("video") {
        ContentKind::Video
    } else {
        ContentKind::File
    }
}
