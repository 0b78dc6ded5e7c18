//! Core configuration types for the crawl subsystem.
//!
//! All knobs are externally supplied: the defaults below are configuration
//! data, loadable from TOML and overridable from the CLI, not behavior
//! baked into crawl logic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for the crawl coordination subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Connection URL for the durable frontier backend.
    pub(crate) redis_url: String,
    /// Redis list key holding queued `CrawlTask` JSON blobs.
    pub(crate) task_queue_key: String,
    /// Redis set key holding normalized already-seen URLs.
    pub(crate) visited_set_key: String,

    /// SOCKS endpoint all fetch traffic is routed through.
    ///
    /// `None` or an empty string disables the proxy, which is only useful
    /// for tests; a real crawl against .onion hosts cannot resolve without
    /// it. Use the `socks5h://` scheme so hostname resolution happens
    /// proxy-side.
    pub(crate) socks_proxy: Option<String>,
    /// Fixed User-Agent sent with every request and used by the browser pool.
    pub(crate) user_agent: String,

    /// Maximum in-flight HTTP requests per worker process.
    pub(crate) max_concurrency: usize,
    /// Requests-per-second floor: each request sleeps `1/rate` before
    /// dispatch. This bounds spacing within one process only; running
    /// multiple worker processes multiplies the effective global rate.
    pub(crate) rate_limit_rps: f64,
    /// Link-hop cutoff: tasks at this depth do not enqueue children.
    pub(crate) max_depth: u32,
    /// Per-request timeout in seconds.
    pub(crate) request_timeout_secs: u64,
    /// How long a worker blocks on an empty frontier before treating the
    /// crawl as complete.
    pub(crate) dequeue_timeout_secs: u64,

    /// Root directory for saved artifacts (text/, images/, screenshots/,
    /// videos/, files/ are created beneath it).
    pub(crate) data_dir: PathBuf,
    /// Seed URLs used when `seed` is invoked without arguments.
    pub(crate) seed_urls: Vec<String>,

    /// Whether crawl workers submit screenshot tasks.
    pub(crate) save_screenshots: bool,
    /// Number of browser instances in the screenshot pool.
    pub(crate) screenshot_workers: usize,
    /// Bound on the screenshot task queue.
    pub(crate) screenshot_queue_size: usize,
    /// Timeout in seconds for page navigation during capture.
    pub(crate) page_load_timeout_secs: u64,
    /// Consecutive browser launch failures tolerated before the pool stops
    /// replenishing and runs degraded.
    pub(crate) max_launch_failures: u32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            task_queue_key: "onioncrawl:tasks".to_string(),
            visited_set_key: "onioncrawl:visited".to_string(),
            socks_proxy: Some("socks5h://127.0.0.1:9050".to_string()),
            user_agent: concat!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) ",
                "AppleWebKit/537.36 (KHTML, like Gecko) Firefox/91.0"
            )
            .to_string(),
            max_concurrency: 8,
            rate_limit_rps: 10.0,
            max_depth: 5,
            request_timeout_secs: 60,
            dequeue_timeout_secs: 30,
            data_dir: PathBuf::from("data/input"),
            seed_urls: Vec::new(),
            save_screenshots: false,
            screenshot_workers: 2,
            screenshot_queue_size: 100,
            page_load_timeout_secs: 30,
            max_launch_failures: 3,
        }
    }
}

impl CrawlConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing keys.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    #[must_use]
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    #[must_use]
    pub fn task_queue_key(&self) -> &str {
        &self.task_queue_key
    }

    #[must_use]
    pub fn visited_set_key(&self) -> &str {
        &self.visited_set_key
    }

    #[must_use]
    pub fn socks_proxy(&self) -> Option<&str> {
        self.socks_proxy.as_deref().filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    #[must_use]
    pub fn rate_limit_rps(&self) -> f64 {
        self.rate_limit_rps
    }

    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    #[must_use]
    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
    }

    #[must_use]
    pub fn dequeue_timeout_secs(&self) -> u64 {
        self.dequeue_timeout_secs
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn seed_urls(&self) -> &[String] {
        &self.seed_urls
    }

    #[must_use]
    pub fn save_screenshots(&self) -> bool {
        self.save_screenshots
    }

    #[must_use]
    pub fn screenshot_workers(&self) -> usize {
        self.screenshot_workers.max(1)
    }

    #[must_use]
    pub fn screenshot_queue_size(&self) -> usize {
        self.screenshot_queue_size.max(1)
    }

    #[must_use]
    pub fn page_load_timeout_secs(&self) -> u64 {
        self.page_load_timeout_secs
    }

    #[must_use]
    pub fn max_launch_failures(&self) -> u32 {
        self.max_launch_failures
    }
}
