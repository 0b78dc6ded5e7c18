//! Fluent builder for [`CrawlConfig`].

use std::path::PathBuf;

use super::types::CrawlConfig;

/// Builder producing a [`CrawlConfig`], starting from the defaults.
#[derive(Debug, Default)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl CrawlConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-loaded config (e.g. a TOML file) and layer
    /// overrides on top.
    #[must_use]
    pub fn from_config(config: CrawlConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn redis_url(mut self, url: impl Into<String>) -> Self {
        self.config.redis_url = url.into();
        self
    }

    #[must_use]
    pub fn task_queue_key(mut self, key: impl Into<String>) -> Self {
        self.config.task_queue_key = key.into();
        self
    }

    #[must_use]
    pub fn visited_set_key(mut self, key: impl Into<String>) -> Self {
        self.config.visited_set_key = key.into();
        self
    }

    #[must_use]
    pub fn socks_proxy(mut self, proxy: Option<String>) -> Self {
        self.config.socks_proxy = proxy;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    #[must_use]
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n;
        self
    }

    #[must_use]
    pub fn rate_limit_rps(mut self, rps: f64) -> Self {
        self.config.rate_limit_rps = rps;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, depth: u32) -> Self {
        self.config.max_depth = depth;
        self
    }

    #[must_use]
    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn dequeue_timeout_secs(mut self, secs: u64) -> Self {
        self.config.dequeue_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    #[must_use]
    pub fn seed_urls(mut self, urls: Vec<String>) -> Self {
        self.config.seed_urls = urls;
        self
    }

    #[must_use]
    pub fn save_screenshots(mut self, enabled: bool) -> Self {
        self.config.save_screenshots = enabled;
        self
    }

    #[must_use]
    pub fn screenshot_workers(mut self, n: usize) -> Self {
        self.config.screenshot_workers = n;
        self
    }

    #[must_use]
    pub fn screenshot_queue_size(mut self, n: usize) -> Self {
        self.config.screenshot_queue_size = n;
        self
    }

    #[must_use]
    pub fn page_load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_load_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn max_launch_failures(mut self, n: u32) -> Self {
        self.config.max_launch_failures = n;
        self
    }

    #[must_use]
    pub fn build(self) -> CrawlConfig {
        self.config
    }
}

impl CrawlConfig {
    #[must_use]
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::new()
    }
}
