//! onioncrawl: crawl coordination for .onion content.
//!
//! A durable, multi-worker, breadth-first crawler: workers pull tasks from
//! a shared frontier (Redis-backed queue + visited set), fetch pages
//! through a SOCKS proxy, persist artifacts content-addressed, extract and
//! enqueue in-scope links, and optionally render pages for screenshots
//! through a supervised browser pool.

pub mod config;
pub mod content_saver;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod screenshot;
pub mod urlnorm;
pub mod worker;

pub use config::{CrawlConfig, CrawlConfigBuilder};
pub use content_saver::{ContentKind, ContentSaver};
pub use fetch::FetchClient;
pub use frontier::{
    CrawlTask, FrontierError, FrontierStatus, FrontierStore, MemoryFrontier, RedisFrontier,
};
pub use screenshot::{ScreenshotHandle, ScreenshotSupervisor};
pub use urlnorm::NormalizedUrl;
pub use worker::{CrawlWorker, WorkerReport};
