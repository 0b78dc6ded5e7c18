//! The shared crawl frontier: a durable FIFO task queue plus a visited set.
//!
//! The frontier is the only state shared across worker processes. Two
//! atomicity guarantees are required of any backend:
//!
//! - `dequeue` pops each task exactly once; no two workers observe the
//!   same popped task.
//! - `enqueue_if_new` is an atomic check-and-set against the visited set;
//!   concurrent duplicate discoveries result in exactly one enqueue.
//!
//! [`RedisFrontier`] is the production backend; [`MemoryFrontier`] backs
//! tests and embedded single-process runs.

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::urlnorm::NormalizedUrl;

pub use memory::MemoryFrontier;
pub use redis_store::RedisFrontier;

/// A unit of crawl work. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    pub url: NormalizedUrl,
    pub depth: u32,
}

impl CrawlTask {
    #[must_use]
    pub fn new(url: NormalizedUrl, depth: u32) -> Self {
        Self { url, depth }
    }
}

/// Point-in-time frontier counts. May be stale under concurrent writers;
/// used for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontierStatus {
    pub queue_size: u64,
    pub visited_size: u64,
}

/// Errors surfaced by frontier operations.
///
/// A connection failure at startup is fatal to the crawler; failures during
/// a single operation propagate to the caller, which retries with backoff
/// before giving up. A task is never silently dropped.
#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("frontier backend error: {0}")]
    Backend(#[from] redis::RedisError),
    #[error("malformed task in queue: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type FrontierResult<T> = Result<T, FrontierError>;

/// Contract every frontier backend satisfies.
#[async_trait]
pub trait FrontierStore: Send + Sync {
    /// Normalize and enqueue seed URLs at depth 0, skipping URLs already in
    /// the visited set. With `clear_existing`, the queue and visited set are
    /// cleared first. Returns the number of tasks added.
    async fn seed(&self, urls: &[String], clear_existing: bool) -> FrontierResult<usize>;

    /// Atomic check-and-set: if `url` has never been seen, mark it visited,
    /// append a task at `depth`, and return `true`.
    async fn enqueue_if_new(&self, url: &NormalizedUrl, depth: u32) -> FrontierResult<bool>;

    /// Blocking pop with a timeout. `None` means the queue stayed empty for
    /// the whole window, which workers interpret as crawl completion.
    async fn dequeue(&self, timeout: Duration) -> FrontierResult<Option<CrawlTask>>;

    /// Observability counts; may be stale under concurrent writers.
    async fn status(&self) -> FrontierResult<FrontierStatus>;
}
