//! Redis-backed frontier.
//!
//! The task queue is a Redis list of JSON task blobs (`RPUSH`/`BLPOP`) and
//! the visited set is a Redis set. `SADD`'s 0/1 reply is the linearization
//! point for `enqueue_if_new`: of N concurrent calls for the same URL,
//! exactly one observes 1 and pushes the task.
//!
//! `BLPOP` pins the connection for the duration of the wait, so each crawl
//! worker owns its own `RedisFrontier` (and connection) rather than sharing
//! one across tasks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::urlnorm::{self, NormalizedUrl};

use super::{CrawlTask, FrontierResult, FrontierStatus, FrontierStore};

pub struct RedisFrontier {
    con: Mutex<MultiplexedConnection>,
    queue_key: String,
    visited_key: String,
}

impl RedisFrontier {
    /// Connect to the backend and verify it with a PING.
    ///
    /// Callers treat a failure here as fatal: the crawler cannot run
    /// without its durable frontier.
    pub async fn connect(
        redis_url: &str,
        queue_key: &str,
        visited_key: &str,
    ) -> FrontierResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let mut con = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<()>(&mut con).await?;
        info!("Connected to frontier store at {redis_url}");
        Ok(Self {
            con: Mutex::new(con),
            queue_key: queue_key.to_string(),
            visited_key: visited_key.to_string(),
        })
    }
}

#[async_trait]
impl FrontierStore for RedisFrontier {
    async fn seed(&self, urls: &[String], clear_existing: bool) -> FrontierResult<usize> {
        let mut con = self.con.lock().await;

        if clear_existing {
            let _: () = con.del(&[&self.queue_key, &self.visited_key]).await?;
            info!("Cleared existing frontier queue and visited set");
        }

        let mut added = 0;
        for raw in urls {
            let Some(url) = urlnorm::normalize(raw) else {
                warn!("Skipping malformed seed URL: {raw}");
                continue;
            };
            let newly_seen: i64 = con.sadd(&self.visited_key, url.as_str()).await?;
            if newly_seen == 0 {
                debug!("Seed already visited, skipping: {url}");
                continue;
            }
            let task = CrawlTask::new(url.clone(), 0);
            let payload = serde_json::to_string(&task)?;
            let _: () = con.rpush(&self.queue_key, payload).await?;
            info!("Seeded frontier with {url}");
            added += 1;
        }
        Ok(added)
    }

    async fn enqueue_if_new(&self, url: &NormalizedUrl, depth: u32) -> FrontierResult<bool> {
        let mut con = self.con.lock().await;
        let newly_seen: i64 = con.sadd(&self.visited_key, url.as_str()).await?;
        if newly_seen == 0 {
            return Ok(false);
        }
        let task = CrawlTask::new(url.clone(), depth);
        let payload = serde_json::to_string(&task)?;
        let _: () = con.rpush(&self.queue_key, payload).await?;
        debug!("Enqueued {url} [depth {depth}]");
        Ok(true)
    }

    async fn dequeue(&self, timeout: Duration) -> FrontierResult<Option<CrawlTask>> {
        let deadline = Instant::now() + timeout;
        let mut con = self.con.lock().await;

        // A malformed blob in the queue is skipped rather than surfaced, so
        // one bad entry cannot wedge every worker that pops it.
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let reply: Option<(String, String)> = con
                .blpop(&self.queue_key, remaining.as_secs_f64().max(0.1))
                .await?;
            let Some((_, payload)) = reply else {
                return Ok(None);
            };
            match serde_json::from_str::<CrawlTask>(&payload) {
                Ok(task) => return Ok(Some(task)),
                Err(e) => {
                    warn!("Discarding malformed frontier task: {e}");
                }
            }
        }
    }

    async fn status(&self) -> FrontierResult<FrontierStatus> {
        let mut con = self.con.lock().await;
        let queue_size: u64 = con.llen(&self.queue_key).await?;
        let visited_size: u64 = con.scard(&self.visited_key).await?;
        Ok(FrontierStatus {
            queue_size,
            visited_size,
        })
    }
}
