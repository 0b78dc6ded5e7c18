//! The per-worker crawl loop.
//!
//! Each worker independently cycles dequeue -> fetch -> persist -> extract
//! -> enqueue against the shared frontier. A timed-out dequeue means the
//! frontier stayed empty for the whole window and the worker stops; an
//! explicit shutdown signal stops it at the next pop boundary or after the
//! current task. Any error while processing a single page is logged and
//! the loop moves on — one bad page never takes a worker down.
//!
//! Shutdown is never allowed to cancel a pop already in flight: a blocking
//! pop removes the task from the queue on the backend, so dropping the
//! future mid-await would lose that task (popped, marked visited, never
//! processed). Instead each pop call is bounded to a short sub-window and
//! the shutdown flag is checked between calls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::CrawlConfig;
use crate::content_saver::{ContentKind, ContentSaver};
use crate::extract;
use crate::fetch::FetchClient;
use crate::frontier::{CrawlTask, FrontierResult, FrontierStore};
use crate::screenshot::ScreenshotHandle;
use crate::urlnorm::NormalizedUrl;

/// Attempts made against the frontier before a failure is considered
/// fatal to this worker.
const FRONTIER_RETRIES: u32 = 3;
/// Initial backoff between frontier retries; doubles per attempt.
const FRONTIER_BACKOFF: Duration = Duration::from_millis(500);
/// Upper bound on a single blocking-pop call, so every pop runs to
/// completion and shutdown is observed between calls rather than by
/// cancelling one.
const DEQUEUE_POLL_WINDOW: Duration = Duration::from_secs(1);

/// Counters a worker reports when its loop ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerReport {
    pub pages_processed: u64,
    pub links_enqueued: u64,
}

pub struct CrawlWorker {
    id: usize,
    config: CrawlConfig,
    frontier: Arc<dyn FrontierStore>,
    fetcher: Arc<FetchClient>,
    saver: Arc<ContentSaver>,
    screenshots: Option<ScreenshotHandle>,
    shutdown: watch::Receiver<bool>,
}

impl CrawlWorker {
    pub fn new(
        id: usize,
        config: CrawlConfig,
        frontier: Arc<dyn FrontierStore>,
        fetcher: Arc<FetchClient>,
        saver: Arc<ContentSaver>,
        screenshots: Option<ScreenshotHandle>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            config,
            frontier,
            fetcher,
            saver,
            screenshots,
            shutdown,
        }
    }

    /// Run the loop to completion (drained frontier, shutdown signal, or a
    /// frontier failure that survived retries).
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::default();
        let dequeue_timeout = Duration::from_secs(self.config.dequeue_timeout_secs());

        loop {
            let task = match self.next_task(dequeue_timeout).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    if *self.shutdown.borrow() {
                        info!("Worker {} stopping on shutdown signal", self.id);
                    } else {
                        info!(
                            "Worker {}: frontier empty for {}s, crawl complete",
                            self.id,
                            dequeue_timeout.as_secs()
                        );
                    }
                    break;
                }
                Err(e) => {
                    error!("Worker {}: frontier unavailable, giving up: {e}", self.id);
                    break;
                }
            };

            match self.process_task(&task).await {
                Ok(enqueued) => {
                    report.pages_processed += 1;
                    report.links_enqueued += enqueued;
                }
                Err(e) => {
                    // Per-task failures are local; the loop continues.
                    warn!("Worker {}: task failed for {}: {e:#}", self.id, task.url);
                    report.pages_processed += 1;
                }
            }
        }

        info!(
            "Worker {} done: {} pages processed, {} links enqueued",
            self.id, report.pages_processed, report.links_enqueued
        );
        report
    }

    /// Pop the next task, honoring the shutdown flag without ever dropping
    /// a pop in flight. Each underlying pop call is bounded to a short
    /// sub-window and awaited to completion; the flag is consulted only at
    /// the boundaries. `Ok(None)` means shutdown or a drained frontier —
    /// the caller disambiguates via the flag.
    async fn next_task(&self, total: Duration) -> FrontierResult<Option<CrawlTask>> {
        let deadline = Instant::now() + total;
        loop {
            if *self.shutdown.borrow() {
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let window = remaining.min(DEQUEUE_POLL_WINDOW);
            if let Some(task) = dequeue_with_retry(self.frontier.as_ref(), window).await? {
                return Ok(Some(task));
            }
        }
    }

    /// Handle one task: fetch, persist text, discover and enqueue links,
    /// request a screenshot. Returns the number of newly enqueued links.
    async fn process_task(&self, task: &CrawlTask) -> Result<u64> {
        info!("Worker {} processing [depth {}]: {}", self.id, task.depth, task.url);

        // A None here means either a failed fetch or binary content the
        // fetch client already handed to the saver; both end the task.
        let Some(html) = self.fetcher.fetch(&task.url).await else {
            return Ok(0);
        };

        let text = extract::extract_text(&html);
        if !text.is_empty() {
            self.saver
                .save(task.url.as_str(), ContentKind::Text, text.as_bytes())
                .await;
        }

        let mut enqueued = 0;
        if task.depth < self.config.max_depth() {
            for link in extract::extract_links(&html, &task.url) {
                match self.enqueue_with_retry(&link, task.depth + 1).await {
                    Ok(true) => enqueued += 1,
                    Ok(false) => {}
                    Err(e) => warn!("Worker {}: dropping discovered link {link}: {e}", self.id),
                }
            }
        } else {
            debug!("Depth cutoff reached for {}, discarding links", task.url);
        }

        if let Some(handle) = &self.screenshots {
            handle.submit(task.url.as_str());
        }

        Ok(enqueued)
    }

    /// One retry before a discovered link is (loudly) dropped; a transient
    /// frontier hiccup must not silently shrink the crawl.
    async fn enqueue_with_retry(&self, url: &NormalizedUrl, depth: u32) -> FrontierResult<bool> {
        match self.frontier.enqueue_if_new(url, depth).await {
            Ok(added) => Ok(added),
            Err(first) => {
                warn!("Enqueue failed for {url}, retrying once: {first}");
                tokio::time::sleep(FRONTIER_BACKOFF).await;
                self.frontier.enqueue_if_new(url, depth).await
            }
        }
    }
}

/// Dequeue with bounded retry and doubling backoff. Exhausted retries
/// surface the last error to the caller, which treats it as fatal.
async fn dequeue_with_retry(
    frontier: &dyn FrontierStore,
    timeout: Duration,
) -> FrontierResult<Option<CrawlTask>> {
    let mut backoff = FRONTIER_BACKOFF;
    let mut attempt = 1;
    loop {
        match frontier.dequeue(timeout).await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < FRONTIER_RETRIES => {
                warn!("Dequeue attempt {attempt}/{FRONTIER_RETRIES} failed, backing off: {e}");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
