//! In-memory [`FrontierStore`] implementation for tests and embedded runs.
//!
//! A `VecDeque` plus `HashSet` behind one `std::sync` mutex, with a
//! `tokio::sync::Notify` providing the blocking-pop wakeup. Not durable
//! across restarts; everything else matches the contract, including the
//! atomic check-and-set (the mutex serializes it).

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::urlnorm::{self, NormalizedUrl};

use super::{CrawlTask, FrontierResult, FrontierStatus, FrontierStore};

#[derive(Default)]
struct Inner {
    queue: VecDeque<CrawlTask>,
    visited: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryFrontier {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl MemoryFrontier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FrontierStore for MemoryFrontier {
    async fn seed(&self, urls: &[String], clear_existing: bool) -> FrontierResult<usize> {
        let mut inner = self.lock();
        if clear_existing {
            inner.queue.clear();
            inner.visited.clear();
        }
        let mut added = 0;
        for raw in urls {
            let Some(url) = urlnorm::normalize(raw) else {
                continue;
            };
            if inner.visited.insert(url.as_str().to_string()) {
                inner.queue.push_back(CrawlTask::new(url, 0));
                added += 1;
            }
        }
        drop(inner);
        for _ in 0..added {
            self.notify.notify_one();
        }
        Ok(added)
    }

    async fn enqueue_if_new(&self, url: &NormalizedUrl, depth: u32) -> FrontierResult<bool> {
        let newly_seen = {
            let mut inner = self.lock();
            if inner.visited.insert(url.as_str().to_string()) {
                inner.queue.push_back(CrawlTask::new(url.clone(), depth));
                true
            } else {
                false
            }
        };
        if newly_seen {
            self.notify.notify_one();
        }
        Ok(newly_seen)
    }

    async fn dequeue(&self, timeout: Duration) -> FrontierResult<Option<CrawlTask>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeup before checking the queue so an enqueue
            // between the check and the wait is not missed.
            let notified = self.notify.notified();
            if let Some(task) = self.lock().queue.pop_front() {
                return Ok(Some(task));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn status(&self) -> FrontierResult<FrontierStatus> {
        let inner = self.lock();
        Ok(FrontierStatus {
            queue_size: inner.queue.len() as u64,
            visited_size: inner.visited.len() as u64,
        })
    }
}
