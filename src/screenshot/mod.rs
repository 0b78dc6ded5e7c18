//! Supervised browser pool for out-of-band page rendering.
//!
//! Rendering runs in its own concurrency domain, separate from the fetch
//! path: a handful of expensive, crash-prone browser processes rather than
//! many cheap I/O waits. The supervisor owns the pool, detects crashed
//! instances, and replaces them while consecutive launch failures stay
//! under the configured threshold; past it the pool runs degraded (reduced
//! or empty) without ever failing the crawl.
//!
//! A bounded queue feeds the pool. A task that arrives while no instance
//! is ready is requeued rather than dropped, and the supervisor attempts
//! lazy replenishment. Instances move `Ready -> Busy -> Ready` through an
//! acquire/return pair; a capture error discards the instance on the spot.
//!
//! The supervisor is generic over [`RenderBackend`], with
//! [`ChromiumBackend`] as the production implementation; pool lifecycle
//! logic is exercised in tests against a scripted backend.

mod browser;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CrawlConfig;
use crate::content_saver::ContentSaver;

pub use browser::BrowserInstance;

/// Pause before retrying when the pool has no ready instance.
const REPLENISH_BACKOFF: Duration = Duration::from_millis(500);
/// Per-instance bound on a graceful browser close at shutdown.
const BROWSER_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Seam between the pool supervisor and the browser runtime: launching an
/// instance, capturing one page on it, and closing it gracefully.
#[async_trait]
pub trait RenderBackend: Send + Sync + 'static {
    type Instance: Send + 'static;

    async fn launch(&self, id: u64) -> Result<Self::Instance>;

    /// Capture `url` on `instance`. An `Err` marks the instance as suspect;
    /// the supervisor discards it and attempts a replacement.
    async fn capture(&self, instance: &Self::Instance, url: &str) -> Result<()>;

    async fn close(&self, instance: Self::Instance);
}

/// Production backend: chromiumoxide browsers writing PNG captures through
/// the content saver.
pub struct ChromiumBackend {
    config: CrawlConfig,
    saver: Arc<ContentSaver>,
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    type Instance = BrowserInstance;

    async fn launch(&self, id: u64) -> Result<BrowserInstance> {
        BrowserInstance::launch(id, &self.config).await
    }

    async fn capture(&self, instance: &BrowserInstance, url: &str) -> Result<()> {
        instance.capture(url, &self.saver, &self.config).await
    }

    async fn close(&self, instance: BrowserInstance) {
        instance.close(BROWSER_CLOSE_GRACE).await;
    }
}

/// Handle for submitting screenshot tasks. Fire-and-forget: submission
/// never blocks the crawl worker.
#[derive(Clone)]
pub struct ScreenshotHandle {
    tx: mpsc::Sender<String>,
}

impl ScreenshotHandle {
    /// Queue a URL for capture. Returns false (and logs) when the queue is
    /// full; a crawl worker treats that as a skipped screenshot, not an
    /// error.
    pub fn submit(&self, url: &str) -> bool {
        match self.tx.try_send(url.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Screenshot queue full, skipping: {url}");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Screenshot supervisor stopped, skipping: {url}");
                false
            }
        }
    }
}

/// Shared pool state, cloned into capture tasks.
struct PoolState<B: RenderBackend> {
    backend: B,
    max_launch_failures: u32,
    ready: Mutex<VecDeque<(u64, B::Instance)>>,
    launch_failures: AtomicU32,
    in_flight: AtomicUsize,
    next_id: AtomicU64,
}

impl<B: RenderBackend> PoolState<B> {
    /// Launch one replacement instance if the failure budget allows it.
    async fn try_launch(&self) -> Option<(u64, B::Instance)> {
        if self.launch_failures.load(Ordering::Relaxed) >= self.max_launch_failures {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.backend.launch(id).await {
            Ok(instance) => {
                self.launch_failures.store(0, Ordering::Relaxed);
                Some((id, instance))
            }
            Err(e) => {
                let failures = self.launch_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Browser launch failed ({failures}/{}): {e:#}",
                    self.max_launch_failures
                );
                if failures >= self.max_launch_failures {
                    warn!("Browser launch failure threshold reached, pool running degraded");
                }
                None
            }
        }
    }

    fn replenishment_possible(&self) -> bool {
        self.launch_failures.load(Ordering::Relaxed) < self.max_launch_failures
            || self.in_flight.load(Ordering::Relaxed) > 0
    }
}

/// Decrements the in-flight counter on every exit path of a capture task.
struct InFlightGuard<B: RenderBackend>(Arc<PoolState<B>>);

impl<B: RenderBackend> Drop for InFlightGuard<B> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct ScreenshotSupervisor<B: RenderBackend = ChromiumBackend> {
    state: Arc<PoolState<B>>,
    loop_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ScreenshotSupervisor<ChromiumBackend> {
    /// Fill the pool and start the dispatch loop.
    ///
    /// Launch failures during pool fill are not fatal; the supervisor comes
    /// up with whatever instances it managed to start (possibly zero) and
    /// keeps trying lazily as tasks arrive.
    pub async fn start(
        config: CrawlConfig,
        saver: Arc<ContentSaver>,
    ) -> (Self, ScreenshotHandle) {
        let workers = config.screenshot_workers();
        let queue_size = config.screenshot_queue_size();
        let max_launch_failures = config.max_launch_failures();
        let backend = ChromiumBackend { config, saver };
        Self::start_with_backend(backend, workers, queue_size, max_launch_failures).await
    }
}

impl<B: RenderBackend> ScreenshotSupervisor<B> {
    async fn start_with_backend(
        backend: B,
        workers: usize,
        queue_size: usize,
        max_launch_failures: u32,
    ) -> (Self, ScreenshotHandle) {
        let (tx, rx) = mpsc::channel(queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = Arc::new(PoolState {
            backend,
            max_launch_failures,
            ready: Mutex::new(VecDeque::new()),
            launch_failures: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
        });

        for i in 0..workers {
            match state.try_launch().await {
                Some(entry) => state.ready.lock().await.push_back(entry),
                None => {
                    debug!("Pool fill stopped after {i} of {workers} instances");
                    break;
                }
            }
        }
        let ready_count = state.ready.lock().await.len();
        info!("Screenshot pool started with {ready_count}/{workers} browser instances");

        let loop_state = Arc::clone(&state);
        let loop_tx = tx.clone();
        let loop_handle = tokio::spawn(async move {
            supervisor_loop(loop_state, rx, loop_tx, shutdown_rx).await;
        });

        (
            Self {
                state,
                loop_handle,
                shutdown_tx,
            },
            ScreenshotHandle { tx },
        )
    }

    /// Stop intake, wait out in-flight captures up to `grace`, then close
    /// every pooled browser (gracefully, with a per-instance bound).
    pub async fn shutdown(self, grace: Duration) {
        info!("Shutting down screenshot supervisor");
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.loop_handle.await {
            warn!("Supervisor loop ended abnormally: {e}");
        }

        let deadline = tokio::time::Instant::now() + grace;
        while self.state.in_flight.load(Ordering::Relaxed) > 0
            && tokio::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let stragglers = self.state.in_flight.load(Ordering::Relaxed);
        if stragglers > 0 {
            warn!("{stragglers} capture task(s) still running at shutdown, abandoning");
        }

        loop {
            let entry = self.state.ready.lock().await.pop_front();
            let Some((id, instance)) = entry else { break };
            debug!("Closing pooled browser instance {id}");
            self.state.backend.close(instance).await;
        }
        info!("Screenshot supervisor shut down");
    }
}

async fn supervisor_loop<B: RenderBackend>(
    state: Arc<PoolState<B>>,
    mut rx: mpsc::Receiver<String>,
    requeue_tx: mpsc::Sender<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let url = tokio::select! {
            _ = shutdown_rx.changed() => break,
            task = rx.recv() => match task {
                Some(url) => url,
                None => break,
            },
        };

        let entry = {
            let mut ready = state.ready.lock().await;
            ready.pop_front()
        };

        match entry {
            Some((id, instance)) => {
                state.in_flight.fetch_add(1, Ordering::Relaxed);
                let task_state = Arc::clone(&state);
                tokio::spawn(async move {
                    let _guard = InFlightGuard(Arc::clone(&task_state));
                    capture_task(task_state, id, instance, url).await;
                });
            }
            None => {
                // Lazy replenishment, then give the task back to the queue.
                if let Some(entry) = state.try_launch().await {
                    state.ready.lock().await.push_back(entry);
                }
                if state.replenishment_possible() || !state.ready.lock().await.is_empty() {
                    if requeue_tx.try_send(url.clone()).is_err() {
                        warn!("Could not requeue screenshot task, dropping: {url}");
                    }
                } else {
                    warn!("No browser instances available (degraded), dropping: {url}");
                }
                tokio::time::sleep(REPLENISH_BACKOFF).await;
            }
        }
    }
    debug!("Screenshot supervisor loop exiting");
}

/// Run one capture. Success returns the instance to the pool; failure
/// discards it and attempts a replacement so the pool heals after a crash.
async fn capture_task<B: RenderBackend>(
    state: Arc<PoolState<B>>,
    id: u64,
    instance: B::Instance,
    url: String,
) {
    info!("Capturing screenshot: {url}");
    match state.backend.capture(&instance, &url).await {
        Ok(()) => {
            state.ready.lock().await.push_back((id, instance));
        }
        Err(e) => {
            warn!("Capture failed on instance {id}, discarding it: {e:#}");
            drop(instance);
            if let Some(replacement) = state.try_launch().await {
                state.ready.lock().await.push_back(replacement);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct BackendStats {
        launches: AtomicUsize,
        captures: AtomicUsize,
        captured: StdMutex<Vec<String>>,
    }

    /// Backend whose first N launches and first M captures fail.
    struct ScriptedBackend {
        stats: Arc<BackendStats>,
        failing_launches: usize,
        failing_captures: usize,
    }

    struct FakeInstance;

    #[async_trait]
    impl RenderBackend for ScriptedBackend {
        type Instance = FakeInstance;

        async fn launch(&self, _id: u64) -> Result<FakeInstance> {
            let n = self.stats.launches.fetch_add(1, Ordering::SeqCst);
            if n < self.failing_launches {
                anyhow::bail!("browser refused to start");
            }
            Ok(FakeInstance)
        }

        async fn capture(&self, _instance: &FakeInstance, url: &str) -> Result<()> {
            let n = self.stats.captures.fetch_add(1, Ordering::SeqCst);
            if n < self.failing_captures {
                anyhow::bail!("renderer crashed");
            }
            self.stats.captured.lock().unwrap().push(url.to_string());
            Ok(())
        }

        async fn close(&self, _instance: FakeInstance) {}
    }

    fn scripted(
        failing_launches: usize,
        failing_captures: usize,
    ) -> (ScriptedBackend, Arc<BackendStats>) {
        let stats = Arc::new(BackendStats::default());
        (
            ScriptedBackend {
                stats: Arc::clone(&stats),
                failing_launches,
                failing_captures,
            },
            stats,
        )
    }

    async fn wait_for(stats: &BackendStats, cond: impl Fn(&BackendStats) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !cond(stats) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "pool never reached the expected state"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn failed_capture_discards_instance_and_launches_replacement() {
        let (backend, stats) = scripted(0, 1);
        let (supervisor, handle) =
            ScreenshotSupervisor::start_with_backend(backend, 1, 8, 3).await;
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);

        assert!(handle.submit("http://a.onion/"));
        // The crashed instance is replaced without waiting for another task.
        wait_for(&stats, |s| s.launches.load(Ordering::SeqCst) == 2).await;
        wait_for(&stats, |_| {
            supervisor
                .state
                .ready
                .try_lock()
                .is_ok_and(|ready| ready.len() == 1)
        })
        .await;

        // The replacement serves the next task normally.
        assert!(handle.submit("http://b.onion/"));
        wait_for(&stats, |s| {
            s.captured
                .lock()
                .unwrap()
                .contains(&"http://b.onion/".to_string())
        })
        .await;

        supervisor.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn task_is_requeued_until_a_launch_succeeds() {
        // Pool fill fails once, the first lazy replenishment fails too, the
        // next succeeds; the submitted task must survive the gap.
        let (backend, stats) = scripted(2, 0);
        let (supervisor, handle) =
            ScreenshotSupervisor::start_with_backend(backend, 1, 8, 3).await;
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);

        assert!(handle.submit("http://slow.onion/"));
        wait_for(&stats, |s| {
            s.captured
                .lock()
                .unwrap()
                .contains(&"http://slow.onion/".to_string())
        })
        .await;
        assert_eq!(stats.launches.load(Ordering::SeqCst), 3);
        assert_eq!(stats.captures.load(Ordering::SeqCst), 1);

        supervisor.shutdown(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn degraded_pool_drops_tasks_instead_of_spinning() {
        // Every launch fails and the threshold is 1: the fill attempt
        // exhausts the budget, so a submitted task is dropped rather than
        // requeued forever.
        let (backend, stats) = scripted(usize::MAX, 0);
        let (supervisor, handle) =
            ScreenshotSupervisor::start_with_backend(backend, 1, 8, 1).await;
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);

        assert!(handle.submit("http://doomed.onion/"));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(stats.captured.lock().unwrap().is_empty());
        // No further launch attempts past the threshold.
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);

        supervisor.shutdown(Duration::from_millis(200)).await;
    }
}
