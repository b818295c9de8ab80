use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use herald_executor::{MetricsSink, PipelineEvent};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{PoolConfig, PoolMode};

/// A unit of work run by the pool.
pub type Job = BoxFuture<'static, ()>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("execution pool is shut down")]
    ShutDown,

    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),
}

/// How a submission was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for an existing worker.
    Queued,
    /// Handed to a newly started worker (or, unbounded, its own task).
    Spawned,
    /// The pool was saturated; the submitter ran the job itself.
    CallerRan,
}

/// Runs dispatch jobs off the publishing path.
///
/// In bounded mode, jobs go to a queue served by `core_workers` long-lived
/// workers. When the queue is full, extra workers are started up to
/// `max_workers`; those exit after `keep_alive` without work. When both the
/// queue and the worker set are full, the submitter runs the job inline.
/// In unbounded mode every job gets its own task.
pub struct ExecutionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    config: PoolConfig,
    tx: parking_lot::Mutex<Option<mpsc::Sender<Job>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Job>>,
    workers: AtomicUsize,
    next_worker_id: AtomicUsize,
    closed: AtomicBool,
    tracker: TaskTracker,
    metrics: Arc<dyn MetricsSink>,
}

impl ExecutionPool {
    pub fn new(config: PoolConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            inner: Arc::new(PoolInner {
                config,
                tx: parking_lot::Mutex::new(Some(tx)),
                rx: tokio::sync::Mutex::new(rx),
                workers: AtomicUsize::new(0),
                next_worker_id: AtomicUsize::new(1),
                closed: AtomicBool::new(false),
                tracker: TaskTracker::new(),
                metrics,
            }),
        }
    }

    /// Hand `job` to the pool.
    ///
    /// Returns once the job is queued or started, or, when the pool is
    /// saturated, once the caller has run it.
    pub async fn submit(&self, job: Job) -> Result<SubmitOutcome, PoolError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        let handle = Handle::try_current().map_err(|e| PoolError::NoRuntime(e.to_string()))?;

        if inner.config.mode == PoolMode::Unbounded {
            inner.tracker.spawn_on(guarded(job), &handle);
            return Ok(SubmitOutcome::Spawned);
        }

        let tx = inner.tx.lock().clone().ok_or(PoolError::ShutDown)?;
        while inner.reserve_worker(inner.config.core_workers) {
            PoolInner::start_worker(inner, &handle, None, true);
        }

        match tx.try_send(job) {
            Ok(()) => Ok(SubmitOutcome::Queued),
            Err(TrySendError::Closed(_)) => Err(PoolError::ShutDown),
            Err(TrySendError::Full(job)) => {
                if inner.reserve_worker(inner.config.max_workers) {
                    PoolInner::start_worker(inner, &handle, Some(job), false);
                    return Ok(SubmitOutcome::Spawned);
                }
                debug!("execution pool saturated, running job on caller");
                inner.metrics.record(&PipelineEvent::CallerRunsFallback);
                guarded(job).await;
                Ok(SubmitOutcome::CallerRan)
            }
        }
    }

    /// Stop intake and wait for queued and in-flight jobs, up to the
    /// configured drain timeout. Returns `false` if the timeout elapsed.
    pub async fn shutdown(&self) -> bool {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            debug!("execution pool already shut down");
        }
        // Workers drain what is queued, then see the closed channel and exit.
        inner.tx.lock().take();
        inner.tracker.close();

        let timeout = inner.config.shutdown_timeout();
        if tokio::time::timeout(timeout, inner.tracker.wait())
            .await
            .is_ok()
        {
            info!("execution pool drained");
            true
        } else {
            warn!(
                timeout_secs = timeout.as_secs(),
                remaining = inner.tracker.len(),
                "execution pool drain timed out"
            );
            false
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Live bounded-mode workers.
    pub fn workers(&self) -> usize {
        self.inner.workers.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl PoolInner {
    /// Claim a worker slot if fewer than `limit` workers are running.
    fn reserve_worker(&self, limit: usize) -> bool {
        self.workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    fn start_worker(inner: &Arc<Self>, handle: &Handle, first: Option<Job>, core: bool) {
        let id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}{id}", inner.config.worker_name_prefix);
        let span = info_span!("pool_worker", worker = %name, core);
        let inner_for_worker = Arc::clone(inner);
        inner.tracker.spawn_on(
            async move {
                debug!("worker started");
                inner_for_worker.run_worker(first, core).await;
                inner_for_worker.workers.fetch_sub(1, Ordering::AcqRel);
                debug!("worker stopped");
            }
            .instrument(span),
            handle,
        );
    }

    async fn run_worker(&self, first: Option<Job>, core: bool) {
        if let Some(job) = first {
            guarded(job).await;
        }
        let keep_alive = self.config.keep_alive();
        loop {
            // Idle workers queue on the receiver lock, so the keep-alive
            // deadline has to cover waiting for the lock too.
            let receive = async { self.rx.lock().await.recv().await };
            let next = if core {
                receive.await
            } else {
                match tokio::time::timeout(keep_alive, receive).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!("worker idle past keep-alive, exiting");
                        return;
                    }
                }
            };
            match next {
                Some(job) => guarded(job).await,
                None => return,
            }
        }
    }
}

impl std::fmt::Debug for ExecutionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionPool")
            .field("mode", &self.inner.config.mode)
            .field("workers", &self.workers())
            .field("closed", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// Run a job, containing any panic so the worker survives.
async fn guarded(job: Job) {
    if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
        error!(
            panic = %crate::dispatcher::panic_message(panic.as_ref()),
            "pool job panicked"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    use herald_executor::PipelineMetrics;
    use tokio::sync::{Semaphore, oneshot};

    use super::*;

    fn bounded(core: usize, max: usize, queue: usize) -> PoolConfig {
        PoolConfig {
            core_workers: core,
            max_workers: max,
            queue_capacity: queue,
            shutdown_timeout_seconds: 5,
            ..PoolConfig::default()
        }
    }

    fn pool(config: PoolConfig) -> (ExecutionPool, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        (ExecutionPool::new(config, metrics.clone()), metrics)
    }

    /// A job that signals when it starts and then waits for a permit.
    fn blocking_job(release: &Arc<Semaphore>) -> (Job, oneshot::Receiver<()>) {
        let (started_tx, started_rx) = oneshot::channel();
        let release = Arc::clone(release);
        let job = async move {
            let _ = started_tx.send(());
            let _permit = release.acquire().await;
        }
        .boxed();
        (job, started_rx)
    }

    fn counting_job(counter: &Arc<AtomicU32>) -> Job {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }

    #[tokio::test]
    async fn bounded_pool_runs_every_job() {
        let (pool, _) = pool(bounded(2, 4, 100));
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..50 {
            let outcome = pool.submit(counting_job(&counter)).await.unwrap();
            assert_eq!(outcome, SubmitOutcome::Queued);
        }
        assert!(pool.shutdown().await);
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn grows_to_max_then_runs_on_caller() {
        let (pool, metrics) = pool(bounded(1, 2, 1));
        let release = Arc::new(Semaphore::new(0));

        // Core worker takes the first job and blocks.
        let (job, started) = blocking_job(&release);
        assert_eq!(pool.submit(job).await.unwrap(), SubmitOutcome::Queued);
        started.await.unwrap();

        // Fills the queue.
        let (job, _queued_started) = blocking_job(&release);
        assert_eq!(pool.submit(job).await.unwrap(), SubmitOutcome::Queued);

        // Queue full: a second worker starts with this job.
        let (job, spawned_started) = blocking_job(&release);
        assert_eq!(pool.submit(job).await.unwrap(), SubmitOutcome::Spawned);
        spawned_started.await.unwrap();
        assert_eq!(pool.workers(), 2);

        // Saturated: the caller runs it.
        let counter = Arc::new(AtomicU32::new(0));
        let outcome = pool.submit(counting_job(&counter)).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::CallerRan);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().caller_runs_fallbacks, 1);

        release.add_permits(3);
        assert!(pool.shutdown().await);
    }

    #[tokio::test(start_paused = true)]
    async fn extra_worker_exits_after_keep_alive() {
        let (pool, _) = pool(PoolConfig {
            keep_alive_seconds: 1,
            ..bounded(1, 2, 1)
        });
        let release = Arc::new(Semaphore::new(0));

        let (job, started) = blocking_job(&release);
        pool.submit(job).await.unwrap();
        started.await.unwrap();
        let (job, _) = blocking_job(&release);
        assert_eq!(pool.submit(job).await.unwrap(), SubmitOutcome::Queued);
        let (job, spawned_started) = blocking_job(&release);
        assert_eq!(pool.submit(job).await.unwrap(), SubmitOutcome::Spawned);
        spawned_started.await.unwrap();
        assert_eq!(pool.workers(), 2);

        // The core worker drains the queue and idles holding the receiver.
        release.add_permits(3);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(pool.workers(), 1);

        // The core worker still serves new work.
        let counter = Arc::new(AtomicU32::new(0));
        assert_eq!(
            pool.submit(counting_job(&counter)).await.unwrap(),
            SubmitOutcome::Queued
        );
        assert!(pool.shutdown().await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn submissions_after_shutdown_are_rejected() {
        let (pool, _) = pool(bounded(1, 1, 10));
        assert!(pool.shutdown().await);
        assert!(pool.is_shut_down());
        let counter = Arc::new(AtomicU32::new(0));
        let err = pool.submit(counting_job(&counter)).await.unwrap_err();
        assert!(matches!(err, PoolError::ShutDown));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_drain_timeout() {
        let (pool, _) = pool(PoolConfig {
            shutdown_timeout_seconds: 1,
            ..bounded(1, 1, 10)
        });
        let never = Arc::new(Semaphore::new(0));
        let (job, started) = blocking_job(&never);
        pool.submit(job).await.unwrap();
        started.await.unwrap();
        assert!(!pool.shutdown().await);
    }

    #[tokio::test]
    async fn unbounded_pool_spawns_per_job() {
        let (pool, _) = pool(PoolConfig {
            mode: PoolMode::Unbounded,
            ..PoolConfig::default()
        });
        let counter = Arc::new(AtomicU32::new(0));
        for _ in 0..20 {
            let outcome = pool.submit(counting_job(&counter)).await.unwrap();
            assert_eq!(outcome, SubmitOutcome::Spawned);
        }
        assert!(pool.shutdown().await);
        assert_eq!(counter.load(Ordering::SeqCst), 20);
        assert_eq!(pool.workers(), 0);
    }

    #[tokio::test]
    async fn panicking_job_does_not_kill_the_worker() {
        let (pool, _) = pool(bounded(1, 1, 10));
        pool.submit(async { panic!("job exploded") }.boxed())
            .await
            .unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        pool.submit(counting_job(&counter)).await.unwrap();
        assert!(pool.shutdown().await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn submit_without_runtime_is_an_error() {
        let (pool, _) = pool(bounded(1, 1, 1));
        let counter = Arc::new(AtomicU32::new(0));
        let result = futures::executor::block_on(pool.submit(counting_job(&counter)));
        assert!(matches!(result, Err(PoolError::NoRuntime(_))));
    }
}
