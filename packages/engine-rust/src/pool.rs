//! Bounded worker pools.
//!
//! A `WorkerPool` owns a dedicated multi-thread runtime and two semaphores:
//! admission (`max_threads + queue_length` permits) decides whether a work
//! unit is accepted at all, execution (`max_threads` permits) bounds how many
//! accepted units run at once. Each running unit gets a blocking-pool thread of
//! its own, so a mediator may block on synchronous I/O without stalling the
//! others. Those threads grow up to `max_threads` and retire after
//! `keep_alive` when idle. Submission never blocks: a full pool hands the work
//! unit straight back to the caller.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::PoolConfig;

// ---------------------------------------------------------------------------
// Runnable
// ---------------------------------------------------------------------------

/// A unit of work executed once on a pool thread.
#[async_trait]
pub trait Runnable: Send + 'static {
    async fn run(self);
}

/// Returned by [`WorkerPool::try_execute`] when the pool is saturated. Carries
/// the rejected work unit so the caller can run it some other way.
#[derive(Debug)]
pub struct Rejected<T>(pub T);

impl<T> Rejected<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

pub struct WorkerPool {
    config: PoolConfig,
    runtime: Option<Runtime>,
    admission: Arc<Semaphore>,
    execution: Arc<Semaphore>,
}

impl WorkerPool {
    /// Start the pool's threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot spawn its threads.
    pub fn new(config: PoolConfig) -> std::io::Result<Self> {
        let prefix = config.thread_name_prefix.clone();
        let next_id = AtomicUsize::new(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.core_threads.max(1))
            .max_blocking_threads(config.max_threads.max(1))
            .thread_keep_alive(config.keep_alive)
            .thread_name_fn(move || format!("{prefix}-{}", next_id.fetch_add(1, Ordering::Relaxed)))
            .enable_all()
            .build()?;

        debug!(
            group = %config.thread_group,
            core_threads = config.core_threads,
            max_threads = config.max_threads,
            queue_length = config.queue_length,
            "worker pool started"
        );

        Ok(Self {
            admission: Arc::new(Semaphore::new(config.capacity())),
            execution: Arc::new(Semaphore::new(config.max_threads)),
            runtime: Some(runtime),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Thread-name prefix, which doubles as the pool's name in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.thread_name_prefix
    }

    /// Accepted work units, running or waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.config.capacity() - self.admission.available_permits()
    }

    /// Work units currently executing.
    #[must_use]
    pub fn active(&self) -> usize {
        self.config.max_threads - self.execution.available_permits()
    }

    /// Submit `work` without waiting.
    ///
    /// # Errors
    ///
    /// Returns the work unit back inside [`Rejected`] when every thread is busy
    /// and the queue is full, or after the pool was shut down.
    pub fn try_execute<W: Runnable>(&self, work: W) -> Result<(), Rejected<W>> {
        let Some(runtime) = &self.runtime else {
            return Err(Rejected(work));
        };
        let Ok(admitted) = Arc::clone(&self.admission).try_acquire_owned() else {
            counter!("relaybus_pool_rejected_total", "pool" => self.name().to_string()).increment(1);
            return Err(Rejected(work));
        };
        counter!("relaybus_pool_submitted_total", "pool" => self.name().to_string()).increment(1);

        let execution = Arc::clone(&self.execution);
        let pool = self.name().to_string();
        let handle = runtime.handle().clone();
        runtime.spawn(async move {
            let _admitted = admitted;
            let Ok(_running) = execution.acquire_owned().await else {
                warn!(pool = %pool, "worker pool closed before work unit could start");
                return;
            };
            let unit = tokio::task::spawn_blocking(move || handle.block_on(work.run()));
            if let Err(e) = unit.await {
                warn!(pool = %pool, error = %e, "work unit did not complete");
            }
        });
        Ok(())
    }

    /// Stop accepting work and release the threads without waiting for
    /// in-flight units.
    pub fn shutdown(&mut self) {
        self.admission.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            debug!(pool = %self.config.thread_name_prefix, "worker pool shut down");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name())
            .field("pending", &self.pending())
            .field("active", &self.active())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use super::*;

    fn small_pool(max_threads: usize, queue_length: usize) -> WorkerPool {
        WorkerPool::new(PoolConfig {
            core_threads: 1,
            max_threads,
            keep_alive: Duration::from_secs(1),
            queue_length,
            thread_group: "test-group".to_string(),
            thread_name_prefix: "TestWorker".to_string(),
        })
        .unwrap()
    }

    #[derive(Debug)]
    struct Gated {
        gate: Arc<Semaphore>,
        done: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Runnable for Gated {
        async fn run(self) {
            let _permit = self.gate.acquire().await.unwrap();
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug)]
    struct ReportThread(mpsc::Sender<Option<String>>);

    #[async_trait]
    impl Runnable for ReportThread {
        async fn run(self) {
            let name = std::thread::current().name().map(str::to_owned);
            let _ = self.0.send(name);
        }
    }

    fn wait_for(done: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) < expected {
            assert!(Instant::now() < deadline, "work did not finish in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn runs_on_named_pool_threads() {
        let pool = small_pool(2, 0);
        let (tx, rx) = mpsc::channel();
        pool.try_execute(ReportThread(tx)).unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("TestWorker-"), "unexpected thread name {name}");
    }

    #[derive(Debug)]
    struct BlockingCall {
        hold: Duration,
        report: mpsc::Sender<Option<String>>,
    }

    #[async_trait]
    impl Runnable for BlockingCall {
        async fn run(self) {
            std::thread::sleep(self.hold);
            let _ = self.report.send(std::thread::current().name().map(str::to_owned));
        }
    }

    #[test]
    fn blocking_units_grow_past_core_threads() {
        let pool = small_pool(2, 0);
        let (tx, rx) = mpsc::channel();
        let started = Instant::now();
        for _ in 0..2 {
            pool.try_execute(BlockingCall {
                hold: Duration::from_millis(400),
                report: tx.clone(),
            })
            .unwrap();
        }

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        let elapsed = started.elapsed();

        assert_ne!(first, second, "both units ran on {first}");
        assert!(first.starts_with("TestWorker-") && second.starts_with("TestWorker-"));
        assert!(elapsed < Duration::from_millis(750), "units ran one after the other: {elapsed:?}");
    }

    #[test]
    fn rejects_once_threads_and_queue_are_full() {
        let pool = small_pool(2, 1);
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));
        let gated = || Gated {
            gate: Arc::clone(&gate),
            done: Arc::clone(&done),
        };

        for _ in 0..3 {
            pool.try_execute(gated()).unwrap();
        }
        let rejected = pool.try_execute(gated()).unwrap_err();
        assert_eq!(pool.pending(), 3);

        gate.add_permits(100);
        wait_for(&done, 3);

        // Capacity frees up once earlier units finish; the handed-back unit is
        // still usable.
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut work = rejected.into_inner();
        loop {
            match pool.try_execute(work) {
                Ok(()) => break,
                Err(Rejected(back)) => {
                    assert!(Instant::now() < deadline, "pool never drained");
                    std::thread::sleep(Duration::from_millis(5));
                    work = back;
                }
            }
        }
        wait_for(&done, 4);
    }

    #[test]
    fn shut_down_pool_rejects() {
        let mut pool = small_pool(1, 1);
        pool.shutdown();
        let done = Arc::new(AtomicUsize::new(0));
        let result = pool.try_execute(Gated {
            gate: Arc::new(Semaphore::new(1)),
            done,
        });
        assert!(result.is_err());
    }
}
