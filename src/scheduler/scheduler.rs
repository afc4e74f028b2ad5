//! Interval Scheduler
//!
//! Runs named jobs once per interval on the tokio runtime. A job never overlaps
//! with itself: ticks that fall due while a run is still going are skipped, so a
//! slow job cannot build up a backlog. Each run is its own task with a timeout
//! budget, and a failed, panicked or timed-out run does not affect later ones.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// A type-erased job body, invoked once per tick.
pub type JobFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub name: String,
    pub interval: Duration,
    /// Budget for one run; an overrun counts as a failed run.
    pub timeout: Duration,
    /// Fire the first run at start-up instead of one interval later.
    pub run_immediately: bool,
}

impl JobConfig {
    pub fn new(name: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            timeout,
            run_immediately: false,
        }
    }

    pub fn run_immediately(mut self, run_immediately: bool) -> Self {
        self.run_immediately = run_immediately;
        self
    }
}

#[derive(Debug, Default)]
pub struct JobStats {
    pub runs: AtomicU64,
    pub failures: AtomicU64,
    pub timeouts: AtomicU64,
}

impl JobStats {
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

pub struct Scheduler {
    shutdown: watch::Receiver<bool>,
    jobs: Vec<(String, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown,
            jobs: Vec::new(),
        }
    }

    /// Starts a job loop and returns its counters.
    pub fn schedule<F, Fut>(&mut self, job: JobConfig, task: F) -> Arc<JobStats>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task: JobFn = Arc::new(move || Box::pin(task()));
        self.schedule_fn(job, task)
    }

    pub fn schedule_fn(&mut self, job: JobConfig, task: JobFn) -> Arc<JobStats> {
        let stats = Arc::new(JobStats::default());
        let name = job.name.clone();

        tracing::info!(
            job = %job.name,
            interval_secs = job.interval.as_secs(),
            timeout_secs = job.timeout.as_secs(),
            "scheduled job"
        );

        let handle = tokio::spawn(run_job(job, task, stats.clone(), self.shutdown.clone()));
        self.jobs.push((name, handle));
        stats
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Waits for every job loop to exit. Loops exit once shutdown is signalled.
    pub async fn join(self) {
        for (name, handle) in self.jobs {
            if let Err(e) = handle.await {
                tracing::error!(job = %name, "job loop panicked: {}", e);
            }
        }
    }
}

async fn run_job(
    job: JobConfig,
    task: JobFn,
    stats: Arc<JobStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = job.interval.max(Duration::from_millis(1));
    let start = if job.run_immediately {
        Instant::now()
    } else {
        Instant::now() + interval
    };
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        tracing::info!(job = %job.name, "job run starting");
        stats.runs.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let body = task.clone();
        let mut run = tokio::spawn(async move { body().await });

        let outcome = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {
                tracing::warn!(job = %job.name, "shutdown during job run, abandoning it");
                run.abort();
                break;
            }
            outcome = tokio::time::timeout(job.timeout, &mut run) => outcome,
        };

        match outcome {
            Ok(Ok(Ok(()))) => {
                tracing::info!(job = %job.name, elapsed_ms = started.elapsed().as_millis() as u64, "job run finished");
            }
            Ok(Ok(Err(e))) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(job = %job.name, "job run failed: {:#}", e);
            }
            Ok(Err(e)) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(job = %job.name, "job run panicked: {}", e);
            }
            Err(_) => {
                run.abort();
                stats.failures.fetch_add(1, Ordering::Relaxed);
                stats.timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::error!(job = %job.name, "job run exceeded its {:?} budget", job.timeout);
            }
        }
    }

    tracing::info!(job = %job.name, "job loop stopped");
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
