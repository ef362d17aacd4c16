//! In-process job queue and worker pool.
//!
//! ```text
//! submit(id) ──► bounded mpsc ──► worker 0..N ──► JobRunner::run
//!                    ▲
//!   reconciler ──────┘  (re-submits jobs still queued in the store)
//! ```
//!
//! An id already waiting in the channel is not sent again. A job may still be
//! delivered more than once; runners must treat a job that is no longer queued
//! as a no-op.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::evaluation::{RunOutcome, StageFailure};
use crate::store::JobStore;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of worker loops.
    pub concurrency: usize,
    /// Capacity of the submission channel.
    pub queue_capacity: usize,
    /// Period of the reconciliation scan. The first scan runs one period after start.
    pub reconcile_interval: Duration,
    /// Queued jobs fetched per scan.
    pub reconcile_batch: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            queue_capacity: 100,
            reconcile_interval: Duration::from_secs(10),
            reconcile_batch: 10,
        }
    }
}

/// Executes one job to completion.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(
        &self,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, StageFailure>;
}

/// Ids sent to the channel and not yet picked up by a worker.
#[derive(Default)]
struct Waiting(StdMutex<HashSet<Uuid>>);

impl Waiting {
    fn ids(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer handle for the pool's queue.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Uuid>,
    waiting: Arc<Waiting>,
    shutdown: CancellationToken,
}

impl JobQueue {
    /// Waits for capacity and enqueues `job_id`. An id that is already waiting
    /// is accepted without taking another slot. Returns `false` if the pool is
    /// shutting down; the job then stays queued in the store.
    pub async fn submit(&self, job_id: Uuid) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if self.waiting.ids().contains(&job_id) {
            return true;
        }

        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return false,
            permit = self.sender.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        // Re-checked under the lock: another submit may have won the race.
        if self.waiting.ids().insert(job_id) {
            permit.send(job_id);
        }
        true
    }
}

/// Fixed set of worker tasks plus the reconciliation task.
pub struct WorkerPool {
    queue: JobQueue,
    shutdown: CancellationToken,
    in_flight: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns the workers and the reconciler. Must be called inside a Tokio runtime.
    pub fn start(runner: Arc<dyn JobRunner>, jobs: Arc<dyn JobStore>, config: WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let waiting = Arc::new(Waiting::default());
        let shutdown = CancellationToken::new();
        let in_flight = CancellationToken::new();
        let queue = JobQueue {
            sender,
            waiting: waiting.clone(),
            shutdown: shutdown.clone(),
        };

        let concurrency = config.concurrency.max(1);
        let mut handles = Vec::with_capacity(concurrency + 1);
        for worker in 0..concurrency {
            handles.push(tokio::spawn(worker_loop(
                worker,
                runner.clone(),
                receiver.clone(),
                waiting.clone(),
                shutdown.clone(),
                in_flight.clone(),
            )));
        }
        handles.push(tokio::spawn(reconcile_loop(
            jobs,
            queue.clone(),
            config.reconcile_interval,
            config.reconcile_batch,
            shutdown.clone(),
        )));

        info!(
            concurrency,
            queue_capacity = config.queue_capacity,
            reconcile_interval_secs = config.reconcile_interval.as_secs(),
            "Worker pool started"
        );

        Self {
            queue,
            shutdown,
            in_flight,
            handles,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Token handed to running jobs. Cancelling it stops their generation
    /// retries at the next attempt boundary.
    pub fn in_flight_token(&self) -> CancellationToken {
        self.in_flight.clone()
    }

    pub fn cancel_in_flight(&self) {
        self.in_flight.cancel();
    }

    /// Stops intake and reconciliation, then waits for in-flight jobs to finish.
    pub async fn stop(&mut self) {
        info!("Stopping worker pool...");
        self.shutdown.cancel();

        for handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.await {
                error!("worker task panicked: {e}");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop(
    worker: usize,
    runner: Arc<dyn JobRunner>,
    receiver: Arc<Mutex<mpsc::Receiver<Uuid>>>,
    waiting: Arc<Waiting>,
    shutdown: CancellationToken,
    in_flight: CancellationToken,
) {
    debug!(worker, "worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job_id) = next else { break };
        waiting.ids().remove(&job_id);

        debug!(worker, %job_id, "picked up job");
        match runner.run(job_id, &in_flight).await {
            Ok(RunOutcome::Completed) => info!(worker, %job_id, "job completed"),
            Ok(RunOutcome::Skipped) => debug!(worker, %job_id, "job skipped"),
            Err(failure) => warn!(worker, %job_id, stage = ?failure.stage, "job failed: {failure}"),
        }
    }

    debug!(worker, "worker stopped");
}

async fn reconcile_loop(
    jobs: Arc<dyn JobStore>,
    queue: JobQueue,
    period: Duration,
    batch: i64,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let pending = match jobs.find_pending_jobs(batch).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Reconciliation skipped: {e}");
                continue;
            }
        };

        if !pending.is_empty() {
            debug!(count = pending.len(), "re-submitting queued jobs");
        }
        for job in pending {
            if !queue.submit(job.id).await {
                break;
            }
        }
    }

    debug!("reconciler stopped");
}
