//! JobEngine — a fixed pool of workers draining an unbounded queue.
//!
//! ```text
//! submit ──► store (queued) ──► mpsc queue ──► worker N
//!                                               ├── claim entity keys ──► busy? defer, next job
//!                                               ├── queued → in_progress
//!                                               ├── JobRunner::run
//!                                               ├── completed | error
//!                                               └── release keys ──► wake deferred jobs
//! ```
//!
//! Callers never wait on a job; they poll its record. The store record is
//! the durable queue, so the channel never pushes back on `submit`. Jobs
//! whose entity keys overlap run one after another in submission order;
//! everything else runs in parallel up to the worker count. A job waiting on
//! a busy entity holds no worker and stays `queued`.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use strata_core::config::JobsConfig;

use crate::error::{JobError, JobResult};
use crate::runner::JobRunner;
use crate::store::JobStore;
use crate::types::{Job, JobRequest, JobStatus};

/// Result recorded for jobs cut off by a restart.
pub const INTERRUPTED: &str = "interrupted: the engine restarted while the job was running";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

impl From<&JobsConfig> for EngineConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            workers: config.workers,
        }
    }
}

/// A unit of work on the queue.
#[derive(Debug)]
enum Dispatch {
    /// Submitted or recovered; its keys still have to be claimed.
    Fresh(String),
    /// Woken from the deferred list with its keys already claimed for it.
    Claimed { job_id: String, keys: Vec<String> },
}

#[derive(Debug)]
struct Deferred {
    job_id: String,
    keys: Vec<String>,
}

#[derive(Debug, Default)]
struct EntityState {
    busy: HashSet<String>,
    deferred: VecDeque<Deferred>,
}

/// Entity keys held by running jobs, plus the jobs waiting for them.
#[derive(Clone, Default)]
struct EntityLocks {
    state: Arc<Mutex<EntityState>>,
}

impl EntityLocks {
    /// Claim every key, or park the job behind the current holders.
    ///
    /// A key owed to an earlier deferred job counts as held, so jobs on one
    /// entity keep their submission order.
    async fn try_claim(&self, job_id: &str, keys: &[String]) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let owed = state
            .deferred
            .iter()
            .any(|d| d.keys.iter().any(|k| keys.contains(k)));
        if owed || keys.iter().any(|k| state.busy.contains(k)) {
            state.deferred.push_back(Deferred {
                job_id: job_id.to_string(),
                keys: keys.to_vec(),
            });
            return false;
        }
        state.busy.extend(keys.iter().cloned());
        true
    }

    /// Free the keys and claim them again for every deferred job that can
    /// now run, oldest first. Returns the jobs to dispatch.
    async fn release(&self, keys: &[String]) -> Vec<Deferred> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        for key in keys {
            state.busy.remove(key);
        }

        let mut ready = Vec::new();
        let mut blocked = HashSet::new();
        let mut waiting = VecDeque::with_capacity(state.deferred.len());
        for job in state.deferred.drain(..) {
            let free = job
                .keys
                .iter()
                .all(|k| !state.busy.contains(k) && !blocked.contains(k));
            if free {
                state.busy.extend(job.keys.iter().cloned());
                ready.push(job);
            } else {
                blocked.extend(job.keys.iter().cloned());
                waiting.push_back(job);
            }
        }
        state.deferred = waiting;
        ready
    }
}

/// Shared by the engine handle and every worker.
struct Shared {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    locks: EntityLocks,
    queue: mpsc::UnboundedSender<Dispatch>,
}

impl Shared {
    /// Release a job's keys and hand them straight to the deferred jobs
    /// waiting on them.
    async fn release(&self, keys: &[String]) {
        for job in self.locks.release(keys).await {
            debug!(job_id = %job.job_id, "deferred job ready");
            let dispatch = Dispatch::Claimed {
                job_id: job.job_id,
                keys: job.keys,
            };
            // Fails only once the workers are gone; the job stays queued
            // in the store for the next start.
            if self.queue.send(dispatch).is_err() {
                debug!("job queue closed; deferred job left queued");
            }
        }
    }
}

pub struct JobEngine {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobEngine {
    /// Recover persisted jobs and start the worker pool.
    ///
    /// Jobs still `queued` are re-enqueued oldest first. Jobs left
    /// `in_progress` by a previous run cannot be resumed safely and are
    /// failed with [`INTERRUPTED`].
    pub async fn start(
        store: Arc<dyn JobStore>,
        runner: Arc<dyn JobRunner>,
        config: EngineConfig,
    ) -> JobResult<Self> {
        if config.workers == 0 {
            return Err(JobError::Config("workers must be at least 1".into()));
        }

        let mut pending = Vec::new();
        for job in store.list().await? {
            match job.status {
                JobStatus::Queued => pending.push(job.job_id),
                JobStatus::InProgress => {
                    warn!(job_id = %job.job_id, job_type = %job.job_type, "failing interrupted job");
                    store
                        .update_status(&job.job_id, JobStatus::Error, Some(INTERRUPTED.to_string()))
                        .await?;
                }
                JobStatus::Completed | JobStatus::Error => {}
            }
        }

        let (queue, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            store,
            runner,
            locks: EntityLocks::default(),
            queue,
        });

        let workers = (0..config.workers)
            .map(|worker| {
                let shared = shared.clone();
                let rx = rx.clone();
                let shutdown = shutdown_rx.clone();
                tokio::spawn(async move { run_worker(worker, shared, rx, shutdown).await })
            })
            .collect();

        let engine = Self {
            shared,
            shutdown_tx,
            workers: Mutex::new(workers),
        };

        if !pending.is_empty() {
            info!(count = pending.len(), "re-enqueueing queued jobs");
        }
        for job_id in pending {
            engine.enqueue(job_id)?;
        }

        info!(workers = config.workers, "job engine started");
        Ok(engine)
    }

    /// Persist a `queued` job and hand it to the pool. Returns the job ID
    /// without waiting for the job to run.
    pub async fn submit(&self, request: JobRequest) -> JobResult<String> {
        if *self.shutdown_tx.borrow() {
            return Err(JobError::QueueClosed);
        }
        let job = Job::new(&request)?;
        self.shared.store.insert(&job).await?;
        info!(job_id = %job.job_id, job_type = %job.job_type, "job submitted");

        let job_id = job.job_id;
        self.enqueue(job_id.clone())?;
        Ok(job_id)
    }

    pub async fn get(&self, job_id: &str) -> JobResult<Job> {
        self.shared
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    pub async fn list(&self) -> JobResult<Vec<Job>> {
        self.shared.store.list().await
    }

    /// Remove the job record. Any provider work the job did stays; a job
    /// deleted while queued is skipped by the worker.
    pub async fn delete(&self, job_id: &str) -> JobResult<()> {
        if self.shared.store.delete(job_id).await? {
            info!(%job_id, "job deleted");
            Ok(())
        } else {
            Err(JobError::NotFound(job_id.to_string()))
        }
    }

    /// Stop taking jobs and wait for the workers. Jobs already running are
    /// finished first; jobs still queued stay `queued` for the next start.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "job worker panicked");
            }
        }
        info!("job engine stopped");
    }

    fn enqueue(&self, job_id: String) -> JobResult<()> {
        if *self.shutdown_tx.borrow() {
            return Err(JobError::QueueClosed);
        }
        self.shared
            .queue
            .send(Dispatch::Fresh(job_id))
            .map_err(|_| JobError::QueueClosed)
    }
}

async fn run_worker(
    worker: usize,
    shared: Arc<Shared>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Dispatch>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker, "job worker starting");
    loop {
        if *shutdown.borrow() {
            break;
        }
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                dispatch = rx.recv() => dispatch,
            }
        };
        match next {
            Some(dispatch) => process(&shared, dispatch).await,
            None => break,
        }
    }
    debug!(worker, "job worker stopped");
}

async fn process(shared: &Shared, dispatch: Dispatch) {
    let (job_id, claimed) = match dispatch {
        Dispatch::Fresh(job_id) => (job_id, None),
        Dispatch::Claimed { job_id, keys } => (job_id, Some(keys)),
    };
    let job_id = job_id.as_str();

    let Some((job, request)) = load(shared, job_id).await else {
        if let Some(keys) = &claimed {
            shared.release(keys).await;
        }
        return;
    };

    let keys = match claimed {
        Some(keys) => keys,
        None => {
            let keys = request.entity_keys();
            if !shared.locks.try_claim(job_id, &keys).await {
                debug!(%job_id, ?keys, "entity busy; job deferred");
                return;
            }
            keys
        }
    };

    if let Err(e) = shared
        .store
        .update_status(job_id, JobStatus::InProgress, None)
        .await
    {
        warn!(%job_id, error = %e, "could not start job");
        shared.release(&keys).await;
        return;
    }

    info!(%job_id, job_type = %job.job_type, "job running");
    match shared.runner.run(&request).await {
        Ok(entity_id) => finish(shared, job_id, JobStatus::Completed, entity_id).await,
        Err(e) => finish(shared, job_id, JobStatus::Error, e.to_string()).await,
    }
    shared.release(&keys).await;
}

/// Fetch a job that is still waiting to run, with its decoded request.
async fn load(shared: &Shared, job_id: &str) -> Option<(Job, JobRequest)> {
    let job = match shared.store.get(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            debug!(%job_id, "job deleted before it started");
            return None;
        }
        Err(e) => {
            error!(%job_id, error = %e, "failed to load job");
            return None;
        }
    };
    if job.status != JobStatus::Queued {
        debug!(%job_id, status = %job.status, "job already picked up");
        return None;
    }

    match job.decode_request() {
        Ok(request) => Some((job, request)),
        Err(e) => {
            finish(shared, job_id, JobStatus::Error, e.to_string()).await;
            None
        }
    }
}

async fn finish(shared: &Shared, job_id: &str, status: JobStatus, result: String) {
    match status {
        JobStatus::Completed => info!(%job_id, %result, "job completed"),
        _ => warn!(%job_id, error = %result, "job failed"),
    }
    if let Err(e) = shared.store.update_status(job_id, status, Some(result)).await {
        warn!(%job_id, error = %e, "could not record job outcome");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn free_keys_are_claimed_and_released() {
        let locks = EntityLocks::default();
        let held = keys(&["environment/a", "environment/b"]);
        assert!(locks.try_claim("j1", &held).await);
        assert_eq!(locks.state.lock().await.busy.len(), 2);

        assert!(locks.release(&held).await.is_empty());
        assert!(locks.state.lock().await.busy.is_empty());
    }

    #[tokio::test]
    async fn busy_keys_defer_until_released() {
        let locks = EntityLocks::default();
        let same = keys(&["service/s"]);
        assert!(locks.try_claim("j1", &same).await);
        assert!(!locks.try_claim("j2", &same).await);
        assert!(locks.try_claim("j3", &keys(&["service/other"])).await);

        let ready = locks.release(&same).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].job_id, "j2");
        // Woken jobs come back holding their keys.
        assert!(locks.state.lock().await.busy.contains("service/s"));
    }

    #[tokio::test]
    async fn deferred_jobs_keep_submission_order() {
        let locks = EntityLocks::default();
        let a = keys(&["environment/a"]);
        let ab = keys(&["environment/a", "environment/b"]);
        let b = keys(&["environment/b"]);

        assert!(locks.try_claim("first", &a).await);
        assert!(!locks.try_claim("second", &ab).await);
        // `b` is free but owed to `second`.
        assert!(!locks.try_claim("third", &b).await);

        let ready = locks.release(&a).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].job_id, "second");

        let ready = locks.release(&ab).await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].job_id, "third");
        assert!(locks.state.lock().await.deferred.is_empty());
    }
}
