//! Job persistence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{JobError, JobResult};
use crate::types::{Job, JobStatus};

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: &Job) -> JobResult<()>;

    async fn get(&self, job_id: &str) -> JobResult<Option<Job>>;

    /// All jobs, oldest first.
    async fn list(&self) -> JobResult<Vec<Job>>;

    /// Move a job to `status`, validated by [`JobStatus::can_transition_to`]
    /// atomically with the write. Returns the updated record.
    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<String>,
    ) -> JobResult<Job>;

    /// Returns `true` if the job existed.
    async fn delete(&self, job_id: &str) -> JobResult<bool>;
}

pub(crate) fn sort_oldest_first(jobs: &mut [Job]) {
    jobs.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
}

/// Process-local job store.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> JobResult<()> {
        self.jobs
            .write()
            .await
            .insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, job_id: &str) -> JobResult<Option<Job>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn list(&self) -> JobResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        sort_oldest_first(&mut jobs);
        Ok(jobs)
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<String>,
    ) -> JobResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
        job.transition(status, result)?;
        Ok(job.clone())
    }

    async fn delete(&self, job_id: &str) -> JobResult<bool> {
        Ok(self.jobs.write().await.remove(job_id).is_some())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_insert_get_delete() {
        contract::insert_get_delete(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn memory_status_updates_are_validated() {
        contract::status_updates_are_validated(&MemoryJobStore::new()).await;
    }

    #[tokio::test]
    async fn memory_list_is_oldest_first() {
        contract::list_is_oldest_first(&MemoryJobStore::new()).await;
    }
}
