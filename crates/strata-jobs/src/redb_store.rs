//! RedbJobStore — jobs persisted in redb so they survive a restart.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::{JobError, JobResult};
use crate::store::{JobStore, sort_oldest_first};
use crate::types::{Job, JobStatus};

/// Job records keyed by job ID; values are JSON [`Job`]s.
const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

macro_rules! map_err {
    ($variant:ident) => {
        |e| JobError::$variant(e.to_string())
    };
}

#[derive(Clone)]
pub struct RedbJobStore {
    db: Arc<Database>,
}

impl RedbJobStore {
    pub fn open(path: &Path) -> JobResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "job store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> JobResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> JobResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(JOBS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    async fn blocking<T, F>(&self, op: F) -> JobResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RedbJobStore) -> JobResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(map_err!(Transaction))?
    }

    fn put_blocking(&self, job: &Job) -> JobResult<()> {
        let value = serde_json::to_vec(job).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            table
                .insert(job.job_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_blocking(&self, job_id: &str) -> JobResult<Option<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        match table.get(job_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }

    fn list_blocking(&self) -> JobResult<Vec<Job>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOBS).map_err(map_err!(Table))?;
        let mut jobs = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let job: Job = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            jobs.push(job);
        }
        sort_oldest_first(&mut jobs);
        Ok(jobs)
    }

    /// Read, validate, and write back inside one write transaction.
    fn update_status_blocking(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<String>,
    ) -> JobResult<Job> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let job = {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            let existing: Option<Job> = match table.get(job_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            let mut job = existing.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;
            job.transition(status, result)?;

            let value = serde_json::to_vec(&job).map_err(map_err!(Serialize))?;
            table
                .insert(job_id, value.as_slice())
                .map_err(map_err!(Write))?;
            job
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%job_id, status = %job.status, "job status stored");
        Ok(job)
    }

    fn delete_blocking(&self, job_id: &str) -> JobResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed = {
            let mut table = txn.open_table(JOBS).map_err(map_err!(Table))?;
            table.remove(job_id).map_err(map_err!(Write))?.is_some()
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

#[async_trait]
impl JobStore for RedbJobStore {
    async fn insert(&self, job: &Job) -> JobResult<()> {
        let job = job.clone();
        self.blocking(move |store| store.put_blocking(&job)).await
    }

    async fn get(&self, job_id: &str) -> JobResult<Option<Job>> {
        let job_id = job_id.to_string();
        self.blocking(move |store| store.get_blocking(&job_id)).await
    }

    async fn list(&self) -> JobResult<Vec<Job>> {
        self.blocking(|store| store.list_blocking()).await
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<String>,
    ) -> JobResult<Job> {
        let job_id = job_id.to_string();
        self.blocking(move |store| store.update_status_blocking(&job_id, status, result))
            .await
    }

    async fn delete(&self, job_id: &str) -> JobResult<bool> {
        let job_id = job_id.to_string();
        self.blocking(move |store| store.delete_blocking(&job_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use crate::types::JobRequest;

    #[tokio::test]
    async fn redb_insert_get_delete() {
        contract::insert_get_delete(&RedbJobStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn redb_status_updates_are_validated() {
        contract::status_updates_are_validated(&RedbJobStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn redb_list_is_oldest_first() {
        contract::list_is_oldest_first(&RedbJobStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.redb");
        let job = Job::new(&JobRequest::DeleteTask {
            task_id: "t1".to_string(),
        })
        .unwrap();

        {
            let store = RedbJobStore::open(&path).unwrap();
            store.insert(&job).await.unwrap();
            store
                .update_status(&job.job_id, JobStatus::InProgress, None)
                .await
                .unwrap();
        }

        let store = RedbJobStore::open(&path).unwrap();
        let reopened = store.get(&job.job_id).await.unwrap().unwrap();
        assert_eq!(reopened.status, JobStatus::InProgress);
        assert_eq!(reopened.request, job.request);
    }
}
