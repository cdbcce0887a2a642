//! strata-jobs — asynchronous execution of orchestration requests.
//!
//! Every mutating request becomes a [`Job`]: persisted as `queued`, picked
//! up by a worker, and finished as `completed` (result = entity ID) or
//! `error` (result = error message). Clients poll the job record.
//!
//! # Components
//!
//! - [`JobStore`]: job persistence ([`MemoryJobStore`], [`RedbJobStore`])
//! - [`JobRunner`]: executes a request ([`OrchestratorRunner`] in production)
//! - [`JobEngine`]: the worker pool, per-entity serialization, and restart
//!   recovery

pub mod engine;
pub mod error;
pub mod redb_store;
pub mod runner;
pub mod store;
pub mod types;

pub use engine::{EngineConfig, INTERRUPTED, JobEngine};
pub use error::{JobError, JobResult};
pub use redb_store::RedbJobStore;
pub use runner::{JobRunner, OrchestratorRunner};
pub use store::{JobStore, MemoryJobStore};
pub use types::{Job, JobRequest, JobStatus, JobType};
