//! Standalone mode: every subsystem in one process.
//!
//! The provider capability set is served by the simulated cloud, so a
//! standalone control plane can be exercised end to end without cloud
//! credentials.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{info, warn};

use strata_core::StrataConfig;
use strata_jobs::{EngineConfig, Job, JobEngine, JobRequest, OrchestratorRunner, RedbJobStore};
use strata_orchestrator::{Orchestrator, OrchestratorConfig, Providers};
use strata_provider::SimulatedCloud;
use strata_tags::RedbTagStore;
use strata_wait::TokioClock;

const TAGS_FILE: &str = "tags.redb";
const JOBS_FILE: &str = "jobs.redb";

/// Poll interval while waiting for submitted jobs.
const JOB_POLL: Duration = Duration::from_millis(250);

/// Open the stores and start the engine.
pub async fn start_engine(config: &StrataConfig, data_dir: &Path) -> anyhow::Result<JobEngine> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

    // ── Stores ─────────────────────────────────────────────────

    let tags_path = data_dir.join(TAGS_FILE);
    let tags = RedbTagStore::open(&tags_path)?;
    info!(path = ?tags_path, "tag store opened");

    let jobs_path = data_dir.join(JOBS_FILE);
    let jobs = RedbJobStore::open(&jobs_path)?;
    info!(path = ?jobs_path, "job store opened");

    // ── Orchestrator ───────────────────────────────────────────

    let providers = Providers::simulated(SimulatedCloud::new());
    let orchestrator = Orchestrator::new(
        providers,
        Arc::new(tags),
        OrchestratorConfig::from_strata(config),
        Arc::new(TokioClock),
    )?;
    info!(instance = %config.instance.name, "orchestrator initialized");

    // ── Job engine ─────────────────────────────────────────────

    let engine = JobEngine::start(
        Arc::new(jobs),
        Arc::new(OrchestratorRunner::new(orchestrator)),
        EngineConfig::from(&config.jobs),
    )
    .await?;
    Ok(engine)
}

pub async fn run(config: StrataConfig, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
    info!("Strata daemon starting in standalone mode");
    let data_dir = data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
    let engine = start_engine(&config, &data_dir).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");

    engine.shutdown().await;
    info!("Strata daemon stopped");
    Ok(())
}

pub async fn run_jobs(
    config: StrataConfig,
    data_dir: Option<PathBuf>,
    requests_path: &Path,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(requests_path)
        .with_context(|| format!("failed to read {}", requests_path.display()))?;
    let requests: Vec<JobRequest> =
        serde_json::from_str(&raw).context("requests must be a JSON array of job requests")?;

    let data_dir = data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
    let engine = start_engine(&config, &data_dir).await?;
    let finished = submit_and_wait(&engine, requests).await;
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&finished?)?);
    Ok(())
}

/// Submit in order, then poll each job until it reaches a terminal state.
async fn submit_and_wait(engine: &JobEngine, requests: Vec<JobRequest>) -> anyhow::Result<Vec<Job>> {
    let mut ids = Vec::with_capacity(requests.len());
    for request in requests {
        ids.push(engine.submit(request).await?);
    }

    let mut finished = Vec::with_capacity(ids.len());
    for job_id in ids {
        let job = loop {
            let job = engine.get(&job_id).await?;
            if job.status.is_terminal() {
                break job;
            }
            tokio::time::sleep(JOB_POLL).await;
        };
        if job.result.is_none() {
            warn!(%job_id, "finished job has no result");
        }
        finished.push(job);
    }
    Ok(finished)
}
