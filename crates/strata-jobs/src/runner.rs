//! JobRunner — executes a decoded request.

use async_trait::async_trait;

use strata_orchestrator::Orchestrator;

use crate::types::JobRequest;

/// Performs the work of one job.
///
/// `Ok` carries the ID of the affected entity; `Err` is recorded verbatim
/// as the job's error message.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, request: &JobRequest) -> anyhow::Result<String>;
}

/// Dispatches jobs to the orchestrator managers.
#[derive(Clone)]
pub struct OrchestratorRunner {
    orchestrator: Orchestrator,
}

impl OrchestratorRunner {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobRunner for OrchestratorRunner {
    async fn run(&self, request: &JobRequest) -> anyhow::Result<String> {
        let o = &self.orchestrator;
        let entity_id = match request {
            JobRequest::CreateEnvironment(req) => {
                o.environments.create(req.clone()).await?.environment_id
            }
            JobRequest::UpdateEnvironment {
                environment_id,
                request,
            } => {
                o.environments
                    .update(environment_id, request.clone())
                    .await?
                    .environment_id
            }
            JobRequest::DeleteEnvironment { environment_id } => {
                o.environments.delete(environment_id).await?;
                environment_id.clone()
            }
            JobRequest::CreateEnvironmentLink {
                source_environment_id,
                dest_environment_id,
            } => {
                o.environments
                    .create_link(source_environment_id, dest_environment_id)
                    .await?;
                source_environment_id.clone()
            }
            JobRequest::DeleteEnvironmentLink {
                source_environment_id,
                dest_environment_id,
            } => {
                o.environments
                    .delete_link(source_environment_id, dest_environment_id)
                    .await?;
                source_environment_id.clone()
            }
            JobRequest::CreateDeploy(req) => o.deploys.create(req.clone()).await?.deploy_id,
            JobRequest::DeleteDeploy { deploy_id } => {
                o.deploys.delete(deploy_id).await?;
                deploy_id.clone()
            }
            JobRequest::CreateService(req) => o.services.create(req.clone()).await?.service_id,
            JobRequest::UpdateService {
                service_id,
                request,
            } => {
                o.services
                    .update(service_id, request.clone())
                    .await?
                    .service_id
            }
            JobRequest::DeleteService { service_id } => {
                o.services.delete(service_id).await?;
                service_id.clone()
            }
            JobRequest::CreateTask(req) => o.tasks.create(req.clone()).await?.task_id,
            JobRequest::DeleteTask { task_id } => {
                o.tasks.delete(task_id).await?;
                task_id.clone()
            }
        };
        Ok(entity_id)
    }
}
