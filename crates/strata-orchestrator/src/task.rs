//! TaskManager — one-off container runs.
//!
//! A task entity groups the copies started by one request. Each started copy
//! is remembered as an `arn:{n}` tag so the group can be described and
//! stopped later.

use tracing::{info, warn};

use strata_core::{
    CreateTaskRequest, EntityType, Tag, Task, TaskSummary, generate_entity_id, tag_keys,
};
use strata_provider::{RunTaskInput, codes};

use crate::context::{Context, tolerate};
use crate::deploy::DeployManager;
use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Clone)]
pub struct TaskManager {
    ctx: Context,
    deploys: DeployManager,
}

impl TaskManager {
    pub(crate) fn new(ctx: Context, deploys: DeployManager) -> Self {
        Self { ctx, deploys }
    }

    pub async fn create(&self, req: CreateTaskRequest) -> OrchestratorResult<Task> {
        let name = req.task_name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::Validation("task_name is required".into()));
        }
        if req.copies == 0 {
            return Err(OrchestratorError::Validation("copies must be at least 1".into()));
        }

        let tags = &self.ctx.tags;
        if !tags.exists(EntityType::Environment, &req.environment_id).await? {
            return Err(OrchestratorError::EnvironmentNotFound(req.environment_id.clone()));
        }
        let task_id = generate_entity_id(name);
        if tags.exists(EntityType::Task, &task_id).await? {
            return Err(OrchestratorError::Validation(format!(
                "task '{name}' already exists as {task_id}"
            )));
        }
        let task_definition = self.deploys.task_definition(&req.deploy_id).await?;

        let codec = self.ctx.codec();
        let started = self
            .ctx
            .providers
            .clusters
            .run_task(RunTaskInput {
                cluster: codec.encode(&req.environment_id).to_string(),
                task_definition,
                count: req.copies,
                started_by: task_id.clone(),
                overrides: req.container_overrides.clone(),
            })
            .await?;

        for (key, value) in [
            (tag_keys::NAME, name),
            (tag_keys::ENVIRONMENT_ID, req.environment_id.as_str()),
            (tag_keys::DEPLOY_ID, req.deploy_id.as_str()),
        ] {
            tags.insert(Tag::new(EntityType::Task, &task_id, key, value))
                .await?;
        }
        for (n, task) in started.iter().enumerate() {
            tags.insert(Tag::new(
                EntityType::Task,
                &task_id,
                format!("{}{n}", tag_keys::ARN_PREFIX),
                &task.arn,
            ))
            .await?;
        }

        info!(%task_id, copies = started.len(), environment_id = %req.environment_id, "task started");
        self.read(&task_id).await
    }

    pub async fn read(&self, task_id: &str) -> OrchestratorResult<Task> {
        let tags = self
            .ctx
            .tags
            .select_by_type_and_id(EntityType::Task.as_str(), task_id)
            .await?;
        let environment_id = tags
            .value_of(tag_keys::ENVIRONMENT_ID)
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))?;
        let arns: Vec<String> = tags
            .with_key_prefix(tag_keys::ARN_PREFIX)
            .iter()
            .map(|tag| tag.value.clone())
            .collect();

        let described = self
            .ctx
            .providers
            .clusters
            .describe_tasks(self.ctx.codec().encode(environment_id).as_str(), &arns)
            .await?;
        let count = |status: &str| {
            let n = described.iter().filter(|t| t.last_status == status).count();
            u32::try_from(n).unwrap_or(u32::MAX)
        };

        Ok(Task {
            task_id: task_id.to_string(),
            task_name: tags.value_of(tag_keys::NAME).unwrap_or_default().to_string(),
            environment_id: environment_id.to_string(),
            deploy_id: tags.value_of(tag_keys::DEPLOY_ID).unwrap_or_default().to_string(),
            copies: u32::try_from(arns.len()).unwrap_or(u32::MAX),
            running_count: count("RUNNING"),
            pending_count: count("PENDING"),
        })
    }

    pub async fn list(&self) -> OrchestratorResult<Vec<TaskSummary>> {
        let tags = self.ctx.tags.select_by_type(EntityType::Task.as_str()).await?;
        Ok(tags
            .entity_ids()
            .into_iter()
            .map(|task_id| {
                let own = tags.with_id(&task_id);
                TaskSummary {
                    task_name: own.value_of(tag_keys::NAME).unwrap_or_default().to_string(),
                    environment_id: own
                        .value_of(tag_keys::ENVIRONMENT_ID)
                        .unwrap_or_default()
                        .to_string(),
                    task_id,
                }
            })
            .collect())
    }

    /// Stop every copy and drop the task's tags. Safe to repeat.
    pub async fn delete(&self, task_id: &str) -> OrchestratorResult<()> {
        let tags = self
            .ctx
            .tags
            .select_by_type_and_id(EntityType::Task.as_str(), task_id)
            .await?;

        let Some(environment_id) = tags.value_of(tag_keys::ENVIRONMENT_ID) else {
            warn!(%task_id, "task has no environment tag; nothing to stop");
            self.drop_tags(task_id).await?;
            return Ok(());
        };

        let arns = tags.with_key_prefix(tag_keys::ARN_PREFIX);
        if arns.is_empty() {
            warn!(%task_id, "task has no recorded copies; nothing to stop");
        }

        let cluster = self.ctx.codec().encode(environment_id);
        for arn in arns.iter() {
            tolerate(
                self.ctx
                    .providers
                    .clusters
                    .stop_task(cluster.as_str(), &arn.value)
                    .await,
                "stop task",
                &[codes::CLUSTER_NOT_FOUND],
                &["task was not found"],
            )?;
        }

        self.drop_tags(task_id).await?;
        info!(%task_id, "task deleted");
        Ok(())
    }

    async fn drop_tags(&self, task_id: &str) -> OrchestratorResult<()> {
        self.ctx
            .tags
            .delete_entity(EntityType::Task.as_str(), task_id)
            .await?;
        Ok(())
    }
}
