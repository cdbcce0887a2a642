//! Job records and the requests they carry.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use strata_core::{
    CreateDeployRequest, CreateEnvironmentRequest, CreateServiceRequest, CreateTaskRequest,
    EntityId, EntityType, UpdateEnvironmentRequest, UpdateServiceRequest, generate_entity_id,
};

use crate::error::{JobError, JobResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// `queued → in_progress → completed | error`, plus `queued → error` for
    /// jobs that fail before they start.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::InProgress)
                | (JobStatus::Queued, JobStatus::Error)
                | (JobStatus::InProgress, JobStatus::Completed)
                | (JobStatus::InProgress, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CreateEnvironment,
    UpdateEnvironment,
    DeleteEnvironment,
    CreateEnvironmentLink,
    DeleteEnvironmentLink,
    CreateDeploy,
    DeleteDeploy,
    CreateService,
    UpdateService,
    DeleteService,
    CreateTask,
    DeleteTask,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobType::CreateEnvironment => "create_environment",
            JobType::UpdateEnvironment => "update_environment",
            JobType::DeleteEnvironment => "delete_environment",
            JobType::CreateEnvironmentLink => "create_environment_link",
            JobType::DeleteEnvironmentLink => "delete_environment_link",
            JobType::CreateDeploy => "create_deploy",
            JobType::DeleteDeploy => "delete_deploy",
            JobType::CreateService => "create_service",
            JobType::UpdateService => "update_service",
            JobType::DeleteService => "delete_service",
            JobType::CreateTask => "create_task",
            JobType::DeleteTask => "delete_task",
        };
        f.write_str(s)
    }
}

/// The work a job performs, persisted as JSON in [`Job::request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum JobRequest {
    CreateEnvironment(CreateEnvironmentRequest),
    UpdateEnvironment {
        environment_id: EntityId,
        request: UpdateEnvironmentRequest,
    },
    DeleteEnvironment {
        environment_id: EntityId,
    },
    CreateEnvironmentLink {
        source_environment_id: EntityId,
        dest_environment_id: EntityId,
    },
    DeleteEnvironmentLink {
        source_environment_id: EntityId,
        dest_environment_id: EntityId,
    },
    CreateDeploy(CreateDeployRequest),
    DeleteDeploy {
        deploy_id: EntityId,
    },
    CreateService(CreateServiceRequest),
    UpdateService {
        service_id: EntityId,
        request: UpdateServiceRequest,
    },
    DeleteService {
        service_id: EntityId,
    },
    CreateTask(CreateTaskRequest),
    DeleteTask {
        task_id: EntityId,
    },
}

impl JobRequest {
    pub fn job_type(&self) -> JobType {
        match self {
            JobRequest::CreateEnvironment(_) => JobType::CreateEnvironment,
            JobRequest::UpdateEnvironment { .. } => JobType::UpdateEnvironment,
            JobRequest::DeleteEnvironment { .. } => JobType::DeleteEnvironment,
            JobRequest::CreateEnvironmentLink { .. } => JobType::CreateEnvironmentLink,
            JobRequest::DeleteEnvironmentLink { .. } => JobType::DeleteEnvironmentLink,
            JobRequest::CreateDeploy(_) => JobType::CreateDeploy,
            JobRequest::DeleteDeploy { .. } => JobType::DeleteDeploy,
            JobRequest::CreateService(_) => JobType::CreateService,
            JobRequest::UpdateService { .. } => JobType::UpdateService,
            JobRequest::DeleteService { .. } => JobType::DeleteService,
            JobRequest::CreateTask(_) => JobType::CreateTask,
            JobRequest::DeleteTask { .. } => JobType::DeleteTask,
        }
    }

    /// Entities the job mutates, as sorted `{type}/{id}` keys. Jobs sharing
    /// a key never run at the same time.
    ///
    /// Creates key on the ID the name will hash to, so a create racing a
    /// delete of the same entity is serialized too. Deploys key on their
    /// family, shared by every revision.
    pub fn entity_keys(&self) -> Vec<String> {
        let key = |entity_type: EntityType, id: &str| format!("{entity_type}/{id}");
        let mut keys = match self {
            JobRequest::CreateEnvironment(req) => vec![key(
                EntityType::Environment,
                &generate_entity_id(req.environment_name.trim()),
            )],
            JobRequest::UpdateEnvironment { environment_id, .. }
            | JobRequest::DeleteEnvironment { environment_id } => {
                vec![key(EntityType::Environment, environment_id)]
            }
            JobRequest::CreateEnvironmentLink {
                source_environment_id,
                dest_environment_id,
            }
            | JobRequest::DeleteEnvironmentLink {
                source_environment_id,
                dest_environment_id,
            } => vec![
                key(EntityType::Environment, source_environment_id),
                key(EntityType::Environment, dest_environment_id),
            ],
            JobRequest::CreateDeploy(req) => vec![key(
                EntityType::Deploy,
                &generate_entity_id(req.deploy_name.trim()),
            )],
            JobRequest::DeleteDeploy { deploy_id } => {
                let family = deploy_id
                    .rsplit_once('.')
                    .map_or(deploy_id.as_str(), |(family, _)| family);
                vec![key(EntityType::Deploy, family)]
            }
            JobRequest::CreateService(req) => vec![key(
                EntityType::Service,
                &generate_entity_id(req.service_name.trim()),
            )],
            JobRequest::UpdateService { service_id, .. } | JobRequest::DeleteService { service_id } => {
                vec![key(EntityType::Service, service_id)]
            }
            JobRequest::CreateTask(req) => {
                vec![key(EntityType::Task, &generate_entity_id(req.task_name.trim()))]
            }
            JobRequest::DeleteTask { task_id } => vec![key(EntityType::Task, task_id)],
        };
        keys.sort();
        keys.dedup();
        keys
    }
}

/// A persisted unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    /// JSON-encoded [`JobRequest`].
    pub request: String,
    /// Entity ID on completion, error message on failure.
    pub result: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Job {
    /// A fresh `queued` job with a random ID.
    pub fn new(request: &JobRequest) -> JobResult<Self> {
        let now = epoch_secs();
        Ok(Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            job_type: request.job_type(),
            status: JobStatus::Queued,
            request: serde_json::to_string(request).map_err(|e| JobError::Serialize(e.to_string()))?,
            result: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn decode_request(&self) -> JobResult<JobRequest> {
        serde_json::from_str(&self.request).map_err(|e| JobError::Deserialize(e.to_string()))
    }

    /// Apply a status change, rejecting illegal transitions.
    pub fn transition(&mut self, status: JobStatus, result: Option<String>) -> JobResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                job_id: self.job_id.clone(),
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.result = result;
        self.updated_at = epoch_secs();
        Ok(())
    }
}

/// Current time as Unix epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_final() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Error));
        assert!(Queued.can_transition_to(Error));

        for terminal in [Completed, Error] {
            assert!(terminal.is_terminal());
            for next in [Queued, InProgress, Completed, Error] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!InProgress.can_transition_to(Queued));
        assert!(!Queued.can_transition_to(Completed));
    }

    #[test]
    fn requests_serialize_with_a_type_tag() {
        let req = JobRequest::DeleteEnvironment {
            environment_id: "prod1a2b3c4d".to_string(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "delete_environment");
        assert_eq!(json["payload"]["environment_id"], "prod1a2b3c4d");

        let job = Job::new(&req).unwrap();
        assert_eq!(job.job_type, JobType::DeleteEnvironment);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.decode_request().unwrap(), req);
    }

    #[test]
    fn entity_keys_cover_every_touched_entity() {
        let link = JobRequest::CreateEnvironmentLink {
            source_environment_id: "b".to_string(),
            dest_environment_id: "a".to_string(),
        };
        assert_eq!(link.entity_keys(), vec!["environment/a", "environment/b"]);

        let create = JobRequest::CreateEnvironment(CreateEnvironmentRequest {
            environment_name: "prod".to_string(),
            instance_size: "t3.small".to_string(),
            operating_system: "linux".to_string(),
            ami_id: None,
            min_cluster_count: 1,
            user_data_template: None,
        });
        let delete = JobRequest::DeleteEnvironment {
            environment_id: generate_entity_id("prod"),
        };
        assert_eq!(create.entity_keys(), delete.entity_keys());

        let deploy = JobRequest::DeleteDeploy {
            deploy_id: "api1a2b3c4d.7".to_string(),
        };
        assert_eq!(deploy.entity_keys(), vec!["deploy/api1a2b3c4d"]);
    }

    #[test]
    fn transitions_stamp_the_job() {
        let mut job = Job::new(&JobRequest::DeleteTask {
            task_id: "t1".to_string(),
        })
        .unwrap();
        job.transition(JobStatus::InProgress, None).unwrap();
        job.transition(JobStatus::Completed, Some("t1".to_string())).unwrap();
        assert_eq!(job.result.as_deref(), Some("t1"));

        let err = job.transition(JobStatus::Error, None).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { from: JobStatus::Completed, .. }));
    }
}
