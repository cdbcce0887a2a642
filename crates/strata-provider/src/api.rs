//! Capability traits and the resource shapes they exchange.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_core::ContainerOverride;

use crate::error::ProviderResult;

// ── Resources ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub status: String,
    pub active_services: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub group_id: String,
    pub group_name: String,
    pub description: String,
    pub vpc_id: String,
    /// Source group IDs allowed in.
    pub ingress_from: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfiguration {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub iam_instance_profile: String,
    pub key_name: String,
    /// Base64-encoded boot script.
    pub user_data: String,
    pub security_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAutoScalingGroupInput {
    pub name: String,
    pub launch_configuration_name: String,
    pub subnets: Vec<String>,
    pub min_size: u32,
    pub max_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoScalingGroup {
    pub name: String,
    pub launch_configuration_name: Option<String>,
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: u32,
    pub instances: Vec<String>,
    /// `None` while healthy; e.g. `"Delete in progress"` while deleting.
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub family: String,
    pub revision: u32,
    pub document: String,
    /// `ACTIVE` or `INACTIVE`.
    pub status: String,
}

impl TaskDefinition {
    /// `family:revision`, the form services and tasks reference.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.family, self.revision)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceInput {
    pub cluster: String,
    pub service_name: String,
    pub task_definition: String,
    pub desired_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServiceInput {
    pub task_definition: Option<String>,
    pub desired_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerService {
    pub name: String,
    pub cluster: String,
    pub task_definition: String,
    pub desired_count: u32,
    pub running_count: u32,
    /// `ACTIVE`, `DRAINING`, or `INACTIVE`.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTaskInput {
    pub cluster: String,
    pub task_definition: String,
    pub count: u32,
    pub started_by: String,
    pub overrides: Vec<ContainerOverride>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningTask {
    pub arn: String,
    pub cluster: String,
    pub task_definition: String,
    /// `PENDING`, `RUNNING`, or `STOPPED`.
    pub last_status: String,
}

// ── Capabilities ───────────────────────────────────────────────────

/// Container cluster manager: clusters and the workloads placed on them.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Idempotent: returns the existing cluster when the name is taken.
    async fn create_cluster(&self, name: &str) -> ProviderResult<Cluster>;
    async fn describe_cluster(&self, name: &str) -> ProviderResult<Cluster>;
    async fn list_clusters(&self) -> ProviderResult<Vec<Cluster>>;
    async fn delete_cluster(&self, name: &str) -> ProviderResult<()>;

    async fn register_task_definition(&self, family: &str, document: &str) -> ProviderResult<TaskDefinition>;
    async fn describe_task_definition(&self, family: &str, revision: u32) -> ProviderResult<TaskDefinition>;
    async fn deregister_task_definition(&self, family: &str, revision: u32) -> ProviderResult<()>;

    async fn create_service(&self, input: CreateServiceInput) -> ProviderResult<ContainerService>;
    async fn describe_service(&self, cluster: &str, service: &str) -> ProviderResult<ContainerService>;
    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        input: UpdateServiceInput,
    ) -> ProviderResult<ContainerService>;
    async fn delete_service(&self, cluster: &str, service: &str) -> ProviderResult<()>;

    async fn run_task(&self, input: RunTaskInput) -> ProviderResult<Vec<RunningTask>>;
    /// Unknown ARNs are omitted from the result rather than failing.
    async fn describe_tasks(&self, cluster: &str, arns: &[String]) -> ProviderResult<Vec<RunningTask>>;
    async fn stop_task(&self, cluster: &str, arn: &str) -> ProviderResult<()>;
}

/// Network security boundaries.
#[async_trait]
pub trait SecurityGroupApi: Send + Sync {
    /// Returns the new group ID.
    async fn create_security_group(&self, name: &str, description: &str, vpc_id: &str) -> ProviderResult<String>;
    /// `Ok(None)` when no group has this name.
    async fn describe_security_group(&self, name: &str) -> ProviderResult<Option<SecurityGroup>>;
    async fn delete_security_group(&self, group_id: &str) -> ProviderResult<()>;
    /// Allow traffic from `source_group_id` into `group_id`.
    async fn authorize_ingress_from_group(&self, group_id: &str, source_group_id: &str) -> ProviderResult<()>;
    async fn revoke_ingress_from_group(&self, group_id: &str, source_group_id: &str) -> ProviderResult<()>;
}

/// Instance fleets.
#[async_trait]
pub trait AutoScalingApi: Send + Sync {
    async fn create_launch_configuration(&self, input: LaunchConfiguration) -> ProviderResult<()>;
    async fn describe_launch_configuration(&self, name: &str) -> ProviderResult<LaunchConfiguration>;
    async fn delete_launch_configuration(&self, name: &str) -> ProviderResult<()>;

    async fn create_auto_scaling_group(&self, input: CreateAutoScalingGroupInput) -> ProviderResult<()>;
    async fn describe_auto_scaling_group(&self, name: &str) -> ProviderResult<AutoScalingGroup>;
    async fn update_min_size(&self, name: &str, size: u32) -> ProviderResult<()>;
    async fn update_max_size(&self, name: &str, size: u32) -> ProviderResult<()>;
    async fn delete_auto_scaling_group(&self, name: &str) -> ProviderResult<()>;
}
