//! SimulatedCloud — an in-memory provider.
//!
//! Reproduces the behaviours the orchestrator must cope with:
//!
//! - deleted autoscaling groups linger as `"Delete in progress"` for a few
//!   describes before disappearing from listings
//! - security groups refuse deletion while an autoscaling group or another
//!   group's ingress rule still references them, and optionally for a few
//!   extra attempts while network interfaces drain
//! - deleted services drain before turning `INACTIVE`
//! - duplicate ingress rules fail with `InvalidPermission.Duplicate`
//!
//! Any operation can be made to fail once via [`SimulatedCloud::fail_next`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::*;
use crate::error::{ProviderError, ProviderResult, codes};

const DELETE_IN_PROGRESS: &str = "Delete in progress";

/// Knobs for the simulated eventual-consistency windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationSettings {
    /// Describes that still return an autoscaling group after its deletion.
    pub asg_delete_polls: u32,
    /// Extra failed delete attempts for a security group once nothing
    /// references it any more.
    pub eni_release_attempts: u32,
    /// Describes a deleted service stays `DRAINING`.
    pub service_drain_polls: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            asg_delete_polls: 2,
            eni_release_attempts: 0,
            service_drain_polls: 1,
        }
    }
}

struct AsgEntry {
    group: AutoScalingGroup,
    security_groups: Vec<String>,
    /// `Some(n)` once deleted: n more describes will still see it.
    polls_left: Option<u32>,
}

struct GroupEntry {
    group: SecurityGroup,
    eni_attempts_left: u32,
}

struct ServiceEntry {
    service: ContainerService,
    drain_polls_left: u32,
}

#[derive(Default)]
struct CloudState {
    clusters: BTreeMap<String, Cluster>,
    groups: BTreeMap<String, GroupEntry>,
    launch_configs: BTreeMap<String, LaunchConfiguration>,
    asgs: BTreeMap<String, AsgEntry>,
    task_definitions: BTreeMap<String, Vec<TaskDefinition>>,
    services: BTreeMap<(String, String), ServiceEntry>,
    tasks: BTreeMap<String, RunningTask>,
    faults: HashMap<String, VecDeque<ProviderError>>,
    calls: Vec<String>,
    next_id: u32,
}

impl CloudState {
    /// Record the call and surface an injected fault, if any.
    fn enter(&mut self, op: &str, target: &str) -> ProviderResult<()> {
        self.calls.push(format!("{op} {target}"));
        match self.faults.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!(%op, %target, error = %err, "injected fault");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn group_by_name(&self, name: &str) -> Option<&GroupEntry> {
        self.groups.values().find(|g| g.group.group_name == name)
    }

    fn active_task_definition(&self, reference: &str) -> ProviderResult<TaskDefinition> {
        let not_found = || {
            ProviderError::new(
                codes::CLIENT_EXCEPTION,
                format!("TaskDefinition not found: {reference}"),
            )
        };
        let (family, revision) = reference.rsplit_once(':').ok_or_else(not_found)?;
        let revision: u32 = revision.parse().map_err(|_| not_found())?;
        self.task_definitions
            .get(family)
            .and_then(|revs| revs.iter().find(|td| td.revision == revision))
            .filter(|td| td.status == "ACTIVE")
            .cloned()
            .ok_or_else(not_found)
    }

    fn require_cluster(&self, name: &str) -> ProviderResult<()> {
        if self.clusters.contains_key(name) {
            Ok(())
        } else {
            Err(ProviderError::new(codes::CLUSTER_NOT_FOUND, "Cluster not found."))
        }
    }

    fn live_services(&self, cluster: &str) -> u32 {
        let count = self
            .services
            .iter()
            .filter(|((c, _), entry)| c == cluster && entry.service.status != "INACTIVE")
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Bring the instance list in line with the group's bounds.
    fn rescale(&mut self, name: &str) {
        let missing = match self.asgs.get(name) {
            Some(entry) => {
                let group = &entry.group;
                let desired = group.desired_capacity.clamp(group.min_size, group.max_size);
                (desired as usize).saturating_sub(group.instances.len())
            }
            None => return,
        };
        let ids: Vec<String> = (0..missing)
            .map(|_| format!("i-{:08x}", self.next_id()))
            .collect();
        if let Some(entry) = self.asgs.get_mut(name) {
            let group = &mut entry.group;
            group.desired_capacity = group.desired_capacity.clamp(group.min_size, group.max_size);
            group.instances.extend(ids);
            group.instances.truncate(group.desired_capacity as usize);
        }
    }
}

fn asg_not_found(name: &str) -> ProviderError {
    ProviderError::new(
        codes::VALIDATION_ERROR,
        format!("AutoScalingGroup name not found - {name}"),
    )
}

fn launch_config_not_found(name: &str) -> ProviderError {
    ProviderError::new(
        codes::VALIDATION_ERROR,
        format!("Launch configuration name not found - {name}"),
    )
}

fn group_not_found(group_id: &str) -> ProviderError {
    ProviderError::new(
        codes::GROUP_NOT_FOUND,
        format!("The security group '{group_id}' does not exist"),
    )
}

/// In-memory implementation of every provider capability.
#[derive(Clone, Default)]
pub struct SimulatedCloud {
    state: Arc<Mutex<CloudState>>,
    settings: SimulationSettings,
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: SimulationSettings) -> Self {
        Self {
            state: Arc::default(),
            settings,
        }
    }

    /// Make the next call to `operation` (trait method name) fail.
    pub async fn fail_next(&self, operation: &str, err: ProviderError) {
        self.state
            .lock()
            .await
            .faults
            .entry(operation.to_string())
            .or_default()
            .push_back(err);
    }

    /// Every call so far as `"{operation} {target}"`.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Remove an autoscaling group out of band, as an operator would.
    pub async fn remove_auto_scaling_group(&self, name: &str) -> bool {
        self.state.lock().await.asgs.remove(name).is_some()
    }

    /// Side-effect-free lookups for assertions.
    pub async fn auto_scaling_group(&self, name: &str) -> Option<AutoScalingGroup> {
        self.state.lock().await.asgs.get(name).map(|e| e.group.clone())
    }

    pub async fn launch_configuration(&self, name: &str) -> Option<LaunchConfiguration> {
        self.state.lock().await.launch_configs.get(name).cloned()
    }

    pub async fn security_group(&self, name: &str) -> Option<SecurityGroup> {
        self.state
            .lock()
            .await
            .group_by_name(name)
            .map(|g| g.group.clone())
    }

    pub async fn cluster_exists(&self, name: &str) -> bool {
        self.state.lock().await.clusters.contains_key(name)
    }

    pub async fn task_status(&self, arn: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .tasks
            .get(arn)
            .map(|t| t.last_status.clone())
    }
}

// ── Clusters, task definitions, services, tasks ────────────────────

#[async_trait]
impl ClusterApi for SimulatedCloud {
    async fn create_cluster(&self, name: &str) -> ProviderResult<Cluster> {
        let mut state = self.state.lock().await;
        state.enter("create_cluster", name)?;
        let active_services = state.live_services(name);
        let cluster = state
            .clusters
            .entry(name.to_string())
            .or_insert_with(|| Cluster {
                name: name.to_string(),
                status: "ACTIVE".to_string(),
                active_services,
            });
        Ok(cluster.clone())
    }

    async fn describe_cluster(&self, name: &str) -> ProviderResult<Cluster> {
        let mut state = self.state.lock().await;
        state.enter("describe_cluster", name)?;
        let active_services = state.live_services(name);
        match state.clusters.get(name) {
            Some(cluster) => Ok(Cluster {
                active_services,
                ..cluster.clone()
            }),
            None => Err(ProviderError::new(
                codes::CLUSTER_NOT_FOUND,
                format!("cluster not found: {name}"),
            )),
        }
    }

    async fn list_clusters(&self) -> ProviderResult<Vec<Cluster>> {
        let mut state = self.state.lock().await;
        state.enter("list_clusters", "*")?;
        Ok(state.clusters.values().cloned().collect())
    }

    async fn delete_cluster(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_cluster", name)?;
        state.require_cluster(name)?;
        if state.live_services(name) > 0 {
            return Err(ProviderError::new(
                codes::CLUSTER_CONTAINS_SERVICES,
                "The Cluster cannot be deleted while Services are active.",
            ));
        }
        state.clusters.remove(name);
        state.services.retain(|(cluster, _), _| cluster != name);
        Ok(())
    }

    async fn register_task_definition(&self, family: &str, document: &str) -> ProviderResult<TaskDefinition> {
        let mut state = self.state.lock().await;
        state.enter("register_task_definition", family)?;
        let revisions = state.task_definitions.entry(family.to_string()).or_default();
        let td = TaskDefinition {
            family: family.to_string(),
            revision: revisions.len() as u32 + 1,
            document: document.to_string(),
            status: "ACTIVE".to_string(),
        };
        revisions.push(td.clone());
        Ok(td)
    }

    async fn describe_task_definition(&self, family: &str, revision: u32) -> ProviderResult<TaskDefinition> {
        let mut state = self.state.lock().await;
        state.enter("describe_task_definition", &format!("{family}:{revision}"))?;
        state
            .task_definitions
            .get(family)
            .and_then(|revs| revs.iter().find(|td| td.revision == revision))
            .cloned()
            .ok_or_else(|| {
                ProviderError::new(
                    codes::CLIENT_EXCEPTION,
                    format!("Unable to describe task definition {family}:{revision}"),
                )
            })
    }

    async fn deregister_task_definition(&self, family: &str, revision: u32) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("deregister_task_definition", &format!("{family}:{revision}"))?;
        let td = state
            .task_definitions
            .get_mut(family)
            .and_then(|revs| revs.iter_mut().find(|td| td.revision == revision))
            .ok_or_else(|| {
                ProviderError::new(
                    codes::CLIENT_EXCEPTION,
                    "The specified task definition does not exist.",
                )
            })?;
        td.status = "INACTIVE".to_string();
        Ok(())
    }

    async fn create_service(&self, input: CreateServiceInput) -> ProviderResult<ContainerService> {
        let mut state = self.state.lock().await;
        state.enter("create_service", &input.service_name)?;
        state.require_cluster(&input.cluster)?;
        state.active_task_definition(&input.task_definition)?;

        let key = (input.cluster.clone(), input.service_name.clone());
        if let Some(existing) = state.services.get(&key) {
            if existing.service.status != "INACTIVE" {
                return Err(ProviderError::new(
                    codes::INVALID_PARAMETER,
                    "Creation of service was not idempotent.",
                ));
            }
        }

        let service = ContainerService {
            name: input.service_name,
            cluster: input.cluster,
            task_definition: input.task_definition,
            desired_count: input.desired_count,
            running_count: input.desired_count,
            status: "ACTIVE".to_string(),
        };
        state.services.insert(
            key,
            ServiceEntry {
                service: service.clone(),
                drain_polls_left: 0,
            },
        );
        Ok(service)
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> ProviderResult<ContainerService> {
        let mut state = self.state.lock().await;
        state.enter("describe_service", service)?;
        let entry = state
            .services
            .get_mut(&(cluster.to_string(), service.to_string()))
            .ok_or_else(|| ProviderError::new(codes::SERVICE_NOT_FOUND, "Service not found."))?;
        if entry.service.status == "DRAINING" {
            if entry.drain_polls_left == 0 {
                entry.service.status = "INACTIVE".to_string();
            } else {
                entry.drain_polls_left -= 1;
            }
        }
        Ok(entry.service.clone())
    }

    async fn update_service(
        &self,
        cluster: &str,
        service: &str,
        input: UpdateServiceInput,
    ) -> ProviderResult<ContainerService> {
        let mut state = self.state.lock().await;
        state.enter("update_service", service)?;
        if let Some(reference) = &input.task_definition {
            state.active_task_definition(reference)?;
        }
        let entry = state
            .services
            .get_mut(&(cluster.to_string(), service.to_string()))
            .ok_or_else(|| ProviderError::new(codes::SERVICE_NOT_FOUND, "Service not found."))?;
        if entry.service.status != "ACTIVE" {
            return Err(ProviderError::new(
                codes::SERVICE_NOT_ACTIVE,
                "Service was not ACTIVE.",
            ));
        }
        if let Some(reference) = input.task_definition {
            entry.service.task_definition = reference;
        }
        if let Some(count) = input.desired_count {
            entry.service.desired_count = count;
            entry.service.running_count = count;
        }
        Ok(entry.service.clone())
    }

    async fn delete_service(&self, cluster: &str, service: &str) -> ProviderResult<()> {
        let drain_polls = self.settings.service_drain_polls;
        let mut state = self.state.lock().await;
        state.enter("delete_service", service)?;
        let entry = state
            .services
            .get_mut(&(cluster.to_string(), service.to_string()))
            .ok_or_else(|| ProviderError::new(codes::SERVICE_NOT_FOUND, "Service not found."))?;
        match entry.service.status.as_str() {
            "INACTIVE" => Err(ProviderError::new(
                codes::SERVICE_NOT_ACTIVE,
                "Service was not ACTIVE.",
            )),
            "DRAINING" => Ok(()),
            _ if entry.service.desired_count > 0 => Err(ProviderError::new(
                codes::INVALID_PARAMETER,
                "The service cannot be stopped while it is scaled above 0.",
            )),
            _ => {
                entry.service.status = "DRAINING".to_string();
                entry.service.running_count = 0;
                entry.drain_polls_left = drain_polls;
                Ok(())
            }
        }
    }

    async fn run_task(&self, input: RunTaskInput) -> ProviderResult<Vec<RunningTask>> {
        let mut state = self.state.lock().await;
        state.enter("run_task", &input.task_definition)?;
        state.require_cluster(&input.cluster)?;
        state.active_task_definition(&input.task_definition)?;

        let mut started = Vec::new();
        for _ in 0..input.count {
            let id = state.next_id();
            let task = RunningTask {
                arn: format!("arn:aws:ecs:local:task/{}/{id:08x}", input.cluster),
                cluster: input.cluster.clone(),
                task_definition: input.task_definition.clone(),
                last_status: "RUNNING".to_string(),
            };
            state.tasks.insert(task.arn.clone(), task.clone());
            started.push(task);
        }
        Ok(started)
    }

    async fn describe_tasks(&self, cluster: &str, arns: &[String]) -> ProviderResult<Vec<RunningTask>> {
        let mut state = self.state.lock().await;
        state.enter("describe_tasks", cluster)?;
        Ok(arns
            .iter()
            .filter_map(|arn| state.tasks.get(arn))
            .filter(|task| task.cluster == cluster)
            .cloned()
            .collect())
    }

    async fn stop_task(&self, cluster: &str, arn: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("stop_task", arn)?;
        state.require_cluster(cluster)?;
        match state.tasks.get_mut(arn).filter(|t| t.cluster == cluster) {
            Some(task) => {
                task.last_status = "STOPPED".to_string();
                Ok(())
            }
            None => Err(ProviderError::new(
                codes::INVALID_PARAMETER,
                "The referenced task was not found.",
            )),
        }
    }
}

// ── Security groups ────────────────────────────────────────────────

#[async_trait]
impl SecurityGroupApi for SimulatedCloud {
    async fn create_security_group(&self, name: &str, description: &str, vpc_id: &str) -> ProviderResult<String> {
        let eni_attempts = self.settings.eni_release_attempts;
        let mut state = self.state.lock().await;
        state.enter("create_security_group", name)?;
        if state.group_by_name(name).is_some() {
            return Err(ProviderError::new(
                codes::GROUP_DUPLICATE,
                format!("The security group '{name}' already exists for VPC '{vpc_id}'"),
            ));
        }
        let group_id = format!("sg-{:08x}", state.next_id());
        state.groups.insert(
            group_id.clone(),
            GroupEntry {
                group: SecurityGroup {
                    group_id: group_id.clone(),
                    group_name: name.to_string(),
                    description: description.to_string(),
                    vpc_id: vpc_id.to_string(),
                    ingress_from: Vec::new(),
                },
                eni_attempts_left: eni_attempts,
            },
        );
        Ok(group_id)
    }

    async fn describe_security_group(&self, name: &str) -> ProviderResult<Option<SecurityGroup>> {
        let mut state = self.state.lock().await;
        state.enter("describe_security_group", name)?;
        Ok(state.group_by_name(name).map(|g| g.group.clone()))
    }

    async fn delete_security_group(&self, group_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_security_group", group_id)?;
        if !state.groups.contains_key(group_id) {
            return Err(group_not_found(group_id));
        }

        let dependency = || {
            ProviderError::new(
                codes::DEPENDENCY_VIOLATION,
                format!("resource {group_id} has a dependent object"),
            )
        };
        let used_by_fleet = state
            .asgs
            .values()
            .any(|asg| asg.security_groups.iter().any(|g| g == group_id));
        let referenced_by_peer = state.groups.values().any(|g| {
            g.group.group_id != group_id && g.group.ingress_from.iter().any(|src| src == group_id)
        });
        if used_by_fleet || referenced_by_peer {
            return Err(dependency());
        }

        if let Some(entry) = state.groups.get_mut(group_id) {
            if entry.eni_attempts_left > 0 {
                entry.eni_attempts_left -= 1;
                return Err(dependency());
            }
        }
        state.groups.remove(group_id);
        Ok(())
    }

    async fn authorize_ingress_from_group(&self, group_id: &str, source_group_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("authorize_ingress_from_group", &format!("{group_id}<-{source_group_id}"))?;
        if !state.groups.contains_key(source_group_id) {
            return Err(group_not_found(source_group_id));
        }
        let entry = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| group_not_found(group_id))?;
        if entry.group.ingress_from.iter().any(|src| src == source_group_id) {
            return Err(ProviderError::new(
                codes::DUPLICATE_PERMISSION,
                format!("the specified rule \"peer: {source_group_id}, ALL, ALLOW\" already exists"),
            ));
        }
        entry.group.ingress_from.push(source_group_id.to_string());
        Ok(())
    }

    async fn revoke_ingress_from_group(&self, group_id: &str, source_group_id: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("revoke_ingress_from_group", &format!("{group_id}<-{source_group_id}"))?;
        let entry = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| group_not_found(group_id))?;
        let before = entry.group.ingress_from.len();
        entry.group.ingress_from.retain(|src| src != source_group_id);
        if entry.group.ingress_from.len() == before {
            return Err(ProviderError::new(
                codes::PERMISSION_NOT_FOUND,
                "The specified rule does not exist in this security group.",
            ));
        }
        Ok(())
    }
}

// ── Autoscaling ────────────────────────────────────────────────────

#[async_trait]
impl AutoScalingApi for SimulatedCloud {
    async fn create_launch_configuration(&self, input: LaunchConfiguration) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("create_launch_configuration", &input.name)?;
        if state.launch_configs.contains_key(&input.name) {
            return Err(ProviderError::new(
                codes::ALREADY_EXISTS,
                format!("Launch Configuration by this name already exists - {}", input.name),
            ));
        }
        state.launch_configs.insert(input.name.clone(), input);
        Ok(())
    }

    async fn describe_launch_configuration(&self, name: &str) -> ProviderResult<LaunchConfiguration> {
        let mut state = self.state.lock().await;
        state.enter("describe_launch_configuration", name)?;
        state.launch_configs.get(name).cloned().ok_or_else(|| {
            ProviderError::new(
                codes::VALIDATION_ERROR,
                format!("Launch configuration '{name}' not found"),
            )
        })
    }

    async fn delete_launch_configuration(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("delete_launch_configuration", name)?;
        if !state.launch_configs.contains_key(name) {
            return Err(launch_config_not_found(name));
        }
        let attached = state.asgs.values().find(|asg| {
            asg.polls_left.is_none()
                && asg.group.launch_configuration_name.as_deref() == Some(name)
        });
        if let Some(asg) = attached {
            return Err(ProviderError::new(
                codes::RESOURCE_IN_USE,
                format!(
                    "Cannot delete launch configuration {name} because it is attached to AutoScalingGroup {}",
                    asg.group.name
                ),
            ));
        }
        state.launch_configs.remove(name);
        Ok(())
    }

    async fn create_auto_scaling_group(&self, input: CreateAutoScalingGroupInput) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("create_auto_scaling_group", &input.name)?;
        if state.asgs.contains_key(&input.name) {
            return Err(ProviderError::new(
                codes::ALREADY_EXISTS,
                format!("AutoScalingGroup by this name already exists - {}", input.name),
            ));
        }
        if input.min_size > input.max_size {
            return Err(ProviderError::new(
                codes::VALIDATION_ERROR,
                "Max bound, must be greater than or equal to min bound",
            ));
        }
        let launch_config = state
            .launch_configs
            .get(&input.launch_configuration_name)
            .ok_or_else(|| launch_config_not_found(&input.launch_configuration_name))?;
        let security_groups = launch_config.security_groups.clone();

        let name = input.name.clone();
        state.asgs.insert(
            name.clone(),
            AsgEntry {
                group: AutoScalingGroup {
                    name: input.name,
                    launch_configuration_name: Some(input.launch_configuration_name),
                    min_size: input.min_size,
                    max_size: input.max_size,
                    desired_capacity: input.min_size,
                    instances: Vec::new(),
                    status: None,
                },
                security_groups,
                polls_left: None,
            },
        );
        state.rescale(&name);
        Ok(())
    }

    async fn describe_auto_scaling_group(&self, name: &str) -> ProviderResult<AutoScalingGroup> {
        let mut state = self.state.lock().await;
        state.enter("describe_auto_scaling_group", name)?;
        let not_found = || {
            ProviderError::new(
                codes::VALIDATION_ERROR,
                format!("AutoScaling Group with name '{name}' not found"),
            )
        };
        let entry = state.asgs.get_mut(name).ok_or_else(not_found)?;
        match entry.polls_left {
            Some(0) => {
                state.asgs.remove(name);
                Err(not_found())
            }
            Some(left) => {
                entry.polls_left = Some(left - 1);
                Ok(entry.group.clone())
            }
            None => Ok(entry.group.clone()),
        }
    }

    async fn update_min_size(&self, name: &str, size: u32) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("update_min_size", name)?;
        let entry = state.asgs.get_mut(name).ok_or_else(|| asg_not_found(name))?;
        if entry.polls_left.is_some() {
            return Err(ProviderError::new(
                codes::VALIDATION_ERROR,
                format!("AutoScalingGroup {name} is pending delete."),
            ));
        }
        if size > entry.group.max_size {
            return Err(ProviderError::new(
                codes::VALIDATION_ERROR,
                "Max bound, must be greater than or equal to min bound",
            ));
        }
        entry.group.min_size = size;
        entry.group.desired_capacity = size;
        state.rescale(name);
        Ok(())
    }

    async fn update_max_size(&self, name: &str, size: u32) -> ProviderResult<()> {
        let mut state = self.state.lock().await;
        state.enter("update_max_size", name)?;
        let entry = state.asgs.get_mut(name).ok_or_else(|| asg_not_found(name))?;
        if entry.polls_left.is_some() {
            return Err(ProviderError::new(
                codes::VALIDATION_ERROR,
                format!("AutoScalingGroup {name} is pending delete."),
            ));
        }
        if size < entry.group.min_size {
            return Err(ProviderError::new(
                codes::VALIDATION_ERROR,
                "Max bound, must be greater than or equal to min bound",
            ));
        }
        entry.group.max_size = size;
        state.rescale(name);
        Ok(())
    }

    async fn delete_auto_scaling_group(&self, name: &str) -> ProviderResult<()> {
        let delete_polls = self.settings.asg_delete_polls;
        let mut state = self.state.lock().await;
        state.enter("delete_auto_scaling_group", name)?;
        let entry = state.asgs.get_mut(name).ok_or_else(|| asg_not_found(name))?;
        if entry.polls_left.is_some() {
            return Ok(());
        }
        if delete_polls == 0 {
            state.asgs.remove(name);
            return Ok(());
        }
        entry.group.status = Some(DELETE_IN_PROGRESS.to_string());
        entry.group.instances.clear();
        entry.polls_left = Some(delete_polls);
        Ok(())
    }
}
