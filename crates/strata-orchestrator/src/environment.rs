//! EnvironmentManager — a cluster plus the fleet that serves it.
//!
//! One environment owns four provider resources, all named from its
//! logical ID through the codec:
//!
//! ```text
//! cluster               l0-{instance}-{id}
//! security group        l0-{instance}-{id}-env
//! launch configuration  l0-{instance}-{id}
//! autoscaling group     l0-{instance}-{id}
//! ```
//!
//! Create walks them in dependency order and stops at the first failure.
//! Delete walks them in reverse, treating "already gone" as success at every
//! step, so it can be re-run after a partial create or a partial delete.

use std::str::FromStr;

use tracing::{debug, info, warn};

use strata_core::{
    CreateEnvironmentRequest, EntityType, Environment, EnvironmentSummary, OperatingSystem, Tag,
    UpdateEnvironmentRequest, generate_entity_id, tag_keys,
};
use strata_provider::{CreateAutoScalingGroupInput, LaunchConfiguration, SecurityGroup, codes};
use strata_wait::Poll;

use crate::context::{Context, tolerate};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::userdata;

const ASG_GONE: &[&str] = &["name not found", "is pending delete"];

#[derive(Clone)]
pub struct EnvironmentManager {
    ctx: Context,
}

impl EnvironmentManager {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, req: CreateEnvironmentRequest) -> OrchestratorResult<Environment> {
        let name = req.environment_name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::Validation("environment_name is required".into()));
        }
        if req.instance_size.trim().is_empty() {
            return Err(OrchestratorError::Validation("instance_size is required".into()));
        }
        let os = OperatingSystem::from_str(&req.operating_system).map_err(OrchestratorError::Validation)?;

        let aws = self.ctx.aws();
        let ami = match req.ami_id.as_deref().filter(|a| !a.is_empty()) {
            Some(ami) => ami.to_string(),
            None => match os {
                OperatingSystem::Linux => aws.linux_service_ami.clone(),
                OperatingSystem::Windows => aws.windows_service_ami.clone(),
            },
        };
        let template = req
            .user_data_template
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| userdata::default_template(os));

        let environment_id = generate_entity_id(name);
        let provider_name = self.ctx.codec().encode(&environment_id);
        let user_data = userdata::render(template, provider_name.as_str(), &aws.s3_bucket)?;

        info!(%environment_id, %provider_name, os = os.as_str(), "creating environment");

        let providers = &self.ctx.providers;
        providers.clusters.create_cluster(provider_name.as_str()).await?;

        let group_id = providers
            .security_groups
            .create_security_group(
                &provider_name.security_group_name(),
                &format!("Auto-generated security group for environment {environment_id}"),
                &aws.vpc_id,
            )
            .await?;

        // New groups are not immediately visible to authorize calls.
        self.ctx.clock.sleep(self.ctx.config.waiter.propagation_delay()).await;
        tolerate(
            providers
                .security_groups
                .authorize_ingress_from_group(&group_id, &group_id)
                .await,
            "authorize self ingress",
            &[codes::DUPLICATE_PERMISSION],
            &[],
        )?;

        providers
            .autoscaling
            .create_launch_configuration(LaunchConfiguration {
                name: provider_name.launch_configuration_name(),
                image_id: ami,
                instance_type: req.instance_size.clone(),
                iam_instance_profile: aws.ecs_instance_profile.clone(),
                key_name: aws.ssh_key_pair.clone(),
                user_data,
                security_groups: vec![group_id, aws.agent_security_group_id.clone()],
            })
            .await?;

        providers
            .autoscaling
            .create_auto_scaling_group(CreateAutoScalingGroupInput {
                name: provider_name.auto_scaling_group_name(),
                launch_configuration_name: provider_name.launch_configuration_name(),
                subnets: aws.private_subnets.clone(),
                min_size: req.min_cluster_count,
                max_size: req.min_cluster_count,
            })
            .await?;

        let tags = &self.ctx.tags;
        tags.insert(Tag::new(EntityType::Environment, &environment_id, tag_keys::NAME, name))
            .await?;
        tags.insert(Tag::new(EntityType::Environment, &environment_id, tag_keys::OS, os.as_str()))
            .await?;

        info!(%environment_id, "environment created");
        self.read(&environment_id).await
    }

    /// The cluster decides existence; missing dependents are reported as
    /// zero/empty fields.
    pub async fn read(&self, environment_id: &str) -> OrchestratorResult<Environment> {
        let provider_name = self.ctx.codec().encode(environment_id);
        let providers = &self.ctx.providers;

        match providers.clusters.describe_cluster(provider_name.as_str()).await {
            Ok(_) => {}
            Err(err) if err.matches(&[codes::CLUSTER_NOT_FOUND], &["cluster not found"]) => {
                return Err(OrchestratorError::EnvironmentNotFound(environment_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        }

        let mut env = Environment {
            environment_id: environment_id.to_string(),
            ..Environment::default()
        };

        let mut launch_config_name = provider_name.launch_configuration_name();
        match providers
            .autoscaling
            .describe_auto_scaling_group(&provider_name.auto_scaling_group_name())
            .await
        {
            Ok(asg) => {
                env.cluster_count = u32::try_from(asg.instances.len()).unwrap_or(u32::MAX);
                if let Some(name) = asg.launch_configuration_name {
                    launch_config_name = name;
                }
            }
            Err(err) if err.message_contains("not found") => {
                warn!(%environment_id, error = %err, "environment has no autoscaling group");
            }
            Err(err) => return Err(err.into()),
        }

        match providers
            .autoscaling
            .describe_launch_configuration(&launch_config_name)
            .await
        {
            Ok(lc) => {
                env.instance_size = lc.instance_type;
                env.ami_id = lc.image_id;
            }
            Err(err) if err.message_contains("not found") => {
                warn!(%environment_id, error = %err, "environment has no launch configuration");
            }
            Err(err) => return Err(err.into()),
        }

        match self.security_group(environment_id).await? {
            Some(group) => env.security_group_id = group.group_id,
            None => warn!(%environment_id, "environment has no security group"),
        }

        let tags = self
            .ctx
            .tags
            .select_by_type_and_id(EntityType::Environment.as_str(), environment_id)
            .await?;
        env.environment_name = tags.value_of(tag_keys::NAME).unwrap_or_default().to_string();
        env.operating_system = tags.value_of(tag_keys::OS).unwrap_or_default().to_string();
        env.links = tags
            .with_key_prefix(tag_keys::LINK_PREFIX)
            .iter()
            .map(|tag| tag.value.clone())
            .collect();

        Ok(env)
    }

    /// Every cluster in this installation's namespace.
    pub async fn list(&self) -> OrchestratorResult<Vec<EnvironmentSummary>> {
        let clusters = self.ctx.providers.clusters.list_clusters().await?;
        let tags = self
            .ctx
            .tags
            .select_by_type(EntityType::Environment.as_str())
            .await?;

        Ok(clusters
            .iter()
            .filter_map(|cluster| self.ctx.codec().decode(&cluster.name))
            .map(|environment_id| {
                let own = tags.with_id(&environment_id);
                EnvironmentSummary {
                    environment_name: own.value_of(tag_keys::NAME).unwrap_or_default().to_string(),
                    operating_system: own.value_of(tag_keys::OS).unwrap_or_default().to_string(),
                    environment_id,
                }
            })
            .collect())
    }

    /// Resize the fleet. Raises the max first when the new min exceeds it.
    pub async fn update(
        &self,
        environment_id: &str,
        req: UpdateEnvironmentRequest,
    ) -> OrchestratorResult<Environment> {
        self.read(environment_id).await?;

        let asg_name = self.ctx.codec().encode(environment_id).auto_scaling_group_name();
        let autoscaling = &self.ctx.providers.autoscaling;
        let asg = match autoscaling.describe_auto_scaling_group(&asg_name).await {
            Ok(asg) => asg,
            Err(err) if err.message_contains("not found") => {
                warn!(%environment_id, error = %err, "cannot resize an environment without an autoscaling group");
                return Err(OrchestratorError::EnvironmentNotFound(environment_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        if asg.max_size < req.min_cluster_count {
            debug!(%environment_id, from = asg.max_size, to = req.min_cluster_count, "raising max size");
            autoscaling.update_max_size(&asg_name, req.min_cluster_count).await?;
        }
        autoscaling.update_min_size(&asg_name, req.min_cluster_count).await?;

        info!(%environment_id, min = req.min_cluster_count, "environment resized");
        self.read(environment_id).await
    }

    /// Tear down every resource of the environment. Safe to repeat.
    pub async fn delete(&self, environment_id: &str) -> OrchestratorResult<()> {
        let provider_name = self.ctx.codec().encode(environment_id);
        let asg_name = provider_name.auto_scaling_group_name();
        let lc_name = provider_name.launch_configuration_name();
        let providers = &self.ctx.providers;

        info!(%environment_id, %provider_name, "deleting environment");

        tolerate(
            providers.autoscaling.update_min_size(&asg_name, 0).await,
            "scale min to zero",
            &[],
            ASG_GONE,
        )?;
        tolerate(
            providers.autoscaling.update_max_size(&asg_name, 0).await,
            "scale max to zero",
            &[],
            ASG_GONE,
        )?;
        tolerate(
            providers.autoscaling.delete_auto_scaling_group(&asg_name).await,
            "delete autoscaling group",
            &[],
            ASG_GONE,
        )?;
        tolerate(
            providers.autoscaling.delete_launch_configuration(&lc_name).await,
            "delete launch configuration",
            &[],
            &["name not found"],
        )?;

        let autoscaling = &providers.autoscaling;
        let asg = asg_name.as_str();
        self.ctx
            .waiter("autoscaling group deletion")
            .wait(|| async move {
                match autoscaling.describe_auto_scaling_group(asg).await {
                    Ok(group) => Ok(Poll::pending(
                        group.status.unwrap_or_else(|| "present".to_string()),
                    )),
                    Err(err) if err.message_contains("not found") => Ok(Poll::Ready),
                    Err(err) => Err(OrchestratorError::from(err)),
                }
            })
            .await?;

        self.unlink_all(environment_id).await?;

        if let Some(group) = self.security_group(environment_id).await? {
            let security_groups = &providers.security_groups;
            let group_id = group.group_id.as_str();
            self.ctx
                .waiter("security group deletion")
                .wait(|| async move {
                    match security_groups.delete_security_group(group_id).await {
                        Ok(()) => Ok::<_, OrchestratorError>(Poll::Ready),
                        Err(err) if err.has_code(codes::GROUP_NOT_FOUND) => Ok(Poll::Ready),
                        Err(err) => Ok(Poll::pending(err.to_string())),
                    }
                })
                .await?;
        }

        tolerate(
            providers.clusters.delete_cluster(provider_name.as_str()).await,
            "delete cluster",
            &[codes::CLUSTER_NOT_FOUND],
            &[],
        )?;

        let removed = self
            .ctx
            .tags
            .delete_entity(EntityType::Environment.as_str(), environment_id)
            .await?;
        info!(%environment_id, tags = removed, "environment deleted");
        Ok(())
    }

    /// Allow traffic both ways between two environments. Repeating a link is
    /// a no-op.
    pub async fn create_link(&self, source_id: &str, dest_id: &str) -> OrchestratorResult<()> {
        if source_id == dest_id {
            return Err(OrchestratorError::Validation(
                "an environment cannot be linked to itself".into(),
            ));
        }
        let source = self
            .security_group(source_id)
            .await?
            .ok_or_else(|| OrchestratorError::EnvironmentNotFound(source_id.to_string()))?;
        let dest = self
            .security_group(dest_id)
            .await?
            .ok_or_else(|| OrchestratorError::EnvironmentNotFound(dest_id.to_string()))?;

        let security_groups = &self.ctx.providers.security_groups;
        for (to, from) in [(&source, &dest), (&dest, &source)] {
            tolerate(
                security_groups
                    .authorize_ingress_from_group(&to.group_id, &from.group_id)
                    .await,
                "authorize link ingress",
                &[codes::DUPLICATE_PERMISSION],
                &[],
            )?;
        }

        let tags = &self.ctx.tags;
        tags.insert(link_tag(source_id, dest_id)).await?;
        tags.insert(link_tag(dest_id, source_id)).await?;

        info!(%source_id, %dest_id, "environments linked");
        Ok(())
    }

    /// Remove a link. Missing rules and missing environments are ignored.
    pub async fn delete_link(&self, source_id: &str, dest_id: &str) -> OrchestratorResult<()> {
        let source = self.security_group(source_id).await?;
        let dest = self.security_group(dest_id).await?;

        match (&source, &dest) {
            (Some(source), Some(dest)) => {
                let security_groups = &self.ctx.providers.security_groups;
                for (to, from) in [(source, dest), (dest, source)] {
                    tolerate(
                        security_groups
                            .revoke_ingress_from_group(&to.group_id, &from.group_id)
                            .await,
                        "revoke link ingress",
                        &[codes::PERMISSION_NOT_FOUND, codes::GROUP_NOT_FOUND],
                        &[],
                    )?;
                }
            }
            _ => warn!(%source_id, %dest_id, "link endpoint has no security group; only removing tags"),
        }

        let tags = &self.ctx.tags;
        let environment = EntityType::Environment.as_str();
        tags.delete(environment, source_id, &link_key(dest_id)).await?;
        tags.delete(environment, dest_id, &link_key(source_id)).await?;

        info!(%source_id, %dest_id, "environment link removed");
        Ok(())
    }

    async fn security_group(&self, environment_id: &str) -> OrchestratorResult<Option<SecurityGroup>> {
        let group_name = self.ctx.codec().encode(environment_id).security_group_name();
        Ok(self
            .ctx
            .providers
            .security_groups
            .describe_security_group(&group_name)
            .await?)
    }

    /// Drop every link of a departing environment so peers stop
    /// referencing its security group.
    async fn unlink_all(&self, environment_id: &str) -> OrchestratorResult<()> {
        let tags = self
            .ctx
            .tags
            .select_by_type_and_id(EntityType::Environment.as_str(), environment_id)
            .await?;
        for peer in tags.with_key_prefix(tag_keys::LINK_PREFIX).iter() {
            self.delete_link(environment_id, &peer.value).await?;
        }
        Ok(())
    }
}

fn link_key(peer_id: &str) -> String {
    format!("{}{peer_id}", tag_keys::LINK_PREFIX)
}

fn link_tag(environment_id: &str, peer_id: &str) -> Tag {
    Tag::new(EntityType::Environment, environment_id, link_key(peer_id), peer_id)
}
