//! ServiceManager — long-running container services inside an environment.

use tracing::{info, warn};

use strata_core::{
    CreateServiceRequest, EntityType, Service, ServiceSummary, Tag, UpdateServiceRequest,
    generate_entity_id, tag_keys,
};
use strata_provider::{CreateServiceInput, UpdateServiceInput, codes};
use strata_wait::Poll;

use crate::context::{Context, tolerate};
use crate::deploy::DeployManager;
use crate::error::{OrchestratorError, OrchestratorResult};

const SERVICE_GONE: &[&str] = &[
    codes::SERVICE_NOT_FOUND,
    codes::SERVICE_NOT_ACTIVE,
    codes::CLUSTER_NOT_FOUND,
];

#[derive(Clone)]
pub struct ServiceManager {
    ctx: Context,
    deploys: DeployManager,
}

impl ServiceManager {
    pub(crate) fn new(ctx: Context, deploys: DeployManager) -> Self {
        Self { ctx, deploys }
    }

    pub async fn create(&self, req: CreateServiceRequest) -> OrchestratorResult<Service> {
        let name = req.service_name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::Validation("service_name is required".into()));
        }
        if !self
            .ctx
            .tags
            .exists(EntityType::Environment, &req.environment_id)
            .await?
        {
            return Err(OrchestratorError::EnvironmentNotFound(req.environment_id));
        }
        let task_definition = self.deploys.task_definition(&req.deploy_id).await?;

        let service_id = generate_entity_id(name);
        let codec = self.ctx.codec();
        self.ctx
            .providers
            .clusters
            .create_service(CreateServiceInput {
                cluster: codec.encode(&req.environment_id).to_string(),
                service_name: codec.encode(&service_id).to_string(),
                task_definition,
                desired_count: 1,
            })
            .await?;

        let tags = &self.ctx.tags;
        for (key, value) in [
            (tag_keys::NAME, name),
            (tag_keys::ENVIRONMENT_ID, req.environment_id.as_str()),
            (tag_keys::DEPLOY_ID, req.deploy_id.as_str()),
        ] {
            tags.insert(Tag::new(EntityType::Service, &service_id, key, value))
                .await?;
        }

        info!(%service_id, environment_id = %req.environment_id, deploy_id = %req.deploy_id, "service created");
        self.read(&service_id).await
    }

    pub async fn read(&self, service_id: &str) -> OrchestratorResult<Service> {
        let tags = self
            .ctx
            .tags
            .select_by_type_and_id(EntityType::Service.as_str(), service_id)
            .await?;
        let environment_id = tags
            .value_of(tag_keys::ENVIRONMENT_ID)
            .ok_or_else(|| OrchestratorError::ServiceNotFound(service_id.to_string()))?;

        let codec = self.ctx.codec();
        let described = self
            .ctx
            .providers
            .clusters
            .describe_service(
                codec.encode(environment_id).as_str(),
                codec.encode(service_id).as_str(),
            )
            .await;
        let service = match described {
            Ok(service) if service.status != "INACTIVE" => service,
            Ok(_) => return Err(OrchestratorError::ServiceNotFound(service_id.to_string())),
            Err(err) if err.matches(SERVICE_GONE, &[]) => {
                return Err(OrchestratorError::ServiceNotFound(service_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        Ok(Service {
            service_id: service_id.to_string(),
            service_name: tags.value_of(tag_keys::NAME).unwrap_or_default().to_string(),
            environment_id: environment_id.to_string(),
            deploy_id: tags.value_of(tag_keys::DEPLOY_ID).unwrap_or_default().to_string(),
            desired_count: service.desired_count,
            running_count: service.running_count,
            status: service.status,
        })
    }

    pub async fn list(&self) -> OrchestratorResult<Vec<ServiceSummary>> {
        let tags = self.ctx.tags.select_by_type(EntityType::Service.as_str()).await?;
        Ok(tags
            .entity_ids()
            .into_iter()
            .map(|service_id| {
                let own = tags.with_id(&service_id);
                ServiceSummary {
                    service_name: own.value_of(tag_keys::NAME).unwrap_or_default().to_string(),
                    environment_id: own
                        .value_of(tag_keys::ENVIRONMENT_ID)
                        .unwrap_or_default()
                        .to_string(),
                    service_id,
                }
            })
            .collect())
    }

    /// Roll to another deploy and/or rescale.
    pub async fn update(
        &self,
        service_id: &str,
        req: UpdateServiceRequest,
    ) -> OrchestratorResult<Service> {
        let current = self.read(service_id).await?;

        let task_definition = match &req.deploy_id {
            Some(deploy_id) => Some(self.deploys.task_definition(deploy_id).await?),
            None => None,
        };

        let codec = self.ctx.codec();
        self.ctx
            .providers
            .clusters
            .update_service(
                codec.encode(&current.environment_id).as_str(),
                codec.encode(service_id).as_str(),
                UpdateServiceInput {
                    task_definition,
                    desired_count: req.desired_count,
                },
            )
            .await?;

        if let Some(deploy_id) = req.deploy_id {
            self.ctx
                .tags
                .insert(Tag::new(EntityType::Service, service_id, tag_keys::DEPLOY_ID, deploy_id))
                .await?;
        }

        info!(%service_id, "service updated");
        self.read(service_id).await
    }

    /// Scale to zero, delete, and wait for the service to go inactive.
    /// Safe to repeat.
    pub async fn delete(&self, service_id: &str) -> OrchestratorResult<()> {
        let environment_id = self
            .ctx
            .tags
            .value_of(EntityType::Service, service_id, tag_keys::ENVIRONMENT_ID)
            .await?;

        if let Some(environment_id) = environment_id {
            let codec = self.ctx.codec();
            let cluster = codec.encode(&environment_id);
            let service = codec.encode(service_id);
            let clusters = &self.ctx.providers.clusters;

            tolerate(
                clusters
                    .update_service(
                        cluster.as_str(),
                        service.as_str(),
                        UpdateServiceInput {
                            desired_count: Some(0),
                            ..UpdateServiceInput::default()
                        },
                    )
                    .await
                    .map(|_| ()),
                "scale service to zero",
                SERVICE_GONE,
                &[],
            )?;
            tolerate(
                clusters.delete_service(cluster.as_str(), service.as_str()).await,
                "delete service",
                SERVICE_GONE,
                &[],
            )?;

            let (cluster, service) = (cluster.as_str(), service.as_str());
            self.ctx
                .waiter("service deletion")
                .wait(|| async move {
                    match clusters.describe_service(cluster, service).await {
                        Ok(svc) if svc.status == "INACTIVE" => Ok(Poll::Ready),
                        Ok(svc) => Ok(Poll::pending(svc.status)),
                        Err(err) if err.matches(SERVICE_GONE, &[]) => Ok(Poll::Ready),
                        Err(err) => Err(OrchestratorError::from(err)),
                    }
                })
                .await?;
        } else {
            warn!(%service_id, "service has no environment tag; only removing tags");
        }

        self.ctx
            .tags
            .delete_entity(EntityType::Service.as_str(), service_id)
            .await?;
        info!(%service_id, "service deleted");
        Ok(())
    }
}
