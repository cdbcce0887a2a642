//! DeployManager — versioned task definitions.
//!
//! A deploy name maps to one task-definition family; every create registers
//! a new revision. The deploy ID is `{family_id}.{revision}`.

use tracing::{info, warn};

use strata_core::{
    CreateDeployRequest, Deploy, DeploySummary, EntityType, Tag, generate_entity_id, tag_keys,
};
use strata_provider::codes;

use crate::context::{Context, tolerate};
use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Clone)]
pub struct DeployManager {
    ctx: Context,
}

impl DeployManager {
    pub(crate) fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, req: CreateDeployRequest) -> OrchestratorResult<Deploy> {
        let name = req.deploy_name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::Validation("deploy_name is required".into()));
        }
        validate_document(&req.document)?;

        let family_id = generate_entity_id(name);
        let family = self.ctx.codec().encode(&family_id);
        let td = self
            .ctx
            .providers
            .clusters
            .register_task_definition(family.as_str(), &req.document)
            .await?;

        let deploy_id = format!("{family_id}.{}", td.revision);
        let version = td.revision.to_string();
        let tags = &self.ctx.tags;
        tags.insert(Tag::new(EntityType::Deploy, &deploy_id, tag_keys::NAME, name))
            .await?;
        tags.insert(Tag::new(EntityType::Deploy, &deploy_id, tag_keys::VERSION, &version))
            .await?;

        info!(%deploy_id, %family, "deploy registered");
        Ok(Deploy {
            deploy_id,
            deploy_name: name.to_string(),
            version,
            document: td.document,
        })
    }

    pub async fn read(&self, deploy_id: &str) -> OrchestratorResult<Deploy> {
        let (family_id, revision) = parse_deploy_id(deploy_id)
            .ok_or_else(|| OrchestratorError::DeployNotFound(deploy_id.to_string()))?;
        let family = self.ctx.codec().encode(family_id);

        let td = match self
            .ctx
            .providers
            .clusters
            .describe_task_definition(family.as_str(), revision)
            .await
        {
            Ok(td) if td.status != "INACTIVE" => td,
            Ok(_) => return Err(OrchestratorError::DeployNotFound(deploy_id.to_string())),
            Err(err) if err.has_code(codes::CLIENT_EXCEPTION) => {
                return Err(OrchestratorError::DeployNotFound(deploy_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let tags = self
            .ctx
            .tags
            .select_by_type_and_id(EntityType::Deploy.as_str(), deploy_id)
            .await?;
        Ok(Deploy {
            deploy_id: deploy_id.to_string(),
            deploy_name: tags.value_of(tag_keys::NAME).unwrap_or(family_id).to_string(),
            version: td.revision.to_string(),
            document: td.document,
        })
    }

    pub async fn list(&self) -> OrchestratorResult<Vec<DeploySummary>> {
        let tags = self.ctx.tags.select_by_type(EntityType::Deploy.as_str()).await?;
        Ok(tags
            .entity_ids()
            .into_iter()
            .map(|deploy_id| {
                let own = tags.with_id(&deploy_id);
                DeploySummary {
                    deploy_name: own.value_of(tag_keys::NAME).unwrap_or_default().to_string(),
                    version: own.value_of(tag_keys::VERSION).unwrap_or_default().to_string(),
                    deploy_id,
                }
            })
            .collect())
    }

    /// Deregister the revision and drop its tags. Safe to repeat.
    pub async fn delete(&self, deploy_id: &str) -> OrchestratorResult<()> {
        match parse_deploy_id(deploy_id) {
            Some((family_id, revision)) => {
                let family = self.ctx.codec().encode(family_id);
                tolerate(
                    self.ctx
                        .providers
                        .clusters
                        .deregister_task_definition(family.as_str(), revision)
                        .await,
                    "deregister task definition",
                    &[codes::CLIENT_EXCEPTION],
                    &[],
                )?;
            }
            None => warn!(%deploy_id, "malformed deploy id; only removing tags"),
        }

        self.ctx
            .tags
            .delete_entity(EntityType::Deploy.as_str(), deploy_id)
            .await?;
        info!(%deploy_id, "deploy deleted");
        Ok(())
    }

    /// `family:revision` of an active deploy, as services and tasks
    /// reference it.
    pub(crate) async fn task_definition(&self, deploy_id: &str) -> OrchestratorResult<String> {
        self.read(deploy_id).await?;
        let (family_id, revision) = parse_deploy_id(deploy_id)
            .ok_or_else(|| OrchestratorError::DeployNotFound(deploy_id.to_string()))?;
        Ok(format!("{}:{revision}", self.ctx.codec().encode(family_id)))
    }
}

/// Split `{family_id}.{revision}`.
pub(crate) fn parse_deploy_id(deploy_id: &str) -> Option<(&str, u32)> {
    let (family_id, revision) = deploy_id.rsplit_once('.')?;
    if family_id.is_empty() {
        return None;
    }
    Some((family_id, revision.parse().ok()?))
}

fn validate_document(document: &str) -> OrchestratorResult<()> {
    let value: serde_json::Value = serde_json::from_str(document)
        .map_err(|e| OrchestratorError::Validation(format!("deploy document is not valid JSON: {e}")))?;
    match value.get("containerDefinitions") {
        Some(serde_json::Value::Array(_)) => Ok(()),
        _ => Err(OrchestratorError::Validation(
            "deploy document must contain a containerDefinitions array".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_ids_split_on_last_dot() {
        assert_eq!(parse_deploy_id("api1a2b3c4d.3"), Some(("api1a2b3c4d", 3)));
        assert_eq!(parse_deploy_id("api"), None);
        assert_eq!(parse_deploy_id(".3"), None);
        assert_eq!(parse_deploy_id("api.latest"), None);
    }

    #[test]
    fn documents_need_container_definitions() {
        assert!(validate_document(r#"{"containerDefinitions": []}"#).is_ok());
        assert!(validate_document(r#"{"family": "x"}"#).unwrap_err().is_validation());
        assert!(validate_document("not json").unwrap_err().is_validation());
    }
}
