//! Entity models, tags, and request payloads shared across Strata crates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical identifier of an entity (stable, client-facing).
pub type EntityId = String;

// ── Entities ───────────────────────────────────────────────────────

/// Kinds of logical entities tracked in the tag store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Environment,
    Deploy,
    Service,
    Task,
    Job,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Environment => "environment",
            EntityType::Deploy => "deploy",
            EntityType::Service => "service",
            EntityType::Task => "task",
            EntityType::Job => "job",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "environment" => Ok(EntityType::Environment),
            "deploy" => Ok(EntityType::Deploy),
            "service" => Ok(EntityType::Service),
            "task" => Ok(EntityType::Task),
            "job" => Ok(EntityType::Job),
            other => Err(format!("unknown entity type '{other}'")),
        }
    }
}

/// Well-known tag keys.
pub mod tag_keys {
    pub const NAME: &str = "name";
    pub const OS: &str = "os";
    pub const VERSION: &str = "version";
    pub const ENVIRONMENT_ID: &str = "environment_id";
    pub const DEPLOY_ID: &str = "deploy_id";
    /// `link:{peer_environment_id}`
    pub const LINK_PREFIX: &str = "link:";
    /// `arn:{index}`
    pub const ARN_PREFIX: &str = "arn:";
}

// ── Tags ───────────────────────────────────────────────────────────

/// A single `(entity_type, entity_id, key, value)` metadata item.
///
/// `entity_type` is kept as a plain string so the store stays generic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub entity_type: String,
    pub entity_id: String,
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.as_str().to_string(),
            entity_id: entity_id.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A collection of tags with query helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(Vec<Tag>);

impl Tags {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.0.iter()
    }

    pub fn push(&mut self, tag: Tag) {
        self.0.push(tag);
    }

    pub fn with_type(&self, entity_type: EntityType) -> Tags {
        self.filter(|t| t.entity_type == entity_type.as_str())
    }

    pub fn with_id(&self, entity_id: &str) -> Tags {
        self.filter(|t| t.entity_id == entity_id)
    }

    pub fn with_key(&self, key: &str) -> Tags {
        self.filter(|t| t.key == key)
    }

    pub fn with_key_prefix(&self, prefix: &str) -> Tags {
        self.filter(|t| t.key.starts_with(prefix))
    }

    /// Value of the first tag with this key.
    pub fn value_of(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Distinct entity IDs, sorted.
    pub fn entity_ids(&self) -> BTreeSet<String> {
        self.0.iter().map(|t| t.entity_id.clone()).collect()
    }

    /// Sort by (type, id, key) for stable output.
    pub fn sorted(mut self) -> Tags {
        self.0.sort();
        self
    }

    pub fn into_vec(self) -> Vec<Tag> {
        self.0
    }

    fn filter(&self, pred: impl Fn(&Tag) -> bool) -> Tags {
        Tags(self.0.iter().filter(|t| pred(t)).cloned().collect())
    }
}

impl From<Vec<Tag>> for Tags {
    fn from(tags: Vec<Tag>) -> Self {
        Self(tags)
    }
}

impl FromIterator<Tag> for Tags {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<Tag> for Tags {
    fn extend<I: IntoIterator<Item = Tag>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ── Environment ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingSystem {
    Linux,
    Windows,
}

impl OperatingSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Windows => "windows",
        }
    }
}

impl FromStr for OperatingSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "linux" => Ok(OperatingSystem::Linux),
            "windows" => Ok(OperatingSystem::Windows),
            _ => Err(format!("operating system '{s}' is not recognized")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub environment_id: EntityId,
    pub environment_name: String,
    pub cluster_count: u32,
    pub instance_size: String,
    pub security_group_id: String,
    pub operating_system: String,
    pub ami_id: String,
    pub links: Vec<EntityId>,
}

/// Listing entry; the full model needs several provider calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    pub environment_id: EntityId,
    pub environment_name: String,
    pub operating_system: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEnvironmentRequest {
    pub environment_name: String,
    pub instance_size: String,
    pub operating_system: String,
    /// Overrides the OS default AMI when set.
    #[serde(default)]
    pub ami_id: Option<String>,
    pub min_cluster_count: u32,
    /// Overrides the OS default boot script when non-empty.
    #[serde(default)]
    pub user_data_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEnvironmentRequest {
    pub min_cluster_count: u32,
}

// ── Deploy ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deploy {
    pub deploy_id: EntityId,
    pub deploy_name: String,
    pub version: String,
    /// The task definition document as registered.
    pub document: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySummary {
    pub deploy_id: EntityId,
    pub deploy_name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDeployRequest {
    pub deploy_name: String,
    /// JSON task definition with a `containerDefinitions` array.
    pub document: String,
}

// ── Service ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: EntityId,
    pub service_name: String,
    pub environment_id: EntityId,
    pub deploy_id: EntityId,
    pub desired_count: u32,
    pub running_count: u32,
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub service_id: EntityId,
    pub service_name: String,
    pub environment_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceRequest {
    pub environment_id: EntityId,
    pub deploy_id: EntityId,
    pub service_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServiceRequest {
    #[serde(default)]
    pub deploy_id: Option<EntityId>,
    #[serde(default)]
    pub desired_count: Option<u32>,
}

// ── Task ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: EntityId,
    pub task_name: String,
    pub environment_id: EntityId,
    pub deploy_id: EntityId,
    pub copies: u32,
    pub running_count: u32,
    pub pending_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: EntityId,
    pub task_name: String,
    pub environment_id: EntityId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOverride {
    pub container_name: String,
    pub environment_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub environment_id: EntityId,
    pub deploy_id: EntityId,
    pub task_name: String,
    pub copies: u32,
    #[serde(default)]
    pub container_overrides: Vec<ContainerOverride>,
}
