//! The `TagStore` contract shared by all backends.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strata_core::{EntityType, Tag, Tags};

use crate::error::{TagError, TagResult};

/// Read consistency honoured by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Observes every write committed before the read started.
    Strong,
    /// May be served from a stale snapshot.
    Relaxed,
}

/// Consistency of each read path of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadConsistency {
    /// `select_by_type_and_id` / `select_by_type`. Existence checks and
    /// relation lookups depend on these, so backends must make them strong.
    pub point: Consistency,
    /// `select_all`.
    pub bulk: Consistency,
}

/// All tags of one entity, as persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub entity_type: String,
    pub entity_id: String,
    pub tags: BTreeMap<String, String>,
}

impl TagRecord {
    pub fn new(entity_type: &str, entity_id: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            tags: BTreeMap::new(),
        }
    }

    pub fn to_tags(&self) -> Tags {
        self.tags
            .iter()
            .map(|(key, value)| Tag {
                entity_type: self.entity_type.clone(),
                entity_id: self.entity_id.clone(),
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }
}

/// Generic metadata store keyed by `(entity_type, entity_id)`.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Upsert one key. Creates the entity record when absent.
    async fn insert(&self, tag: Tag) -> TagResult<()>;

    /// Remove one key; a no-op when absent. Removing the last key removes
    /// the record.
    async fn delete(&self, entity_type: &str, entity_id: &str, key: &str) -> TagResult<()>;

    /// Remove the whole record. Returns the number of keys removed.
    async fn delete_entity(&self, entity_type: &str, entity_id: &str) -> TagResult<usize>;

    async fn select_by_type_and_id(&self, entity_type: &str, entity_id: &str) -> TagResult<Tags>;

    async fn select_by_type(&self, entity_type: &str) -> TagResult<Tags>;

    async fn select_all(&self) -> TagResult<Tags>;

    /// Wipe every record. Administrative/test use only.
    async fn clear(&self) -> TagResult<()>;

    fn consistency(&self) -> ReadConsistency;

    /// `true` when the entity has at least one tag.
    async fn exists(&self, entity_type: EntityType, entity_id: &str) -> TagResult<bool> {
        let tags = self
            .select_by_type_and_id(entity_type.as_str(), entity_id)
            .await?;
        Ok(!tags.is_empty())
    }

    /// Value of a single key, if present.
    async fn value_of(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        key: &str,
    ) -> TagResult<Option<String>> {
        let tags = self
            .select_by_type_and_id(entity_type.as_str(), entity_id)
            .await?;
        Ok(tags.value_of(key).map(str::to_string))
    }
}

// ── Validation ─────────────────────────────────────────────────────

pub(crate) fn validate_entity(entity_type: &str, entity_id: &str) -> TagResult<()> {
    if entity_type.is_empty() {
        return Err(TagError::MissingField("entity_type"));
    }
    if entity_id.is_empty() {
        return Err(TagError::MissingField("entity_id"));
    }
    if entity_type.contains('/') {
        return Err(TagError::InvalidField {
            field: "entity_type",
            reason: format!("'{entity_type}' must not contain '/'"),
        });
    }
    Ok(())
}

pub(crate) fn validate_type(entity_type: &str) -> TagResult<()> {
    if entity_type.is_empty() {
        return Err(TagError::MissingField("entity_type"));
    }
    Ok(())
}

pub(crate) fn validate_key(key: &str) -> TagResult<()> {
    if key.is_empty() {
        return Err(TagError::MissingField("key"));
    }
    Ok(())
}

pub(crate) fn record_key(entity_type: &str, entity_id: &str) -> String {
    format!("{entity_type}/{entity_id}")
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every backend must satisfy; run by each backend's tests.

    use std::sync::Arc;

    use super::*;

    pub async fn insert_then_select(store: &dyn TagStore) {
        store
            .insert(Tag::new(EntityType::Environment, "e1", "name", "prod"))
            .await
            .unwrap();
        store
            .insert(Tag::new(EntityType::Environment, "e1", "os", "linux"))
            .await
            .unwrap();

        let tags = store.select_by_type_and_id("environment", "e1").await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.value_of("name"), Some("prod"));
        assert_eq!(tags.value_of("os"), Some("linux"));
    }

    pub async fn insert_overwrites_existing_key(store: &dyn TagStore) {
        store
            .insert(Tag::new(EntityType::Deploy, "d1", "version", "1"))
            .await
            .unwrap();
        store
            .insert(Tag::new(EntityType::Deploy, "d1", "version", "2"))
            .await
            .unwrap();

        let tags = store.select_by_type_and_id("deploy", "d1").await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags.value_of("version"), Some("2"));
    }

    pub async fn missing_record_is_empty_not_error(store: &dyn TagStore) {
        assert!(store.select_by_type_and_id("task", "nope").await.unwrap().is_empty());
        assert!(store.select_by_type("task").await.unwrap().is_empty());
        assert!(store.select_all().await.unwrap().is_empty());
        assert!(!store.exists(EntityType::Task, "nope").await.unwrap());
    }

    pub async fn record_does_not_outlive_last_tag(store: &dyn TagStore) {
        let keys = ["a", "b", "c", "d"];
        for key in keys {
            store
                .insert(Tag::new(EntityType::Service, "s1", key, "v"))
                .await
                .unwrap();
        }
        for (i, key) in keys.iter().enumerate() {
            store.delete("service", "s1", key).await.unwrap();
            let remaining = store.select_by_type_and_id("service", "s1").await.unwrap();
            assert_eq!(remaining.len(), keys.len() - i - 1);
        }

        assert!(!store.exists(EntityType::Service, "s1").await.unwrap());
        assert!(store.select_by_type("service").await.unwrap().is_empty());
    }

    pub async fn delete_absent_key_is_noop(store: &dyn TagStore) {
        store.delete("task", "never", "name").await.unwrap();
        store
            .insert(Tag::new(EntityType::Task, "t1", "name", "job"))
            .await
            .unwrap();
        store.delete("task", "t1", "other").await.unwrap();
        assert_eq!(store.select_by_type_and_id("task", "t1").await.unwrap().len(), 1);
    }

    pub async fn select_by_type_is_scoped(store: &dyn TagStore) {
        store
            .insert(Tag::new(EntityType::Environment, "e1", "name", "a"))
            .await
            .unwrap();
        store
            .insert(Tag::new(EntityType::Environment, "e2", "name", "b"))
            .await
            .unwrap();
        store
            .insert(Tag::new(EntityType::Service, "e1", "name", "c"))
            .await
            .unwrap();

        let envs = store.select_by_type("environment").await.unwrap();
        assert_eq!(envs.len(), 2);
        assert_eq!(envs.entity_ids().len(), 2);
        assert_eq!(store.select_all().await.unwrap().len(), 3);
    }

    pub async fn delete_entity_and_clear(store: &dyn TagStore) {
        for key in ["name", "os"] {
            store
                .insert(Tag::new(EntityType::Environment, "e1", key, "v"))
                .await
                .unwrap();
        }
        store
            .insert(Tag::new(EntityType::Task, "t1", "name", "v"))
            .await
            .unwrap();

        assert_eq!(store.delete_entity("environment", "e1").await.unwrap(), 2);
        assert_eq!(store.delete_entity("environment", "e1").await.unwrap(), 0);
        assert_eq!(store.select_all().await.unwrap().len(), 1);

        store.clear().await.unwrap();
        assert!(store.select_all().await.unwrap().is_empty());
    }

    pub async fn rejects_missing_arguments(store: &dyn TagStore) {
        let err = store
            .insert(Tag::new(EntityType::Task, "", "name", "v"))
            .await
            .unwrap_err();
        assert!(matches!(err, TagError::MissingField("entity_id")));

        let err = store.select_by_type_and_id("", "t1").await.unwrap_err();
        assert!(matches!(err, TagError::MissingField("entity_type")));

        let err = store.delete("task", "t1", "").await.unwrap_err();
        assert!(err.is_validation());
    }

    pub async fn concurrent_inserts_keep_every_key(store: Arc<dyn TagStore>) {
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert(Tag::new(EntityType::Environment, "fresh", format!("key{i}"), "v"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let tags = store.select_by_type_and_id("environment", "fresh").await.unwrap();
        assert_eq!(tags.len(), 16);
    }
}
