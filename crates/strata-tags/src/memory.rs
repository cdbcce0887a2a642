//! In-memory tag store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use strata_core::{Tag, Tags};

use crate::error::TagResult;
use crate::store::{
    Consistency, ReadConsistency, TagRecord, TagStore, record_key, validate_entity, validate_key,
    validate_type,
};

/// Process-local tag store. Every read is strongly consistent.
#[derive(Clone, Default)]
pub struct MemoryTagStore {
    records: Arc<RwLock<BTreeMap<String, TagRecord>>>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn insert(&self, tag: Tag) -> TagResult<()> {
        validate_entity(&tag.entity_type, &tag.entity_id)?;
        validate_key(&tag.key)?;

        let key = record_key(&tag.entity_type, &tag.entity_id);
        let mut records = self.records.write().await;
        records
            .entry(key)
            .or_insert_with(|| TagRecord::new(&tag.entity_type, &tag.entity_id))
            .tags
            .insert(tag.key, tag.value);
        Ok(())
    }

    async fn delete(&self, entity_type: &str, entity_id: &str, key: &str) -> TagResult<()> {
        validate_entity(entity_type, entity_id)?;
        validate_key(key)?;

        let slot = record_key(entity_type, entity_id);
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&slot) else {
            return Ok(());
        };
        if record.tags.remove(key).is_none() {
            return Ok(());
        }
        if record.tags.is_empty() {
            records.remove(&slot);
            debug!(%entity_type, %entity_id, "last tag removed, record deleted");
        }
        Ok(())
    }

    async fn delete_entity(&self, entity_type: &str, entity_id: &str) -> TagResult<usize> {
        validate_entity(entity_type, entity_id)?;
        let mut records = self.records.write().await;
        Ok(records
            .remove(&record_key(entity_type, entity_id))
            .map(|r| r.tags.len())
            .unwrap_or(0))
    }

    async fn select_by_type_and_id(&self, entity_type: &str, entity_id: &str) -> TagResult<Tags> {
        validate_entity(entity_type, entity_id)?;
        let records = self.records.read().await;
        Ok(records
            .get(&record_key(entity_type, entity_id))
            .map(TagRecord::to_tags)
            .unwrap_or_default())
    }

    async fn select_by_type(&self, entity_type: &str) -> TagResult<Tags> {
        validate_type(entity_type)?;
        let records = self.records.read().await;
        let mut tags = Tags::new();
        for record in records.values().filter(|r| r.entity_type == entity_type) {
            tags.extend(record.to_tags());
        }
        Ok(tags)
    }

    async fn select_all(&self) -> TagResult<Tags> {
        let records = self.records.read().await;
        let mut tags = Tags::new();
        for record in records.values() {
            tags.extend(record.to_tags());
        }
        Ok(tags)
    }

    async fn clear(&self) -> TagResult<()> {
        self.records.write().await.clear();
        Ok(())
    }

    fn consistency(&self) -> ReadConsistency {
        ReadConsistency {
            point: Consistency::Strong,
            bulk: Consistency::Strong,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn insert_then_select() {
        contract::insert_then_select(&MemoryTagStore::new()).await;
    }

    #[tokio::test]
    async fn insert_overwrites_existing_key() {
        contract::insert_overwrites_existing_key(&MemoryTagStore::new()).await;
    }

    #[tokio::test]
    async fn missing_record_is_empty_not_error() {
        contract::missing_record_is_empty_not_error(&MemoryTagStore::new()).await;
    }

    #[tokio::test]
    async fn record_does_not_outlive_last_tag() {
        contract::record_does_not_outlive_last_tag(&MemoryTagStore::new()).await;
    }

    #[tokio::test]
    async fn delete_absent_key_is_noop() {
        contract::delete_absent_key_is_noop(&MemoryTagStore::new()).await;
    }

    #[tokio::test]
    async fn select_by_type_is_scoped() {
        contract::select_by_type_is_scoped(&MemoryTagStore::new()).await;
    }

    #[tokio::test]
    async fn delete_entity_and_clear() {
        contract::delete_entity_and_clear(&MemoryTagStore::new()).await;
    }

    #[tokio::test]
    async fn rejects_missing_arguments() {
        contract::rejects_missing_arguments(&MemoryTagStore::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_keep_every_key() {
        contract::concurrent_inserts_keep_every_key(Arc::new(MemoryTagStore::new())).await;
    }
}
