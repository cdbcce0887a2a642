//! RedbTagStore — redb-backed tag persistence.
//!
//! One row per entity, keyed by `{entity_type}/{entity_id}`, holding the
//! JSON-serialized [`TagRecord`]. redb serializes write transactions, so the
//! read-merge-write in [`insert`](TagStore::insert) is the conditional
//! "insert if absent, else patch" write: no concurrent writer can slip in
//! between the existence check and the commit.
//!
//! Read transactions see the latest committed snapshot, so every read path
//! is strongly consistent.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use strata_core::{Tag, Tags};

use crate::error::{TagError, TagResult};
use crate::store::{
    Consistency, ReadConsistency, TagRecord, TagStore, record_key, validate_entity, validate_key,
    validate_type,
};
use crate::tables::TAGS;

/// Convert any `Display` error into a `TagError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| TagError::$variant(e.to_string())
    };
}

/// Thread-safe tag store backed by redb.
#[derive(Clone)]
pub struct RedbTagStore {
    db: Arc<Database>,
}

impl RedbTagStore {
    /// Open (or create) a persistent tag store at the given path.
    pub fn open(path: &Path) -> TagResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "tag store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory redb store.
    pub fn open_in_memory() -> TagResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> TagResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(TAGS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Run a blocking redb operation off the async runtime.
    async fn blocking<T, F>(&self, op: F) -> TagResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&RedbTagStore) -> TagResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(map_err!(Transaction))?
    }

    // ── Blocking operations ────────────────────────────────────────

    fn insert_blocking(&self, tag: &Tag) -> TagResult<()> {
        let key = record_key(&tag.entity_type, &tag.entity_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let created;
        {
            let mut table = txn.open_table(TAGS).map_err(map_err!(Table))?;
            let existing: Option<TagRecord> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            created = existing.is_none();
            let mut record =
                existing.unwrap_or_else(|| TagRecord::new(&tag.entity_type, &tag.entity_id));
            record.tags.insert(tag.key.clone(), tag.value.clone());

            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, tag = %tag.key, created, "tag stored");
        Ok(())
    }

    fn delete_blocking(&self, entity_type: &str, entity_id: &str, tag_key: &str) -> TagResult<()> {
        let key = record_key(entity_type, entity_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TAGS).map_err(map_err!(Table))?;
            let existing: Option<TagRecord> = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            let Some(mut record) = existing else {
                return Ok(());
            };
            if record.tags.remove(tag_key).is_none() {
                return Ok(());
            }

            if record.tags.is_empty() {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
                debug!(%key, "last tag removed, record deleted");
            } else {
                let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn delete_entity_blocking(&self, entity_type: &str, entity_id: &str) -> TagResult<usize> {
        let key = record_key(entity_type, entity_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed;
        {
            let mut table = txn.open_table(TAGS).map_err(map_err!(Table))?;
            removed = match table.remove(key.as_str()).map_err(map_err!(Write))? {
                Some(guard) => {
                    let record: TagRecord =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    record.tags.len()
                }
                None => 0,
            };
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, removed, "entity tags deleted");
        Ok(removed)
    }

    fn select_one_blocking(&self, entity_type: &str, entity_id: &str) -> TagResult<Tags> {
        let key = record_key(entity_type, entity_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TAGS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: TagRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(record.to_tags())
            }
            None => Ok(Tags::new()),
        }
    }

    /// Scan records whose key starts with `prefix` (all records when empty).
    fn scan_blocking(&self, prefix: &str) -> TagResult<Tags> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(TAGS).map_err(map_err!(Table))?;
        let mut tags = Tags::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(prefix) {
                break;
            }
            let record: TagRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            tags.extend(record.to_tags());
        }
        Ok(tags)
    }

    fn clear_blocking(&self) -> TagResult<()> {
        let mut removed = 0usize;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(TAGS).map_err(map_err!(Table))?;
            table
                .retain(|_, _| {
                    removed += 1;
                    false
                })
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(records = removed, "tag store cleared");
        Ok(())
    }
}

#[async_trait]
impl TagStore for RedbTagStore {
    async fn insert(&self, tag: Tag) -> TagResult<()> {
        validate_entity(&tag.entity_type, &tag.entity_id)?;
        validate_key(&tag.key)?;
        self.blocking(move |store| store.insert_blocking(&tag)).await
    }

    async fn delete(&self, entity_type: &str, entity_id: &str, key: &str) -> TagResult<()> {
        validate_entity(entity_type, entity_id)?;
        validate_key(key)?;
        let (entity_type, entity_id, key) =
            (entity_type.to_string(), entity_id.to_string(), key.to_string());
        self.blocking(move |store| store.delete_blocking(&entity_type, &entity_id, &key))
            .await
    }

    async fn delete_entity(&self, entity_type: &str, entity_id: &str) -> TagResult<usize> {
        validate_entity(entity_type, entity_id)?;
        let (entity_type, entity_id) = (entity_type.to_string(), entity_id.to_string());
        self.blocking(move |store| store.delete_entity_blocking(&entity_type, &entity_id))
            .await
    }

    async fn select_by_type_and_id(&self, entity_type: &str, entity_id: &str) -> TagResult<Tags> {
        validate_entity(entity_type, entity_id)?;
        let (entity_type, entity_id) = (entity_type.to_string(), entity_id.to_string());
        self.blocking(move |store| store.select_one_blocking(&entity_type, &entity_id))
            .await
    }

    async fn select_by_type(&self, entity_type: &str) -> TagResult<Tags> {
        validate_type(entity_type)?;
        let prefix = format!("{entity_type}/");
        self.blocking(move |store| store.scan_blocking(&prefix)).await
    }

    async fn select_all(&self) -> TagResult<Tags> {
        self.blocking(|store| store.scan_blocking("")).await
    }

    async fn clear(&self) -> TagResult<()> {
        self.blocking(|store| store.clear_blocking()).await
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
    use strata_core::EntityType;

    fn store() -> RedbTagStore {
        RedbTagStore::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn insert_then_select() {
        contract::insert_then_select(&store()).await;
    }

    #[tokio::test]
    async fn insert_overwrites_existing_key() {
        contract::insert_overwrites_existing_key(&store()).await;
    }

    #[tokio::test]
    async fn missing_record_is_empty_not_error() {
        contract::missing_record_is_empty_not_error(&store()).await;
    }

    #[tokio::test]
    async fn record_does_not_outlive_last_tag() {
        contract::record_does_not_outlive_last_tag(&store()).await;
    }

    #[tokio::test]
    async fn delete_absent_key_is_noop() {
        contract::delete_absent_key_is_noop(&store()).await;
    }

    #[tokio::test]
    async fn select_by_type_is_scoped() {
        contract::select_by_type_is_scoped(&store()).await;
    }

    #[tokio::test]
    async fn delete_entity_and_clear() {
        contract::delete_entity_and_clear(&store()).await;
    }

    #[tokio::test]
    async fn rejects_missing_arguments() {
        contract::rejects_missing_arguments(&store()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_keep_every_key() {
        contract::concurrent_inserts_keep_every_key(Arc::new(store())).await;
    }

    #[tokio::test]
    async fn type_prefix_does_not_match_longer_type_names() {
        let store = store();
        store
            .insert(Tag {
                entity_type: "environment_archive".to_string(),
                entity_id: "e1".to_string(),
                key: "name".to_string(),
                value: "old".to_string(),
            })
            .await
            .unwrap();
        store
            .insert(Tag::new(EntityType::Environment, "e1", "name", "prod"))
            .await
            .unwrap();

        let envs = store.select_by_type("environment").await.unwrap();
        assert_eq!(envs.len(), 1);
        assert_eq!(envs.value_of("name"), Some("prod"));
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tags.redb");

        {
            let store = RedbTagStore::open(&db_path).unwrap();
            store
                .insert(Tag::new(EntityType::Environment, "e1", "name", "prod"))
                .await
                .unwrap();
        }

        let store = RedbTagStore::open(&db_path).unwrap();
        let tags = store.select_by_type_and_id("environment", "e1").await.unwrap();
        assert_eq!(tags.value_of("name"), Some("prod"));
    }

    #[tokio::test]
    async fn clear_wipes_every_record_durably() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("tags.redb");

        {
            let store = RedbTagStore::open(&db_path).unwrap();
            for n in 0..20 {
                let id = format!("e{n}");
                store
                    .insert(Tag::new(EntityType::Environment, &id, "name", "env"))
                    .await
                    .unwrap();
                store
                    .insert(Tag::new(EntityType::Service, &id, "environment_id", &id))
                    .await
                    .unwrap();
            }
            store.clear().await.unwrap();
            assert!(store.select_all().await.unwrap().is_empty());

            store
                .insert(Tag::new(EntityType::Task, "t1", "name", "after"))
                .await
                .unwrap();
        }

        let store = RedbTagStore::open(&db_path).unwrap();
        let all = store.select_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all.value_of("name"), Some("after"));
    }
}
