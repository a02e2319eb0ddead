//! In-memory entity store

use crate::error::{StorageError, StorageResult};
use crate::traits::StorageBackend;
use async_trait::async_trait;
use forget_core::{Entity, EntityId, EntityKey, EntityStore, EntityType, Result};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory storage backend
///
/// Useful for testing and for embedding the engine over data that is already
/// in memory. Entities are cloned in and out, so a loaded entity is never
/// shared with the store.
pub struct MemoryStore {
    entities: RwLock<HashMap<EntityKey, Entity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
        }
    }

    /// Store pre-populated with `entities`
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let map = entities.into_iter().map(|e| (e.key(), e)).collect();
        Self {
            entities: RwLock::new(map),
        }
    }

    fn read(&self) -> StorageResult<RwLockReadGuard<'_, HashMap<EntityKey, Entity>>> {
        self.entities
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }

    fn write(&self) -> StorageResult<RwLockWriteGuard<'_, HashMap<EntityKey, Entity>>> {
        self.entities
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn load(&self, key: &EntityKey) -> Result<Option<Entity>> {
        Ok(self.read()?.get(key).cloned())
    }

    async fn query(
        &self,
        entity_type: &EntityType,
        field: &str,
        equals: &EntityId,
    ) -> Result<Vec<EntityId>> {
        let entities = self.read()?;
        let mut ids: Vec<EntityId> = entities
            .values()
            .filter(|e| e.entity_type == *entity_type && e.field_matches_id(field, equals))
            .map(|e| e.id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn save(&self, entity: &Entity) -> Result<()> {
        self.write()?.insert(entity.key(), entity.clone());
        Ok(())
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        let key = entity.key();
        match self.write()?.remove(&key) {
            Some(_) => Ok(()),
            None => Err(StorageError::EntityNotFound(key.to_string()).into()),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStore {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(true)
    }

    async fn entities_of_type(&self, entity_type: &EntityType) -> StorageResult<Vec<Entity>> {
        let entities = self.read()?;
        let mut found: Vec<Entity> = entities
            .values()
            .filter(|e| e.entity_type == *entity_type)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.read()?.len())
    }

    async fn save_batch(&self, entities: &[Entity]) -> StorageResult<()> {
        let mut map = self.write()?;
        for entity in entities {
            map.insert(entity.key(), entity.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forget_core::FieldValue;

    fn comment(id: &str, author: &str) -> Entity {
        Entity::new("comment", id, "default")
            .with_field("author", EntityKey::new("user", author))
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.initialize().await.unwrap();

        let entity = Entity::new("user", "u1", "default").with_field("name", "Jane");
        store.save(&entity).await.unwrap();

        let loaded = store.load(&entity.key()).await.unwrap();
        assert_eq!(loaded, Some(entity.clone()));

        store.delete(&entity).await.unwrap();
        assert!(store.load(&entity.key()).await.unwrap().is_none());
        assert!(store.delete(&entity).await.is_err());
    }

    #[tokio::test]
    async fn test_query_matches_reference_and_plain_ids() {
        let store = MemoryStore::with_entities(vec![
            comment("c2", "u1"),
            comment("c1", "u1"),
            comment("c3", "u2"),
            Entity::new("comment", "c4", "default").with_field("author", "u1"),
            Entity::new("note", "n1", "default").with_field("author", EntityKey::new("user", "u1")),
        ]);

        let ids = store
            .query(&EntityType::from("comment"), "author", &EntityId::from("u1"))
            .await
            .unwrap();

        assert_eq!(ids, vec![EntityId::from("c1"), EntityId::from("c2"), EntityId::from("c4")]);
    }

    #[tokio::test]
    async fn test_load_multiple_skips_missing() {
        let store = MemoryStore::with_entities(vec![comment("c1", "u1")]);

        let loaded = store
            .load_multiple(
                &EntityType::from("comment"),
                &[EntityId::from("c1"), EntityId::from("gone")],
            )
            .await
            .unwrap();

        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, EntityId::from("c1"));
    }

    #[tokio::test]
    async fn test_loaded_copies_are_independent() {
        let store = MemoryStore::with_entities(vec![comment("c1", "u1")]);
        let key = EntityKey::new("comment", "c1");

        let mut copy = store.load(&key).await.unwrap().unwrap();
        copy.set("author", vec![FieldValue::from("changed")]);

        let fresh = store.load_unchanged(&key).await.unwrap().unwrap();
        assert_eq!(fresh.referenced_keys("author"), vec![EntityKey::new("user", "u1")]);
    }

    #[tokio::test]
    async fn test_batch_and_listing() {
        let store = MemoryStore::new();
        store
            .save_batch(&[comment("c2", "u1"), comment("c1", "u2"), Entity::new("user", "u1", "default")])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 3);
        let comments = store.entities_of_type(&EntityType::from("comment")).await.unwrap();
        let ids: Vec<_> = comments.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }
}
