//! Test fixtures shared by the unit tests of this crate

use crate::entity::{Entity, EntityId, EntityKey, EntityType};
use crate::error::{Error, Result};
use crate::store::EntityStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// Map-backed store with failure injection
#[derive(Default)]
pub struct TestStore {
    entities: Mutex<BTreeMap<EntityKey, Entity>>,
    fail_delete: Mutex<HashSet<EntityKey>>,
    fail_query: Mutex<HashSet<EntityType>>,
    deleted: Mutex<Vec<EntityKey>>,
}

impl TestStore {
    pub fn with(entities: Vec<Entity>) -> Self {
        let store = Self::default();
        {
            let mut map = store.entities.lock().unwrap();
            for entity in entities {
                map.insert(entity.key(), entity);
            }
        }
        store
    }

    pub fn fail_delete_of(&self, key: EntityKey) {
        self.fail_delete.lock().unwrap().insert(key);
    }

    pub fn fail_query_on(&self, entity_type: &str) {
        self.fail_query
            .lock()
            .unwrap()
            .insert(EntityType::from(entity_type));
    }

    pub fn get(&self, key: &EntityKey) -> Option<Entity> {
        self.entities.lock().unwrap().get(key).cloned()
    }

    pub fn deleted(&self) -> Vec<EntityKey> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityStore for TestStore {
    async fn load(&self, key: &EntityKey) -> Result<Option<Entity>> {
        Ok(self.get(key))
    }

    async fn query(
        &self,
        entity_type: &EntityType,
        field: &str,
        equals: &EntityId,
    ) -> Result<Vec<EntityId>> {
        if self.fail_query.lock().unwrap().contains(entity_type) {
            return Err(Error::Storage(format!("query on {} failed", entity_type)));
        }
        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.entity_type == *entity_type && e.field_matches_id(field, equals))
            .map(|e| e.id.clone())
            .collect())
    }

    async fn save(&self, entity: &Entity) -> Result<()> {
        self.entities
            .lock()
            .unwrap()
            .insert(entity.key(), entity.clone());
        Ok(())
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        let key = entity.key();
        if self.fail_delete.lock().unwrap().contains(&key) {
            return Err(Error::Storage(format!("cannot delete {}", key)));
        }
        self.entities.lock().unwrap().remove(&key);
        self.deleted.lock().unwrap().push(key);
        Ok(())
    }
}
