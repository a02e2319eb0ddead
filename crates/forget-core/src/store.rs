//! Entity store trait definition

use crate::entity::{Entity, EntityId, EntityKey, EntityType};
use crate::error::Result;
use async_trait::async_trait;

/// Load, query and mutate entities in a backend
///
/// All storage backends implement this trait. Calls are awaited one at a
/// time by the traversal engine; nothing is batched.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Load an entity by key
    async fn load(&self, key: &EntityKey) -> Result<Option<Entity>>;

    /// Load the canonical stored copy, bypassing any cached or mutated value
    ///
    /// Backends that hand out independent copies from `load` can rely on the
    /// default.
    async fn load_unchanged(&self, key: &EntityKey) -> Result<Option<Entity>> {
        self.load(key).await
    }

    /// Load several entities of one type; missing ids are skipped
    async fn load_multiple(&self, entity_type: &EntityType, ids: &[EntityId]) -> Result<Vec<Entity>> {
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            let key = EntityKey::new(entity_type.clone(), id.clone());
            if let Some(entity) = self.load(&key).await? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Ids of all entities of `entity_type` whose `field` holds `equals`
    async fn query(&self, entity_type: &EntityType, field: &str, equals: &EntityId)
        -> Result<Vec<EntityId>>;

    /// Insert or replace an entity
    async fn save(&self, entity: &Entity) -> Result<()>;

    /// Delete an entity
    async fn delete(&self, entity: &Entity) -> Result<()>;
}
