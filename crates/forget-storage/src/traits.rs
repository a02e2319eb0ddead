//! Storage backend trait definitions

use crate::error::StorageResult;
use async_trait::async_trait;
use forget_core::{Entity, EntityStore, EntityType};

/// Administrative operations shared by the entity store backends
///
/// The traversal engine only needs [`EntityStore`]; this adds what the CLI
/// uses to populate and inspect a store.
#[async_trait]
pub trait StorageBackend: EntityStore {
    /// Initialize the storage (create tables, run migrations)
    async fn initialize(&self) -> StorageResult<()>;

    /// Health check
    async fn health_check(&self) -> StorageResult<bool>;

    /// All stored entities of a type, ordered by id
    async fn entities_of_type(&self, entity_type: &EntityType) -> StorageResult<Vec<Entity>>;

    /// Number of stored entities
    async fn count(&self) -> StorageResult<usize>;

    /// Save many entities, replacing existing ones with the same key
    async fn save_batch(&self, entities: &[Entity]) -> StorageResult<()>;
}
