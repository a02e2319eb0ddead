//! ReDB entity store

use crate::error::{StorageError, StorageResult};
use crate::migration::{Migratable, CURRENT_VERSION};
use crate::traits::StorageBackend;
use async_trait::async_trait;
use forget_core::{Entity, EntityId, EntityKey, EntityStore, EntityType, Result};
use redb::{Database, ReadableTableMetadata, TableDefinition};
use std::path::Path;

// Table definitions
const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");
const META: TableDefinition<&str, u32> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";

/// ReDB storage backend
///
/// Entities are stored as JSON under `type:id` keys, so all entities of a type
/// share a key prefix and can be scanned as one range.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a ReDB database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(ENTITIES)?;
            write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        let store = Self { db };
        store.migrate_to_latest()?;
        Ok(store)
    }

    fn make_entity_key(key: &EntityKey) -> String {
        format!("{}:{}", key.entity_type, key.id)
    }

    fn get(&self, key: &EntityKey) -> StorageResult<Option<Entity>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;

        match table.get(Self::make_entity_key(key).as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Every stored entity of one type, in key order
    fn scan_type(&self, entity_type: &EntityType) -> StorageResult<Vec<Entity>> {
        let prefix = format!("{}:", entity_type);

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;

        let mut entities = Vec::new();
        for entry in table.range(prefix.as_str()..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let entity: Entity = serde_json::from_slice(value.value())?;
            // Type names containing ':' can share a prefix with this one.
            if entity.entity_type == *entity_type {
                entities.push(entity);
            }
        }

        Ok(entities)
    }

    fn put_all<'a>(&self, entities: impl IntoIterator<Item = &'a Entity>) -> StorageResult<usize> {
        let write_txn = self.db.begin_write()?;
        let mut saved = 0;
        {
            let mut table = write_txn.open_table(ENTITIES)?;
            for entity in entities {
                let value = serde_json::to_vec(entity)?;
                table.insert(Self::make_entity_key(&entity.key()).as_str(), value.as_slice())?;
                saved += 1;
            }
        }
        write_txn.commit()?;
        Ok(saved)
    }

    fn remove(&self, key: &EntityKey) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(ENTITIES)?;
            let existed = table.remove(Self::make_entity_key(key).as_str())?.is_some();
            existed
        };
        if !removed {
            return Err(StorageError::EntityNotFound(key.to_string()));
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl Migratable for RedbStore {
    fn get_schema_version(&self) -> StorageResult<u32> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(META)?;
        Ok(table
            .get(SCHEMA_VERSION_KEY)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(META)?;
            table.insert(SCHEMA_VERSION_KEY, version)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn run_migration(&self, version: u32) -> StorageResult<()> {
        match version {
            // Tables are created on open.
            1 => Ok(()),
            other => Err(StorageError::Migration(format!(
                "No migration to schema version {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl EntityStore for RedbStore {
    async fn load(&self, key: &EntityKey) -> Result<Option<Entity>> {
        Ok(self.get(key)?)
    }

    async fn query(
        &self,
        entity_type: &EntityType,
        field: &str,
        equals: &EntityId,
    ) -> Result<Vec<EntityId>> {
        Ok(self
            .scan_type(entity_type)?
            .into_iter()
            .filter(|e| e.field_matches_id(field, equals))
            .map(|e| e.id)
            .collect())
    }

    async fn save(&self, entity: &Entity) -> Result<()> {
        self.put_all(std::iter::once(entity))?;
        Ok(())
    }

    async fn delete(&self, entity: &Entity) -> Result<()> {
        Ok(self.remove(&entity.key())?)
    }
}

#[async_trait]
impl StorageBackend for RedbStore {
    async fn initialize(&self) -> StorageResult<()> {
        self.migrate_to(CURRENT_VERSION)
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(self.get_schema_version()? == CURRENT_VERSION)
    }

    async fn entities_of_type(&self, entity_type: &EntityType) -> StorageResult<Vec<Entity>> {
        self.scan_type(entity_type)
    }

    async fn count(&self) -> StorageResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ENTITIES)?;
        Ok(table.len()? as usize)
    }

    async fn save_batch(&self, entities: &[Entity]) -> StorageResult<()> {
        if entities.is_empty() {
            return Ok(());
        }

        let saved = self.put_all(entities)?;
        tracing::debug!("Batch saved {} entities in single transaction", saved);

        Ok(())
    }
}
