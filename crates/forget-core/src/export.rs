//! Export strategy: collect every reached entity

use crate::entity::{Entity, EntityId, EntityKey, EntityType};
use crate::error::Result;
use crate::processor::{EntityProcessor, ProcessContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entities collected by an export traversal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    /// entity type -> entity id -> entity
    pub entities: BTreeMap<EntityType, BTreeMap<EntityId, Entity>>,

    /// entity type -> entity id -> row-grouping token
    pub rows: BTreeMap<EntityType, BTreeMap<EntityId, EntityId>>,
}

impl ExportResult {
    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities
            .get(&key.entity_type)
            .and_then(|by_id| by_id.get(&key.id))
    }

    pub fn row_id(&self, key: &EntityKey) -> Option<&EntityId> {
        self.rows.get(&key.entity_type).and_then(|by_id| by_id.get(&key.id))
    }

    /// Number of collected entities
    pub fn len(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entity keys grouped by row token
    pub fn grouped_rows(&self) -> BTreeMap<EntityId, Vec<EntityKey>> {
        let mut groups: BTreeMap<EntityId, Vec<EntityKey>> = BTreeMap::new();
        for (entity_type, by_id) in &self.rows {
            for (id, row_id) in by_id {
                groups
                    .entry(row_id.clone())
                    .or_default()
                    .push(EntityKey::new(entity_type.clone(), id.clone()));
            }
        }
        groups
    }
}

/// Default strategy: stores each entity untouched, keyed by type then id
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportProcessor;

impl ExportProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EntityProcessor for ExportProcessor {
    type Output = ExportResult;

    async fn process_entity(
        &self,
        ctx: ProcessContext<'_>,
        output: &mut ExportResult,
    ) -> Result<()> {
        let entity = ctx.entity;
        tracing::trace!("Exporting {} (row {})", entity.key(), ctx.row_id);

        output
            .entities
            .entry(entity.entity_type.clone())
            .or_default()
            .insert(entity.id.clone(), entity.clone());
        output
            .rows
            .entry(entity.entity_type.clone())
            .or_default()
            .insert(entity.id.clone(), ctx.row_id.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::BundlePolicy;

    #[tokio::test]
    async fn test_reinserting_same_entity_is_idempotent() {
        let entity = Entity::new("user", "1", "default").with_field("name", "Jane");
        let policy = BundlePolicy::new("user");
        let row_id = EntityId::from("1");
        let mut output = ExportResult::default();

        for _ in 0..2 {
            let ctx = ProcessContext {
                entity: &entity,
                policy: &policy,
                row_id: &row_id,
                parent_policy: None,
            };
            ExportProcessor.process_entity(ctx, &mut output).await.unwrap();
        }

        assert_eq!(output.len(), 1);
        assert_eq!(output.get(&entity.key()), Some(&entity));
        assert_eq!(output.row_id(&entity.key()), Some(&row_id));
    }

    #[test]
    fn test_grouped_rows() {
        let mut result = ExportResult::default();
        let row = EntityId::from("u1");
        result
            .rows
            .entry(EntityType::from("user"))
            .or_default()
            .insert(EntityId::from("u1"), row.clone());
        result
            .rows
            .entry(EntityType::from("profile"))
            .or_default()
            .insert(EntityId::from("p1"), row.clone());
        result
            .rows
            .entry(EntityType::from("order"))
            .or_default()
            .insert(EntityId::from("o1"), EntityId::from("o1"));

        let groups = result.grouped_rows();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&row].len(), 2);
    }
}
