//! Per-entity processing strategies plugged into the traversal engine

use crate::entity::{Entity, EntityId};
use crate::error::Result;
use crate::policy::{BundlePolicy, FieldPolicy};
use async_trait::async_trait;

/// Everything the walker knows about the entity being processed
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    pub entity: &'a Entity,

    /// Policy of the entity's type
    pub policy: &'a BundlePolicy,

    /// Row-grouping token for this entity
    pub row_id: &'a EntityId,

    /// Policy of the field through which the entity was reached
    pub parent_policy: Option<&'a FieldPolicy>,
}

/// Work done on each entity reached by a traversal
///
/// The output accumulator is created fresh for every traversal and handed
/// back to the caller when it finishes.
#[async_trait]
pub trait EntityProcessor: Send + Sync {
    type Output: Default + Send;

    /// Handle one entity, adding whatever the strategy collects to `output`.
    ///
    /// Returning an error does not stop the traversal; the walker records it
    /// as an issue against this entity.
    async fn process_entity(&self, ctx: ProcessContext<'_>, output: &mut Self::Output)
        -> Result<()>;
}
