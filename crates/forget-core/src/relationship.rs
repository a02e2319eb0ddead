//! Reverse ("owner") relationships
//!
//! A reference field flagged as owner links the referencing entity back to
//! the entity it points at: when the walker reaches the target, it also
//! queries every owner field that points at the target's type and visits
//! the entities holding the target's id there.

use crate::entity::EntityType;
use crate::policy::{FieldPolicy, FieldPolicyRegistry};
use crate::schema::{FieldMetadataProvider, FieldType};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// An owner field on `source_type` referencing `target_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseRelationship {
    pub source_type: EntityType,
    pub source_bundle: String,
    pub source_field: String,
    pub target_type: EntityType,
    pub owner_policy: FieldPolicy,
}

/// Scan every configured policy for enabled owner reference fields
pub fn scan_reverse_relationships(
    registry: &dyn FieldPolicyRegistry,
    metadata: &dyn FieldMetadataProvider,
) -> Vec<ReverseRelationship> {
    let mut relationships = Vec::new();

    for bundle_policy in registry.all_bundle_policies() {
        for field in bundle_policy.all_fields() {
            if !(field.enabled && field.is_owner) {
                continue;
            }

            let definitions = metadata.field_definitions(&bundle_policy.entity_type, &field.bundle);
            let Some(definition) = definitions.get(&field.name) else {
                tracing::debug!(
                    "Owner field {}.{}.{} has no definition",
                    bundle_policy.entity_type,
                    field.bundle,
                    field.name
                );
                continue;
            };

            if definition.field_type != FieldType::EntityReference {
                continue;
            }

            if let Some(target_type) = &definition.target_type {
                relationships.push(ReverseRelationship {
                    source_type: bundle_policy.entity_type.clone(),
                    source_bundle: field.bundle.clone(),
                    source_field: field.name.clone(),
                    target_type: target_type.clone(),
                    owner_policy: field.clone(),
                });
            }
        }
    }

    tracing::debug!("Found {} reverse relationships", relationships.len());
    relationships
}

/// Compute-once cache of reverse relationships
///
/// The scan runs on first use and is never repeated; build a new index to
/// pick up configuration changes.
#[derive(Debug, Default)]
pub struct ReverseRelationshipIndex {
    relationships: OnceLock<Vec<ReverseRelationship>>,
}

impl ReverseRelationshipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reverse relationships, scanning on first call
    pub fn get_or_build(
        &self,
        registry: &dyn FieldPolicyRegistry,
        metadata: &dyn FieldMetadataProvider,
    ) -> &[ReverseRelationship] {
        self.relationships
            .get_or_init(|| scan_reverse_relationships(registry, metadata))
    }

    /// Whether the scan has already happened
    pub fn is_built(&self) -> bool {
        self.relationships.get().is_some()
    }
}
