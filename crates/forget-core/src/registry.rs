//! Static schema: entity types, field definitions and field policies
//!
//! A [`Schema`] answers both [`FieldMetadataProvider`] and
//! [`FieldPolicyRegistry`] from configuration held in memory. It is usually
//! built from a [`SchemaConfig`] deserialized from a TOML file.

use crate::entity::EntityType;
use crate::error::{Error, Result};
use crate::limits::{validate_field_name, validate_type_name};
use crate::policy::{BundlePolicy, ErasureMode, FieldPolicy, FieldPolicyRegistry};
use crate::schema::{EntityTypeInfo, FieldDefinition, FieldMetadataProvider, FieldType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

fn default_true() -> bool {
    true
}

fn default_bundle() -> String {
    "default".to_string()
}

/// Serialized form of a schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub entity_types: Vec<EntityTypeConfig>,
}

/// One entity type with its fields and policies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeConfig {
    #[serde(flatten)]
    pub info: EntityTypeInfo,

    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// A field policy as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_bundle")]
    pub bundle: String,

    pub field: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub include_related_entities: bool,

    #[serde(default)]
    pub erasure_mode: ErasureMode,

    #[serde(default)]
    pub is_owner: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymizer: Option<String>,
}

impl PolicyConfig {
    fn into_policy(self, entity_type: &EntityType) -> FieldPolicy {
        FieldPolicy {
            entity_type: entity_type.clone(),
            bundle: self.bundle,
            name: self.field,
            enabled: self.enabled,
            include_related_entities: self.include_related_entities,
            erasure_mode: self.erasure_mode,
            is_owner: self.is_owner,
            anonymizer: self.anonymizer,
        }
    }
}

#[derive(Debug, Clone)]
struct TypeEntry {
    info: EntityTypeInfo,
    fields: Vec<FieldDefinition>,
}

/// In-memory schema and policy registry
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<EntityType, TypeEntry>,
    policies: BTreeMap<EntityType, Arc<BundlePolicy>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a schema from its serialized form
    pub fn from_config(config: SchemaConfig) -> Result<Self> {
        let mut schema = Self::new();

        for type_config in config.entity_types {
            let entity_type = type_config.info.id.clone();
            validate_type_name(entity_type.as_str())
                .map_err(|e| Error::Config(e.to_string()))?;

            if schema.types.contains_key(&entity_type) {
                return Err(Error::Config(format!(
                    "Entity type '{}' is defined more than once",
                    entity_type
                )));
            }

            for field in &type_config.fields {
                validate_field_name(&field.name).map_err(|e| Error::Config(e.to_string()))?;
                if field.field_type == FieldType::EntityReference && field.target_type.is_none() {
                    return Err(Error::Config(format!(
                        "Reference field '{}.{}' has no target_type",
                        entity_type, field.name
                    )));
                }
            }

            let mut bundle_policy = BundlePolicy::new(entity_type.clone());
            for policy in type_config.policies {
                if !type_config.fields.iter().any(|f| f.name == policy.field)
                    && policy.field != type_config.info.id_key
                {
                    tracing::warn!(
                        "Policy for {}.{}.{} names a field with no definition",
                        entity_type,
                        policy.bundle,
                        policy.field
                    );
                }
                bundle_policy.insert(policy.into_policy(&entity_type));
            }

            let has_policies = bundle_policy.all_fields().next().is_some();
            schema.types.insert(
                entity_type.clone(),
                TypeEntry {
                    info: type_config.info,
                    fields: type_config.fields,
                },
            );
            if has_policies {
                schema.policies.insert(entity_type, Arc::new(bundle_policy));
            }
        }

        tracing::debug!(
            "Loaded schema with {} entity types, {} configured",
            schema.types.len(),
            schema.policies.len()
        );

        Ok(schema)
    }

    /// Register an entity type with its field definitions
    pub fn with_type(mut self, info: EntityTypeInfo, fields: Vec<FieldDefinition>) -> Self {
        self.types.insert(info.id.clone(), TypeEntry { info, fields });
        self
    }

    /// Register the policy of an entity type, replacing any previous one
    pub fn with_policy(mut self, policy: BundlePolicy) -> Self {
        self.policies
            .insert(policy.entity_type.clone(), Arc::new(policy));
        self
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityTypeInfo> {
        self.types.values().map(|t| &t.info)
    }
}

impl FieldMetadataProvider for Schema {
    fn entity_type(&self, entity_type: &EntityType) -> Option<EntityTypeInfo> {
        self.types.get(entity_type).map(|t| t.info.clone())
    }

    fn field_definitions(
        &self,
        entity_type: &EntityType,
        bundle: &str,
    ) -> BTreeMap<String, FieldDefinition> {
        self.types
            .get(entity_type)
            .map(|t| {
                t.fields
                    .iter()
                    .filter(|f| f.applies_to(bundle))
                    .map(|f| (f.name.clone(), f.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl FieldPolicyRegistry for Schema {
    fn bundle_policy(&self, entity_type: &EntityType) -> Option<Arc<BundlePolicy>> {
        self.policies.get(entity_type).cloned()
    }

    fn all_bundle_policies(&self) -> Vec<Arc<BundlePolicy>> {
        self.policies.values().cloned().collect()
    }
}
