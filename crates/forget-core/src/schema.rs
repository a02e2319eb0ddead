//! Entity type and field metadata

use crate::entity::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    StringLong,
    Email,
    Integer,
    Boolean,
    Datetime,
    EntityReference,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::StringLong => "string_long",
            Self::Email => "email",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::EntityReference => "entity_reference",
        };
        f.write_str(s)
    }
}

/// Maximum number of items a field may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    Limited(u32),
    Unlimited,
}

impl Cardinality {
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Single | Self::Limited(1))
    }
}

/// Definition of one field on an `(entity_type, bundle)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub cardinality: Cardinality,

    /// Required fields cannot be cleared by erasure
    #[serde(default)]
    pub required: bool,

    /// Declared target entity type of a reference field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<EntityType>,

    /// Restricts the definition to a set of bundles (empty = all bundles)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundles: Vec<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            cardinality: Cardinality::Single,
            required: false,
            target_type: None,
            bundles: Vec::new(),
        }
    }

    /// Reference field pointing at `target_type`
    pub fn reference(name: impl Into<String>, target_type: impl Into<EntityType>) -> Self {
        Self {
            target_type: Some(target_type.into()),
            ..Self::new(name, FieldType::EntityReference)
        }
    }

    pub fn with_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = cardinality;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn for_bundles(mut self, bundles: Vec<String>) -> Self {
        self.bundles = bundles;
        self
    }

    pub fn applies_to(&self, bundle: &str) -> bool {
        self.bundles.is_empty() || self.bundles.iter().any(|b| b == bundle)
    }
}

fn default_id_key() -> String {
    "id".to_string()
}

fn default_bundle_key() -> String {
    "bundle".to_string()
}

fn default_fieldable() -> bool {
    true
}

/// Entity type level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTypeInfo {
    pub id: EntityType,

    /// Name of the field holding the identifier
    #[serde(default = "default_id_key")]
    pub id_key: String,

    /// Name of the field holding the bundle
    #[serde(default = "default_bundle_key")]
    pub bundle_key: String,

    /// Whether the type exposes field-level access
    #[serde(default = "default_fieldable")]
    pub fieldable: bool,
}

impl EntityTypeInfo {
    pub fn new(id: impl Into<EntityType>) -> Self {
        Self {
            id: id.into(),
            id_key: default_id_key(),
            bundle_key: default_bundle_key(),
            fieldable: true,
        }
    }

    pub fn not_fieldable(mut self) -> Self {
        self.fieldable = false;
        self
    }
}

/// Source of entity type and field definitions
pub trait FieldMetadataProvider: Send + Sync {
    /// Entity type metadata; `None` for unknown types
    fn entity_type(&self, entity_type: &EntityType) -> Option<EntityTypeInfo>;

    /// All fields defined for a bundle, keyed by field name
    fn field_definitions(
        &self,
        entity_type: &EntityType,
        bundle: &str,
    ) -> BTreeMap<String, FieldDefinition>;
}
