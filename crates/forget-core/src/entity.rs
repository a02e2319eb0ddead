//! Entity (node) types and field values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity type classification (e.g. `user`, `order`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(pub String);

impl EntityType {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an entity, unique within its entity type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally unique address of an entity: `(entity_type, id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub id: EntityId,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<EntityType>, id: impl Into<EntityId>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

/// A single item stored in a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    /// Reference to another entity
    Reference(EntityKey),
}

impl FieldValue {
    pub fn as_reference(&self) -> Option<&EntityKey> {
        match self {
            Self::Reference(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this item holds the given identifier, as a reference or raw value
    pub fn matches_id(&self, id: &EntityId) -> bool {
        match self {
            Self::Reference(key) => key.id == *id,
            Self::Text(s) => s == id.as_str(),
            Self::Integer(i) => i.to_string() == id.as_str(),
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<EntityKey> for FieldValue {
    fn from(key: EntityKey) -> Self {
        Self::Reference(key)
    }
}

/// A record in the entity graph (a node)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type
    pub entity_type: EntityType,

    /// Identifier, unique within the entity type
    pub id: EntityId,

    /// Sub-type with its own field configuration
    pub bundle: String,

    /// Field values keyed by field name; every field holds zero or more items
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<FieldValue>>,
}

impl Entity {
    /// Create a new entity without field values
    pub fn new(
        entity_type: impl Into<EntityType>,
        id: impl Into<EntityId>,
        bundle: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            bundle: bundle.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style single value setter
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), vec![value.into()]);
        self
    }

    /// Builder-style multi value setter
    pub fn with_values(mut self, name: impl Into<String>, values: Vec<FieldValue>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey {
            entity_type: self.entity_type.clone(),
            id: self.id.clone(),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Items of a field; empty when the field is absent
    pub fn get(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set(&mut self, name: impl Into<String>, values: Vec<FieldValue>) {
        self.fields.insert(name.into(), values);
    }

    /// Clear all items of a field, keeping the field itself present
    pub fn clear(&mut self, name: &str) {
        if let Some(items) = self.fields.get_mut(name) {
            items.clear();
        }
    }

    /// Whether any item of a field holds the given identifier
    pub fn field_matches_id(&self, name: &str, id: &EntityId) -> bool {
        self.get(name).iter().any(|v| v.matches_id(id))
    }

    /// Entities referenced by a field, in item order
    pub fn referenced_keys(&self, name: &str) -> Vec<EntityKey> {
        self.get(name)
            .iter()
            .filter_map(FieldValue::as_reference)
            .cloned()
            .collect()
    }
}
