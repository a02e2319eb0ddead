//! Field policies: how each field takes part in traversal, export and erasure

use crate::entity::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What erasure does with a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErasureMode {
    /// Field is left untouched
    #[default]
    None,
    /// Value is replaced by an anonymizer
    Anonymize,
    /// Value is cleared; on the identifier field the whole entity is deleted
    Remove,
    /// Needs a human decision; no value is changed
    Maybe,
}

impl ErasureMode {
    /// Whether erasure considers the field at all
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Anonymize | Self::Remove | Self::Maybe)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Anonymize => "anonymize",
            Self::Remove => "remove",
            Self::Maybe => "maybe",
        }
    }
}

impl std::fmt::Display for ErasureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy for one `(entity_type, bundle, field)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    pub entity_type: EntityType,
    pub bundle: String,
    pub name: String,

    #[serde(default)]
    pub enabled: bool,

    /// Follow references held by this field during traversal
    #[serde(default)]
    pub include_related_entities: bool,

    #[serde(default)]
    pub erasure_mode: ErasureMode,

    /// The referencing entity owns the link; followed in reverse
    #[serde(default)]
    pub is_owner: bool,

    /// Explicit anonymizer id, overriding the type-keyed default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymizer: Option<String>,
}

impl FieldPolicy {
    /// Enabled policy with no traversal or erasure behaviour
    pub fn new(
        entity_type: impl Into<EntityType>,
        bundle: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            name: name.into(),
            enabled: true,
            include_related_entities: false,
            erasure_mode: ErasureMode::None,
            is_owner: false,
            anonymizer: None,
        }
    }

    pub fn traverse(mut self) -> Self {
        self.include_related_entities = true;
        self
    }

    pub fn owner(mut self) -> Self {
        self.is_owner = true;
        self
    }

    pub fn erase(mut self, mode: ErasureMode) -> Self {
        self.erasure_mode = mode;
        self
    }

    pub fn with_anonymizer(mut self, id: impl Into<String>) -> Self {
        self.anonymizer = Some(id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enabled and flagged for relationship traversal
    pub fn follows_references(&self) -> bool {
        self.enabled && self.include_related_entities
    }
}

/// Field policies of one entity type, grouped by bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundlePolicy {
    pub entity_type: EntityType,

    /// bundle -> field name -> policy
    #[serde(default)]
    pub bundles: BTreeMap<String, BTreeMap<String, FieldPolicy>>,
}

impl BundlePolicy {
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundles: BTreeMap::new(),
        }
    }

    /// Add a field policy, filed under its own bundle
    pub fn with_field(mut self, policy: FieldPolicy) -> Self {
        self.insert(policy);
        self
    }

    pub fn insert(&mut self, policy: FieldPolicy) {
        self.bundles
            .entry(policy.bundle.clone())
            .or_default()
            .insert(policy.name.clone(), policy);
    }

    /// Policies configured for one bundle
    pub fn fields_for_bundle(&self, bundle: &str) -> impl Iterator<Item = &FieldPolicy> {
        self.bundles.get(bundle).into_iter().flat_map(|f| f.values())
    }

    pub fn field(&self, bundle: &str, name: &str) -> Option<&FieldPolicy> {
        self.bundles.get(bundle).and_then(|f| f.get(name))
    }

    /// Every policy across all bundles
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldPolicy> {
        self.bundles.values().flat_map(|f| f.values())
    }
}

/// Source of configured field policies
pub trait FieldPolicyRegistry: Send + Sync {
    /// Policy for an entity type; `None` means the type is not configured
    fn bundle_policy(&self, entity_type: &EntityType) -> Option<Arc<BundlePolicy>>;

    /// All configured policies
    fn all_bundle_policies(&self) -> Vec<Arc<BundlePolicy>>;
}
