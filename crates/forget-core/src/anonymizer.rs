//! Anonymizers: pluggable value transforms and their resolution
//!
//! A field set to `anonymize` is handed to the anonymizer named by its
//! policy, or failing that to the default for its [`FieldType`]. The
//! type table starts from a small built-in mapping and is then passed through
//! every registered [`TypeAnonymizerOverride`], in registration order.

use crate::entity::{EntityKey, FieldValue};
use crate::schema::{FieldDefinition, FieldType};
use chrono::{Datelike, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Id of the built-in text anonymizer
pub const TEXT_ANONYMIZER: &str = "text_anonymizer";

/// Id of the built-in date anonymizer
pub const DATE_ANONYMIZER: &str = "date_anonymizer";

/// Failure raised by an anonymizer transform
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnonymizerError {
    #[error("Anonymizer '{anonymizer}' cannot handle {value_kind} values")]
    UnsupportedValue {
        anonymizer: String,
        value_kind: &'static str,
    },

    #[error("{0}")]
    Failed(String),
}

/// Where the value being anonymized lives
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub entity: &'a EntityKey,
    pub bundle: &'a str,
    pub definition: &'a FieldDefinition,
}

/// Replaces a value with a non-identifying substitute
pub trait Anonymizer: Send + Sync {
    fn anonymize(
        &self,
        value: &FieldValue,
        field: &FieldContext<'_>,
    ) -> Result<FieldValue, AnonymizerError>;
}

/// Alters the default field type -> anonymizer id table
pub trait TypeAnonymizerOverride: Send + Sync {
    fn alter(&self, table: &mut BTreeMap<FieldType, String>);
}

impl<F> TypeAnonymizerOverride for F
where
    F: Fn(&mut BTreeMap<FieldType, String>) + Send + Sync,
{
    fn alter(&self, table: &mut BTreeMap<FieldType, String>) {
        self(table)
    }
}

/// Maps anonymizer ids and field types to transforms
pub trait AnonymizerResolver: Send + Sync {
    /// Transform registered under `id`
    fn get(&self, id: &str) -> Option<Arc<dyn Anonymizer>>;

    /// Default anonymizer id for a field type, after overrides
    fn default_for_type(&self, field_type: FieldType) -> Option<String>;
}

/// Anonymizer registry with an overridable type table
#[derive(Clone)]
pub struct AnonymizerRegistry {
    anonymizers: HashMap<String, Arc<dyn Anonymizer>>,
    overrides: Vec<Arc<dyn TypeAnonymizerOverride>>,
}

impl AnonymizerRegistry {
    /// Registry with no transforms registered
    pub fn new() -> Self {
        Self {
            anonymizers: HashMap::new(),
            overrides: Vec::new(),
        }
    }

    /// Registry with the built-in text and date anonymizers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(TEXT_ANONYMIZER, Arc::new(TextAnonymizer));
        registry.register(DATE_ANONYMIZER, Arc::new(DateAnonymizer));
        registry
    }

    pub fn register(&mut self, id: impl Into<String>, anonymizer: Arc<dyn Anonymizer>) {
        self.anonymizers.insert(id.into(), anonymizer);
    }

    /// Append an override; overrides run in the order they were added
    pub fn add_type_override(&mut self, provider: Arc<dyn TypeAnonymizerOverride>) {
        self.overrides.push(provider);
    }

    pub fn type_overrides(&self) -> &[Arc<dyn TypeAnonymizerOverride>] {
        &self.overrides
    }

    pub fn reset_type_overrides(&mut self) {
        self.overrides.clear();
    }

    /// Ids of all registered transforms, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.anonymizers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Built-in table before overrides
    pub fn default_type_table() -> BTreeMap<FieldType, String> {
        let mut table = BTreeMap::new();
        table.insert(FieldType::String, TEXT_ANONYMIZER.to_string());
        table.insert(FieldType::StringLong, TEXT_ANONYMIZER.to_string());
        table.insert(FieldType::Email, TEXT_ANONYMIZER.to_string());
        table.insert(FieldType::Datetime, DATE_ANONYMIZER.to_string());
        table
    }

    /// Effective table after all overrides
    pub fn type_table(&self) -> BTreeMap<FieldType, String> {
        let mut table = Self::default_type_table();
        for provider in &self.overrides {
            provider.alter(&mut table);
        }
        table
    }
}

impl Default for AnonymizerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for AnonymizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonymizerRegistry")
            .field("anonymizers", &self.ids())
            .field("overrides", &self.overrides.len())
            .finish()
    }
}

impl AnonymizerResolver for AnonymizerRegistry {
    fn get(&self, id: &str) -> Option<Arc<dyn Anonymizer>> {
        self.anonymizers.get(id).cloned()
    }

    fn default_for_type(&self, field_type: FieldType) -> Option<String> {
        self.type_table().remove(&field_type)
    }
}

fn value_kind(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Text(_) => "text",
        FieldValue::Integer(_) => "integer",
        FieldValue::Boolean(_) => "boolean",
        FieldValue::DateTime(_) => "datetime",
        FieldValue::Reference(_) => "reference",
    }
}

/// Replaces text with a random `anon-<ulid>` token
#[derive(Debug, Clone, Copy, Default)]
pub struct TextAnonymizer;

impl Anonymizer for TextAnonymizer {
    fn anonymize(
        &self,
        value: &FieldValue,
        _field: &FieldContext<'_>,
    ) -> Result<FieldValue, AnonymizerError> {
        match value {
            FieldValue::Text(_) => Ok(FieldValue::Text(format!(
                "anon-{}",
                ulid::Ulid::new().to_string().to_lowercase()
            ))),
            other => Err(AnonymizerError::UnsupportedValue {
                anonymizer: TEXT_ANONYMIZER.to_string(),
                value_kind: value_kind(other),
            }),
        }
    }
}

/// Truncates a timestamp to midnight UTC on 1 January of its year
#[derive(Debug, Clone, Copy, Default)]
pub struct DateAnonymizer;

impl Anonymizer for DateAnonymizer {
    fn anonymize(
        &self,
        value: &FieldValue,
        _field: &FieldContext<'_>,
    ) -> Result<FieldValue, AnonymizerError> {
        match value {
            FieldValue::DateTime(dt) => Utc
                .with_ymd_and_hms(dt.year(), 1, 1, 0, 0, 0)
                .single()
                .map(FieldValue::DateTime)
                .ok_or_else(|| {
                    AnonymizerError::Failed(format!("Cannot truncate date {}", dt))
                }),
            other => Err(AnonymizerError::UnsupportedValue {
                anonymizer: DATE_ANONYMIZER.to_string(),
                value_kind: value_kind(other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_context<T>(definition: FieldDefinition, f: impl FnOnce(&FieldContext<'_>) -> T) -> T {
        let key = EntityKey::new("user", "1");
        let ctx = FieldContext {
            entity: &key,
            bundle: "default",
            definition: &definition,
        };
        f(&ctx)
    }

    #[test]
    fn test_default_type_table() {
        let registry = AnonymizerRegistry::with_builtins();

        assert_eq!(
            registry.default_for_type(FieldType::String).as_deref(),
            Some(TEXT_ANONYMIZER)
        );
        assert_eq!(
            registry.default_for_type(FieldType::Datetime).as_deref(),
            Some(DATE_ANONYMIZER)
        );
        assert!(registry.default_for_type(FieldType::Integer).is_none());
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let mut registry = AnonymizerRegistry::with_builtins();
        registry.add_type_override(Arc::new(|table: &mut BTreeMap<FieldType, String>| {
            table.insert(FieldType::Integer, "first".to_string());
        }));
        registry.add_type_override(Arc::new(|table: &mut BTreeMap<FieldType, String>| {
            table.insert(FieldType::Integer, "second".to_string());
            table.remove(&FieldType::Email);
        }));

        assert_eq!(registry.type_overrides().len(), 2);
        assert_eq!(
            registry.default_for_type(FieldType::Integer).as_deref(),
            Some("second")
        );
        assert!(registry.default_for_type(FieldType::Email).is_none());

        registry.reset_type_overrides();
        assert!(registry.default_for_type(FieldType::Integer).is_none());
        assert!(registry.default_for_type(FieldType::Email).is_some());
    }

    #[test]
    fn test_text_anonymizer() {
        let result = with_context(FieldDefinition::new("name", FieldType::String), |ctx| {
            TextAnonymizer.anonymize(&FieldValue::from("Jane Doe"), ctx)
        })
        .unwrap();

        let text = result.as_text().unwrap();
        assert!(text.starts_with("anon-"));
        assert_ne!(text, "Jane Doe");
    }

    #[test]
    fn test_text_anonymizer_rejects_integers() {
        let result = with_context(FieldDefinition::new("age", FieldType::Integer), |ctx| {
            TextAnonymizer.anonymize(&FieldValue::Integer(40), ctx)
        });

        assert!(matches!(
            result,
            Err(AnonymizerError::UnsupportedValue {
                value_kind: "integer",
                ..
            })
        ));
    }

    #[test]
    fn test_date_anonymizer_truncates_to_year() {
        let birthday = Utc.with_ymd_and_hms(1990, 7, 14, 8, 30, 0).unwrap();
        let result = with_context(FieldDefinition::new("dob", FieldType::Datetime), |ctx| {
            DateAnonymizer.anonymize(&FieldValue::DateTime(birthday), ctx)
        })
        .unwrap();

        assert_eq!(
            result,
            FieldValue::DateTime(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = AnonymizerRegistry::with_builtins();
        assert!(registry.get(TEXT_ANONYMIZER).is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.ids(), vec![DATE_ANONYMIZER, TEXT_ANONYMIZER]);
        assert!(AnonymizerRegistry::new().ids().is_empty());
    }
}
