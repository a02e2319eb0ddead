//! Erasure strategy: remove or anonymize personal data field by field
//!
//! Each reached entity is reloaded from the store. When its policy removes
//! the identifier field the entity is deleted outright and nothing else is
//! done to it. Otherwise its fields are walked in field-name order. Every
//! field outcome is recorded: successes in the log, failures in `errors`. A
//! failing field never stops its siblings, and nothing already applied is
//! rolled back.

use crate::anonymizer::{AnonymizerResolver, FieldContext};
use crate::entity::{Entity, EntityId, EntityKey};
use crate::error::{Error, Result};
use crate::policy::{ErasureMode, FieldPolicy};
use crate::processor::{EntityProcessor, ProcessContext};
use crate::schema::{EntityTypeInfo, FieldDefinition, FieldMetadataProvider};
use crate::store::EntityStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One successful field action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErasureLogEntry {
    pub entity_id: EntityId,

    /// `entity_type.bundle`
    pub entity_type: String,

    pub field_name: String,

    pub action: ErasureMode,

    /// Anonymizer used, for `anonymize` actions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymizer: Option<String>,
}

/// Outcome of an erasure traversal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErasureResult {
    pub errors: Vec<String>,
    pub successes: Vec<Entity>,
    pub failures: Vec<Entity>,
    pub log: Vec<ErasureLogEntry>,
}

impl ErasureResult {
    /// No field failed anywhere in the graph
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty()
    }

    pub fn is_success(&self, key: &EntityKey) -> bool {
        self.successes.iter().any(|e| e.key() == *key)
    }

    pub fn is_failure(&self, key: &EntityKey) -> bool {
        self.failures.iter().any(|e| e.key() == *key)
    }
}

/// Decides whether a non-identifier field may be cleared
pub trait RemovalRule: Send + Sync {
    /// `Err` carries the message reported to the operator
    fn check(&self, info: &EntityTypeInfo, definition: &FieldDefinition)
        -> std::result::Result<(), String>;
}

/// Rejects required fields and the bundle key
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredFieldRule;

impl RemovalRule for RequiredFieldRule {
    fn check(
        &self,
        info: &EntityTypeInfo,
        definition: &FieldDefinition,
    ) -> std::result::Result<(), String> {
        if definition.required || definition.name == info.bundle_key {
            return Err(Error::FieldNotRemovable(format!(
                "'{}' on {} is required and cannot be cleared",
                definition.name, info.id
            ))
            .to_string());
        }
        Ok(())
    }
}

/// What happened to one field
enum FieldOutcome {
    Done { anonymizer: Option<String> },
    Deleted,
    Failed(String),
}

/// Strategy that anonymizes or removes fields according to their policy
pub struct ErasureProcessor {
    store: Arc<dyn EntityStore>,
    metadata: Arc<dyn FieldMetadataProvider>,
    anonymizers: Arc<dyn AnonymizerResolver>,
    removal_rule: Arc<dyn RemovalRule>,
}

impl ErasureProcessor {
    pub fn new(
        store: Arc<dyn EntityStore>,
        metadata: Arc<dyn FieldMetadataProvider>,
        anonymizers: Arc<dyn AnonymizerResolver>,
    ) -> Self {
        Self {
            store,
            metadata,
            anonymizers,
            removal_rule: Arc::new(RequiredFieldRule),
        }
    }

    pub fn with_removal_rule(mut self, rule: Arc<dyn RemovalRule>) -> Self {
        self.removal_rule = rule;
        self
    }

    /// Explicit per-field anonymizer first, then the type default
    fn anonymizer_id(&self, definition: &FieldDefinition, policy: &FieldPolicy) -> Option<String> {
        policy
            .anonymizer
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| self.anonymizers.default_for_type(definition.field_type))
    }

    fn anonymize(
        &self,
        entity: &mut Entity,
        definition: &FieldDefinition,
        policy: &FieldPolicy,
    ) -> FieldOutcome {
        let Some(anonymizer_id) = self.anonymizer_id(definition, policy) else {
            return FieldOutcome::Failed(format!(
                "Could not anonymize field {}. Please consider changing this field from 'anonymize' to 'remove', or register a custom anonymizer.",
                definition.name
            ));
        };

        let Some(anonymizer) = self.anonymizers.get(&anonymizer_id) else {
            return FieldOutcome::Failed(Error::AnonymizerNotFound(anonymizer_id).to_string());
        };

        let key = entity.key();
        let ctx = FieldContext {
            entity: &key,
            bundle: &entity.bundle,
            definition,
        };

        // All items are transformed before any is written back.
        let replaced: std::result::Result<Vec<_>, _> = entity
            .get(&definition.name)
            .iter()
            .map(|value| anonymizer.anonymize(value, &ctx))
            .collect();

        match replaced {
            Ok(values) => {
                if entity.has_field(&definition.name) {
                    entity.set(definition.name.clone(), values);
                }
                FieldOutcome::Done {
                    anonymizer: Some(anonymizer_id),
                }
            }
            Err(e) => FieldOutcome::Failed(e.to_string()),
        }
    }

    async fn remove(
        &self,
        entity: &mut Entity,
        info: &EntityTypeInfo,
        definition: &FieldDefinition,
    ) -> FieldOutcome {
        if definition.name == info.id_key {
            return match self.store.delete(entity).await {
                Ok(()) => FieldOutcome::Deleted,
                Err(e) => FieldOutcome::Failed(e.to_string()),
            };
        }

        if let Err(message) = self.removal_rule.check(info, definition) {
            return FieldOutcome::Failed(message);
        }

        entity.set(definition.name.clone(), Vec::new());
        FieldOutcome::Done { anonymizer: None }
    }
}

#[async_trait]
impl EntityProcessor for ErasureProcessor {
    type Output = ErasureResult;

    async fn process_entity(
        &self,
        ctx: ProcessContext<'_>,
        output: &mut ErasureResult,
    ) -> Result<()> {
        let key = ctx.entity.key();

        // Work on the stored copy, never on the instance the walker holds.
        let mut entity = match self.store.load_unchanged(&key).await {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                tracing::warn!("{} disappeared before it could be erased", key);
                output
                    .errors
                    .push(Error::EntityNotFound(key.to_string()).to_string());
                output.failures.push(ctx.entity.clone());
                return Ok(());
            }
            Err(e) => {
                tracing::warn!("Failed to reload {}: {}", key, e);
                output.errors.push(e.to_string());
                output.failures.push(ctx.entity.clone());
                return Ok(());
            }
        };

        let info = self
            .metadata
            .entity_type(&entity.entity_type)
            .unwrap_or_else(|| EntityTypeInfo::new(entity.entity_type.clone()));
        let definitions = self
            .metadata
            .field_definitions(&entity.entity_type, &entity.bundle);
        let type_bundle = format!("{}.{}", entity.entity_type, entity.bundle);

        let mut entity_success = true;
        let mut mutated = false;

        // Removing the identifier deletes the entity; no other field is touched first.
        let id_removal = ctx
            .policy
            .field(&entity.bundle, &info.id_key)
            .filter(|p| p.enabled && p.erasure_mode == ErasureMode::Remove)
            .and(definitions.get(&info.id_key));
        if let Some(definition) = id_removal {
            match self.remove(&mut entity, &info, definition).await {
                FieldOutcome::Failed(message) => {
                    tracing::warn!("Deleting {} failed: {}", key, message);
                    entity_success = false;
                    output.errors.push(message);
                }
                FieldOutcome::Deleted | FieldOutcome::Done { .. } => {
                    tracing::info!("Deleted {}", key);
                    output.log.push(ErasureLogEntry {
                        entity_id: entity.id.clone(),
                        entity_type: type_bundle,
                        field_name: info.id_key.clone(),
                        action: ErasureMode::Remove,
                        anonymizer: None,
                    });
                    output.successes.push(entity);
                    return Ok(());
                }
            }
        }

        for (name, definition) in &definitions {
            if *name == info.id_key && id_removal.is_some() {
                continue;
            }
            let Some(field_policy) = ctx.policy.field(&entity.bundle, name) else {
                continue;
            };
            if !field_policy.enabled || !field_policy.erasure_mode.is_actionable() {
                continue;
            }

            let mode = field_policy.erasure_mode;
            let outcome = match mode {
                ErasureMode::Anonymize => self.anonymize(&mut entity, definition, field_policy),
                ErasureMode::Remove => self.remove(&mut entity, &info, definition).await,
                ErasureMode::Maybe => FieldOutcome::Done { anonymizer: None },
                ErasureMode::None => continue,
            };

            let anonymizer = match outcome {
                FieldOutcome::Done { anonymizer } => {
                    mutated |= mode != ErasureMode::Maybe;
                    anonymizer
                }
                FieldOutcome::Deleted => None,
                FieldOutcome::Failed(message) => {
                    tracing::warn!("Erasure of {}.{} failed: {}", key, name, message);
                    entity_success = false;
                    output.errors.push(message);
                    continue;
                }
            };

            tracing::debug!("{} {}.{}", mode, key, name);
            output.log.push(ErasureLogEntry {
                entity_id: entity.id.clone(),
                entity_type: type_bundle.clone(),
                field_name: name.clone(),
                action: mode,
                anonymizer,
            });
        }

        if mutated {
            if let Err(e) = self.store.save(&entity).await {
                tracing::warn!("Failed to save erased {}: {}", key, e);
                entity_success = false;
                output.errors.push(e.to_string());
            }
        }

        if entity_success {
            output.successes.push(entity);
        } else {
            output.failures.push(entity);
        }

        Ok(())
    }
}
