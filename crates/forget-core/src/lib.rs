//! Forget Core - Relationship graph traversal for personal data export and erasure
//!
//! This crate provides the entity model, field policies and metadata, the
//! traversal engine, and the export and erasure strategies it drives.
//! Storage lives behind the [`EntityStore`] trait.

pub mod anonymizer;
pub mod cancel;
pub mod entity;
pub mod erasure;
pub mod error;
pub mod export;
pub mod limits;
pub mod policy;
pub mod processor;
pub mod registry;
pub mod relationship;
pub mod schema;
pub mod store;
pub mod traversal;

#[cfg(test)]
mod testing;

pub use anonymizer::{
    Anonymizer, AnonymizerError, AnonymizerRegistry, AnonymizerResolver, DateAnonymizer,
    FieldContext, TextAnonymizer, TypeAnonymizerOverride, DATE_ANONYMIZER, TEXT_ANONYMIZER,
};
pub use cancel::CancellationToken;
pub use entity::{Entity, EntityId, EntityKey, EntityType, FieldValue};
pub use erasure::{ErasureLogEntry, ErasureProcessor, ErasureResult, RemovalRule, RequiredFieldRule};
pub use error::{Error, Result};
pub use export::{ExportProcessor, ExportResult};
pub use limits::TraversalLimits;
pub use policy::{BundlePolicy, ErasureMode, FieldPolicy, FieldPolicyRegistry};
pub use processor::{EntityProcessor, ProcessContext};
pub use registry::{EntityTypeConfig, PolicyConfig, Schema, SchemaConfig};
pub use relationship::{ReverseRelationship, ReverseRelationshipIndex};
pub use schema::{Cardinality, EntityTypeInfo, FieldDefinition, FieldMetadataProvider, FieldType};
pub use store::EntityStore;
pub use traversal::{
    TraversalEngine, TraversalIssue, TraversalOutcome, TraversalStats, Visit, TASK_ENTITY_TYPE,
};
