//! Relationship graph traversal
//!
//! Starting from a root entity, the engine follows enabled forward reference
//! fields and configured reverse (owner) relationships, hands every entity it
//! reaches to an [`EntityProcessor`] exactly once, and returns whatever the
//! processor accumulated.
//!
//! The walk is depth-first over an explicit stack. Visiting an entity pushes
//! one expansion item per reverse relationship and then one per traversable
//! field, both in reverse order, so entities are reached in the same order a
//! recursive walk would reach them: forward fields in order, each subtree
//! completed before the next field, reverse relationships last.

use crate::anonymizer::AnonymizerResolver;
use crate::cancel::CancellationToken;
use crate::entity::{Entity, EntityId, EntityKey};
use crate::erasure::ErasureProcessor;
use crate::error::{Error, Result};
use crate::export::ExportProcessor;
use crate::limits::TraversalLimits;
use crate::policy::{FieldPolicy, FieldPolicyRegistry};
use crate::processor::{EntityProcessor, ProcessContext};
use crate::relationship::{ReverseRelationship, ReverseRelationshipIndex};
use crate::schema::FieldMetadataProvider;
use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Entity type of this system's own request records; never traversed
pub const TASK_ENTITY_TYPE: &str = "gdpr_task";

/// Entities already handled by one traversal
#[derive(Debug, Clone, Default)]
pub struct TraversalProgress {
    visited: HashSet<EntityKey>,
}

impl TraversalProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.visited.contains(key)
    }

    /// Returns false if the key was already marked
    pub fn mark(&mut self, key: EntityKey) -> bool {
        self.visited.insert(key)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// An entity handed to the processor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub key: EntityKey,
    pub row_id: EntityId,

    /// Field through which the entity was reached; `None` for the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_field: Option<String>,
}

/// Something that kept part of the graph from being handled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraversalIssue {
    /// Entity type has no bundle policy; the entity was not processed
    MissingPolicy { key: EntityKey },

    /// Loading or querying failed; the branch was abandoned
    Storage { key: EntityKey, message: String },

    /// The processor returned an error for this entity
    Processing { key: EntityKey, message: String },
}

/// Traversal statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraversalStats {
    pub nodes_visited: usize,
    pub forward_edges: usize,
    pub reverse_edges: usize,
    pub revisits_skipped: usize,
    pub unfieldable_skipped: usize,
    pub max_pending: usize,
}

/// Result of one traversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalOutcome<T> {
    /// Accumulated processor output
    pub result: T,

    /// Processed entities, in processing order
    pub visited: Vec<Visit>,

    pub issues: Vec<TraversalIssue>,

    pub stats: TraversalStats,
}

impl<T> TraversalOutcome<T> {
    pub fn visit(&self, key: &EntityKey) -> Option<&Visit> {
        self.visited.iter().find(|v| v.key == *key)
    }

    pub fn was_visited(&self, key: &EntityKey) -> bool {
        self.visit(key).is_some()
    }
}

/// Pending work on the traversal stack
enum WorkItem {
    Visit {
        entity: Entity,
        parent_policy: Option<FieldPolicy>,
        row_id: Option<EntityId>,
    },
    /// Load the entities referenced by one forward field
    ExpandField {
        from: EntityKey,
        targets: Vec<EntityKey>,
        policy: FieldPolicy,
        row_id: Option<EntityId>,
    },
    /// Query one reverse relationship pointing at `target`
    ExpandReverse { target: EntityKey, relationship: usize },
}

/// Graph traversal engine
///
/// Holds its collaborators, the processing strategy, and the reverse
/// relationship cache, which is filled on first use and kept for the life of
/// the engine.
pub struct TraversalEngine<P> {
    store: Arc<dyn EntityStore>,
    registry: Arc<dyn FieldPolicyRegistry>,
    metadata: Arc<dyn FieldMetadataProvider>,
    processor: P,
    limits: TraversalLimits,
    reverse_index: ReverseRelationshipIndex,
}

impl TraversalEngine<ExportProcessor> {
    /// Engine collecting every reached entity
    pub fn export(
        store: Arc<dyn EntityStore>,
        registry: Arc<dyn FieldPolicyRegistry>,
        metadata: Arc<dyn FieldMetadataProvider>,
    ) -> Self {
        Self::new(store, registry, metadata, ExportProcessor::new())
    }
}

impl TraversalEngine<ErasureProcessor> {
    /// Engine anonymizing or removing personal data in every reached entity
    pub fn erasure(
        store: Arc<dyn EntityStore>,
        registry: Arc<dyn FieldPolicyRegistry>,
        metadata: Arc<dyn FieldMetadataProvider>,
        anonymizers: Arc<dyn AnonymizerResolver>,
    ) -> Self {
        let processor = ErasureProcessor::new(store.clone(), metadata.clone(), anonymizers);
        Self::new(store, registry, metadata, processor)
    }
}

impl<P: EntityProcessor> TraversalEngine<P> {
    pub fn new(
        store: Arc<dyn EntityStore>,
        registry: Arc<dyn FieldPolicyRegistry>,
        metadata: Arc<dyn FieldMetadataProvider>,
        processor: P,
    ) -> Self {
        Self {
            store,
            registry,
            metadata,
            processor,
            limits: TraversalLimits::default(),
            reverse_index: ReverseRelationshipIndex::new(),
        }
    }

    pub fn with_limits(mut self, limits: TraversalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Reverse relationships known to this engine, scanned on first call
    pub fn reverse_relationships(&self) -> &[ReverseRelationship] {
        self.reverse_index
            .get_or_build(self.registry.as_ref(), self.metadata.as_ref())
    }

    /// Traverse the relationship graph from `root`
    pub async fn traverse(&self, root: Entity) -> Result<TraversalOutcome<P::Output>> {
        self.traverse_with_cancel(root, &CancellationToken::new())
            .await
    }

    /// Traverse, checking `token` before every step
    pub async fn traverse_with_cancel(
        &self,
        root: Entity,
        token: &CancellationToken,
    ) -> Result<TraversalOutcome<P::Output>> {
        let root_key = root.key();
        tracing::debug!("Starting traversal at {}", root_key);

        let mut session = TraversalSession::new(self);
        session.stack.push(WorkItem::Visit {
            entity: root,
            parent_policy: None,
            row_id: None,
        });

        while let Some(item) = session.stack.pop() {
            if token.is_cancelled() {
                tracing::info!("Traversal from {} cancelled", root_key);
                return Err(Error::Cancelled);
            }

            match item {
                WorkItem::Visit {
                    entity,
                    parent_policy,
                    row_id,
                } => session.visit(entity, parent_policy, row_id).await?,
                WorkItem::ExpandField {
                    from,
                    targets,
                    policy,
                    row_id,
                } => session.expand_field(from, targets, policy, row_id).await,
                WorkItem::ExpandReverse {
                    target,
                    relationship,
                } => session.expand_reverse(target, relationship).await,
            }
        }

        let outcome = session.finish();
        tracing::info!(
            "Traversal from {} visited {} entities ({} issues)",
            root_key,
            outcome.stats.nodes_visited,
            outcome.issues.len()
        );
        Ok(outcome)
    }
}

/// State of one traversal call; discarded when it returns
struct TraversalSession<'e, P: EntityProcessor> {
    engine: &'e TraversalEngine<P>,
    progress: TraversalProgress,
    stack: Vec<WorkItem>,
    output: P::Output,
    visited: Vec<Visit>,
    issues: Vec<TraversalIssue>,
    stats: TraversalStats,
}

impl<'e, P: EntityProcessor> TraversalSession<'e, P> {
    fn new(engine: &'e TraversalEngine<P>) -> Self {
        Self {
            engine,
            progress: TraversalProgress::new(),
            stack: Vec::new(),
            output: P::Output::default(),
            visited: Vec::new(),
            issues: Vec::new(),
            stats: TraversalStats::default(),
        }
    }

    async fn visit(
        &mut self,
        entity: Entity,
        parent_policy: Option<FieldPolicy>,
        row_id: Option<EntityId>,
    ) -> Result<()> {
        let engine = self.engine;
        let key = entity.key();

        let fieldable = engine
            .metadata
            .entity_type(&entity.entity_type)
            .map(|info| info.fieldable)
            .unwrap_or(false);
        if !fieldable {
            tracing::trace!("{} is not fieldable", key);
            self.stats.unfieldable_skipped += 1;
            return Ok(());
        }

        // Never walk into our own request records, whatever the configuration says.
        if entity.entity_type.as_str() == TASK_ENTITY_TYPE {
            return Ok(());
        }

        if self.progress.contains(&key) {
            self.stats.revisits_skipped += 1;
            return Ok(());
        }

        if self.progress.len() >= engine.limits.max_nodes {
            tracing::warn!(
                "Traversal limit of {} entities reached at {}",
                engine.limits.max_nodes,
                key
            );
            return Err(Error::TraversalLimit {
                max: engine.limits.max_nodes,
            });
        }

        let row_id = row_id.unwrap_or_else(|| entity.id.clone());
        self.progress.mark(key.clone());

        let Some(policy) = engine.registry.bundle_policy(&entity.entity_type) else {
            tracing::warn!("No policy configured for {}; skipping {}", entity.entity_type, key);
            self.issues.push(TraversalIssue::MissingPolicy { key });
            return Ok(());
        };

        tracing::debug!("Visiting {} (row {})", key, row_id);
        self.stats.nodes_visited += 1;

        let ctx = ProcessContext {
            entity: &entity,
            policy: &policy,
            row_id: &row_id,
            parent_policy: parent_policy.as_ref(),
        };
        if let Err(e) = engine.processor.process_entity(ctx, &mut self.output).await {
            tracing::warn!("Processing {} failed: {}", key, e);
            self.issues.push(TraversalIssue::Processing {
                key: key.clone(),
                message: e.to_string(),
            });
        }

        self.visited.push(Visit {
            key: key.clone(),
            row_id: row_id.clone(),
            parent_field: parent_policy.map(|p| p.name),
        });

        // Reverse relationships run after every forward subtree, so they go
        // on the stack first.
        let reverse: Vec<usize> = engine
            .reverse_relationships()
            .iter()
            .enumerate()
            .filter(|(_, rel)| rel.target_type == entity.entity_type)
            .map(|(i, _)| i)
            .collect();
        for relationship in reverse.into_iter().rev() {
            self.stack.push(WorkItem::ExpandReverse {
                target: key.clone(),
                relationship,
            });
        }

        let definitions = engine
            .metadata
            .field_definitions(&entity.entity_type, &entity.bundle);
        let mut forward = Vec::new();
        for field_policy in policy.fields_for_bundle(&entity.bundle) {
            if !field_policy.follows_references() || !entity.has_field(&field_policy.name) {
                continue;
            }

            let targets = entity.referenced_keys(&field_policy.name);
            if targets.is_empty() {
                continue;
            }

            // Single-valued chains share the parent's row; anything else starts its own.
            let single = definitions
                .get(&field_policy.name)
                .map(|d| d.cardinality.is_single())
                .unwrap_or(false);

            forward.push(WorkItem::ExpandField {
                from: key.clone(),
                targets,
                policy: field_policy.clone(),
                row_id: single.then(|| row_id.clone()),
            });
        }
        self.push_in_order(forward);

        Ok(())
    }

    async fn expand_field(
        &mut self,
        from: EntityKey,
        targets: Vec<EntityKey>,
        policy: FieldPolicy,
        row_id: Option<EntityId>,
    ) {
        let mut children = Vec::with_capacity(targets.len());
        for target in targets {
            match self.engine.store.load(&target).await {
                Ok(Some(child)) => {
                    self.stats.forward_edges += 1;
                    children.push(WorkItem::Visit {
                        entity: child,
                        parent_policy: Some(policy.clone()),
                        row_id: row_id.clone(),
                    });
                }
                Ok(None) => {
                    tracing::debug!("{}.{} references missing {}", from, policy.name, target);
                }
                Err(e) => {
                    tracing::warn!("Failed to load {} from {}: {}", target, from, e);
                    self.issues.push(TraversalIssue::Storage {
                        key: target,
                        message: e.to_string(),
                    });
                }
            }
        }
        self.push_in_order(children);
    }

    async fn expand_reverse(&mut self, target: EntityKey, relationship: usize) {
        let engine = self.engine;
        let Some(rel) = engine.reverse_relationships().get(relationship) else {
            return;
        };

        let related = match engine
            .store
            .query(&rel.source_type, &rel.source_field, &target.id)
            .await
        {
            Ok(ids) => engine.store.load_multiple(&rel.source_type, &ids).await,
            Err(e) => Err(e),
        };

        match related {
            Ok(entities) => {
                self.stats.reverse_edges += entities.len();
                let children = entities
                    .into_iter()
                    .map(|entity| WorkItem::Visit {
                        entity,
                        parent_policy: Some(rel.owner_policy.clone()),
                        row_id: None,
                    })
                    .collect();
                self.push_in_order(children);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to follow {}.{} back to {}: {}",
                    rel.source_type,
                    rel.source_field,
                    target,
                    e
                );
                self.issues.push(TraversalIssue::Storage {
                    key: target,
                    message: e.to_string(),
                });
            }
        }
    }

    /// Push items so they are popped in their original order
    fn push_in_order(&mut self, items: Vec<WorkItem>) {
        self.stack.extend(items.into_iter().rev());
        self.stats.max_pending = self.stats.max_pending.max(self.stack.len());
    }

    fn finish(self) -> TraversalOutcome<P::Output> {
        TraversalOutcome {
            result: self.output,
            visited: self.visited,
            issues: self.issues,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymizer::{AnonymizerRegistry, TEXT_ANONYMIZER};
    use crate::entity::FieldValue;
    use crate::erasure::ErasureResult;
    use crate::policy::{BundlePolicy, ErasureMode};
    use crate::registry::Schema;
    use crate::schema::{Cardinality, EntityTypeInfo, FieldDefinition, FieldType};
    use crate::testing::TestStore;

    fn key(entity_type: &str, id: &str) -> EntityKey {
        EntityKey::new(entity_type, id)
    }

    fn reference(entity_type: &str, id: &str) -> FieldValue {
        FieldValue::Reference(key(entity_type, id))
    }

    /// user -address-> address (single), user -friends-> user (unlimited),
    /// comment -author-> user (owner), gdpr_task -subject-> user (owner)
    fn schema() -> Schema {
        Schema::new()
            .with_type(
                EntityTypeInfo::new("user"),
                vec![
                    FieldDefinition::new("id", FieldType::String),
                    FieldDefinition::new("name", FieldType::String),
                    FieldDefinition::reference("address", "address"),
                    FieldDefinition::reference("friends", "user")
                        .with_cardinality(Cardinality::Unlimited),
                ],
            )
            .with_type(
                EntityTypeInfo::new("address"),
                vec![
                    FieldDefinition::new("id", FieldType::String),
                    FieldDefinition::new("street", FieldType::String),
                    FieldDefinition::reference("resident", "user"),
                ],
            )
            .with_type(
                EntityTypeInfo::new("comment"),
                vec![
                    FieldDefinition::new("id", FieldType::String),
                    FieldDefinition::reference("author", "user"),
                ],
            )
            .with_type(
                EntityTypeInfo::new(TASK_ENTITY_TYPE),
                vec![FieldDefinition::reference("subject", "user")],
            )
            .with_type(EntityTypeInfo::new("audit").not_fieldable(), vec![])
            .with_type(EntityTypeInfo::new("tag"), vec![])
            .with_policy(
                BundlePolicy::new("user")
                    .with_field(FieldPolicy::new("user", "default", "address").traverse())
                    .with_field(FieldPolicy::new("user", "default", "friends").traverse())
                    .with_field(FieldPolicy::new("user", "default", "name")),
            )
            .with_policy(
                BundlePolicy::new("address")
                    .with_field(FieldPolicy::new("address", "default", "resident").traverse()),
            )
            .with_policy(
                BundlePolicy::new("comment")
                    .with_field(FieldPolicy::new("comment", "default", "author").owner()),
            )
            .with_policy(
                BundlePolicy::new(TASK_ENTITY_TYPE)
                    .with_field(FieldPolicy::new(TASK_ENTITY_TYPE, "default", "subject").owner()),
            )
    }

    fn user(id: &str) -> Entity {
        Entity::new("user", id, "default").with_field("name", format!("User {}", id))
    }

    fn export_engine(store: Arc<TestStore>) -> TraversalEngine<ExportProcessor> {
        let schema = Arc::new(schema());
        TraversalEngine::export(store, schema.clone(), schema)
    }

    fn keys(outcome: &TraversalOutcome<impl Sized>) -> Vec<String> {
        outcome.visited.iter().map(|v| v.key.to_string()).collect()
    }

    #[tokio::test]
    async fn test_each_entity_visited_once_in_depth_first_order() {
        let u1 = user("u1")
            .with_field("address", key("address", "a1"))
            .with_values("friends", vec![reference("user", "u2"), reference("user", "u3")]);
        let u2 = user("u2").with_field("friends", key("user", "u3"));
        let u3 = user("u3");
        let a1 = Entity::new("address", "a1", "default").with_field("street", "Main St");
        let store = Arc::new(TestStore::with(vec![u1.clone(), u2, u3, a1]));

        let outcome = export_engine(store).traverse(u1).await.unwrap();

        assert_eq!(
            keys(&outcome),
            vec!["user:u1", "address:a1", "user:u2", "user:u3"]
        );
        assert_eq!(outcome.result.len(), 4);
        assert_eq!(outcome.stats.nodes_visited, 4);
        assert_eq!(outcome.stats.revisits_skipped, 1);
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn test_cycles_terminate() {
        let u1 = user("u1").with_field("friends", key("user", "u2"));
        let u2 = user("u2").with_field("friends", key("user", "u1"));
        let u3 = user("u3").with_values(
            "friends",
            vec![reference("user", "u3"), reference("user", "u1")],
        );
        let store = Arc::new(TestStore::with(vec![u1.clone(), u2, u3.clone()]));
        let engine = export_engine(store);

        let outcome = engine.traverse(u1).await.unwrap();
        assert_eq!(keys(&outcome), vec!["user:u1", "user:u2"]);

        let outcome = engine.traverse(u3).await.unwrap();
        assert_eq!(keys(&outcome), vec!["user:u3", "user:u1", "user:u2"]);
    }

    #[tokio::test]
    async fn test_reverse_owner_relationships_followed_after_forward_fields() {
        let u1 = user("u1").with_field("address", key("address", "a1"));
        let a1 = Entity::new("address", "a1", "default");
        let c1 = Entity::new("comment", "c1", "default").with_field("author", key("user", "u1"));
        let c2 = Entity::new("comment", "c2", "default").with_field("author", key("user", "u9"));
        let store = Arc::new(TestStore::with(vec![u1.clone(), a1, c1, c2]));

        let outcome = export_engine(store).traverse(u1).await.unwrap();

        assert_eq!(keys(&outcome), vec!["user:u1", "address:a1", "comment:c1"]);
        let c1 = outcome.visit(&key("comment", "c1")).unwrap();
        assert_eq!(c1.row_id, EntityId::from("c1"));
        assert_eq!(c1.parent_field.as_deref(), Some("author"));
        assert_eq!(outcome.stats.reverse_edges, 1);
    }

    #[tokio::test]
    async fn test_non_owner_references_are_not_followed_backwards() {
        // address.resident points at users but is not an owner field
        let u1 = user("u1");
        let a1 = Entity::new("address", "a1", "default").with_field("resident", key("user", "u1"));
        let store = Arc::new(TestStore::with(vec![u1.clone(), a1]));

        let outcome = export_engine(store).traverse(u1).await.unwrap();

        assert_eq!(keys(&outcome), vec!["user:u1"]);
    }

    #[tokio::test]
    async fn test_row_token_follows_single_valued_chain() {
        let u1 = user("u1")
            .with_field("address", key("address", "a1"))
            .with_field("friends", key("user", "u2"));
        let a1 = Entity::new("address", "a1", "default").with_field("resident", key("user", "u3"));
        let u2 = user("u2").with_field("address", key("address", "a2"));
        let a2 = Entity::new("address", "a2", "default");
        let u3 = user("u3");
        let store = Arc::new(TestStore::with(vec![u1.clone(), a1, u2, a2, u3]));

        let outcome = export_engine(store).traverse(u1).await.unwrap();

        let row = |entity_type: &str, id: &str| {
            outcome
                .result
                .row_id(&key(entity_type, id))
                .cloned()
                .unwrap()
        };
        assert_eq!(row("user", "u1"), EntityId::from("u1"));
        assert_eq!(row("address", "a1"), EntityId::from("u1"));
        assert_eq!(row("user", "u3"), EntityId::from("u1"));
        // multi-valued field starts a new row
        assert_eq!(row("user", "u2"), EntityId::from("u2"));
        assert_eq!(row("address", "a2"), EntityId::from("u2"));

        let groups = outcome.result.grouped_rows();
        assert_eq!(groups[&EntityId::from("u1")].len(), 3);
        assert_eq!(groups[&EntityId::from("u2")].len(), 2);
    }

    #[tokio::test]
    async fn test_task_records_and_unfieldable_entities_are_skipped() {
        let u1 = user("u1");
        let task = Entity::new(TASK_ENTITY_TYPE, "t1", "default").with_field("subject", key("user", "u1"));
        let store = Arc::new(TestStore::with(vec![u1.clone(), task.clone()]));
        let engine = export_engine(store);

        let outcome = engine.traverse(u1).await.unwrap();
        assert_eq!(keys(&outcome), vec!["user:u1"]);

        let outcome = engine.traverse(task).await.unwrap();
        assert!(outcome.visited.is_empty());
        assert!(outcome.result.is_empty());

        let audit = Entity::new("audit", "x1", "default");
        let outcome = engine.traverse(audit).await.unwrap();
        assert!(outcome.visited.is_empty());
        assert_eq!(outcome.stats.unfieldable_skipped, 1);
    }

    #[tokio::test]
    async fn test_missing_policy_is_reported_not_fatal() {
        let u1 = user("u1").with_values(
            "friends",
            vec![reference("tag", "t1"), reference("user", "u2")],
        );
        let t1 = Entity::new("tag", "t1", "default");
        let u2 = user("u2");
        let store = Arc::new(TestStore::with(vec![u1.clone(), t1, u2]));

        let outcome = export_engine(store).traverse(u1).await.unwrap();

        assert_eq!(keys(&outcome), vec!["user:u1", "user:u2"]);
        assert!(outcome.result.get(&key("tag", "t1")).is_none());
        assert_eq!(
            outcome.issues,
            vec![TraversalIssue::MissingPolicy {
                key: key("tag", "t1")
            }]
        );
    }

    #[tokio::test]
    async fn test_missing_references_are_skipped() {
        let u1 = user("u1").with_field("address", key("address", "gone"));
        let store = Arc::new(TestStore::with(vec![u1.clone()]));

        let outcome = export_engine(store).traverse(u1).await.unwrap();

        assert_eq!(keys(&outcome), vec!["user:u1"]);
        assert!(outcome.issues.is_empty());
    }

    #[tokio::test]
    async fn test_failed_reverse_query_abandons_branch() {
        let u1 = user("u1").with_field("address", key("address", "a1"));
        let a1 = Entity::new("address", "a1", "default");
        let c1 = Entity::new("comment", "c1", "default").with_field("author", key("user", "u1"));
        let store = Arc::new(TestStore::with(vec![u1.clone(), a1, c1]));
        store.fail_query_on("comment");

        let outcome = export_engine(store).traverse(u1).await.unwrap();

        assert_eq!(keys(&outcome), vec!["user:u1", "address:a1"]);
        assert!(matches!(
            &outcome.issues[..],
            [TraversalIssue::Storage { key: k, .. }] if *k == key("user", "u1")
        ));
    }

    #[tokio::test]
    async fn test_limit_exceeded() {
        let u1 = user("u1").with_values(
            "friends",
            vec![reference("user", "u2"), reference("user", "u3")],
        );
        let store = Arc::new(TestStore::with(vec![u1.clone(), user("u2"), user("u3")]));
        let engine = export_engine(store).with_limits(TraversalLimits::with_max_nodes(2).unwrap());

        let err = engine.traverse(u1).await.unwrap_err();
        assert!(matches!(err, Error::TraversalLimit { max: 2 }));
    }

    struct CancelAfterFirst(CancellationToken);

    #[async_trait::async_trait]
    impl EntityProcessor for CancelAfterFirst {
        type Output = Vec<EntityKey>;

        async fn process_entity(
            &self,
            ctx: ProcessContext<'_>,
            output: &mut Vec<EntityKey>,
        ) -> Result<()> {
            output.push(ctx.entity.key());
            self.0.cancel();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_traversal() {
        let u1 = user("u1").with_field("friends", key("user", "u2"));
        let store = Arc::new(TestStore::with(vec![u1.clone(), user("u2")]));
        let schema = Arc::new(schema());
        let token = CancellationToken::new();
        let engine = TraversalEngine::new(store, schema.clone(), schema, CancelAfterFirst(token.clone()));

        let err = engine.traverse_with_cancel(u1, &token).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_reverse_index_built_once_per_engine() {
        let store = Arc::new(TestStore::default());
        let engine = export_engine(store);

        engine.traverse(user("u1")).await.unwrap();
        let first = engine.reverse_relationships().as_ptr();
        engine.traverse(user("u2")).await.unwrap();

        assert_eq!(engine.reverse_relationships().as_ptr(), first);
        assert_eq!(engine.reverse_relationships().len(), 2);
    }

    fn erasure_schema() -> Schema {
        Schema::new()
            .with_type(
                EntityTypeInfo::new("a"),
                vec![
                    FieldDefinition::new("id", FieldType::String),
                    FieldDefinition::new("name", FieldType::String),
                    FieldDefinition::reference("ref", "b"),
                ],
            )
            .with_type(
                EntityTypeInfo {
                    id_key: "ref2".to_string(),
                    ..EntityTypeInfo::new("b")
                },
                vec![
                    FieldDefinition::new("ref2", FieldType::String),
                    FieldDefinition::new("label", FieldType::String),
                ],
            )
            .with_policy(
                BundlePolicy::new("a")
                    .with_field(
                        FieldPolicy::new("a", "default", "name")
                            .erase(ErasureMode::Anonymize)
                            .with_anonymizer(TEXT_ANONYMIZER),
                    )
                    .with_field(FieldPolicy::new("a", "default", "ref").traverse()),
            )
            .with_policy(
                BundlePolicy::new("b")
                    .with_field(FieldPolicy::new("b", "default", "ref2").erase(ErasureMode::Remove)),
            )
    }

    async fn erase(store: Arc<TestStore>, schema: Schema, root: Entity) -> TraversalOutcome<ErasureResult> {
        let schema = Arc::new(schema);
        TraversalEngine::erasure(
            store,
            schema.clone(),
            schema,
            Arc::new(AnonymizerRegistry::with_builtins()),
        )
        .traverse(root)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_erasure_anonymizes_parent_and_deletes_child() {
        let a = Entity::new("a", "a1", "default")
            .with_field("name", "Jane")
            .with_field("ref", key("b", "b1"));
        let b = Entity::new("b", "b1", "default")
            .with_field("ref2", "b1")
            .with_field("label", "kept");
        let store = Arc::new(TestStore::with(vec![a.clone(), b]));

        let outcome = erase(store.clone(), erasure_schema(), a).await;
        let result = &outcome.result;

        let anonymized: Vec<_> = result
            .log
            .iter()
            .filter(|e| e.action == ErasureMode::Anonymize)
            .collect();
        assert_eq!(anonymized.len(), 1);
        assert_eq!(anonymized[0].entity_id, EntityId::from("a1"));
        assert_eq!(anonymized[0].field_name, "name");
        assert_eq!(anonymized[0].anonymizer.as_deref(), Some(TEXT_ANONYMIZER));

        assert!(result.is_complete());
        assert!(result.is_success(&key("a", "a1")));
        assert!(result.is_success(&key("b", "b1")));
        assert_eq!(store.deleted(), vec![key("b", "b1")]);

        let b_visit = outcome.visit(&key("b", "b1")).unwrap();
        assert_eq!(b_visit.row_id, EntityId::from("a1"));

        let saved = store.get(&key("a", "a1")).unwrap();
        assert_ne!(saved.get("name"), &[FieldValue::from("Jane")][..]);
    }

    #[tokio::test]
    async fn test_erasure_failure_does_not_affect_siblings() {
        let schema = erasure_schema()
            .with_type(
                EntityTypeInfo::new("c"),
                vec![
                    FieldDefinition::new("id", FieldType::String),
                    FieldDefinition::new("count", FieldType::Integer),
                ],
            )
            .with_policy(
                BundlePolicy::new("c")
                    .with_field(FieldPolicy::new("c", "default", "count").erase(ErasureMode::Anonymize)),
            );
        // no default anonymizer exists for integers
        let c = Entity::new("c", "c1", "default").with_values("count", vec![FieldValue::Integer(3)]);
        let a = Entity::new("a", "a1", "default")
            .with_field("name", "Jane")
            .with_values("ref", vec![reference("c", "c1"), reference("b", "b1")]);
        let b = Entity::new("b", "b1", "default").with_field("ref2", "b1");
        let store = Arc::new(TestStore::with(vec![a.clone(), b, c]));

        let outcome = erase(store.clone(), schema, a).await;
        let result = &outcome.result;

        assert!(result.is_failure(&key("c", "c1")));
        assert!(result.is_success(&key("b", "b1")));
        assert!(result.is_success(&key("a", "a1")));
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("Could not anonymize field count"));
    }
}
