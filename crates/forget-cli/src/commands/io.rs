//! Dataset import

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;

use crate::{AppContext, Cli};
use forget_core::{Entity, EntityType, FieldMetadataProvider};
use forget_storage::StorageBackend;

#[derive(Args)]
pub struct ImportArgs {
    /// Input file: a JSON array of entities, or an object with an `entities` array
    pub file: PathBuf,

    /// Reject entities whose type is not in the schema instead of importing them
    #[arg(long)]
    pub strict: bool,
}

/// Accepted dataset layouts
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Dataset {
    Entities(Vec<Entity>),
    Document { entities: Vec<Entity> },
}

impl Dataset {
    pub fn into_entities(self) -> Vec<Entity> {
        match self {
            Self::Entities(entities) | Self::Document { entities } => entities,
        }
    }
}

pub async fn run_import(args: &ImportArgs, _cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    tracing::info!("Importing from {:?}", args.file);

    let content = std::fs::read_to_string(&args.file)?;
    let dataset: Dataset = serde_json::from_str(&content)?;
    let entities = dataset.into_entities();

    let mut unknown: BTreeMap<EntityType, usize> = BTreeMap::new();
    for entity in &entities {
        if ctx.schema.entity_type(&entity.entity_type).is_none() {
            *unknown.entry(entity.entity_type.clone()).or_default() += 1;
        }
    }

    if !unknown.is_empty() {
        let types: Vec<String> = unknown
            .iter()
            .map(|(t, n)| format!("{} ({})", t, n))
            .collect();
        if args.strict {
            anyhow::bail!("Dataset has entity types missing from the schema: {}", types.join(", "));
        }
        tracing::warn!(
            "Importing entity types missing from the schema; they will never be traversed: {}",
            types.join(", ")
        );
    }

    ctx.storage.save_batch(&entities).await?;
    let total = ctx.storage.count().await?;

    tracing::info!("Imported {} entities", entities.len());
    println!(
        "Imported {} entities from {:?} ({} stored)",
        entities.len(),
        args.file,
        total
    );

    Ok(())
}
