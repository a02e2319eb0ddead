//! Export and erase commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use serde::Serialize;

use crate::output::{emit, render_table, to_json, OutputFormat};
use crate::{AppContext, Cli};
use forget_core::{
    AnonymizerRegistry, Entity, EntityKey, EntityStore, ErasureMode, ErasureResult,
    ExportProcessor, ExportResult, FieldPolicyRegistry, TraversalEngine, TraversalIssue,
    TraversalOutcome, TraversalStats,
};

#[derive(Args)]
pub struct ExportArgs {
    /// Entity type of the root entity
    pub entity_type: String,

    /// Identifier of the root entity
    pub id: String,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct EraseArgs {
    /// Entity type of the root entity
    pub entity_type: String,

    /// Identifier of the root entity
    pub id: String,

    /// List the field actions that would run without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// A field action an erasure would attempt
#[derive(Debug, Serialize)]
pub struct PlannedAction {
    pub entity: EntityKey,
    pub field: String,
    pub action: ErasureMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymizer: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErasurePlan<'a> {
    root: EntityKey,
    actions: Vec<PlannedAction>,
    issues: &'a [TraversalIssue],
    stats: &'a TraversalStats,
}

async fn load_root(ctx: &AppContext, entity_type: &str, id: &str) -> anyhow::Result<Entity> {
    let key = EntityKey::new(entity_type, id);
    match ctx.storage.load(&key).await? {
        Some(entity) => Ok(entity),
        None => anyhow::bail!("Entity not found: {}", key),
    }
}

fn export_engine(cli: &Cli, ctx: &AppContext) -> anyhow::Result<TraversalEngine<ExportProcessor>> {
    Ok(TraversalEngine::export(ctx.storage.clone(), ctx.schema.clone(), ctx.schema.clone())
        .with_limits(cli.limits()?))
}

fn report_issues(issues: &[TraversalIssue]) {
    for issue in issues {
        match issue {
            TraversalIssue::MissingPolicy { key } => {
                eprintln!("warning: no policy for {}; not processed", key)
            }
            TraversalIssue::Storage { key, message } => {
                eprintln!("warning: storage failure at {}: {}", key, message)
            }
            TraversalIssue::Processing { key, message } => {
                eprintln!("warning: processing failed for {}: {}", key, message)
            }
        }
    }
}

pub async fn run_export(args: &ExportArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let root = load_root(ctx, &args.entity_type, &args.id).await?;
    let root_key = root.key();
    tracing::info!("Exporting data reachable from {}", root_key);

    let outcome = export_engine(cli, ctx)?.traverse(root).await?;

    let content = match cli.format {
        OutputFormat::Json => to_json(&outcome)?,
        OutputFormat::Table => export_table(&outcome),
    };
    emit(&content, args.output.as_deref())?;

    if !cli.quiet {
        report_issues(&outcome.issues);
    }
    Ok(())
}

fn export_table(outcome: &TraversalOutcome<ExportResult>) -> String {
    let rows: Vec<Vec<String>> = outcome
        .visited
        .iter()
        .map(|visit| {
            let fields = outcome
                .result
                .get(&visit.key)
                .map(|e| e.fields.len())
                .unwrap_or(0);
            vec![
                visit.row_id.to_string(),
                visit.key.entity_type.to_string(),
                visit.key.id.to_string(),
                visit.parent_field.clone().unwrap_or_else(|| "-".to_string()),
                fields.to_string(),
            ]
        })
        .collect();

    let mut table = render_table(&["ROW", "TYPE", "ID", "VIA", "FIELDS"], &rows);
    table.push_str(&format!(
        "\n{} entities in {} rows\n",
        outcome.result.len(),
        outcome.result.grouped_rows().len()
    ));
    table
}

pub async fn run_erase(args: &EraseArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let root = load_root(ctx, &args.entity_type, &args.id).await?;
    let root_key = root.key();

    if args.dry_run {
        return run_erase_plan(root, args, cli, ctx).await;
    }

    tracing::info!("Erasing data reachable from {}", root_key);
    let anonymizers = Arc::new(AnonymizerRegistry::with_builtins());
    let engine = TraversalEngine::erasure(
        ctx.storage.clone(),
        ctx.schema.clone(),
        ctx.schema.clone(),
        anonymizers,
    )
    .with_limits(cli.limits()?);

    let outcome = engine.traverse(root).await?;
    let result = &outcome.result;

    let content = match cli.format {
        OutputFormat::Json => to_json(&outcome)?,
        OutputFormat::Table => erasure_table(result),
    };
    emit(&content, args.output.as_deref())?;

    if !cli.quiet {
        report_issues(&outcome.issues);
        for error in &result.errors {
            eprintln!("error: {}", error);
        }
    }

    if !result.is_complete() {
        anyhow::bail!(
            "Erasure from {} incomplete: {} entities failed",
            root_key,
            result.failures.len()
        );
    }
    Ok(())
}

fn erasure_table(result: &ErasureResult) -> String {
    let rows: Vec<Vec<String>> = result
        .log
        .iter()
        .map(|entry| {
            vec![
                entry.entity_type.clone(),
                entry.entity_id.to_string(),
                entry.field_name.clone(),
                entry.action.to_string(),
                entry.anonymizer.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut table = render_table(&["TYPE", "ID", "FIELD", "ACTION", "ANONYMIZER"], &rows);
    table.push_str(&format!(
        "\n{} succeeded, {} failed, {} errors\n",
        result.successes.len(),
        result.failures.len(),
        result.errors.len()
    ));
    table
}

/// Walk the graph without touching it and list the erasure actions per entity
async fn run_erase_plan(
    root: Entity,
    args: &EraseArgs,
    cli: &Cli,
    ctx: &AppContext,
) -> anyhow::Result<()> {
    let root_key = root.key();
    tracing::info!("Planning erasure from {}", root_key);

    let outcome = export_engine(cli, ctx)?.traverse(root).await?;
    let actions = plan_actions(&outcome, ctx.schema.as_ref());

    let content = match cli.format {
        OutputFormat::Json => to_json(&ErasurePlan {
            root: root_key,
            actions,
            issues: &outcome.issues,
            stats: &outcome.stats,
        })?,
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = actions
                .iter()
                .map(|a| {
                    vec![
                        a.entity.to_string(),
                        a.field.clone(),
                        a.action.to_string(),
                        a.anonymizer.clone().unwrap_or_else(|| "-".to_string()),
                    ]
                })
                .collect();
            let mut table = render_table(&["ENTITY", "FIELD", "ACTION", "ANONYMIZER"], &rows);
            table.push_str(&format!(
                "\nDry run: {} actions on {} entities\n",
                actions.len(),
                outcome.visited.len()
            ));
            table
        }
    };
    emit(&content, args.output.as_deref())?;

    if !cli.quiet {
        report_issues(&outcome.issues);
    }
    Ok(())
}

/// Enabled, actionable field policies of every visited entity
pub fn plan_actions(
    outcome: &TraversalOutcome<ExportResult>,
    registry: &dyn FieldPolicyRegistry,
) -> Vec<PlannedAction> {
    let mut actions = Vec::new();
    for visit in &outcome.visited {
        let Some(entity) = outcome.result.get(&visit.key) else {
            continue;
        };
        let Some(policy) = registry.bundle_policy(&entity.entity_type) else {
            continue;
        };
        for field in policy.fields_for_bundle(&entity.bundle) {
            if !field.enabled || !field.erasure_mode.is_actionable() {
                continue;
            }
            actions.push(PlannedAction {
                entity: visit.key.clone(),
                field: field.name.clone(),
                action: field.erasure_mode,
                anonymizer: field.anonymizer.clone(),
            });
        }
    }
    actions
}
