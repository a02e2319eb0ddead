//! Reverse relationship listing

use crate::output::{emit, render_table, to_json, OutputFormat};
use crate::{AppContext, Cli};
use forget_core::relationship::scan_reverse_relationships;

pub fn run(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let relationships = scan_reverse_relationships(ctx.schema.as_ref(), ctx.schema.as_ref());
    tracing::info!("Found {} reverse relationships", relationships.len());

    let content = match cli.format {
        OutputFormat::Json => to_json(&relationships)?,
        OutputFormat::Table if relationships.is_empty() => {
            "No owner reference fields configured".to_string()
        }
        OutputFormat::Table => {
            let rows: Vec<Vec<String>> = relationships
                .iter()
                .map(|r| {
                    vec![
                        r.target_type.to_string(),
                        format!("{}.{}", r.source_type, r.source_bundle),
                        r.source_field.clone(),
                        r.owner_policy.erasure_mode.to_string(),
                    ]
                })
                .collect();
            render_table(&["TARGET", "OWNED BY", "FIELD", "ERASURE"], &rows)
        }
    };

    emit(&content, None)
}
