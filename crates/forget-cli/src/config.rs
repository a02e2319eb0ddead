//! CLI configuration

use std::path::{Path, PathBuf};

use anyhow::Context;
use forget_core::{Schema, SchemaConfig};

/// Schema file looked up in the data directory when `--schema` is not given
pub const SCHEMA_FILE: &str = "schema.toml";

/// Entity database inside the data directory
pub const DATABASE_FILE: &str = "forget.redb";

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("forget")
}

/// Parse a TOML schema and policy file
pub fn parse_schema(content: &str) -> anyhow::Result<Schema> {
    let config: SchemaConfig = toml::from_str(content)?;
    Ok(Schema::from_config(config)?)
}

/// Load the schema and policy file at `path`
pub fn load_schema(path: &Path) -> anyhow::Result<Schema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read schema file {}", path.display()))?;
    let schema = parse_schema(&content)
        .with_context(|| format!("Invalid schema file {}", path.display()))?;
    tracing::debug!(
        "Loaded schema with {} entity types from {:?}",
        schema.entity_types().count(),
        path
    );
    Ok(schema)
}
