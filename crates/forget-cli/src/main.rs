//! Forget CLI - Export and erase personal data across an entity graph

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{completions, io, relationships, traverse};
use forget_core::{limits::DEFAULT_MAX_TRAVERSAL_NODES, Schema, TraversalLimits};
use forget_storage::{RedbStore, StorageBackend};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "forget")]
#[command(author, version, about = "Export or erase everything an entity graph holds about a person")]
pub struct Cli {
    /// Data directory
    #[arg(short, long, global = true, env = "FORGET_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Schema and policy file (default: <data-dir>/schema.toml)
    #[arg(short, long, global = true, env = "FORGET_SCHEMA")]
    pub schema: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Maximum number of entities a single traversal may visit
    #[arg(long, default_value_t = DEFAULT_MAX_TRAVERSAL_NODES, global = true)]
    pub max_nodes: usize,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the data directory path
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(config::default_data_dir)
    }

    /// Get the schema file path
    pub fn schema_path(&self) -> PathBuf {
        self.schema
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir().join(config::SCHEMA_FILE))
    }

    pub fn limits(&self) -> anyhow::Result<TraversalLimits> {
        Ok(TraversalLimits::with_max_nodes(self.max_nodes)?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import entities from a JSON dataset
    Import(io::ImportArgs),
    /// Collect everything reachable from an entity
    Export(traverse::ExportArgs),
    /// Anonymize or remove personal data reachable from an entity
    Erase(traverse::EraseArgs),
    /// List the reverse (owner) relationships derived from the schema
    Relationships,
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with storage backend and schema
pub struct AppContext {
    pub storage: Arc<RedbStore>,
    pub schema: Arc<Schema>,
}

impl AppContext {
    pub async fn new(cli: &Cli) -> anyhow::Result<Self> {
        let schema_path = cli.schema_path();
        let schema = config::load_schema(&schema_path)?;

        let data_dir = cli.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let db_path = data_dir.join(config::DATABASE_FILE);
        tracing::debug!("Using database at: {:?}", db_path);

        let storage = RedbStore::open(&db_path)?;
        storage.initialize().await?;

        Ok(Self {
            storage: Arc::new(storage),
            schema: Arc::new(schema),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting forget CLI");

    if let Commands::Completions(args) = &cli.command {
        return completions::run(args);
    }

    let ctx = AppContext::new(&cli).await?;

    match &cli.command {
        Commands::Import(args) => io::run_import(args, &cli, &ctx).await?,
        Commands::Export(args) => traverse::run_export(args, &cli, &ctx).await?,
        Commands::Erase(args) => traverse::run_erase(args, &cli, &ctx).await?,
        Commands::Relationships => relationships::run(&cli, &ctx)?,
        Commands::Completions(_) => {}
    }

    Ok(())
}
