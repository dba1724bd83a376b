//! ledgerlens-ai - Document analysis command line
//!
//! Commands:
//! - `init-db`: create the reference-data tables
//! - `reference --tenant <id>`: load and summarize a tenant's reference data
//! - `analyze --tenant <id> <images...>`: analyze document photos and print
//!   the response as JSON
//! - `set-api-key <key>`: store the reasoning-service API key in the config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ledgerlens_common::config::{default_config_path, ConfigResolver, CONFIG_ENV_VAR};
use ledgerlens_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use ledgerlens_ai::db::{self, SqliteReferenceStore};
use ledgerlens_ai::models::DocumentImage;
use ledgerlens_ai::services::ReferenceDataCache;

const MODULE_NAME: &str = "ledgerlens-ai";

#[derive(Parser)]
#[command(name = "ledgerlens-ai", version, about = "Photographed documents to accounting entries")]
struct Cli {
    /// Config file (overrides LEDGERLENS_CONFIG and the platform default)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the reference-data tables
    InitDb,
    /// Load a tenant's reference data and print a summary
    Reference {
        #[arg(long)]
        tenant: String,
    },
    /// Analyze document images and print the response JSON
    Analyze {
        #[arg(long)]
        tenant: String,
        /// Image files, in page order
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Store the reasoning-service API key in the config file
    SetApiKey { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolver = ConfigResolver::new(MODULE_NAME).with_cli_path(cli.config.clone());
    let config = resolver.load()?;
    ledgerlens_common::logging::init_tracing(&config.logging)?;

    info!("Starting ledgerlens-ai {}", env!("CARGO_PKG_VERSION"));

    let db_path = config.database.resolved_path();
    info!("Database: {}", db_path.display());

    match cli.command {
        Command::InitDb => {
            db::init_database_pool(&db_path).await?;
            println!("Reference-data tables ready at {}", db_path.display());
        }

        Command::Reference { tenant } => {
            let pool = db::init_database_pool(&db_path).await?;
            let cache = ReferenceDataCache::new(
                Arc::new(SqliteReferenceStore::new(pool)),
                config.cache.ttl(),
            );
            let snapshot = cache.get(&tenant).await?;

            let summary = serde_json::json!({
                "tenant_id": snapshot.tenant_id,
                "accounts": snapshot.accounts.len(),
                "journals": snapshot.journals.len(),
                "creditors": snapshot.creditors.len(),
                "debtors": snapshot.debtors.len(),
                "templates": snapshot.templates.iter().map(|t| &t.id).collect::<Vec<_>>(),
                "has_profile": snapshot.profile.is_some(),
                "missing": snapshot.missing_collections(),
                "loaded_at": snapshot.loaded_at,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Analyze { tenant, images } => {
            let pool = db::init_database_pool(&db_path).await?;
            let orchestrator =
                ledgerlens_ai::build_default_orchestrator(&config, pool, EventBus::new(100))?;

            let mut documents = Vec::with_capacity(images.len());
            for path in &images {
                let image = DocumentImage::load(path)
                    .await
                    .with_context(|| format!("Failed to read image {}", path.display()))?;
                documents.push(image);
            }

            let response = orchestrator.analyze(&tenant, documents).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::SetApiKey { key } => {
            let path = match resolver.resolve_path().or_else(|| default_config_path(MODULE_NAME)) {
                Some(path) => path,
                None => anyhow::bail!(
                    "No config location available; pass --config or set {}",
                    CONFIG_ENV_VAR
                ),
            };
            ledgerlens_ai::config::persist_reasoning_api_key(&key, &path)?;
            println!("Reasoning API key stored in {}", path.display());
        }
    }

    Ok(())
}
