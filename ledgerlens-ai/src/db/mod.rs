//! Database access for ledgerlens-ai
//!
//! SQLite holds the tenant reference data the pipeline reads. The pipeline
//! itself never writes to it; `init_database_pool` only bootstraps the schema.

pub mod reference_store;

pub use reference_store::{ReferenceStore, SqliteReferenceStore};

use ledgerlens_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the file (and parent directory) when missing, then ensures the
/// reference-data tables exist.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create reference-data tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            tenant_id TEXT NOT NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            level INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (tenant_id, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS journals (
            tenant_id TEXT NOT NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (tenant_id, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // alt_names: JSON array of additional name variants
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parties (
            tenant_id TEXT NOT NULL,
            code TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('creditor', 'debtor')),
            name TEXT NOT NULL,
            alt_names TEXT NOT NULL DEFAULT '[]',
            tax_id TEXT,
            PRIMARY KEY (tenant_id, role, code)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entry_templates (
            tenant_id TEXT NOT NULL,
            id TEXT NOT NULL,
            description TEXT NOT NULL,
            guidance TEXT NOT NULL DEFAULT '',
            journal_code TEXT,
            counterparty TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (tenant_id, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS template_accounts (
            tenant_id TEXT NOT NULL,
            template_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            account_code TEXT NOT NULL,
            account_label TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (tenant_id, template_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS business_profiles (
            tenant_id TEXT PRIMARY KEY,
            profile TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (accounts, journals, parties, entry_templates, template_accounts, business_profiles)"
    );

    Ok(())
}
