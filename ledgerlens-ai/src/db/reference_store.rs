//! Read contract for tenant reference data
//!
//! Rows are decoded into typed records here and nowhere else; everything
//! downstream of the store works with [`Account`], [`Party`] etc.

use async_trait::async_trait;
use ledgerlens_common::{Error, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::models::{Account, EntryTemplate, Journal, Party, PartyRole, TemplateAccount};

/// Backing store the reference cache loads from
///
/// Each method returns an ordered list (possibly empty). Absence of records
/// is not an error; only an unreachable or corrupt store is.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn load_accounts(&self, tenant_id: &str) -> Result<Vec<Account>>;

    async fn load_journals(&self, tenant_id: &str) -> Result<Vec<Journal>>;

    async fn load_parties(&self, tenant_id: &str, role: PartyRole) -> Result<Vec<Party>>;

    async fn load_templates(&self, tenant_id: &str) -> Result<Vec<EntryTemplate>>;

    async fn load_profile(&self, tenant_id: &str) -> Result<Option<String>>;
}

/// SQLite-backed reference store
#[derive(Clone)]
pub struct SqliteReferenceStore {
    db: SqlitePool,
}

impl SqliteReferenceStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

#[async_trait]
impl ReferenceStore for SqliteReferenceStore {
    async fn load_accounts(&self, tenant_id: &str) -> Result<Vec<Account>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT code, name, level FROM accounts WHERE tenant_id = ? ORDER BY code",
        )
        .bind(tenant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(code, name, level)| Account {
                code,
                name,
                level: level.max(0) as u32,
            })
            .collect())
    }

    async fn load_journals(&self, tenant_id: &str) -> Result<Vec<Journal>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT code, name FROM journals WHERE tenant_id = ? ORDER BY code",
        )
        .bind(tenant_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(code, name)| Journal { code, name })
            .collect())
    }

    async fn load_parties(&self, tenant_id: &str, role: PartyRole) -> Result<Vec<Party>> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT code, name, alt_names, tax_id FROM parties \
             WHERE tenant_id = ? AND role = ? ORDER BY code",
        )
        .bind(tenant_id)
        .bind(role.as_str())
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(code, name, alt_names, tax_id)| {
                let alternates: Vec<String> = serde_json::from_str(&alt_names).map_err(|e| {
                    Error::InvalidInput(format!(
                        "Party {} has malformed alt_names: {}",
                        code, e
                    ))
                })?;

                let mut names = Vec::with_capacity(alternates.len() + 1);
                names.push(name);
                names.extend(alternates.into_iter().filter(|n| !n.trim().is_empty()));

                Ok(Party {
                    code,
                    names,
                    tax_id: tax_id.filter(|t| !t.trim().is_empty()),
                    role,
                })
            })
            .collect()
    }

    async fn load_templates(&self, tenant_id: &str) -> Result<Vec<EntryTemplate>> {
        let templates: Vec<(String, String, String, Option<String>, Option<String>)> =
            sqlx::query_as(
                "SELECT id, description, guidance, journal_code, counterparty \
                 FROM entry_templates WHERE tenant_id = ? ORDER BY sort_order, id",
            )
            .bind(tenant_id)
            .fetch_all(&self.db)
            .await?;

        let lines: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT template_id, account_code, account_label FROM template_accounts \
             WHERE tenant_id = ? ORDER BY template_id, position",
        )
        .bind(tenant_id)
        .fetch_all(&self.db)
        .await?;

        let mut accounts_by_template: HashMap<String, Vec<TemplateAccount>> = HashMap::new();
        for (template_id, account_code, account_label) in lines {
            accounts_by_template
                .entry(template_id)
                .or_default()
                .push(TemplateAccount {
                    account_code,
                    account_label,
                });
        }

        Ok(templates
            .into_iter()
            .map(|(id, description, guidance, journal_code, counterparty)| {
                let accounts = accounts_by_template.remove(&id).unwrap_or_default();
                EntryTemplate {
                    id,
                    description,
                    guidance,
                    accounts,
                    journal_code: journal_code.filter(|j| !j.trim().is_empty()),
                    counterparty: counterparty.filter(|c| !c.trim().is_empty()),
                }
            })
            .collect())
    }

    async fn load_profile(&self, tenant_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT profile FROM business_profiles WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_optional(&self.db)
                .await?;

        Ok(row.map(|(profile,)| profile))
    }
}
