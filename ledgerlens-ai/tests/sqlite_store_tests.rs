//! Integration tests for the SQLite reference store
//!
//! Uses a file database created through `init_database_pool`, the same path
//! the `init-db` command takes.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use ledgerlens_ai::db::{self, ReferenceStore, SqliteReferenceStore};
use ledgerlens_ai::models::PartyRole;
use ledgerlens_ai::services::ReferenceDataCache;
use sqlx::SqlitePool;

async fn seeded_pool(dir: &TempDir) -> SqlitePool {
    let pool = db::init_database_pool(&dir.path().join("data").join("ledgerlens.db"))
        .await
        .unwrap();

    for statement in [
        "INSERT INTO accounts (tenant_id, code, name, level) VALUES \
         ('acme', '5100', 'Fuel expense', 2), ('acme', '1155', 'Input VAT', 2), \
         ('acme', '2100', 'Accounts payable', 2), ('other', '9000', 'Other tenant', 1)",
        "INSERT INTO journals (tenant_id, code, name) VALUES ('acme', 'PJ', 'Purchases')",
        "INSERT INTO parties (tenant_id, code, role, name, alt_names, tax_id) VALUES \
         ('acme', 'C001', 'creditor', 'PTT Station Co., Ltd.', '[\"PTT Station\"]', '0107544000108'), \
         ('acme', 'D001', 'debtor', 'Big Buyer Co., Ltd.', '[]', NULL)",
        "INSERT INTO entry_templates (tenant_id, id, description, guidance, journal_code, counterparty, sort_order) VALUES \
         ('acme', 'T-FUEL', 'Fuel expense', 'Debit fuel and VAT', 'PJ', NULL, 2), \
         ('acme', 'T-RENT', 'Office rent', '', '', 'Landlord Co., Ltd.', 1)",
        "INSERT INTO template_accounts (tenant_id, template_id, position, account_code, account_label) VALUES \
         ('acme', 'T-FUEL', 2, '2100', 'Accounts payable'), \
         ('acme', 'T-FUEL', 0, '5100', 'Fuel expense'), \
         ('acme', 'T-FUEL', 1, '1155', 'Input VAT')",
        "INSERT INTO business_profiles (tenant_id, profile) VALUES ('acme', 'Fuel retailer customer')",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }

    pool
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledgerlens.db");

    let pool = db::init_database_pool(&path).await.unwrap();
    db::init_tables(&pool).await.unwrap();

    assert!(path.exists());
}

#[tokio::test]
async fn test_collections_scoped_to_tenant() {
    let dir = TempDir::new().unwrap();
    let store = SqliteReferenceStore::new(seeded_pool(&dir).await);

    let accounts = store.load_accounts("acme").await.unwrap();
    let codes: Vec<&str> = accounts.iter().map(|a| a.code.as_str()).collect();
    assert_eq!(codes, vec!["1155", "2100", "5100"]);
    assert_eq!(accounts[0].level, 2);

    let other = store.load_accounts("other").await.unwrap();
    assert_eq!(other.len(), 1);

    let creditors = store.load_parties("acme", PartyRole::Creditor).await.unwrap();
    assert_eq!(creditors.len(), 1);
    assert_eq!(creditors[0].names, vec!["PTT Station Co., Ltd.", "PTT Station"]);

    let debtors = store.load_parties("acme", PartyRole::Debtor).await.unwrap();
    assert_eq!(debtors[0].role, PartyRole::Debtor);
    assert!(debtors[0].tax_id.is_none());
}

#[tokio::test]
async fn test_templates_ordered_with_accounts_in_position_order() {
    let dir = TempDir::new().unwrap();
    let store = SqliteReferenceStore::new(seeded_pool(&dir).await);

    let templates = store.load_templates("acme").await.unwrap();
    let ids: Vec<&str> = templates.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["T-RENT", "T-FUEL"]);

    // Blank journal code reads as absent
    assert!(templates[0].journal_code.is_none());
    assert_eq!(templates[0].counterparty.as_deref(), Some("Landlord Co., Ltd."));
    assert!(templates[0].accounts.is_empty());

    assert_eq!(templates[1].account_codes(), vec!["5100", "1155", "2100"]);
    assert_eq!(templates[1].journal_code.as_deref(), Some("PJ"));
}

#[tokio::test]
async fn test_snapshot_through_cache() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteReferenceStore::new(seeded_pool(&dir).await));
    let cache = ReferenceDataCache::new(store, Duration::from_secs(60));

    let snapshot = cache.get("acme").await.unwrap();

    assert!(snapshot.missing_collections().is_empty());
    assert_eq!(snapshot.party_count(), 2);
    assert_eq!(snapshot.profile.as_deref(), Some("Fuel retailer customer"));
    assert!(snapshot.template("T-FUEL").is_some());
    assert_eq!(snapshot.account("1155").map(|a| a.name.as_str()), Some("Input VAT"));

    let empty = cache.get("nobody").await.unwrap();
    assert_eq!(empty.missing_collections(), vec!["accounts", "journals"]);
}
