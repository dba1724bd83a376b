//! Reference data, document texts and wiring shared by the integration tests

use std::sync::Arc;

use ledgerlens_ai::models::{
    Account, DocumentImage, EntryTemplate, Journal, Party, PartyRole, TemplateAccount,
};
use ledgerlens_ai::services::AnalysisOrchestrator;
use ledgerlens_common::config::{
    CacheConfig, PipelineConfig, RateLimitConfig, RetryConfig, TomlConfig,
};
use ledgerlens_common::events::EventBus;

use super::mocks::{MockReasoning, MockStore, TenantData};

pub const TENANT: &str = "acme-trading";

pub const FUEL_RECEIPT: &str = "PTT Station Co., Ltd.\n\
    Tax ID 0107544000108\n\
    Tax Invoice / Receipt No. R-001\n\
    Date 01/03/2026\n\
    Description  Qty  Amount\n\
    Diesel fuel B7  30.5  1,000.00\n\
    VAT 7% 70.00\n\
    Total 1,070.00";

pub const PAYMENT_SLIP: &str = "K PLUS\n\
    Transfer successful\n\
    From: ACME Trading\n\
    To: PTT Station\n\
    Amount 1,070.00 THB";

fn account(code: &str, name: &str) -> Account {
    Account {
        code: code.to_string(),
        name: name.to_string(),
        level: 1,
    }
}

fn template_account(code: &str, label: &str) -> TemplateAccount {
    TemplateAccount {
        account_code: code.to_string(),
        account_label: label.to_string(),
    }
}

/// Tenant with a chart of accounts, two journals, one fuel supplier and a
/// fuel-expense template
pub fn fuel_tenant() -> TenantData {
    TenantData {
        accounts: vec![
            account("1000", "Cash"),
            account("1155", "Input VAT"),
            account("2100", "Accounts payable"),
            account("5100", "Fuel expense"),
            account("5300", "Office supplies"),
        ],
        journals: vec![
            Journal {
                code: "PJ".to_string(),
                name: "Purchases".to_string(),
            },
            Journal {
                code: "GJ".to_string(),
                name: "General".to_string(),
            },
        ],
        creditors: vec![Party {
            code: "C001".to_string(),
            names: vec!["PTT Station Co., Ltd.".to_string(), "PTT Station".to_string()],
            tax_id: Some("0107544000108".to_string()),
            role: PartyRole::Creditor,
        }],
        debtors: Vec::new(),
        templates: vec![
            EntryTemplate {
                id: "T-RENT".to_string(),
                description: "Office rent".to_string(),
                guidance: String::new(),
                accounts: vec![
                    template_account("5200", "Rent expense"),
                    template_account("2100", "Accounts payable"),
                ],
                journal_code: Some("GJ".to_string()),
                counterparty: None,
            },
            EntryTemplate {
                id: "T-FUEL".to_string(),
                description: "Fuel expense".to_string(),
                guidance: "Debit fuel and input VAT, credit payables".to_string(),
                accounts: vec![
                    template_account("5100", "Fuel expense"),
                    template_account("1155", "Input VAT"),
                    template_account("2100", "Accounts payable"),
                ],
                journal_code: Some("PJ".to_string()),
                counterparty: None,
            },
        ],
        profile: Some("Trading company, VAT registered".to_string()),
    }
}

/// Structuring output for [`FUEL_RECEIPT`]; `vat_account` lets a test
/// swap in an account outside the template
pub fn fuel_analysis_json(vat_account: &str) -> String {
    serde_json::json!({
        "document_type": "tax_invoice",
        "receipt": {
            "document_number": "R-001",
            "document_date": "2026-03-01",
            "issuer_name": "PTT Station Co., Ltd.",
            "issuer_tax_id": "0107544000108",
            "total_amount": 1070.0,
            "vat_amount": 70.0,
            "currency": "THB"
        },
        "counterparty": {
            "name": "PTT Station Co., Ltd.",
            "tax_id": "0107544000108",
            "role": "creditor"
        },
        "accounting_entry": {
            "journal_code": "PJ",
            "entry_date": "2026-03-01",
            "description": "Diesel fuel B7",
            "entries": [
                {"account_code": "5100", "account_label": "Fuel expense", "debit": 1000.0, "credit": 0},
                {"account_code": vat_account, "account_label": "Input VAT", "debit": 70.0, "credit": 0},
                {"account_code": "2100", "account_label": "Accounts payable", "debit": 0, "credit": 1070.0}
            ]
        }
    })
    .to_string()
}

/// Image whose bytes are the key registered with [`MockReasoning::with_page`]
pub fn image(key: &str) -> DocumentImage {
    DocumentImage::new(key.as_bytes().to_vec(), "image/jpeg")
}

pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        deadline_secs: 30,
        ..PipelineConfig::default()
    }
}

/// Orchestrator over the mocks with a roomy rate limit and millisecond backoff
pub fn build_test_orchestrator(
    store: Arc<MockStore>,
    reasoning: Arc<MockReasoning>,
    pipeline: PipelineConfig,
    cache_ttl_secs: u64,
) -> AnalysisOrchestrator {
    let config = TomlConfig {
        cache: CacheConfig {
            ttl_secs: cache_ttl_secs,
        },
        rate_limit: RateLimitConfig {
            capacity: Some(100),
            ..RateLimitConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
        },
        pipeline,
        ..TomlConfig::default()
    };

    ledgerlens_ai::build_orchestrator(&config, store, reasoning, EventBus::new(100))
}
