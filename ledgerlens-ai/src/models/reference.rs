//! Tenant reference data
//!
//! Typed records decoded once at the store boundary. A
//! [`ReferenceDataSnapshot`] is immutable after construction and shared as
//! `Arc` by every consumer; refreshes replace it wholesale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chart-of-accounts entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub code: String,
    pub name: String,
    pub level: u32,
}

/// Journal book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    pub code: String,
    pub name: String,
}

/// Side of the transaction a counterparty sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyRole {
    /// Supplier the tenant pays (purchase documents)
    #[default]
    Creditor,
    /// Customer that pays the tenant (sales documents)
    Debtor,
}

impl PartyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Creditor => "creditor",
            PartyRole::Debtor => "debtor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "creditor" | "supplier" | "vendor" => Some(PartyRole::Creditor),
            "debtor" | "customer" => Some(PartyRole::Debtor),
            _ => None,
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known counterparty with all of its recorded name variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub code: String,
    /// First entry is the primary name
    pub names: Vec<String>,
    pub tax_id: Option<String>,
    pub role: PartyRole,
}

impl Party {
    pub fn primary_name(&self) -> &str {
        self.names.first().map(String::as_str).unwrap_or("")
    }
}

/// One pre-approved line of an entry template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateAccount {
    pub account_code: String,
    pub account_label: String,
}

/// Reusable entry template defined by the tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryTemplate {
    pub id: String,
    pub description: String,
    /// Free-text guidance for the reasoning service
    pub guidance: String,
    /// Ordered account lines; template-only results must use exactly these
    pub accounts: Vec<TemplateAccount>,
    pub journal_code: Option<String>,
    /// Counterparty that must be the document issuer for this template to apply
    pub counterparty: Option<String>,
}

impl EntryTemplate {
    pub fn account_codes(&self) -> Vec<&str> {
        self.accounts.iter().map(|a| a.account_code.as_str()).collect()
    }
}

/// Everything the pipeline knows about one tenant, loaded as a unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceDataSnapshot {
    pub tenant_id: String,
    pub accounts: Vec<Account>,
    pub journals: Vec<Journal>,
    pub creditors: Vec<Party>,
    pub debtors: Vec<Party>,
    pub templates: Vec<EntryTemplate>,
    pub profile: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

impl ReferenceDataSnapshot {
    pub fn parties(&self, role: PartyRole) -> &[Party] {
        match role {
            PartyRole::Creditor => &self.creditors,
            PartyRole::Debtor => &self.debtors,
        }
    }

    pub fn account(&self, code: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.code == code)
    }

    pub fn journal(&self, code: &str) -> Option<&Journal> {
        self.journals.iter().find(|j| j.code == code)
    }

    pub fn template(&self, id: &str) -> Option<&EntryTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Accounts and journals are the minimum needed to post anything
    pub fn missing_collections(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.accounts.is_empty() {
            missing.push("accounts");
        }
        if self.journals.is_empty() {
            missing.push("journals");
        }
        missing
    }

    pub fn party_count(&self) -> usize {
        self.creditors.len() + self.debtors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ReferenceDataSnapshot {
        ReferenceDataSnapshot {
            tenant_id: "t1".to_string(),
            accounts: vec![Account {
                code: "5100".to_string(),
                name: "Fuel expense".to_string(),
                level: 2,
            }],
            journals: vec![],
            creditors: vec![Party {
                code: "C001".to_string(),
                names: vec!["Acme Co., Ltd.".to_string(), "Acme".to_string()],
                tax_id: Some("0105551234567".to_string()),
                role: PartyRole::Creditor,
            }],
            debtors: vec![],
            templates: vec![],
            profile: None,
            loaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_collections_reports_journals() {
        assert_eq!(snapshot().missing_collections(), vec!["journals"]);
    }

    #[test]
    fn test_parties_by_role() {
        let snap = snapshot();
        assert_eq!(snap.parties(PartyRole::Creditor).len(), 1);
        assert!(snap.parties(PartyRole::Debtor).is_empty());
        assert_eq!(snap.creditors[0].primary_name(), "Acme Co., Ltd.");
    }

    #[test]
    fn test_party_role_parse() {
        assert_eq!(PartyRole::parse("Vendor"), Some(PartyRole::Creditor));
        assert_eq!(PartyRole::parse("customer"), Some(PartyRole::Debtor));
        assert_eq!(PartyRole::parse("other"), None);
    }
}
