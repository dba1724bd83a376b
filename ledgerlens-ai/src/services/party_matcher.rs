//! Party Matcher
//!
//! Resolves an extracted counterparty (name and/or tax id) against the
//! tenant's creditor or debtor list.
//!
//! Only lexical and identifier evidence counts. Two parties that sell the
//! same kind of goods are never a match on that basis.

use crate::models::{MatchCandidate, MatchResult, Party};
use crate::services::text_normalizer::{normalize_party_name, normalize_tax_id};

/// Default minimum similarity (0-100) for a fuzzy name match
pub const DEFAULT_PARTY_THRESHOLD: f64 = 70.0;

/// Party Matcher
#[derive(Debug, Clone)]
pub struct PartyMatcher {
    /// Minimum similarity (0-100) for a fuzzy match
    threshold: f64,
}

impl PartyMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 100.0),
        }
    }

    /// Match an extracted counterparty against known parties
    ///
    /// 1. Tax id equal after separator stripping: confidence 100, `tax_id`.
    ///    Wins regardless of how the names compare.
    /// 2. Normalized name equal to any variant: confidence 100, `exact`.
    ///    Stops the scan.
    /// 3. Otherwise best `1 - normalized Levenshtein` over all variants,
    ///    accepted at or above the threshold.
    ///
    /// # Arguments
    /// * `name` - Counterparty name as extracted from the document
    /// * `tax_id` - Counterparty tax id as extracted, if any
    /// * `parties` - Candidate parties (creditors or debtors)
    pub fn match_party(
        &self,
        name: Option<&str>,
        tax_id: Option<&str>,
        parties: &[Party],
    ) -> MatchResult {
        if let Some(extracted) = tax_id.map(normalize_tax_id).filter(|t| !t.is_empty()) {
            let hit = parties.iter().find(|p| {
                p.tax_id
                    .as_deref()
                    .map(normalize_tax_id)
                    .map(|known| known == extracted)
                    .unwrap_or(false)
            });
            if let Some(party) = hit {
                tracing::debug!(party = %party.code, "Counterparty resolved by tax id");
                return MatchResult::tax_id(
                    party.primary_name(),
                    &party.code,
                    format!("Tax id {} matches party {}", extracted, party.code),
                );
            }
        }

        let normalized = match name.map(normalize_party_name) {
            Some(n) if !n.is_empty() => n,
            _ => {
                return MatchResult::not_found("No usable counterparty name or tax id extracted")
            }
        };

        let mut best: Option<(&Party, MatchCandidate, f64)> = None;
        for (party, candidate) in name_candidates(parties) {
            if candidate.normalized == normalized {
                return MatchResult::exact(
                    party.primary_name(),
                    &candidate.code,
                    format!("Normalized name equals '{}'", candidate.label),
                );
            }

            let similarity =
                strsim::normalized_levenshtein(&normalized, &candidate.normalized) * 100.0;
            if best.as_ref().map(|(_, _, s)| similarity > *s).unwrap_or(true) {
                best = Some((party, candidate, similarity));
            }
        }

        match best {
            Some((party, candidate, similarity)) if similarity >= self.threshold => {
                tracing::debug!(
                    party = %candidate.code,
                    similarity = similarity,
                    "Counterparty resolved by fuzzy name"
                );
                MatchResult::fuzzy(
                    party.primary_name(),
                    &candidate.code,
                    similarity,
                    format!("Name similarity {:.1} with '{}'", similarity, candidate.label),
                )
            }
            Some((_, candidate, similarity)) => MatchResult::not_found(format!(
                "Best name similarity {:.1} with '{}' is below {:.0}",
                similarity, candidate.label, self.threshold
            )),
            None => MatchResult::not_found("No known parties to compare against"),
        }
    }
}

/// Every usable name variant of every party, normalized once
fn name_candidates(parties: &[Party]) -> Vec<(&Party, MatchCandidate)> {
    parties
        .iter()
        .flat_map(|party| {
            party.names.iter().filter_map(move |variant| {
                let normalized = normalize_party_name(variant);
                if normalized.is_empty() {
                    return None;
                }
                Some((
                    party,
                    MatchCandidate {
                        label: variant.clone(),
                        normalized,
                        code: party.code.clone(),
                    },
                ))
            })
        })
        .collect()
}

impl Default for PartyMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PARTY_THRESHOLD)
    }
}
