//! Tiered matching of a catalog entity against registry search results.
//!
//! Tiers are evaluated across all candidates in order, first hit wins:
//! exact name, then name containment in either direction, then postal code
//! found in the local address. No hit (including an empty result set) is a
//! definitive `NotCertified`; `Unknown` is reserved for failed queries and is
//! never produced here.

use std::fmt;

use catalog_common::CertificationStatus;
use registry_client::RegistryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Partial,
    Postal,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Partial => write!(f, "partial"),
            Self::Postal => write!(f, "postal"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome<'a> {
    pub status: CertificationStatus,
    pub matched: Option<&'a RegistryRecord>,
    pub tier: Option<MatchTier>,
}

impl<'a> MatchOutcome<'a> {
    fn hit(tier: MatchTier, record: &'a RegistryRecord) -> Self {
        Self {
            status: CertificationStatus::Certified,
            matched: Some(record),
            tier: Some(tier),
        }
    }

    fn miss() -> Self {
        Self {
            status: CertificationStatus::NotCertified,
            matched: None,
            tier: None,
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

pub fn match_entity<'a>(
    candidates: &'a [RegistryRecord],
    name: &str,
    address: &str,
) -> MatchOutcome<'a> {
    let local = normalize(name);
    let normalized: Vec<String> = candidates.iter().map(|c| normalize(&c.name)).collect();

    if !local.is_empty() {
        if let Some(i) = normalized.iter().position(|n| *n == local) {
            return MatchOutcome::hit(MatchTier::Exact, &candidates[i]);
        }

        if let Some(i) = normalized
            .iter()
            .position(|n| !n.is_empty() && (n.contains(&local) || local.contains(n.as_str())))
        {
            return MatchOutcome::hit(MatchTier::Partial, &candidates[i]);
        }
    }

    let address = address.to_lowercase();
    if let Some(record) = candidates.iter().find(|c| {
        c.postal
            .as_deref()
            .map(str::trim)
            .is_some_and(|postal| !postal.is_empty() && address.contains(&postal.to_lowercase()))
    }) {
        return MatchOutcome::hit(MatchTier::Postal, record);
    }

    MatchOutcome::miss()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, postal: &str) -> RegistryRecord {
        RegistryRecord::new(name, Some(postal))
    }

    #[test]
    fn exact_match_ignores_case_and_whitespace() {
        let candidates = vec![rec("  AL-FALAH RESTAURANT ", "123456")];
        let outcome = match_entity(&candidates, "Al-Falah Restaurant", "");
        assert_eq!(outcome.status, CertificationStatus::Certified);
        assert_eq!(outcome.tier, Some(MatchTier::Exact));
    }

    #[test]
    fn exact_match_wins_over_earlier_partial_and_postal_candidates() {
        let candidates = vec![
            rec("Al-Falah Restaurant Pte Ltd", "123456"),
            rec("Other Kitchen", "123456"),
            rec("al-falah restaurant", "999999"),
        ];
        let outcome = match_entity(&candidates, "Al-Falah Restaurant", "1 Road, Singapore 123456");
        assert_eq!(outcome.tier, Some(MatchTier::Exact));
        assert_eq!(outcome.matched.map(|r| r.name.as_str()), Some("al-falah restaurant"));
    }

    #[test]
    fn partial_match_works_in_both_directions() {
        let registered_longer = vec![rec("AL-FALAH RESTAURANT PTE LTD", "123456")];
        let outcome = match_entity(&registered_longer, "Al-Falah Restaurant", "");
        assert_eq!(outcome.tier, Some(MatchTier::Partial));

        let local_longer = vec![rec("Al-Falah", "000000")];
        let outcome = match_entity(&local_longer, "Al-Falah Restaurant (Bedok)", "");
        assert_eq!(outcome.tier, Some(MatchTier::Partial));
    }

    #[test]
    fn partial_match_wins_over_postal() {
        let candidates = vec![rec("Nasi Lemak Corner", "123456"), rec("Warung Al-Falah", "654321")];
        let outcome = match_entity(&candidates, "Al-Falah", "Blk 1 Singapore 123456");
        assert_eq!(outcome.tier, Some(MatchTier::Partial));
        assert_eq!(outcome.matched.map(|r| r.name.as_str()), Some("Warung Al-Falah"));
    }

    #[test]
    fn postal_match_when_names_differ() {
        let candidates = vec![rec("Rebranded Eatery", "520123")];
        let outcome = match_entity(&candidates, "Old Name Cafe", "10 Tampines Ave, Singapore 520123");
        assert_eq!(outcome.status, CertificationStatus::Certified);
        assert_eq!(outcome.tier, Some(MatchTier::Postal));
    }

    #[test]
    fn empty_postal_never_matches() {
        let candidates = vec![RegistryRecord::new("Rebranded Eatery", None), rec("X", "")];
        let outcome = match_entity(&candidates, "Old Name Cafe", "Singapore 520123");
        assert_eq!(outcome.status, CertificationStatus::NotCertified);
    }

    #[test]
    fn no_candidates_is_a_definitive_negative() {
        let outcome = match_entity(&[], "Al-Falah", "Singapore 123456");
        assert_eq!(outcome.status, CertificationStatus::NotCertified);
        assert!(outcome.matched.is_none());
        assert!(outcome.tier.is_none());
    }

    #[test]
    fn blank_local_name_does_not_partially_match_everything() {
        let candidates = vec![rec("Anything", "111111")];
        let outcome = match_entity(&candidates, "   ", "nowhere");
        assert_eq!(outcome.status, CertificationStatus::NotCertified);
    }
}
