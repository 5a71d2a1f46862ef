//! Proposal policy: when an observed value is worth staging, and how much it is trusted.
//!
//! Confidence is a fixed property of the source, not of the match. Ambiguous
//! signals are resolved by the constants below, which pick the side that
//! cannot produce a proposal.

use std::fmt::Display;

use chrono::Utc;
use uuid::Uuid;

use catalog_common::{CertificationStatus, ProfileStatus, ProposalStatus, UpdateProposal};

/// Per-pipeline provenance and trust weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourcePolicy {
    /// Written to `UpdateProposal::source`.
    pub source: &'static str,
    /// Written to `RunLogRecord::scraper_name`.
    pub scraper_name: &'static str,
    pub confidence: f64,
}

/// Direct lookup against the official registry.
pub const CERTIFICATION_POLICY: SourcePolicy = SourcePolicy {
    source: "muis_registry",
    scraper_name: "halal_certification",
    confidence: 1.0,
};

/// HTTP status heuristic. Needs manual review: a dead profile today may be back tomorrow.
pub const LIVENESS_POLICY: SourcePolicy = SourcePolicy {
    source: "social_liveness_probe",
    scraper_name: "social_liveness",
    confidence: 0.6,
};

/// A registry query that failed (non-2xx) resolves to the sentinel.
pub const QUERY_FAILURE_STATUS: CertificationStatus = CertificationStatus::Unknown;

/// A probe that could not get a definitive 404/410 keeps the profile active.
pub const PROBE_FAILURE_STATUS: ProfileStatus = ProfileStatus::Active;

/// Field name for certification proposals.
pub const STATUS_FIELD: &str = "status";

/// Field name for a social profile's liveness proposal.
pub fn social_field(platform: &str) -> String {
    format!("socials.{platform}")
}

/// A value a pipeline can observe and compare against the stored one.
pub trait Observation: PartialEq + Display {
    /// "Could not determine" values never become proposals.
    fn is_sentinel(&self) -> bool;
}

impl Observation for CertificationStatus {
    fn is_sentinel(&self) -> bool {
        matches!(self, CertificationStatus::Unknown)
    }
}

impl Observation for ProfileStatus {
    fn is_sentinel(&self) -> bool {
        false
    }
}

/// Build a pending proposal if `observed` is definitive and differs from `stored`.
pub fn propose<T: Observation>(
    policy: &SourcePolicy,
    entity_id: &str,
    field: &str,
    stored: &T,
    observed: &T,
) -> Option<UpdateProposal> {
    if observed.is_sentinel() || observed == stored {
        return None;
    }

    Some(UpdateProposal {
        id: Uuid::new_v4(),
        entity_id: entity_id.to_string(),
        field: field.to_string(),
        old_value: stored.to_string(),
        new_value: observed.to_string(),
        source: policy.source.to_string(),
        confidence: policy.confidence,
        timestamp: Utc::now(),
        status: ProposalStatus::Pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use CertificationStatus::*;

    const ALL: [CertificationStatus; 3] = [Certified, NotCertified, Unknown];

    #[test]
    fn never_proposes_unchanged_or_unknown() {
        for stored in ALL {
            for observed in ALL {
                let proposal = propose(&CERTIFICATION_POLICY, "e1", STATUS_FIELD, &stored, &observed);
                let expected = observed != Unknown && observed != stored;
                assert_eq!(proposal.is_some(), expected, "stored={stored} observed={observed}");
            }
        }
    }

    #[test]
    fn certification_proposal_carries_full_confidence() {
        let p = propose(&CERTIFICATION_POLICY, "e1", STATUS_FIELD, &NotCertified, &Certified).unwrap();
        assert_eq!(p.confidence, 1.0);
        assert_eq!(p.source, "muis_registry");
        assert_eq!(p.old_value, "not_certified");
        assert_eq!(p.new_value, "certified");
        assert_eq!(p.status, ProposalStatus::Pending);
    }

    #[test]
    fn liveness_proposal_needs_review() {
        let field = social_field("instagram");
        let p = propose(
            &LIVENESS_POLICY,
            "e2",
            &field,
            &ProfileStatus::Active,
            &ProfileStatus::Inactive,
        )
        .unwrap();
        assert_eq!(p.confidence, 0.6);
        assert_eq!(p.field, "socials.instagram");
        assert_eq!((p.old_value.as_str(), p.new_value.as_str()), ("active", "inactive"));

        assert!(propose(&LIVENESS_POLICY, "e2", &field, &ProfileStatus::Active, &ProfileStatus::Active).is_none());
    }

    #[test]
    fn ambiguity_defaults_cannot_produce_proposals() {
        assert!(QUERY_FAILURE_STATUS.is_sentinel());
        assert!(propose(
            &LIVENESS_POLICY,
            "e3",
            "socials.x",
            &ProfileStatus::Active,
            &PROBE_FAILURE_STATUS
        )
        .is_none());
    }
}
