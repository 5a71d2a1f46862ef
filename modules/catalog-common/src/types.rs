use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Catalog entities ---

/// Halal-certification state of a catalog entity.
///
/// `Unknown` is a sentinel for "could not determine" and never triggers a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationStatus {
    Certified,
    NotCertified,
    Unknown,
}

impl CertificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certified => "certified",
            Self::NotCertified => "not_certified",
            Self::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "certified" => Self::Certified,
            "not_certified" | "notcertified" => Self::NotCertified,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for CertificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reachability of a listed social profile, as judged by the liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileStatus {
    Active,
    Inactive,
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
        }
    }
}

/// A catalog entry (restaurant, caterer, ...). Owned by the catalog store;
/// the reconciler only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub status: CertificationStatus,
    pub is_active: bool,
    /// platform -> handle or full profile URL
    #[serde(default)]
    pub socials: BTreeMap<String, String>,
}

// --- Update proposals ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staged, unapplied change to one entity field. Created here as `Pending`;
/// only the review workflow moves it on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProposal {
    pub id: Uuid,
    pub entity_id: String,
    pub field: String,
    pub old_value: String,
    pub new_value: String,
    /// Provenance, e.g. `"muis_registry"`.
    pub source: String,
    /// 0.0..=1.0, fixed per source.
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub status: ProposalStatus,
}

// --- Run log ---

/// One audit record per pipeline invocation, written on success and failure alike.
///
/// Counters are `None` when the run failed before producing them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogRecord {
    pub scraper_name: String,
    pub timestamp: DateTime<Utc>,
    pub entities_checked: Option<u32>,
    pub updates_found: Option<u32>,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl fmt::Display for RunLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_opt = |v: Option<u32>| v.map_or_else(|| "-".to_string(), |n| n.to_string());
        write!(
            f,
            "{}: checked={} updates={} errors={} duration={}ms",
            self.scraper_name,
            fmt_opt(self.entities_checked),
            fmt_opt(self.updates_found),
            self.errors.len(),
            self.duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certification_status_round_trips_through_strings() {
        for status in [
            CertificationStatus::Certified,
            CertificationStatus::NotCertified,
            CertificationStatus::Unknown,
        ] {
            assert_eq!(CertificationStatus::parse(status.as_str()), status);
        }
        assert_eq!(CertificationStatus::parse("garbage"), CertificationStatus::Unknown);
    }

    #[test]
    fn entity_deserializes_with_missing_optional_fields() {
        let entity: Entity = serde_json::from_str(
            r#"{"id":"e1","name":"Al-Falah","status":"not_certified","is_active":true}"#,
        )
        .unwrap();
        assert!(entity.socials.is_empty());
        assert_eq!(entity.address, "");
        assert_eq!(entity.status, CertificationStatus::NotCertified);
    }

    #[test]
    fn run_log_display_marks_missing_counters() {
        let record = RunLogRecord {
            scraper_name: "halal_certification".into(),
            timestamp: Utc::now(),
            entities_checked: None,
            updates_found: None,
            errors: vec!["session".into()],
            duration_ms: 12,
        };
        assert_eq!(
            record.to_string(),
            "halal_certification: checked=- updates=- errors=1 duration=12ms"
        );
    }
}
