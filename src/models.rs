// 🏛️ Rulemaking Entities - agencies, regulations, stages, documents
// Rows are created once by the sync engine and never updated afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// STAGE KIND
// ============================================================================

/// The three procedural stages of a rulemaking, in increasing finality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Advance Notice of Proposed Rulemaking
    #[serde(rename = "ANPRM")]
    Anprm,

    /// Notice of Proposed Rulemaking
    #[serde(rename = "NPRM")]
    Nprm,

    /// Final Rule
    #[serde(rename = "Final")]
    Final,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::Anprm, StageKind::Nprm, StageKind::Final];

    /// Value stored in `rule_stages.stage_type` / `documents.document_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Anprm => "ANPRM",
            StageKind::Nprm => "NPRM",
            StageKind::Final => "Final",
        }
    }

    /// Human-readable name for listings
    pub fn display_name(&self) -> &'static str {
        match self {
            StageKind::Anprm => "Advance Notice of Proposed Rulemaking (ANPRM)",
            StageKind::Nprm => "Notice of Proposed Rulemaking (NPRM)",
            StageKind::Final => "Final Rule",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = String;

    /// Accepts the stored form and lowercase CLI/query forms ("anprm", "nprm", "final")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anprm" => Ok(StageKind::Anprm),
            "nprm" => Ok(StageKind::Nprm),
            "final" => Ok(StageKind::Final),
            other => Err(format!("unknown stage kind: {}", other)),
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Federal agency. Identified by exact `name` for resolution purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: i64,
    pub name: String,
    pub abbreviation: Option<String>,

    /// Upstream URL slug, used to attach committee oversight
    pub slug: Option<String>,

    pub description: Option<String>,
}

/// Congressional committee with oversight over one or more agencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Committee {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

/// A regulation, keyed globally by its RIN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regulation {
    pub id: i64,
    pub title: String,
    pub rin: String,
    pub agency_id: Option<i64>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One stage of a regulation's rulemaking history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStage {
    pub id: i64,
    pub regulation_id: i64,

    /// Stored stage label ("ANPRM", "NPRM", "Final")
    pub stage_type: String,

    /// None when the upstream date could not be parsed
    pub publication_date: Option<NaiveDate>,

    /// Upstream document number - dedup key within a regulation
    pub federal_register_id: Option<String>,

    pub comment_end_date: Option<NaiveDate>,
}

impl RuleStage {
    /// Parsed stage kind; None for labels outside the three known stages
    pub fn kind(&self) -> Option<StageKind> {
        self.stage_type.parse().ok()
    }
}

/// Source document attached to a regulation, created alongside its stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub regulation_id: i64,

    /// Stage this document was created with (UNIQUE - one document per stage)
    pub rule_stage_id: Option<i64>,

    pub title: String,
    pub document_type: String,
    pub url: Option<String>,
    pub publication_date: Option<NaiveDate>,
    pub source: String,
}

// ============================================================================
// COMMITTEE → AGENCY MAPPING
// ============================================================================

/// Built-in committee with the upstream agency slugs it oversees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownCommittee {
    /// Short key used in search forms and query strings
    pub key: &'static str,
    pub display_name: &'static str,
    pub agency_slugs: &'static [&'static str],
}

pub static KNOWN_COMMITTEES: [KnownCommittee; 3] = [
    KnownCommittee {
        key: "commerce",
        display_name: "Energy & Commerce",
        agency_slugs: &["federal-trade-commission", "federal-communications-commission"],
    },
    KnownCommittee {
        key: "agriculture",
        display_name: "Agriculture",
        agency_slugs: &["agriculture-department"],
    },
    KnownCommittee {
        key: "transportation",
        display_name: "Transportation & Infrastructure",
        agency_slugs: &["transportation-department"],
    },
];

/// Look up a built-in committee by key (case-insensitive)
pub fn known_committee(key: &str) -> Option<&'static KnownCommittee> {
    KNOWN_COMMITTEES
        .iter()
        .find(|c| c.key.eq_ignore_ascii_case(key.trim()))
}

/// Committee overseeing an agency, by upstream agency slug
pub fn committee_for_agency_slug(slug: &str) -> Option<&'static KnownCommittee> {
    let slug = slug.to_ascii_lowercase();
    KNOWN_COMMITTEES
        .iter()
        .find(|c| c.agency_slugs.contains(&slug.as_str()))
}

// ============================================================================
// INSERT PAYLOADS
// ============================================================================

/// Stage + document pair about to be written for a regulation
#[derive(Debug, Clone, PartialEq)]
pub struct NewStage {
    pub kind: StageKind,
    pub publication_date: Option<NaiveDate>,
    pub federal_register_id: Option<String>,
    pub url: Option<String>,
}

impl NewStage {
    /// Title given to the paired document ("NPRM Document", ...)
    pub fn document_title(&self) -> String {
        format!("{} Document", self.kind)
    }
}

// ============================================================================
// CURRENT-STAGE RESOLVER
// ============================================================================

/// Pick the stage that best represents a regulation's status today.
///
/// A Final rule wins over any pending proposal regardless of date, then NPRM,
/// then ANPRM. Within a bucket the most recently published stage wins;
/// undated stages rank below dated ones and ties keep input order.
pub fn current_stage(stages: &[RuleStage]) -> Option<&RuleStage> {
    for kind in [StageKind::Final, StageKind::Nprm, StageKind::Anprm] {
        if let Some(stage) = most_recent(stages.iter().filter(|s| s.kind() == Some(kind))) {
            return Some(stage);
        }
    }

    // Unrecognized labels only
    most_recent(stages.iter())
}

fn most_recent<'a, I>(stages: I) -> Option<&'a RuleStage>
where
    I: Iterator<Item = &'a RuleStage>,
{
    stages.fold(None, |best: Option<&RuleStage>, stage| match best {
        Some(b) if b.publication_date >= stage.publication_date => Some(b),
        _ => Some(stage),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn stage(id: i64, stage_type: &str, date: Option<&str>) -> RuleStage {
        RuleStage {
            id,
            regulation_id: 1,
            stage_type: stage_type.to_string(),
            publication_date: date.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            federal_register_id: Some(format!("2021-{:05}", id)),
            comment_end_date: None,
        }
    }

    #[test]
    fn test_final_wins_even_when_oldest() {
        let stages = vec![
            stage(1, "ANPRM", Some("2021-01-01")),
            stage(2, "NPRM", Some("2022-01-01")),
            stage(3, "Final", Some("2020-06-01")),
        ];

        assert_eq!(current_stage(&stages).map(|s| s.id), Some(3));
    }

    #[test]
    fn test_nprm_beats_anprm() {
        let stages = vec![
            stage(1, "ANPRM", Some("2021-01-01")),
            stage(2, "NPRM", Some("2022-06-01")),
        ];

        assert_eq!(current_stage(&stages).map(|s| s.id), Some(2));
    }

    #[test]
    fn test_most_recent_anprm() {
        let stages = vec![
            stage(1, "ANPRM", Some("2019-03-01")),
            stage(2, "ANPRM", Some("2021-07-15")),
            stage(3, "ANPRM", Some("2020-01-01")),
        ];

        assert_eq!(current_stage(&stages).map(|s| s.id), Some(2));
    }

    #[test]
    fn test_no_stages() {
        assert!(current_stage(&[]).is_none());
    }

    #[test]
    fn test_most_recent_final_among_several() {
        let stages = vec![
            stage(1, "Final", Some("2020-06-01")),
            stage(2, "Final", Some("2023-02-10")),
            stage(3, "NPRM", Some("2024-01-01")),
        ];

        assert_eq!(current_stage(&stages).map(|s| s.id), Some(2));
    }

    #[test]
    fn test_undated_stage_ranks_below_dated() {
        let stages = vec![stage(1, "NPRM", None), stage(2, "NPRM", Some("2018-01-01"))];

        assert_eq!(current_stage(&stages).map(|s| s.id), Some(2));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let stages = vec![
            stage(7, "Final", Some("2022-05-05")),
            stage(8, "Final", Some("2022-05-05")),
        ];

        assert_eq!(current_stage(&stages).map(|s| s.id), Some(7));
    }

    #[test]
    fn test_unrecognized_labels_fall_back_to_most_recent() {
        let stages = vec![
            stage(1, "Notice", Some("2020-01-01")),
            stage(2, "Withdrawal", Some("2021-01-01")),
        ];

        assert_eq!(current_stage(&stages).map(|s| s.id), Some(2));
    }

    #[rstest]
    #[case("ANPRM", StageKind::Anprm)]
    #[case("nprm", StageKind::Nprm)]
    #[case("Final", StageKind::Final)]
    #[case(" final ", StageKind::Final)]
    fn test_stage_kind_from_str(#[case] input: &str, #[case] expected: StageKind) {
        assert_eq!(input.parse::<StageKind>(), Ok(expected));
    }

    #[test]
    fn test_stage_kind_round_trips_through_storage_label() {
        for kind in StageKind::ALL {
            assert_eq!(kind.as_str().parse::<StageKind>(), Ok(kind));
        }
        assert!("Proposed Rule".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_committee_lookup() {
        assert_eq!(known_committee("Commerce").map(|c| c.display_name), Some("Energy & Commerce"));
        assert!(known_committee("judiciary").is_none());

        let committee = committee_for_agency_slug("Transportation-Department").unwrap();
        assert_eq!(committee.key, "transportation");
        assert!(committee_for_agency_slug("defense-department").is_none());
    }

    #[test]
    fn test_document_title() {
        let new_stage = NewStage {
            kind: StageKind::Nprm,
            publication_date: None,
            federal_register_id: None,
            url: None,
        };

        assert_eq!(new_stage.document_title(), "NPRM Document");
    }
}
