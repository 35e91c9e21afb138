// 🏷️ Stage Classifier - upstream document type → rulemaking stage
// Total function: unknown labels fall into the ANPRM bucket.

use crate::models::StageKind;

/// Upstream labels meaning "proposed rule" (short code and long form)
pub const PROPOSED_RULE_LABELS: [&str; 2] = ["PRORULE", "PROPOSED RULE"];

/// Upstream label meaning "final rule"
pub const FINAL_RULE_LABEL: &str = "RULE";

/// Document type codes requested from the upstream source during sync
pub const SYNC_DOCUMENT_TYPES: [&str; 3] = ["RULE", "PRORULE", "PROPOSED RULE"];

/// Map an upstream document type label to a stage.
///
/// Matching is exact; the engine does not try to tell other document kinds
/// apart, so anything that is not a proposed or final rule is an ANPRM.
pub fn classify(label: &str) -> StageKind {
    if PROPOSED_RULE_LABELS.contains(&label) {
        StageKind::Nprm
    } else if label == FINAL_RULE_LABEL {
        StageKind::Final
    } else {
        StageKind::Anprm
    }
}

// ============================================================================
// TESTS
// ============================================================================
