// 🔍 Deduplication Guard - has this upstream document already been recorded?
// Dedup key: (regulation, upstream document number).

use crate::db;
use crate::error::Result;
use crate::models::Regulation;
use rusqlite::Connection;
use std::fmt;

/// The pair that identifies a recorded stage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey<'a> {
    pub regulation_id: i64,
    pub federal_register_id: Option<&'a str>,
}

impl<'a> DedupKey<'a> {
    pub fn new(regulation: &Regulation, federal_register_id: Option<&'a str>) -> Self {
        DedupKey {
            regulation_id: regulation.id,
            federal_register_id,
        }
    }
}

impl fmt::Display for DedupKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "regulation {} / document {}",
            self.regulation_id,
            self.federal_register_id.unwrap_or("<none>")
        )
    }
}

/// True when the regulation already has a stage for this upstream document.
///
/// Only stages of the given regulation are considered; the same document
/// number under another regulation does not count.
pub fn already_recorded(
    conn: &Connection,
    regulation: &Regulation,
    federal_register_id: Option<&str>,
) -> Result<bool> {
    let key = DedupKey::new(regulation, federal_register_id);
    Ok(db::find_stage(conn, key.regulation_id, key.federal_register_id)?.is_some())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_stage_with_document, setup_database};
    use crate::models::{NewStage, StageKind};
    use crate::resolver::{resolve_agency, resolve_regulation};

    fn setup() -> (Connection, Regulation, Regulation) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let agency = resolve_agency(&conn, "Agency", None, None).unwrap().into_inner();
        let a = resolve_regulation(&conn, Some("RIN-A"), "A", &agency, None).unwrap().into_inner();
        let b = resolve_regulation(&conn, Some("RIN-B"), "B", &agency, None).unwrap().into_inner();
        (conn, a, b)
    }

    fn record(conn: &mut Connection, regulation: &Regulation, fr_id: Option<&str>) {
        let tx = conn.transaction().unwrap();
        insert_stage_with_document(
            &tx,
            regulation.id,
            &NewStage {
                kind: StageKind::Nprm,
                publication_date: None,
                federal_register_id: fr_id.map(str::to_string),
                url: None,
            },
            "federalregister.gov",
        )
        .unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn test_not_recorded_initially() {
        let (conn, a, _) = setup();
        assert!(!already_recorded(&conn, &a, Some("2024-00001")).unwrap());
    }

    #[test]
    fn test_recorded_after_insert() {
        let (mut conn, a, _) = setup();
        record(&mut conn, &a, Some("2024-00001"));

        assert!(already_recorded(&conn, &a, Some("2024-00001")).unwrap());
        assert!(!already_recorded(&conn, &a, Some("2024-00002")).unwrap());
    }

    #[test]
    fn test_scoped_to_regulation() {
        let (mut conn, a, b) = setup();
        record(&mut conn, &a, Some("2024-00001"));

        assert!(!already_recorded(&conn, &b, Some("2024-00001")).unwrap());
    }

    #[test]
    fn test_missing_document_number_matches_missing() {
        let (mut conn, a, _) = setup();
        record(&mut conn, &a, None);

        assert!(already_recorded(&conn, &a, None).unwrap());
        assert!(!already_recorded(&conn, &a, Some("2024-00001")).unwrap());
    }

    #[test]
    fn test_key_display() {
        let (_, a, _) = setup();
        let key = DedupKey::new(&a, None);
        assert_eq!(key.to_string(), format!("regulation {} / document <none>", a.id));
    }
}
