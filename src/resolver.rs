// 🔗 Entity Resolver - find-or-create agencies and regulations
//
// Lookup first, then insert-if-absent (UNIQUE-backed), then re-read. A row
// that appears between the lookup and the insert is simply picked up by the
// re-read instead of tripping a constraint error.

use crate::db::{self, Event, NewRegulation};
use crate::error::{Error, Result};
use crate::models::{committee_for_agency_slug, Agency, Regulation};
use rusqlite::Connection;
use tracing::debug;

/// Actor recorded on audit events written during sync
pub const SYNC_ACTOR: &str = "federal_register_sync";

/// A resolved entity and whether this call created it
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub entity: T,
    pub created: bool,
}

impl<T> Resolved<T> {
    fn existing(entity: T) -> Self {
        Resolved { entity, created: false }
    }

    pub fn into_inner(self) -> T {
        self.entity
    }
}

/// Find an agency by exact name, creating it when absent.
///
/// An empty name is accepted: documents listing no agencies all share the
/// agency with an empty name. A newly created agency whose slug belongs to a
/// known committee is linked to that committee.
pub fn resolve_agency(
    conn: &Connection,
    name: &str,
    abbreviation: Option<&str>,
    slug: Option<&str>,
) -> Result<Resolved<Agency>> {
    if let Some(agency) = db::find_agency_by_name(conn, name)? {
        return Ok(Resolved::existing(agency));
    }

    let abbreviation = abbreviation.filter(|a| !a.is_empty());
    let created = db::insert_agency_if_absent(conn, name, abbreviation, slug)?;
    let agency = db::find_agency_by_name(conn, name)?.ok_or_else(|| Error::NotFound {
        entity: "agency",
        key: name.to_string(),
    })?;

    if created {
        debug!(agency_id = agency.id, name, "created agency");
        db::insert_event(
            conn,
            &Event::new(
                "agency_created",
                "agency",
                &agency.id.to_string(),
                serde_json::json!({ "name": agency.name, "abbreviation": agency.abbreviation }),
                SYNC_ACTOR,
            ),
        )?;

        if let Some(committee) = slug.and_then(committee_for_agency_slug) {
            let row = db::insert_committee(conn, committee.display_name, None)?;
            db::link_agency_committee(conn, agency.id, row.id)?;
        }
    }

    Ok(Resolved { entity: agency, created })
}

/// Find a regulation by RIN, creating it when absent.
///
/// Existing regulations are returned as stored: title and description are
/// not refreshed from newer upstream data. Fails with `MissingIdentity` when
/// the RIN is absent or blank.
pub fn resolve_regulation(
    conn: &Connection,
    rin: Option<&str>,
    title: &str,
    agency: &Agency,
    description: Option<&str>,
) -> Result<Resolved<Regulation>> {
    let rin = rin.map(str::trim).filter(|r| !r.is_empty()).ok_or(Error::MissingIdentity)?;

    if let Some(regulation) = db::find_regulation_by_rin(conn, rin)? {
        return Ok(Resolved::existing(regulation));
    }

    let created = db::insert_regulation_if_absent(
        conn,
        &NewRegulation {
            rin,
            title,
            agency_id: agency.id,
            description,
        },
    )?;
    let regulation = db::find_regulation_by_rin(conn, rin)?.ok_or_else(|| Error::NotFound {
        entity: "regulation",
        key: rin.to_string(),
    })?;

    if created {
        debug!(regulation_id = regulation.id, rin, "created regulation");
        db::insert_event(
            conn,
            &Event::new(
                "regulation_created",
                "regulation",
                &regulation.id.to_string(),
                serde_json::json!({ "rin": rin, "title": title, "agency_id": agency.id }),
                SYNC_ACTOR,
            ),
        )?;
    }

    Ok(Resolved { entity: regulation, created })
}

// ============================================================================
// TESTS
// ============================================================================
