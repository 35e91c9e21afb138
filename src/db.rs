use crate::error::{Error, Result};
use crate::models::{
    current_stage, Agency, Committee, Document, NewStage, Regulation, RuleStage, StageKind,
    KNOWN_COMMITTEES,
};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Event for audit trail - every entity the sync creates leaves one behind
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// Fields of a regulation about to be created
#[derive(Debug, Clone, PartialEq)]
pub struct NewRegulation<'a> {
    pub rin: &'a str,
    pub title: &'a str,
    pub agency_id: i64,
    pub description: Option<&'a str>,
}

/// Row counts per entity table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub agencies: i64,
    pub regulations: i64,
    pub rule_stages: i64,
    pub documents: i64,
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Agencies & committees
    // ==========================================================================
    // name is the natural key used by the resolver; the UNIQUE index backs
    // insert-if-absent so two runs can't both create the same agency.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS agencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            abbreviation TEXT,
            slug TEXT,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS committees (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS agency_committees (
            agency_id INTEGER NOT NULL REFERENCES agencies(id),
            committee_id INTEGER NOT NULL REFERENCES committees(id),
            PRIMARY KEY (agency_id, committee_id)
        );",
    )?;

    // ==========================================================================
    // Regulations, stages, documents
    // ==========================================================================
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS regulations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            rin TEXT NOT NULL UNIQUE,
            agency_id INTEGER REFERENCES agencies(id),
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rule_stages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            regulation_id INTEGER NOT NULL REFERENCES regulations(id),
            stage_type TEXT NOT NULL,
            publication_date TEXT,
            federal_register_id TEXT,
            comment_end_date TEXT,
            UNIQUE (regulation_id, federal_register_id)
        );

        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            regulation_id INTEGER NOT NULL REFERENCES regulations(id),
            rule_stage_id INTEGER UNIQUE REFERENCES rule_stages(id),
            title TEXT NOT NULL,
            document_type TEXT,
            url TEXT,
            publication_date TEXT,
            source TEXT NOT NULL
        );",
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_regulations_agency ON regulations(agency_id);
         CREATE INDEX IF NOT EXISTS idx_stages_regulation ON rule_stages(regulation_id);
         CREATE INDEX IF NOT EXISTS idx_documents_regulation ON documents(regulation_id);
         CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);
         CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);",
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const AGENCY_COLUMNS: &str = "id, name, abbreviation, slug, description";
const REGULATION_COLUMNS: &str = "id, title, rin, agency_id, description, created_at";
const STAGE_COLUMNS: &str =
    "id, regulation_id, stage_type, publication_date, federal_register_id, comment_end_date";
const DOCUMENT_COLUMNS: &str =
    "id, regulation_id, rule_stage_id, title, document_type, url, publication_date, source";

fn agency_from_row(row: &Row) -> rusqlite::Result<Agency> {
    Ok(Agency {
        id: row.get(0)?,
        name: row.get(1)?,
        abbreviation: row.get(2)?,
        slug: row.get(3)?,
        description: row.get(4)?,
    })
}

fn regulation_from_row(row: &Row) -> rusqlite::Result<Regulation> {
    Ok(Regulation {
        id: row.get(0)?,
        title: row.get(1)?,
        rin: row.get(2)?,
        agency_id: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn stage_from_row(row: &Row) -> rusqlite::Result<RuleStage> {
    Ok(RuleStage {
        id: row.get(0)?,
        regulation_id: row.get(1)?,
        stage_type: row.get(2)?,
        publication_date: row.get(3)?,
        federal_register_id: row.get(4)?,
        comment_end_date: row.get(5)?,
    })
}

fn document_from_row(row: &Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        regulation_id: row.get(1)?,
        rule_stage_id: row.get(2)?,
        title: row.get(3)?,
        document_type: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        url: row.get(5)?,
        publication_date: row.get(6)?,
        source: row.get(7)?,
    })
}

fn committee_from_row(row: &Row) -> rusqlite::Result<Committee> {
    Ok(Committee {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

// ============================================================================
// AGENCIES
// ============================================================================

/// Exact, case-sensitive name match
pub fn find_agency_by_name(conn: &Connection, name: &str) -> Result<Option<Agency>> {
    let agency = conn
        .query_row(
            &format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE name = ?1"),
            params![name],
            agency_from_row,
        )
        .optional()?;
    Ok(agency)
}

pub fn get_agency(conn: &Connection, id: i64) -> Result<Option<Agency>> {
    let agency = conn
        .query_row(
            &format!("SELECT {AGENCY_COLUMNS} FROM agencies WHERE id = ?1"),
            params![id],
            agency_from_row,
        )
        .optional()?;
    Ok(agency)
}

/// Insert an agency unless one with that name exists. Returns true if a row was written.
pub fn insert_agency_if_absent(
    conn: &Connection,
    name: &str,
    abbreviation: Option<&str>,
    slug: Option<&str>,
) -> Result<bool> {
    let changed = conn.execute(
        "INSERT INTO agencies (name, abbreviation, slug) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO NOTHING",
        params![name, abbreviation, slug],
    )?;
    Ok(changed > 0)
}

pub fn list_agencies(conn: &Connection) -> Result<Vec<Agency>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {AGENCY_COLUMNS} FROM agencies ORDER BY name"
    ))?;
    let agencies = stmt
        .query_map([], agency_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(agencies)
}

// ============================================================================
// COMMITTEES
// ============================================================================

pub fn find_committee_by_name(conn: &Connection, name: &str) -> Result<Option<Committee>> {
    let committee = conn
        .query_row(
            "SELECT id, name, description FROM committees WHERE name = ?1",
            params![name],
            committee_from_row,
        )
        .optional()?;
    Ok(committee)
}

/// Find-or-create a committee by name
pub fn insert_committee(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<Committee> {
    conn.execute(
        "INSERT INTO committees (name, description) VALUES (?1, ?2)
         ON CONFLICT(name) DO NOTHING",
        params![name, description],
    )?;
    find_committee_by_name(conn, name)?.ok_or_else(|| Error::NotFound {
        entity: "committee",
        key: name.to_string(),
    })
}

pub fn link_agency_committee(conn: &Connection, agency_id: i64, committee_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO agency_committees (agency_id, committee_id) VALUES (?1, ?2)",
        params![agency_id, committee_id],
    )?;
    Ok(())
}

/// Create rows for the built-in committees. Returns how many were new.
pub fn seed_known_committees(conn: &Connection) -> Result<usize> {
    let mut created = 0;
    for committee in KNOWN_COMMITTEES.iter() {
        created += conn.execute(
            "INSERT INTO committees (name) VALUES (?1) ON CONFLICT(name) DO NOTHING",
            params![committee.display_name],
        )?;
    }
    Ok(created)
}

pub fn list_committees(conn: &Connection) -> Result<Vec<Committee>> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM committees ORDER BY name")?;
    let committees = stmt
        .query_map([], committee_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(committees)
}

pub fn committees_for_agency(conn: &Connection, agency_id: i64) -> Result<Vec<Committee>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.description
         FROM committees c
         JOIN agency_committees ac ON ac.committee_id = c.id
         WHERE ac.agency_id = ?1
         ORDER BY c.name",
    )?;
    let committees = stmt
        .query_map(params![agency_id], committee_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(committees)
}

// ============================================================================
// REGULATIONS
// ============================================================================

pub fn find_regulation_by_rin(conn: &Connection, rin: &str) -> Result<Option<Regulation>> {
    let regulation = conn
        .query_row(
            &format!("SELECT {REGULATION_COLUMNS} FROM regulations WHERE rin = ?1"),
            params![rin],
            regulation_from_row,
        )
        .optional()?;
    Ok(regulation)
}

pub fn get_regulation(conn: &Connection, id: i64) -> Result<Option<Regulation>> {
    let regulation = conn
        .query_row(
            &format!("SELECT {REGULATION_COLUMNS} FROM regulations WHERE id = ?1"),
            params![id],
            regulation_from_row,
        )
        .optional()?;
    Ok(regulation)
}

/// Insert a regulation unless its RIN is already stored. Existing rows are
/// left untouched. Returns true if a row was written.
pub fn insert_regulation_if_absent(conn: &Connection, new: &NewRegulation) -> Result<bool> {
    let now = Utc::now();
    let changed = conn.execute(
        "INSERT INTO regulations (title, rin, agency_id, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(rin) DO NOTHING",
        params![new.title, new.rin, new.agency_id, new.description, now],
    )?;
    Ok(changed > 0)
}

// ============================================================================
// STAGES & DOCUMENTS
// ============================================================================

/// Stage recorded for `regulation_id` under an upstream document number.
/// A missing document number matches a stage stored without one.
pub fn find_stage(
    conn: &Connection,
    regulation_id: i64,
    federal_register_id: Option<&str>,
) -> Result<Option<RuleStage>> {
    let stage = conn
        .query_row(
            &format!(
                "SELECT {STAGE_COLUMNS} FROM rule_stages
                 WHERE regulation_id = ?1 AND federal_register_id IS ?2
                 ORDER BY id LIMIT 1"
            ),
            params![regulation_id, federal_register_id],
            stage_from_row,
        )
        .optional()?;
    Ok(stage)
}

/// Write a stage and its paired document.
///
/// Takes a `Transaction` so the pair is committed or rolled back together.
pub fn insert_stage_with_document(
    tx: &Transaction,
    regulation_id: i64,
    stage: &NewStage,
    source: &str,
) -> Result<(RuleStage, Document)> {
    tx.execute(
        "INSERT INTO rule_stages (regulation_id, stage_type, publication_date, federal_register_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            regulation_id,
            stage.kind.as_str(),
            stage.publication_date,
            stage.federal_register_id,
        ],
    )?;
    let stage_id = tx.last_insert_rowid();

    let title = stage.document_title();
    tx.execute(
        "INSERT INTO documents (regulation_id, rule_stage_id, title, document_type, url, publication_date, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            regulation_id,
            stage_id,
            title,
            stage.kind.as_str(),
            stage.url,
            stage.publication_date,
            source,
        ],
    )?;
    let document_id = tx.last_insert_rowid();

    let rule_stage = RuleStage {
        id: stage_id,
        regulation_id,
        stage_type: stage.kind.as_str().to_string(),
        publication_date: stage.publication_date,
        federal_register_id: stage.federal_register_id.clone(),
        comment_end_date: None,
    };
    let document = Document {
        id: document_id,
        regulation_id,
        rule_stage_id: Some(stage_id),
        title,
        document_type: stage.kind.as_str().to_string(),
        url: stage.url.clone(),
        publication_date: stage.publication_date,
        source: source.to_string(),
    };

    Ok((rule_stage, document))
}

/// All stages of a regulation, newest publication first (undated last)
pub fn stages_for_regulation(conn: &Connection, regulation_id: i64) -> Result<Vec<RuleStage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STAGE_COLUMNS} FROM rule_stages
         WHERE regulation_id = ?1
         ORDER BY publication_date IS NULL, publication_date DESC, id"
    ))?;
    let stages = stmt
        .query_map(params![regulation_id], stage_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(stages)
}

pub fn documents_for_regulation(conn: &Connection, regulation_id: i64) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE regulation_id = ?1
         ORDER BY publication_date IS NULL, publication_date DESC, id"
    ))?;
    let documents = stmt
        .query_map(params![regulation_id], document_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(documents)
}

// ============================================================================
// READ SIDE (listing / filtering / detail)
// ============================================================================

/// Listing filters; all optional, combined with AND
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegulationFilter {
    pub agency_id: Option<i64>,
    pub committee_id: Option<i64>,

    /// Matched against the regulation's current stage
    pub stage: Option<StageKind>,

    /// Case-insensitive substring of title or RIN
    pub term: Option<String>,

    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: u32,
}

/// Listing row: a regulation, its agency and where it currently stands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegulationSummary {
    pub regulation: Regulation,
    pub agency_name: Option<String>,
    pub current_stage: Option<RuleStage>,
}

/// Everything the detail page shows for one regulation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegulationDetail {
    pub regulation: Regulation,
    pub agency: Option<Agency>,
    pub committees: Vec<Committee>,
    pub stages: Vec<RuleStage>,
    pub documents: Vec<Document>,
    pub current_stage: Option<RuleStage>,
}

pub fn list_regulations(conn: &Connection, filter: &RegulationFilter) -> Result<Vec<RegulationSummary>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(agency_id) = filter.agency_id {
        values.push(Value::Integer(agency_id));
        clauses.push(format!("r.agency_id = ?{}", values.len()));
    }
    if let Some(committee_id) = filter.committee_id {
        values.push(Value::Integer(committee_id));
        clauses.push(format!(
            "r.agency_id IN (SELECT agency_id FROM agency_committees WHERE committee_id = ?{})",
            values.len()
        ));
    }
    if let Some(term) = filter.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        values.push(Value::Text(format!("%{}%", escape_like(term))));
        clauses.push(format!(
            "(r.title LIKE ?{n} ESCAPE '\\' OR r.rin LIKE ?{n} ESCAPE '\\')",
            n = values.len()
        ));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT r.id, r.title, r.rin, r.agency_id, r.description, r.created_at, a.name
         FROM regulations r
         LEFT JOIN agencies a ON a.id = r.agency_id
         {where_sql}
         ORDER BY r.created_at DESC, r.id DESC"
    ))?;

    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok((regulation_from_row(row)?, row.get::<_, Option<String>>(6)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut summaries = Vec::new();
    for (regulation, agency_name) in rows {
        let stages = stages_for_regulation(conn, regulation.id)?;
        let current = current_stage(&stages).cloned();

        if let Some(wanted) = filter.stage {
            if current.as_ref().and_then(RuleStage::kind) != Some(wanted) {
                continue;
            }
        }

        summaries.push(RegulationSummary {
            regulation,
            agency_name,
            current_stage: current,
        });
    }

    let offset = filter.offset as usize;
    let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    Ok(summaries.into_iter().skip(offset).take(limit).collect())
}

/// Escape LIKE wildcards so a search term matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn regulation_detail(conn: &Connection, id: i64) -> Result<RegulationDetail> {
    let regulation = get_regulation(conn, id)?.ok_or_else(|| Error::NotFound {
        entity: "regulation",
        key: id.to_string(),
    })?;

    let (agency, committees) = match regulation.agency_id {
        Some(agency_id) => (
            get_agency(conn, agency_id)?,
            committees_for_agency(conn, agency_id)?,
        ),
        None => (None, Vec::new()),
    };

    let stages = stages_for_regulation(conn, id)?;
    let documents = documents_for_regulation(conn, id)?;
    let current = current_stage(&stages).cloned();

    Ok(RegulationDetail {
        regulation,
        agency,
        committees,
        stages,
        documents,
        current_stage: current,
    })
}

pub fn entity_counts(conn: &Connection) -> Result<EntityCounts> {
    let count = |table: &str| -> Result<i64> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n)
    };

    Ok(EntityCounts {
        agencies: count("agencies")?,
        regulations: count("regulations")?,
        rule_stages: count("rule_stages")?,
        documents: count("documents")?,
    })
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt
        .query_map(params![entity_type, entity_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut events = Vec::with_capacity(rows.len());
    for (event_id, timestamp, event_type, entity_type, entity_id, data, actor) in rows {
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
            })?;

        events.push(Event {
            event_id,
            timestamp,
            event_type,
            entity_type,
            entity_id,
            data: serde_json::from_str(&data)?,
            actor,
        });
    }

    Ok(events)
}

// ============================================================================
// TESTS
// ============================================================================
