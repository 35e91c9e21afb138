// 🔄 Synchronization Engine - one batch from the Federal Register per run
//
// fetch → per document: resolve agency → resolve regulation → classify →
// dedup → write stage + document. Each document gets its own transaction,
// so a failure rolls back only that document and the batch keeps going.
// A failed fetch is not an error for the caller: the run just reports
// zero processed documents and the next scheduled run tries again.

use crate::classifier::classify;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::db::{self, Event};
use crate::deduplication::{already_recorded, DedupKey};
use crate::error::Result;
use crate::fetch::{DocumentSource, FederalRegisterDocument, SearchQuery, SOURCE_TAG};
use crate::models::NewStage;
use crate::resolver::{resolve_agency, resolve_regulation, SYNC_ACTOR};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// SYNC REPORT
// ============================================================================

/// Outcome of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// New stage/document pairs written
    pub processed_count: usize,

    /// Documents without a RIN (not trackable, silently skipped)
    pub skipped_missing_rin: usize,

    /// Documents whose stage was recorded by an earlier run
    pub already_recorded: usize,

    /// Documents rolled back because storage rejected them
    pub failed: usize,

    /// Upstream records that could not be parsed and were dropped
    pub malformed: usize,

    /// True when the fetch itself failed and nothing was looked at
    pub fetch_failed: bool,
}

impl SyncReport {
    fn degraded() -> Self {
        SyncReport {
            fetch_failed: true,
            ..Default::default()
        }
    }

    /// Documents looked at in this run
    pub fn seen(&self) -> usize {
        self.processed_count
            + self.skipped_missing_rin
            + self.already_recorded
            + self.failed
            + self.malformed
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fetch_failed {
            write!(f, "No results found or API error occurred.")
        } else {
            write!(f, "Sync completed. Processed {} new documents.", self.processed_count)
        }
    }
}

/// What happened to a single upstream document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentOutcome {
    Recorded,
    MissingRin,
    AlreadyRecorded,
}

// ============================================================================
// SYNC ENGINE
// ============================================================================

/// Drives one sync run against an explicit storage handle.
///
/// No locking is done here; callers must not run two syncs against the same
/// database at once.
pub struct SyncEngine<'c, S> {
    source: S,
    conn: &'c mut Connection,
    batch_size: u32,
}

impl<'c, S: DocumentSource> SyncEngine<'c, S> {
    pub fn new(source: S, conn: &'c mut Connection) -> Self {
        SyncEngine {
            source,
            conn,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Fetch one batch and record every new stage in it.
    ///
    /// Never fails: fetch errors degrade to an empty report and per-document
    /// errors are counted in `failed`.
    #[instrument(name = "sync", skip(self), fields(batch_size = self.batch_size))]
    pub fn sync(&mut self) -> SyncReport {
        let query = SearchQuery::for_sync(self.batch_size);

        let batch = match self.source.search(&query) {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), "fetch failed, nothing synchronized");
                return SyncReport::degraded();
            }
        };

        let mut report = SyncReport {
            malformed: batch.malformed,
            ..Default::default()
        };

        for doc in &batch.results {
            match self.process_document(doc) {
                Ok(DocumentOutcome::Recorded) => report.processed_count += 1,
                Ok(DocumentOutcome::MissingRin) => report.skipped_missing_rin += 1,
                Ok(DocumentOutcome::AlreadyRecorded) => report.already_recorded += 1,
                Err(e) => {
                    warn!(
                        document = doc.document_number.as_deref().unwrap_or("<none>"),
                        rin = doc.rin().unwrap_or("<none>"),
                        constraint = e.is_constraint_violation(),
                        error = %e,
                        "document rolled back"
                    );
                    report.failed += 1;
                }
            }
        }

        if let Err(e) = self.record_run(&report) {
            warn!(error = %e, "could not write sync run to audit trail");
        }

        info!(
            processed = report.processed_count,
            skipped_missing_rin = report.skipped_missing_rin,
            already_recorded = report.already_recorded,
            failed = report.failed,
            malformed = report.malformed,
            "sync finished"
        );

        report
    }

    fn process_document(&mut self, doc: &FederalRegisterDocument) -> Result<DocumentOutcome> {
        // Not a trackable regulation; don't touch storage at all
        let Some(rin) = doc.rin() else {
            return Ok(DocumentOutcome::MissingRin);
        };

        let tx = self.conn.transaction()?;
        let outcome = record_document(&tx, doc, rin)?;
        tx.commit()?;

        Ok(outcome)
    }

    fn record_run(&self, report: &SyncReport) -> Result<()> {
        let run_id = uuid::Uuid::new_v4().to_string();
        db::insert_event(
            &*self.conn,
            &Event::new(
                "sync_completed",
                "sync_run",
                &run_id,
                serde_json::to_value(report)?,
                SYNC_ACTOR,
            ),
        )
    }
}

/// Resolve, dedup and write one document inside an open transaction
fn record_document(
    tx: &Transaction,
    doc: &FederalRegisterDocument,
    rin: &str,
) -> Result<DocumentOutcome> {
    let agency_ref = doc.primary_agency();
    let agency = resolve_agency(
        tx,
        agency_ref.name.as_deref().unwrap_or(""),
        agency_ref.acronym.as_deref(),
        agency_ref.slug.as_deref(),
    )?
    .into_inner();

    let regulation = resolve_regulation(
        tx,
        Some(rin),
        doc.title.as_deref().unwrap_or(""),
        &agency,
        doc.abstract_text.as_deref(),
    )?
    .into_inner();

    let kind = classify(doc.type_label());

    let publication_date = doc.parsed_publication_date();
    if publication_date.is_none() {
        if let Some(raw) = doc.publication_date.as_deref() {
            warn!(rin, raw, "unparseable publication date, storing stage without one");
        }
    }

    let federal_register_id = doc.document_number.as_deref();
    if already_recorded(tx, &regulation, federal_register_id)? {
        debug!(key = %DedupKey::new(&regulation, federal_register_id), "stage already recorded");
        return Ok(DocumentOutcome::AlreadyRecorded);
    }

    let new_stage = NewStage {
        kind,
        publication_date,
        federal_register_id: federal_register_id.map(str::to_string),
        url: doc.html_url.clone(),
    };
    let (stage, _document) = db::insert_stage_with_document(tx, regulation.id, &new_stage, SOURCE_TAG)?;

    db::insert_event(
        tx,
        &Event::new(
            "stage_recorded",
            "regulation",
            &regulation.id.to_string(),
            serde_json::json!({
                "stage_id": stage.id,
                "stage_type": stage.stage_type,
                "federal_register_id": stage.federal_register_id,
            }),
            SYNC_ACTOR,
        ),
    )?;

    debug!(rin, stage = %kind, "recorded stage");
    Ok(DocumentOutcome::Recorded)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        documents_for_regulation, entity_counts, find_regulation_by_rin, get_events_for_entity,
        setup_database, stages_for_regulation,
    };
    use crate::error::Error;
    use crate::fetch::{AgencyRef, SearchResults};
    use std::cell::RefCell;

    /// Returns the same batch on every call and remembers the queries it saw
    struct StaticSource {
        batch: Vec<FederalRegisterDocument>,
        queries: RefCell<Vec<SearchQuery>>,
    }

    impl StaticSource {
        fn new(batch: Vec<FederalRegisterDocument>) -> Self {
            StaticSource {
                batch,
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl DocumentSource for StaticSource {
        fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
            self.queries.borrow_mut().push(query.clone());
            Ok(SearchResults {
                count: self.batch.len() as u64,
                results: self.batch.clone(),
                malformed: 0,
            })
        }
    }

    struct FailingSource;

    impl DocumentSource for FailingSource {
        fn search(&self, _query: &SearchQuery) -> Result<SearchResults> {
            Err(Error::UpstreamStatus { status: 503 })
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn doc(number: &str, rin: Option<&str>, doc_type: &str, date: &str, agency: &str) -> FederalRegisterDocument {
        FederalRegisterDocument {
            document_number: Some(number.to_string()),
            rin: rin.map(str::to_string),
            title: Some(format!("Rule {}", number)),
            abstract_text: Some("Summary".to_string()),
            publication_date: Some(date.to_string()),
            agencies: vec![AgencyRef {
                name: Some(agency.to_string()),
                acronym: None,
                slug: None,
            }],
            html_url: Some(format!("https://www.federalregister.gov/d/{}", number)),
            doc_type: Some(doc_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_sync_requests_one_rulemaking_batch() {
        let mut conn = setup();
        let source = StaticSource::new(vec![]);

        let report = SyncEngine::new(&source, &mut conn).sync();

        assert_eq!(report, SyncReport::default());
        let queries = source.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].per_page, 50);
        assert_eq!(queries[0].document_types, vec!["RULE", "PRORULE", "PROPOSED RULE"]);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let mut conn = setup();
        let source = StaticSource::new(vec![
            doc("2024-00001", Some("1111-AA01"), "PRORULE", "2024-01-01", "Agency One"),
            doc("2024-00002", Some("1111-AA01"), "RULE", "2024-06-01", "Agency One"),
            doc("2024-00003", Some("2222-BB02"), "PROPOSED RULE", "2024-02-02", "Agency Two"),
        ]);

        let first = SyncEngine::new(&source, &mut conn).sync();
        let second = SyncEngine::new(&source, &mut conn).sync();

        assert_eq!(first.processed_count, 3);
        assert_eq!(second.processed_count, 0);
        assert_eq!(second.already_recorded, 3);

        let counts = entity_counts(&conn).unwrap();
        assert_eq!(counts.agencies, 2);
        assert_eq!(counts.regulations, 2);
        assert_eq!(counts.rule_stages, 3);
        assert_eq!(counts.documents, 3);
    }

    #[test]
    fn test_missing_rin_skipped() {
        let mut conn = setup();
        let source = StaticSource::new(vec![
            doc("2024-00001", None, "RULE", "2024-01-01", "Orphan Agency"),
            doc("2024-00002", Some("1111-AA01"), "RULE", "2024-01-02", "Agency One"),
            doc("2024-00003", Some("2222-BB02"), "PRORULE", "2024-01-03", "Agency Two"),
        ]);

        let report = SyncEngine::new(&source, &mut conn).sync();

        assert_eq!(report.processed_count, 2);
        assert_eq!(report.skipped_missing_rin, 1);
        assert!(db::find_agency_by_name(&conn, "Orphan Agency").unwrap().is_none());
        assert_eq!(entity_counts(&conn).unwrap().agencies, 2);
    }

    #[test]
    fn test_fetch_failure_degrades() {
        let mut conn = setup();

        let report = SyncEngine::new(FailingSource, &mut conn).sync();

        assert_eq!(report.processed_count, 0);
        assert!(report.fetch_failed);
        assert_eq!(report.to_string(), "No results found or API error occurred.");
        assert_eq!(entity_counts(&conn).unwrap(), db::EntityCounts::default());
    }

    #[test]
    fn test_stage_fields_and_paired_document() {
        let mut conn = setup();
        let source = StaticSource::new(vec![doc("2024-00009", Some("3333-CC03"), "NOTICE", "2024-07-04", "Agency")]);

        SyncEngine::new(&source, &mut conn).sync();

        let regulation = find_regulation_by_rin(&conn, "3333-CC03").unwrap().unwrap();
        assert_eq!(regulation.title, "Rule 2024-00009");
        assert_eq!(regulation.description.as_deref(), Some("Summary"));

        let stages = stages_for_regulation(&conn, regulation.id).unwrap();
        let documents = documents_for_regulation(&conn, regulation.id).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].stage_type, "ANPRM");
        assert_eq!(stages[0].federal_register_id.as_deref(), Some("2024-00009"));
        assert_eq!(documents[0].title, "ANPRM Document");
        assert_eq!(documents[0].rule_stage_id, Some(stages[0].id));
        assert_eq!(documents[0].url.as_deref(), Some("https://www.federalregister.gov/d/2024-00009"));
        assert_eq!(documents[0].source, "federalregister.gov");
    }

    #[test]
    fn test_bad_date_and_no_agencies_degrade_fields() {
        let mut conn = setup();
        let mut odd = doc("2024-00010", Some("4444-DD04"), "RULE", "04/07/2024", "ignored");
        odd.agencies = Vec::new();
        let source = StaticSource::new(vec![odd]);

        let report = SyncEngine::new(&source, &mut conn).sync();

        assert_eq!(report.processed_count, 1);
        let regulation = find_regulation_by_rin(&conn, "4444-DD04").unwrap().unwrap();
        let stages = stages_for_regulation(&conn, regulation.id).unwrap();
        assert_eq!(stages[0].publication_date, None);
        assert_eq!(stages[0].stage_type, "Final");

        let agency = db::get_agency(&conn, regulation.agency_id.unwrap()).unwrap().unwrap();
        assert_eq!(agency.name, "");
    }

    #[test]
    fn test_duplicate_within_batch_recorded_once() {
        let mut conn = setup();
        let source = StaticSource::new(vec![
            doc("2024-00001", Some("1111-AA01"), "RULE", "2024-01-01", "Agency"),
            doc("2024-00001", Some("1111-AA01"), "RULE", "2024-01-01", "Agency"),
        ]);

        let report = SyncEngine::new(&source, &mut conn).sync();

        assert_eq!(report.processed_count, 1);
        assert_eq!(report.already_recorded, 1);
        assert_eq!(report.seen(), 2);
    }

    #[test]
    fn test_storage_failure_rolls_back_only_that_document() {
        let mut conn = setup();
        conn.execute_batch(
            "CREATE TRIGGER reject_document BEFORE INSERT ON documents
             WHEN NEW.url LIKE '%/2024-00002'
             BEGIN SELECT RAISE(ABORT, 'document rejected'); END;",
        )
        .unwrap();
        let source = StaticSource::new(vec![
            doc("2024-00001", Some("1111-AA01"), "RULE", "2024-01-01", "Agency One"),
            doc("2024-00002", Some("9999-ZZ99"), "PRORULE", "2024-01-02", "Rejected Agency"),
            doc("2024-00003", Some("2222-BB02"), "RULE", "2024-01-03", "Agency Two"),
        ]);

        let report = SyncEngine::new(&source, &mut conn).sync();

        assert_eq!(report.processed_count, 2);
        assert_eq!(report.failed, 1);
        assert!(db::find_agency_by_name(&conn, "Rejected Agency").unwrap().is_none());
        assert!(find_regulation_by_rin(&conn, "9999-ZZ99").unwrap().is_none());

        let counts = entity_counts(&conn).unwrap();
        assert_eq!(counts.agencies, 2);
        assert_eq!(counts.regulations, 2);
        assert_eq!(counts.rule_stages, 2);
        assert_eq!(counts.documents, 2);

        let orphan_events: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM events WHERE data LIKE '%9999-ZZ99%' OR data LIKE '%Rejected Agency%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphan_events, 0);
    }

    #[test]
    fn test_malformed_records_counted_and_rest_recorded() {
        struct JsonSource(&'static str);

        impl DocumentSource for JsonSource {
            fn search(&self, _query: &SearchQuery) -> Result<SearchResults> {
                Ok(serde_json::from_str(self.0)?)
            }
        }

        let mut conn = setup();
        let source = JsonSource(
            r#"{"count": 3, "results": [
                {"document_number": "2024-00001", "rin": "1111-AA01", "type": "RULE",
                 "agencies": [{"name": "Agency One"}]},
                {"document_number": "2024-00002", "rin": "2222-BB02", "type": "RULE",
                 "agencies": ["Agency Two"]},
                {"document_number": "2024-00003", "rin": "3333-CC03", "type": "PRORULE",
                 "publication_date": 20240103}
            ]}"#,
        );

        let report = SyncEngine::new(&source, &mut conn).sync();

        assert!(!report.fetch_failed);
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.malformed, 2);
        assert_eq!(report.seen(), 3);
        assert!(find_regulation_by_rin(&conn, "1111-AA01").unwrap().is_some());
    }

    #[test]
    fn test_run_is_audited() {
        let mut conn = setup();
        let source = StaticSource::new(vec![doc("2024-00001", Some("1111-AA01"), "RULE", "2024-01-01", "Agency")]);

        SyncEngine::new(&source, &mut conn).sync();

        let regulation = find_regulation_by_rin(&conn, "1111-AA01").unwrap().unwrap();
        let events = get_events_for_entity(&conn, "regulation", &regulation.id.to_string()).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(types.contains(&"regulation_created"));
        assert!(types.contains(&"stage_recorded"));

        let runs: i64 = conn
            .query_row("SELECT COUNT(*) FROM events WHERE entity_type = 'sync_run'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(runs, 1);
    }

    #[test]
    fn test_report_message() {
        let report = SyncReport {
            processed_count: 7,
            ..Default::default()
        };
        assert_eq!(report.to_string(), "Sync completed. Processed 7 new documents.");
    }
}
