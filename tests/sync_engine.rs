// End-to-end sync runs through the public API, fed by upstream-shaped JSON

use pretty_assertions::assert_eq;
use regtrack::db::{documents_for_regulation, find_regulation_by_rin, stages_for_regulation};
use regtrack::{
    entity_counts, list_committees, list_regulations, regulation_detail, seed_known_committees,
    setup_database, DocumentSource, Error, RegulationFilter, Result, SearchQuery, SearchResults,
    StageKind, SyncEngine, SyncReport,
};
use rusqlite::Connection;
use serde_json::json;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Serves one prepared response per call, then empty pages
struct ScriptedSource {
    pages: RefCell<VecDeque<Result<SearchResults>>>,
}

impl ScriptedSource {
    fn new(pages: Vec<Result<SearchResults>>) -> Self {
        ScriptedSource {
            pages: RefCell::new(pages.into()),
        }
    }
}

impl DocumentSource for ScriptedSource {
    fn search(&self, _query: &SearchQuery) -> Result<SearchResults> {
        self.pages
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(SearchResults::default()))
    }
}

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    setup_database(&conn).unwrap();
    seed_known_committees(&conn).unwrap();
    conn
}

fn page(results: serde_json::Value) -> Result<SearchResults> {
    let count = results.as_array().map(|r| r.len()).unwrap_or(0);
    Ok(serde_json::from_value(json!({ "count": count, "results": results })).unwrap())
}

fn dot_proposal() -> serde_json::Value {
    json!({
        "document_number": "2024-10001",
        "regulation_id_numbers": ["2127-AM00"],
        "title": "Automatic Emergency Braking",
        "abstract": "Requires AEB on light vehicles.",
        "publication_date": "2024-03-01",
        "agencies": [{
            "name": "Transportation Department",
            "acronym": "DOT",
            "slug": "transportation-department"
        }],
        "html_url": "https://www.federalregister.gov/d/2024-10001",
        "type": "PRORULE"
    })
}

fn dot_final() -> serde_json::Value {
    json!({
        "document_number": "2024-20002",
        "regulation_id_numbers": ["2127-AM00"],
        "title": "Automatic Emergency Braking (final)",
        "publication_date": "2024-09-15",
        "agencies": [{
            "name": "Transportation Department",
            "acronym": "DOT",
            "slug": "transportation-department"
        }],
        "html_url": "https://www.federalregister.gov/d/2024-20002",
        "type": "RULE"
    })
}

fn notice_without_rin() -> serde_json::Value {
    json!({
        "document_number": "2024-30003",
        "regulation_id_numbers": [],
        "title": "Sunshine Act Meeting",
        "publication_date": "2024-04-02",
        "agencies": [{ "name": "Federal Trade Commission", "slug": "federal-trade-commission" }],
        "type": "NOTICE"
    })
}

#[test]
fn test_repeated_sync_is_idempotent() {
    let mut conn = setup();
    let source = ScriptedSource::new(vec![
        page(json!([dot_proposal(), notice_without_rin()])),
        page(json!([dot_proposal(), notice_without_rin()])),
    ]);

    let first = SyncEngine::new(&source, &mut conn).sync();
    let after_first = entity_counts(&conn).unwrap();
    let second = SyncEngine::new(&source, &mut conn).sync();
    let after_second = entity_counts(&conn).unwrap();

    assert_eq!(first.processed_count, 1);
    assert_eq!(first.skipped_missing_rin, 1);
    assert_eq!(second.processed_count, 0);
    assert_eq!(second.already_recorded, 1);
    assert_eq!(after_first, after_second);
    assert_eq!(after_second.regulations, 1);
    assert_eq!(after_second.rule_stages, 1);
    assert_eq!(after_second.documents, 1);
}

#[test]
fn test_progression_updates_current_stage() {
    let mut conn = setup();
    let source = ScriptedSource::new(vec![page(json!([dot_proposal()])), page(json!([dot_final()]))]);

    SyncEngine::new(&source, &mut conn).sync();
    let regulation = find_regulation_by_rin(&conn, "2127-AM00").unwrap().unwrap();
    let before = regulation_detail(&conn, regulation.id).unwrap();
    assert_eq!(before.current_stage.and_then(|s| s.kind()), Some(StageKind::Nprm));

    let report = SyncEngine::new(&source, &mut conn).sync();
    assert_eq!(report.to_string(), "Sync completed. Processed 1 new documents.");

    let after = regulation_detail(&conn, regulation.id).unwrap();
    assert_eq!(after.current_stage.and_then(|s| s.kind()), Some(StageKind::Final));
    assert_eq!(after.stages.len(), 2);
    // Regulation keeps the title it was created with
    assert_eq!(after.regulation.title, "Automatic Emergency Braking");
    assert_eq!(after.regulation.description.as_deref(), Some("Requires AEB on light vehicles."));
}

#[test]
fn test_every_stage_has_exactly_one_document() {
    let mut conn = setup();
    let source = ScriptedSource::new(vec![page(json!([dot_proposal(), dot_final()]))]);

    SyncEngine::new(&source, &mut conn).sync();

    let regulation = find_regulation_by_rin(&conn, "2127-AM00").unwrap().unwrap();
    let stages = stages_for_regulation(&conn, regulation.id).unwrap();
    let documents = documents_for_regulation(&conn, regulation.id).unwrap();

    assert_eq!(stages.len(), 2);
    assert_eq!(documents.len(), 2);
    for stage in &stages {
        let paired: Vec<_> = documents
            .iter()
            .filter(|d| d.rule_stage_id == Some(stage.id))
            .collect();
        assert_eq!(paired.len(), 1);
        assert_eq!(paired[0].document_type, stage.stage_type);
        assert_eq!(paired[0].source, "federalregister.gov");
    }
}

#[test]
fn test_agency_linked_to_committee_and_filterable() {
    let mut conn = setup();
    let source = ScriptedSource::new(vec![page(json!([dot_proposal()]))]);

    SyncEngine::new(&source, &mut conn).sync();

    let transportation = list_committees(&conn)
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Transportation & Infrastructure")
        .unwrap();
    let agriculture = list_committees(&conn)
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Agriculture")
        .unwrap();

    let by_committee = |committee_id| {
        list_regulations(
            &conn,
            &RegulationFilter {
                committee_id: Some(committee_id),
                ..Default::default()
            },
        )
        .unwrap()
    };

    assert_eq!(by_committee(transportation.id).len(), 1);
    assert!(by_committee(agriculture.id).is_empty());

    let nprm = list_regulations(
        &conn,
        &RegulationFilter {
            stage: Some(StageKind::Nprm),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(nprm.len(), 1);
    assert_eq!(nprm[0].agency_name.as_deref(), Some("Transportation Department"));
}

#[test]
fn test_fetch_failure_leaves_storage_untouched() {
    let mut conn = setup();
    let source = ScriptedSource::new(vec![Err(Error::UpstreamStatus { status: 502 })]);

    let report = SyncEngine::new(&source, &mut conn).sync();

    assert!(report.fetch_failed);
    assert_eq!(report.processed_count, 0);
    assert_eq!(report.to_string(), "No results found or API error occurred.");
    assert_eq!(entity_counts(&conn).unwrap().regulations, 0);
}

#[test]
fn test_empty_batch_reports_nothing_processed() {
    let mut conn = setup();
    let source = ScriptedSource::new(vec![page(json!([]))]);

    let report = SyncEngine::new(&source, &mut conn).sync();

    assert_eq!(report, SyncReport::default());
    assert_eq!(report.to_string(), "Sync completed. Processed 0 new documents.");
}
