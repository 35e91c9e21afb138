// 🔎 Live Search - query the Federal Register directly, without storing anything
//
// Filters mirror the search form: keywords, agency, committee, stage and a
// "published in the last N days" window. Hits are flattened for display.

use crate::error::Result;
use crate::fetch::{DocumentSource, FederalRegisterDocument, SearchQuery};
use crate::models::{committee_for_agency_slug, StageKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Committee shown for agencies outside the built-in mapping
pub const UNKNOWN_COMMITTEE: &str = "Unknown";

/// Search filters; empty fields are ignored
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SearchForm {
    pub term: Option<String>,

    /// Upstream agency slug ("federal-trade-commission")
    pub agency: Option<String>,

    /// Built-in committee key ("commerce"); takes precedence over `agency`
    pub committee: Option<String>,

    pub stage: Option<StageKind>,

    /// Only documents published in the last N days
    pub days: Option<i64>,

    /// 1-based
    pub page: Option<u32>,
}

impl SearchForm {
    /// Build the upstream query for this form
    pub fn to_query(&self, today: NaiveDate, per_page: u32) -> SearchQuery {
        let mut query = SearchQuery::new()
            .with_stage(self.stage)
            .page(self.page.unwrap_or(1).max(1))
            .per_page(per_page);

        if let Some(agency) = self.agency.as_deref().filter(|a| !a.trim().is_empty()) {
            query = query.with_agency(agency.trim());
        }
        if let Some(committee) = self.committee.as_deref() {
            query = query.for_committee(committee);
        }
        if let Some(term) = &self.term {
            query = query.with_term(term.as_str());
        }
        if let Some(days) = self.days.filter(|d| *d > 0) {
            query = query.published_within_days(days, today);
        }

        query
    }
}

/// One search result, flattened for listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_number: String,
    pub title: String,
    pub agency: String,
    pub committee: String,
    pub stage: String,
    pub publication_date: String,
    pub abstract_text: String,
    pub html_url: String,
}

impl From<&FederalRegisterDocument> for SearchHit {
    fn from(doc: &FederalRegisterDocument) -> Self {
        let agency = doc.primary_agency();
        let committee = agency
            .slug
            .as_deref()
            .and_then(committee_for_agency_slug)
            .map(|c| c.display_name)
            .unwrap_or(UNKNOWN_COMMITTEE);

        SearchHit {
            document_number: doc.document_number.clone().unwrap_or_default(),
            title: doc.title.clone().unwrap_or_default(),
            agency: agency.name.unwrap_or_default(),
            committee: committee.to_string(),
            stage: stage_label(doc.type_label()).to_string(),
            publication_date: doc.publication_date.clone().unwrap_or_default(),
            abstract_text: doc.abstract_text.clone().unwrap_or_default(),
            html_url: doc.html_url.clone().unwrap_or_default(),
        }
    }
}

/// Display label for an upstream document type; unknown types pass through
pub fn stage_label(doc_type: &str) -> &str {
    match doc_type {
        "Proposed Rule" => StageKind::Nprm.display_name(),
        "Rule" => StageKind::Final.display_name(),
        other => other,
    }
}

/// One page of live results
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchPage {
    /// Total matches upstream
    pub count: u64,
    pub hits: Vec<SearchHit>,
}

/// Run a live search against the upstream source
pub fn search_documents<S: DocumentSource>(
    source: &S,
    form: &SearchForm,
    today: NaiveDate,
    per_page: u32,
) -> Result<SearchPage> {
    let query = form.to_query(today, per_page);
    let results = source.search(&query)?;
    debug!(count = results.count, returned = results.results.len(), "live search");

    Ok(SearchPage {
        count: results.count,
        hits: results.results.iter().map(SearchHit::from).collect(),
    })
}

// ============================================================================
// TESTS
// ============================================================================
