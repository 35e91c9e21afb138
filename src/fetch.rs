// 🌐 Fetch Capability - Federal Register document search
//
// The engine only sees `DocumentSource`. Upstream JSON is parsed into
// `FederalRegisterDocument` at this boundary so nothing downstream pokes
// at untyped maps: every loosely-typed field is an explicit Option.

use crate::classifier::SYNC_DOCUMENT_TYPES;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{known_committee, StageKind};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Deserializer};
use std::time::Duration as StdDuration;
use tracing::{debug, instrument, warn};

/// Tag stored in `documents.source` for everything fetched here
pub const SOURCE_TAG: &str = "federalregister.gov";

/// Fields requested from the documents endpoint
pub const DEFAULT_FIELDS: [&str; 10] = [
    "title",
    "type",
    "document_number",
    "publication_date",
    "agencies",
    "rin",
    "regulation_id_numbers",
    "docket_ids",
    "abstract",
    "html_url",
];

const USER_AGENT: &str = concat!("regtrack/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// BOUNDARY RECORDS
// ============================================================================

/// Agency entry attached to an upstream document
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgencyRef {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub acronym: Option<String>,

    /// Upstream URL slug, e.g. "transportation-department"
    #[serde(default)]
    pub slug: Option<String>,
}

/// One document record as returned by the upstream search endpoint
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FederalRegisterDocument {
    /// Upstream document number ("2024-01234")
    #[serde(default)]
    pub document_number: Option<String>,

    #[serde(default)]
    pub rin: Option<String>,

    /// Newer API responses list RINs here instead of `rin`
    #[serde(default, deserialize_with = "null_as_default")]
    pub regulation_id_numbers: Vec<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,

    /// `YYYY-MM-DD`, but not guaranteed
    #[serde(default)]
    pub publication_date: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub agencies: Vec<AgencyRef>,

    #[serde(default)]
    pub html_url: Option<String>,

    /// Upstream type label ("RULE", "PRORULE", "Proposed Rule", ...)
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
}

impl FederalRegisterDocument {
    /// Non-blank RIN, preferring the scalar field over the list form
    pub fn rin(&self) -> Option<&str> {
        self.rin
            .as_deref()
            .into_iter()
            .chain(self.regulation_id_numbers.iter().map(String::as_str))
            .map(str::trim)
            .find(|rin| !rin.is_empty())
    }

    /// First listed agency; documents without agencies get an empty entry
    pub fn primary_agency(&self) -> AgencyRef {
        self.agencies.first().cloned().unwrap_or_default()
    }

    /// Publication date, None when absent or not a `YYYY-MM-DD` literal
    pub fn parsed_publication_date(&self) -> Option<NaiveDate> {
        self.publication_date
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
    }

    pub fn type_label(&self) -> &str {
        self.doc_type.as_deref().unwrap_or("")
    }
}

/// One page of search results
///
/// Records are parsed one by one; a record that does not fit
/// `FederalRegisterDocument` is dropped and counted in `malformed`
/// instead of failing the whole page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "RawSearchResults")]
pub struct SearchResults {
    /// Total matches upstream (across all pages)
    pub count: u64,

    pub results: Vec<FederalRegisterDocument>,

    /// Records on this page that could not be parsed
    pub malformed: usize,
}

#[derive(Deserialize)]
struct RawSearchResults {
    #[serde(default)]
    count: u64,

    #[serde(default, deserialize_with = "null_as_default")]
    results: Vec<serde_json::Value>,
}

impl From<RawSearchResults> for SearchResults {
    fn from(raw: RawSearchResults) -> Self {
        let mut page = SearchResults {
            count: raw.count,
            ..Default::default()
        };

        for record in raw.results {
            let document_number = record
                .get("document_number")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string);

            match serde_json::from_value::<FederalRegisterDocument>(record) {
                Ok(doc) => page.results.push(doc),
                Err(e) => {
                    warn!(
                        document = document_number.as_deref().unwrap_or("<none>"),
                        error = %e,
                        "skipping malformed upstream record"
                    );
                    page.malformed += 1;
                }
            }
        }

        page
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// SEARCH QUERY
// ============================================================================

/// Upstream query parameters, encoded with the `conditions[...]` convention
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub fields: Vec<String>,
    pub per_page: u32,
    pub page: Option<u32>,
    pub order: String,
    pub document_types: Vec<String>,
    pub agency_slugs: Vec<String>,
    pub term: Option<String>,
    pub published_since: Option<NaiveDate>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            per_page: 20,
            page: None,
            order: "newest".to_string(),
            document_types: Vec::new(),
            agency_slugs: Vec::new(),
            term: None,
            published_since: None,
        }
    }
}

impl SearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// The query a sync run issues: rulemaking types only, one batch
    pub fn for_sync(batch_size: u32) -> Self {
        SearchQuery {
            per_page: batch_size,
            document_types: SYNC_DOCUMENT_TYPES.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Restrict to the document types of one stage; None means all rule types
    pub fn with_stage(mut self, stage: Option<StageKind>) -> Self {
        self.document_types = match stage {
            None => vec!["RULE".to_string(), "PRORULE".to_string()],
            Some(StageKind::Nprm) => vec!["PRORULE".to_string()],
            Some(StageKind::Final) => vec!["RULE".to_string()],
            // Upstream has no ANPRM type code
            Some(StageKind::Anprm) => Vec::new(),
        };
        self
    }

    pub fn with_agency(mut self, slug: impl Into<String>) -> Self {
        self.agency_slugs = vec![slug.into()];
        self
    }

    /// Restrict to a committee's agencies. Unknown keys leave the query as is;
    /// a known committee replaces any agency set earlier.
    pub fn for_committee(mut self, key: &str) -> Self {
        if let Some(committee) = known_committee(key) {
            self.agency_slugs = committee.agency_slugs.iter().map(|s| s.to_string()).collect();
        }
        self
    }

    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.term = if term.trim().is_empty() { None } else { Some(term) };
        self
    }

    /// Only documents published in the last `days` days, counted from `today`
    pub fn published_within_days(mut self, days: i64, today: NaiveDate) -> Self {
        self.published_since = Some(today - Duration::days(days));
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Flatten into repeated key/value pairs for the query string
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();

        for field in &self.fields {
            pairs.push(("fields[]".to_string(), field.clone()));
        }
        pairs.push(("per_page".to_string(), self.per_page.to_string()));
        if let Some(page) = self.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        pairs.push(("order".to_string(), self.order.clone()));

        for doc_type in &self.document_types {
            pairs.push(("conditions[type][]".to_string(), doc_type.clone()));
        }
        for slug in &self.agency_slugs {
            pairs.push(("conditions[agencies][]".to_string(), slug.clone()));
        }
        if let Some(term) = &self.term {
            pairs.push(("conditions[term]".to_string(), term.clone()));
        }
        if let Some(since) = self.published_since {
            pairs.push((
                "conditions[publication_date][gte]".to_string(),
                since.format("%Y-%m-%d").to_string(),
            ));
        }

        pairs
    }
}

// ============================================================================
// DOCUMENT SOURCE
// ============================================================================

/// Anything that can answer a document search (HTTP client, fixtures, fakes)
pub trait DocumentSource {
    fn search(&self, query: &SearchQuery) -> Result<SearchResults>;
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        (**self).search(query)
    }
}

impl<T: DocumentSource + ?Sized> DocumentSource for Box<T> {
    fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        (**self).search(query)
    }
}

/// Blocking HTTP client for the Federal Register documents endpoint.
///
/// Must not be created or dropped on an async executor thread; the server
/// builds it inside `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct FederalRegisterClient {
    client: reqwest::blocking::Client,
    api_base: String,
}

impl FederalRegisterClient {
    pub fn new(api_base: impl Into<String>, timeout: StdDuration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(FederalRegisterClient {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_base.clone(), config.http_timeout)
    }

    fn documents_url(&self) -> String {
        format!("{}/documents.json", self.api_base)
    }
}

impl DocumentSource for FederalRegisterClient {
    #[instrument(level = "debug", skip(self, query), fields(per_page = query.per_page))]
    fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        let response = self
            .client
            .get(self.documents_url())
            .query(&query.to_query_pairs())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let results: SearchResults = response.json()?;
        debug!(
            returned = results.results.len(),
            malformed = results.malformed,
            total = results.count,
            "fetched document page"
        );

        Ok(results)
    }
}

// ============================================================================
// TESTS
// ============================================================================
