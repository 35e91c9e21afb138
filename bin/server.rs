// Regulation Tracker - Web Server
// REST API over the tracked rulemaking data, plus on-demand sync

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use regtrack::{
    list_agencies, list_committees, list_regulations, logging, open_database,
    regulation_detail, search_documents, seed_known_committees, Agency, Committee, Config,
    Error, FederalRegisterClient, RegulationDetail, RegulationFilter, RegulationSummary,
    SearchForm, SearchPage, StageKind, SyncEngine, SyncReport,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<Config>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Handler failure rendered as an `ApiResponse` with a status code
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { .. } => Self {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            other => {
                error!("request failed: {}", other);
                Self::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Query string of GET /api/regulations
#[derive(Debug, Default, Deserialize)]
struct RegulationQuery {
    agency: Option<i64>,
    committee: Option<i64>,
    stage: Option<String>,
    q: Option<String>,
    /// 1-based
    page: Option<u32>,
}

fn parse_stage(raw: Option<&str>) -> Result<Option<StageKind>, ApiError> {
    match raw.filter(|s| !s.is_empty()) {
        Some(raw) => Ok(Some(raw.parse::<StageKind>().map_err(ApiError::bad_request)?)),
        None => Ok(None),
    }
}

impl RegulationQuery {
    fn into_filter(self, per_page: u32) -> Result<RegulationFilter, ApiError> {
        let stage = parse_stage(self.stage.as_deref())?;
        let page = self.page.unwrap_or(1).max(1);

        Ok(RegulationFilter {
            agency_id: self.agency,
            committee_id: self.committee,
            stage,
            term: self.q,
            limit: Some(per_page),
            offset: (page - 1).saturating_mul(per_page),
        })
    }
}

/// Query string of GET /api/search
#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    agency: Option<String>,
    committee: Option<String>,
    stage: Option<String>,
    /// Days back from today
    date: Option<i64>,
    page: Option<u32>,
}

impl SearchParams {
    fn into_form(self) -> Result<SearchForm, ApiError> {
        Ok(SearchForm {
            stage: parse_stage(self.stage.as_deref())?,
            term: self.q,
            agency: self.agency,
            committee: self.committee,
            days: self.date,
            page: self.page,
        })
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/agencies
async fn get_agencies(State(state): State<AppState>) -> ApiResult<Vec<Agency>> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(list_agencies(&conn)?)))
}

/// GET /api/committees
async fn get_committees(State(state): State<AppState>) -> ApiResult<Vec<Committee>> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(list_committees(&conn)?)))
}

/// GET /api/regulations - Filtered, paginated listing
async fn get_regulations(
    State(state): State<AppState>,
    Query(query): Query<RegulationQuery>,
) -> ApiResult<Vec<RegulationSummary>> {
    let filter = query.into_filter(state.config.items_per_page)?;
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(list_regulations(&conn, &filter)?)))
}

/// GET /api/regulations/:id - Regulation with stages, documents and committees
async fn get_regulation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<RegulationDetail> {
    let conn = state.conn()?;
    Ok(Json(ApiResponse::ok(regulation_detail(&conn, id)?)))
}

/// GET /api/search - Live Federal Register search, nothing is stored
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<SearchPage> {
    let form = params.into_form()?;
    let config = state.config.clone();

    let page = tokio::task::spawn_blocking(move || -> Result<SearchPage, ApiError> {
        let client = FederalRegisterClient::from_config(&config)?;
        let today = chrono::Local::now().date_naive();
        Ok(search_documents(&client, &form, today, config.items_per_page)?)
    })
    .await
    .map_err(|e| ApiError::internal(format!("search task failed: {e}")))??;

    Ok(Json(ApiResponse::ok(page)))
}

/// POST /api/sync - Run one sync batch now
async fn run_sync(State(state): State<AppState>) -> ApiResult<SyncReport> {
    // Blocking HTTP client and SQLite both stay off the async workers
    let report = tokio::task::spawn_blocking(move || -> Result<SyncReport, ApiError> {
        let client = FederalRegisterClient::from_config(&state.config)?;
        let mut conn = state.conn()?;
        let report = SyncEngine::new(client, &mut conn)
            .with_batch_size(state.config.batch_size)
            .sync();
        Ok(report)
    })
    .await
    .map_err(|e| ApiError::internal(format!("sync task failed: {e}")))??;

    info!(processed = report.processed_count, "on-demand sync finished");
    Ok(Json(ApiResponse::ok(report)))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = logging::init() {
        eprintln!("warning: logging not initialized: {e}");
    }

    let config = Config::from_env()?;
    let conn = open_database(&config.database_path)?;
    seed_known_committees(&conn)?;
    info!(path = %config.database_path.display(), "database opened");

    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        config: Arc::new(config),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/agencies", get(get_agencies))
        .route("/committees", get(get_committees))
        .route("/regulations", get(get_regulations))
        .route("/regulations/:id", get(get_regulation))
        .route("/search", get(search))
        .route("/sync", post(run_sync))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("server running on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
