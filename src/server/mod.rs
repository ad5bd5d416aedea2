//! HTTP API over the store and search engine.
//!
//! Every endpoint is read-only and safe from any origin, so CORS is wide
//! open. Errors map onto status codes: 400 for missing/invalid parameters,
//! 404 for unknown projects/pages/languages, 500 for IO or decode failures.

pub mod watch;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::extract::Registry;
use crate::search;
use crate::store;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared across all handlers.
pub struct AppState {
    pub data_dir: PathBuf,
    pub index_data_dir: PathBuf,
}

/// Error wrapper for API handlers.
enum ApiError {
    MissingParam(&'static str),
    Core(Error),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MissingParam(name) => (
                StatusCode::BAD_REQUEST,
                format!("missing required parameter: {name}"),
            ),
            ApiError::Core(err) => {
                let status = match &err {
                    Error::NotFound(_) => StatusCode::NOT_FOUND,
                    Error::InvalidProjectName(_) => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string())
            }
        };
        (status, message).into_response()
    }
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/list", get(api_list))
        .route("/api/get", get(api_get))
        .route("/api/get-index", get(api_get_index))
        .route("/api/get-page", get(api_get_page))
        .route("/api/search", get(api_search))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(CompressionLayer::new())
}

/// Run the HTTP server on `addr` and the auto-index watcher beside it.
pub async fn serve(addr: &str, data_dir: PathBuf, registry: Arc<Registry>) -> anyhow::Result<()> {
    store::ensure_data_dir(&data_dir)?;

    let _watcher = match watch::spawn(data_dir.clone(), Arc::clone(&registry)) {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!("auto-index watcher disabled: {err}");
            None
        }
    };

    let state = Arc::new(AppState {
        index_data_dir: store::index_data_dir(&data_dir),
        data_dir,
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn api_list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let projects = store::list_projects(&state.index_data_dir)?;
    Ok(Json(projects))
}

#[derive(Deserialize)]
struct GetParams {
    name: Option<String>,
}

/// The page tree without page contents. This is what list views fetch; it
/// cuts a multi-megabyte project schema down to kilobytes.
async fn api_get(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GetParams>,
) -> Result<impl IntoResponse, ApiError> {
    let name = params.name.ok_or(ApiError::MissingParam("name"))?;
    let summary = store::list_index_summary(&state.index_data_dir, &name)?;
    Ok(Json(summary))
}

/// The full schema for every language of a project.
async fn api_get_index(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GetParams>,
) -> Result<impl IntoResponse, ApiError> {
    let name = params.name.ok_or(ApiError::MissingParam("name"))?;
    let indexes = store::get_index(&state.index_data_dir, &name)?;
    Ok(Json(indexes))
}

#[derive(Deserialize)]
struct GetPageParams {
    project: Option<String>,
    language: Option<String>,
    page: Option<String>,
}

async fn api_get_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GetPageParams>,
) -> Result<impl IntoResponse, ApiError> {
    let project = params.project.ok_or(ApiError::MissingParam("project"))?;
    let language = params.language.ok_or(ApiError::MissingParam("language"))?;
    let page = params.page.ok_or(ApiError::MissingParam("page"))?;

    let page = store::get_page(&state.index_data_dir, &project, &language, &page)?;
    Ok(Json(page))
}

#[derive(Deserialize)]
struct SearchParams {
    query: Option<String>,
    project: Option<String>,
    autocomplete: Option<bool>,
}

async fn api_search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.query.ok_or(ApiError::MissingParam("query"))?;
    let autocomplete = params.autocomplete.unwrap_or(false);

    let start = std::time::Instant::now();
    let results = search::search(
        &state.index_data_dir,
        &query,
        params.project.as_deref(),
        &CancelToken::new(),
    )?;

    // Autocomplete probes fire on every keystroke; only deliberate queries
    // are worth a log line.
    if !autocomplete {
        tracing::debug!(
            query = %query,
            project = params.project.as_deref().unwrap_or("all"),
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search"
        );
    }

    Ok(Json(results))
}
