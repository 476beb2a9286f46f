use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use codeprism_core::{Card, CodeprismError, FlowSummary, SyncRequest, SyncResponse};
use codeprism_search::ResultSource;
use codeprism_sync::{Codeprism, Health};
use std::sync::Arc;

use crate::types::*;

pub type AppState = Arc<Codeprism>;
type ApiResult<T> = Result<Json<T>, ApiError>;

/// Error response: a status code plus `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<CodeprismError> for ApiError {
    fn from(e: CodeprismError) -> Self {
        let status = match &e {
            CodeprismError::InvalidInput(_)
            | CodeprismError::InvalidEventType(_)
            | CodeprismError::InvalidFileStatus(_) => StatusCode::BAD_REQUEST,
            CodeprismError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {e}");
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// Run blocking store work off the async executor.
async fn blocking<T, F>(cp: AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Codeprism) -> Result<T, CodeprismError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&cp))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("worker failed: {e}")))?
        .map_err(ApiError::from)
}

// -- Ingestion --------------------------------------------------------------------

pub async fn api_sync(State(cp): State<AppState>, Json(req): Json<SyncRequest>) -> ApiResult<SyncResponse> {
    let limit = cp.config().sync.batch_size_limit;
    if req.changed_files.len() > limit {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("batch of {} files exceeds the limit of {limit}", req.changed_files.len()),
        ));
    }
    let resp = blocking(cp, move |cp| cp.handle_sync(&req)).await?;
    Ok(Json(resp))
}

// -- Retrieval --------------------------------------------------------------------

pub async fn api_search(State(cp): State<AppState>, Query(query): Query<SearchQuery>) -> ApiResult<SearchResponse> {
    if query.q.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "query parameter 'q' is empty"));
    }
    let hits = blocking(cp, move |cp| {
        let limit = query.limit.unwrap_or_else(|| cp.search().default_limit());
        cp.search().search(&query.q, query.branch.as_deref(), limit)
    })
    .await?;
    let cache_hit = !hits.is_empty() && hits.iter().all(|h| h.source == ResultSource::Cache);
    Ok(Json(SearchResponse {
        results: hits.into_iter().map(SearchResultItem::from).collect(),
        cache_hit,
    }))
}

pub async fn api_health(State(cp): State<AppState>) -> ApiResult<Health> {
    Ok(Json(blocking(cp, |cp| cp.health()).await?))
}

pub async fn api_flows(State(cp): State<AppState>) -> ApiResult<Vec<FlowSummary>> {
    Ok(Json(blocking(cp, |cp| cp.search().list_flows()).await?))
}

pub async fn api_cards(State(cp): State<AppState>, Query(query): Query<CardsQuery>) -> ApiResult<Vec<Card>> {
    Ok(Json(blocking(cp, move |cp| cp.storage().cards_by_flow(&query.flow)).await?))
}
