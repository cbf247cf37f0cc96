use super::{
    ApiService, ErrorBody, IndexFileRequest, ReindexRequest, SearchRequest, SimilarRequest,
    StatusBody, API_PREFIX,
};
use crate::indexer::SearchHit;
use crate::{Result, VaultfindError};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Error wrapper translating domain errors into HTTP status + JSON body.
pub struct ApiError(VaultfindError);

impl From<VaultfindError> for ApiError {
    fn from(err: VaultfindError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VaultfindError::Config(_) => StatusCode::BAD_REQUEST,
            VaultfindError::EmbeddingUnavailable(_) => StatusCode::BAD_REQUEST,
            VaultfindError::IndexingBusy => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        warn!(status = %status, error = %self.0, "request failed");
        let body = Json(ErrorBody {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

pub fn router(service: Arc<ApiService>) -> Router {
    Router::new()
        .route(&format!("{API_PREFIX}/health"), get(health))
        .route(&format!("{API_PREFIX}/status"), get(status))
        .route(
            &format!("{API_PREFIX}/search/query"),
            get(search_get).post(search_post),
        )
        .route(&format!("{API_PREFIX}/search/similar"), post(similar))
        .route(&format!("{API_PREFIX}/index/file"), post(index_file))
        .route(
            &format!("{API_PREFIX}/index/all"),
            post(reindex_all).delete(cancel_reindex),
        )
        .route(&format!("{API_PREFIX}/index/status"), get(index_status))
        .with_state(service)
}

/// Serve the API until the shutdown token fires.
pub async fn serve(
    service: Arc<ApiService>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(service);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| VaultfindError::Daemon(format!("failed to bind {addr}: {e}")))?;

    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| VaultfindError::Daemon(format!("API server error: {e}")))?;

    Ok(())
}

async fn health() -> Json<StatusBody> {
    Json(StatusBody {
        status: "ok".to_string(),
    })
}

async fn status(State(service): State<Arc<ApiService>>) -> Json<super::StatusResponse> {
    Json(service.status().await)
}

/// GET form: `q, limit, offset, min_score, tag (repeated), path_prefix`.
async fn search_get(
    State(service): State<Arc<ApiService>>,
    Query(params): Query<Vec<(String, String)>>,
) -> std::result::Result<Json<Vec<SearchHit>>, ApiError> {
    let mut request = SearchRequest {
        query: String::new(),
        limit: 10,
        offset: 0,
        min_score: 0.6,
        tags: Vec::new(),
        path_prefix: None,
    };

    for (key, value) in params {
        match key.as_str() {
            "q" | "query" => request.query = value,
            "limit" => request.limit = value.parse().unwrap_or(request.limit),
            "offset" => request.offset = value.parse().unwrap_or(0),
            "min_score" => request.min_score = value.parse().unwrap_or(request.min_score),
            "tag" => request.tags.push(value),
            "path_prefix" => request.path_prefix = Some(value),
            _ => {}
        }
    }

    if request.query.is_empty() {
        return Err(VaultfindError::Config("missing query parameter 'q'".to_string()).into());
    }

    Ok(Json(service.search(&request).await?))
}

async fn search_post(
    State(service): State<Arc<ApiService>>,
    Json(request): Json<SearchRequest>,
) -> std::result::Result<Json<Vec<SearchHit>>, ApiError> {
    if request.query.is_empty() {
        return Err(VaultfindError::Config("missing query parameter".to_string()).into());
    }
    Ok(Json(service.search(&request).await?))
}

async fn similar(
    State(service): State<Arc<ApiService>>,
    Json(request): Json<SimilarRequest>,
) -> std::result::Result<Json<Vec<SearchHit>>, ApiError> {
    if request.file_path.is_empty() {
        return Err(VaultfindError::Config("missing file_path parameter".to_string()).into());
    }
    Ok(Json(service.similar(&request).await?))
}

async fn index_file(
    State(service): State<Arc<ApiService>>,
    Json(request): Json<IndexFileRequest>,
) -> std::result::Result<Json<StatusBody>, ApiError> {
    if request.file_path.is_empty() {
        return Err(VaultfindError::Config("missing file_path parameter".to_string()).into());
    }

    service.index_file(&request).await?;
    Ok(Json(StatusBody {
        status: "success".to_string(),
    }))
}

async fn reindex_all(
    State(service): State<Arc<ApiService>>,
    request: Option<Json<ReindexRequest>>,
) -> std::result::Result<Json<StatusBody>, ApiError> {
    let force = request.map(|Json(r)| r.force).unwrap_or_default();
    service.start_reindex(force)?;
    Ok(Json(StatusBody {
        status: "reindexing_started".to_string(),
    }))
}

async fn cancel_reindex(State(service): State<Arc<ApiService>>) -> Json<StatusBody> {
    service.cancel_reindex();
    Json(StatusBody {
        status: "cancelled".to_string(),
    })
}

async fn index_status(State(service): State<Arc<ApiService>>) -> Json<super::IndexingStatus> {
    Json(service.indexing_status())
}
