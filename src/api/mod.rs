pub mod client;
pub mod server;


use crate::config::Config;
use crate::embedding::Embedder;
use crate::indexer::{IndexStats, IndexerService, QueryService, SearchHit, SearchOptions};
use crate::store::VectorStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use client::ApiClient;

pub const API_PREFIX: &str = "/api/v1";

fn default_limit() -> usize {
    10
}

fn default_min_score() -> f32 {
    0.6
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarRequest {
    pub file_path: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFileRequest {
    pub file_path: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReindexRequest {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub uptime: String,
    pub start_time: DateTime<Utc>,
    pub index_stats: IndexStats,
    pub version: String,
    pub config: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStatus {
    pub is_indexing: bool,
    pub indexed_docs: usize,
    pub total_docs: usize,
    pub percent_complete: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_indexed_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

impl From<&SearchRequest> for SearchOptions {
    fn from(request: &SearchRequest) -> Self {
        Self {
            limit: request.limit,
            offset: request.offset,
            min_score: request.min_score,
            tags: request.tags.clone(),
            path_prefix: request.path_prefix.clone(),
        }
    }
}

/// Service layer behind the HTTP handlers: holds every stateful component
/// and the daemon-root cancellation token for detached reindex runs.
pub struct ApiService {
    config: Arc<Config>,
    indexer: Arc<IndexerService>,
    query: Arc<QueryService>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    shutdown: CancellationToken,
    start_time: DateTime<Utc>,
}

impl ApiService {
    pub fn new(
        config: Arc<Config>,
        indexer: Arc<IndexerService>,
        query: Arc<QueryService>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            indexer,
            query,
            embedder,
            store,
            shutdown,
            start_time: Utc::now(),
        }
    }

    pub async fn status(&self) -> StatusResponse {
        let mut config_map = self.config.as_status_map();
        // Report the live provider, which may have changed via fallback.
        config_map.insert("embedding_model".to_string(), self.embedder.name());
        if let Some(points) = self.collection_point_count().await {
            config_map.insert("collection_points".to_string(), points.to_string());
        }

        StatusResponse {
            status: "running".to_string(),
            uptime: format_uptime(Utc::now() - self.start_time),
            start_time: self.start_time,
            index_stats: self.indexer.stats(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config: config_map,
        }
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.query
            .search(&request.query, &SearchOptions::from(request))
            .await
    }

    pub async fn similar(&self, request: &SimilarRequest) -> Result<Vec<SearchHit>> {
        let options = SearchOptions {
            limit: request.limit,
            ..SearchOptions::default()
        };
        self.query.find_similar(&request.file_path, &options).await
    }

    pub async fn index_file(&self, request: &IndexFileRequest) -> Result<()> {
        info!(path = %request.file_path, force = request.force, "index file requested");
        self.indexer.index_file(Path::new(&request.file_path)).await
    }

    pub fn start_reindex(&self, force: bool) -> Result<()> {
        info!(force, "full reindex requested");
        self.indexer.clone().start_background_reindex(force, &self.shutdown)
    }

    pub fn cancel_reindex(&self) {
        self.indexer.cancel_indexing();
    }

    pub fn indexing_status(&self) -> IndexingStatus {
        let stats = self.indexer.stats();
        let percent_complete = if stats.total_documents > 0 {
            stats.indexed_documents as f64 / stats.total_documents as f64 * 100.0
        } else {
            0.0
        };

        IndexingStatus {
            is_indexing: self.indexer.is_indexing(),
            indexed_docs: stats.indexed_documents,
            total_docs: stats.total_documents,
            percent_complete,
            current_file: self.indexer.current_file(),
            last_indexed_file: self.indexer.last_indexed_file(),
            indexing_start_time: stats.last_run,
        }
    }

    pub async fn collection_point_count(&self) -> Option<u64> {
        self.store
            .collection_info(&self.config.qdrant.collection)
            .await
            .ok()
            .map(|info| info.points_count)
    }
}

fn format_uptime(duration: chrono::Duration) -> String {
    let total = duration.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}
