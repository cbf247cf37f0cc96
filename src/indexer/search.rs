use crate::embedding::Embedder;
use crate::store::payload::{payload_i64, payload_str, payload_str_list};
use crate::store::{ScoredPoint, StoreError, VectorStore};
use crate::{Result, VaultfindError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const DEFAULT_LIMIT: usize = 10;
const DEFAULT_MIN_SCORE: f32 = 0.6;
const EXCERPT_MAX: usize = 150;

/// Options shared by text search and similar-document search.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchOptions {
    pub limit: usize,
    pub offset: usize,
    pub min_score: f32,
    pub tags: Vec<String>,
    pub path_prefix: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            min_score: DEFAULT_MIN_SCORE,
            tags: Vec::new(),
            path_prefix: None,
        }
    }
}

/// A ranked search result assembled from a stored point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub section: String,
    #[serde(default)]
    pub chunk_index: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

/// Translates user queries and reference documents into vector-store
/// requests and assembles ranked results.
pub struct QueryService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    collection: String,
    vault_paths: Vec<PathBuf>,
}

impl QueryService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        collection: String,
        vault_paths: Vec<PathBuf>,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
            vault_paths,
        }
    }

    /// Semantic text search: embed the query, search the store, then apply
    /// the client-side filter/sort/truncate pipeline.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let limit = if options.limit == 0 {
            DEFAULT_LIMIT
        } else {
            options.limit
        };

        debug!(query, limit, "executing semantic search");

        let vector = self.embedder.embed(query).await.map_err(|e| {
            VaultfindError::EmbeddingUnavailable(format!(
                "unable to process search query: {e} - please check if Ollama is running"
            ))
        })?;

        let points = match self
            .store
            .search(
                &self.collection,
                &vector,
                limit as u64,
                options.offset as u64,
                None,
            )
            .await
        {
            Ok(points) => points,
            // An absent collection means nothing has been indexed yet; that
            // is an empty result, not a failure.
            Err(StoreError::CollectionNotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(VaultfindError::StoreUnavailable(e.to_string())),
        };

        let hits = filter_and_rank(points, options, limit, None);
        info!(query, results = hits.len(), "search completed");
        Ok(hits)
    }

    /// Find chunks similar to an already-indexed document, excluding the
    /// document itself. Uses the first stored vector of the document.
    pub async fn find_similar(&self, path: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let limit = if options.limit == 0 {
            DEFAULT_LIMIT
        } else {
            options.limit
        };

        let relative = self.to_relative(path);

        let points = self
            .store
            .get_points_by_path(&self.collection, &relative)
            .await
            .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;

        if points.is_empty() {
            if self.collection_is_empty().await {
                return Err(VaultfindError::DocumentNotIndexed(
                    "no vectors found: the vault has not been indexed yet - run 'vaultfind reindex' to build the search index"
                        .to_string(),
                ));
            }
            info!(path, "document not found in index for similar search");
            return Ok(Vec::new());
        }

        let Some(reference) = points.iter().find(|p| !p.vector.is_empty()) else {
            return Err(VaultfindError::DocumentNotIndexed(format!(
                "no vectors found for document: {path}"
            )));
        };

        let scored = self
            .store
            .search(
                &self.collection,
                &reference.vector,
                // Self-matches are dropped below, so fetch enough extras to
                // still fill the page.
                (limit + points.len()) as u64,
                options.offset as u64,
                None,
            )
            .await
            .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;

        let hits = filter_and_rank(scored, options, limit, Some(&relative));
        info!(path, results = hits.len(), "similar search completed");
        Ok(hits)
    }

    async fn collection_is_empty(&self) -> bool {
        match self.store.collection_info(&self.collection).await {
            Ok(info) => info.points_count == 0,
            Err(_) => true,
        }
    }

    /// Map an absolute path inside a configured vault to the stored
    /// vault-relative form. Other inputs pass through unchanged.
    fn to_relative(&self, path: &str) -> String {
        let p = Path::new(path);
        if p.is_absolute() {
            for vault in &self.vault_paths {
                if let Ok(stripped) = p.strip_prefix(vault) {
                    return stripped.display().to_string();
                }
            }
        }
        path.to_string()
    }
}

/// Shared post-processing: score threshold, path prefix, tag intersection,
/// self-exclusion, sort by score descending, truncate to the limit.
fn filter_and_rank(
    points: Vec<ScoredPoint>,
    options: &SearchOptions,
    limit: usize,
    exclude_path: Option<&str>,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = points
        .into_iter()
        .filter(|point| point.score >= options.min_score)
        .map(to_hit)
        .filter(|hit| exclude_path != Some(hit.path.as_str()))
        .filter(|hit| {
            options
                .path_prefix
                .as_ref()
                .is_none_or(|prefix| hit.path.starts_with(prefix.as_str()))
        })
        .filter(|hit| {
            options.tags.is_empty() || hit.tags.iter().any(|t| options.tags.contains(t))
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

fn to_hit(point: ScoredPoint) -> SearchHit {
    let content = payload_str(&point.payload, "content")
        .or_else(|| payload_str(&point.payload, "text"))
        .unwrap_or_default()
        .to_string();

    SearchHit {
        id: point.id,
        path: payload_str(&point.payload, "path").unwrap_or_default().to_string(),
        title: payload_str(&point.payload, "title").unwrap_or_default().to_string(),
        excerpt: excerpt(&content, EXCERPT_MAX),
        content,
        score: point.score,
        tags: payload_str_list(&point.payload, "tags"),
        section: payload_str(&point.payload, "section")
            .unwrap_or_default()
            .to_string(),
        chunk_index: payload_i64(&point.payload, "chunk_index").unwrap_or_default(),
        metadata: BTreeMap::new(),
    }
}

/// Baseline excerpt: the first `max` characters with a trailing ellipsis
/// when the content is longer.
fn excerpt(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        return content.to_string();
    }
    let mut shortened: String = content.chars().take(max).collect();
    shortened.push('…');
    shortened
}
