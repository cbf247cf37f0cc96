pub mod search;

#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::embedding::{Embedder, EmbeddingError};
use crate::markdown::{self, chunk_point_id, Chunk, ChunkerConfig};
use crate::store::{Distance, PointRecord, VectorStore};
use crate::{Result, VaultfindError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub use search::{QueryService, SearchHit, SearchOptions};

/// Indexing outcome for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub path: String,
    pub indexed: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Idle,
    Indexing,
    Error,
}

/// Process-wide snapshot of indexing progress. Kept in memory only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexStats {
    pub total_documents: usize,
    pub indexed_documents: usize,
    pub failed_documents: usize,
    pub status: IndexState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentStatus>,
}

impl Default for IndexStats {
    fn default() -> Self {
        Self {
            total_documents: 0,
            indexed_documents: 0,
            failed_documents: 0,
            status: IndexState::Idle,
            last_run: None,
            last_error: None,
            documents: Vec::new(),
        }
    }
}

struct RunState {
    stats: IndexStats,
    is_indexing: bool,
    current_file: Option<String>,
    cancel: Option<CancellationToken>,
}

/// Orchestrates chunk → embed → upsert for single files and whole vaults.
pub struct IndexerService {
    config: Arc<Config>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunker: ChunkerConfig,
    state: Mutex<RunState>,
    /// Serializes collection resets against in-flight per-file indexing:
    /// file operations hold the read side, a forced reset holds the write
    /// side while it drops and recreates the collection.
    reset_gate: tokio::sync::RwLock<()>,
}

impl IndexerService {
    pub fn new(
        config: Arc<Config>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let chunker = ChunkerConfig::from_indexing(&config.indexing);
        Self {
            config,
            embedder,
            store,
            chunker,
            state: Mutex::new(RunState {
                stats: IndexStats::default(),
                is_indexing: false,
                current_file: None,
                cancel: None,
            }),
            reset_gate: tokio::sync::RwLock::new(()),
        }
    }

    pub fn stats(&self) -> IndexStats {
        self.state.lock().expect("state lock").stats.clone()
    }

    pub fn is_indexing(&self) -> bool {
        self.state.lock().expect("state lock").is_indexing
    }

    pub fn current_file(&self) -> Option<String> {
        self.state.lock().expect("state lock").current_file.clone()
    }

    /// Path of the most recently completed document, from the status list.
    pub fn last_indexed_file(&self) -> Option<String> {
        let state = self.state.lock().expect("state lock");
        state
            .stats
            .documents
            .iter()
            .max_by_key(|d| d.updated_at)
            .map(|d| d.path.clone())
    }

    fn collection(&self) -> &str {
        &self.config.qdrant.collection
    }

    /// Resolve the owning vault by longest matching prefix.
    fn resolve_vault(&self, path: &Path) -> Result<(PathBuf, String, String)> {
        let mut best: Option<&PathBuf> = None;
        for vault in self.config.vault_paths() {
            if path.starts_with(vault) && best.is_none_or(|b| vault.as_os_str().len() > b.as_os_str().len())
            {
                best = Some(vault);
            }
        }

        let vault = best
            .or_else(|| self.config.vault_paths().first())
            .ok_or_else(|| VaultfindError::Config("no vault paths configured".to_string()))?;

        let vault_name = vault
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("vault")
            .to_string();
        let relative = path
            .strip_prefix(vault)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| path.display().to_string());

        Ok((vault.clone(), vault_name, relative))
    }

    /// Index one file: parse, chunk, embed, then reconcile the stored points
    /// with the file's current content. A missing file is not an error; the
    /// deletion path owns that case.
    pub async fn index_file(&self, path: &Path) -> Result<()> {
        let result = {
            let _gate = self.reset_gate.read().await;
            self.index_file_inner(path).await
        };

        let status = DocumentStatus {
            path: path.display().to_string(),
            indexed: result.is_ok(),
            updated_at: Utc::now(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        self.record_document(status);

        result
    }

    async fn index_file_inner(&self, path: &Path) -> Result<()> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file vanished before indexing");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let (vault_path, vault_name, relative) = self.resolve_vault(path)?;
        let doc = markdown::parse_file(&raw, path.to_path_buf());
        let chunks = markdown::chunker::chunk_document(&doc, &self.chunker);

        let existing: Vec<String> = self
            .store
            .get_points_by_path(self.collection(), &relative)
            .await
            .map(|points| points.into_iter().map(|p| p.id).collect())
            .unwrap_or_default();

        if chunks.is_empty() {
            debug!(path = %path.display(), "no chunks generated");
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await.map_err(map_embedding_error)?;

        if embeddings.len() != chunks.len() {
            return Err(VaultfindError::EmbeddingMismatch {
                expected: chunks.len(),
                actual: embeddings.len(),
            });
        }

        let total = chunks.len();
        let points: Vec<PointRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(index, (chunk, vector))| {
                build_point(
                    chunk, vector, index, total, path, &vault_path, &vault_name, &relative, &doc,
                )
            })
            .collect();

        // Chunks that no longer exist leave stale points behind; drop them
        // before upserting so the store mirrors the file's current content.
        let fresh: HashSet<&str> = points.iter().map(|p| p.id.as_str()).collect();
        let stale: Vec<String> = existing
            .into_iter()
            .filter(|id| !fresh.contains(id.as_str()))
            .collect();
        if !stale.is_empty() {
            self.store
                .delete_points(self.collection(), &stale)
                .await
                .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;
        }

        self.store
            .upsert_points(self.collection(), points)
            .await
            .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;

        debug!(path = %path.display(), chunks = total, "indexed file");
        Ok(())
    }

    /// Remove every stored point for a deleted or renamed-away file.
    pub async fn remove_file(&self, path: &Path) -> Result<()> {
        let _gate = self.reset_gate.read().await;
        let (_, _, relative) = self.resolve_vault(path)?;

        let points = self
            .store
            .get_points_by_path(self.collection(), &relative)
            .await
            .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;

        if points.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = points.into_iter().map(|p| p.id).collect();
        let count = ids.len();
        self.store
            .delete_points(self.collection(), &ids)
            .await
            .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;

        info!(path = %path.display(), points = count, "removed deleted file from index");
        Ok(())
    }

    /// Start a full reindex in the background. Exactly one run may be in
    /// flight; a second request fails with `IndexingBusy`. The run is
    /// detached from the caller and only the returned token (or daemon
    /// shutdown) cancels it.
    pub fn start_background_reindex(
        self: Arc<Self>,
        force: bool,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let cancel = {
            let mut state = self.state.lock().expect("state lock");
            if state.is_indexing {
                return Err(VaultfindError::IndexingBusy);
            }
            let cancel = shutdown.child_token();
            state.is_indexing = true;
            state.cancel = Some(cancel.clone());
            state.stats = IndexStats {
                status: IndexState::Indexing,
                last_run: Some(Utc::now()),
                ..IndexStats::default()
            };
            cancel
        };

        let this = Arc::clone(&self);
        tokio::spawn(async move {
            let result = this.run_vault_index(force, cancel).await;
            if let Err(e) = result {
                error!(error = %e, "background reindex failed");
                let mut state = this.state.lock().expect("state lock");
                state.stats.last_error = Some(e.to_string());
                state.stats.status = IndexState::Error;
            }
            let mut state = this.state.lock().expect("state lock");
            state.is_indexing = false;
            state.cancel = None;
            state.current_file = None;
        });

        Ok(())
    }

    /// Cancel an in-flight reindex, if any. Idempotent.
    pub fn cancel_indexing(&self) {
        let state = self.state.lock().expect("state lock");
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
            info!("reindex cancellation requested");
        }
    }

    /// The full-reindex body. With `force` the collection is dropped and
    /// recreated at the configured dimension and distance first.
    async fn run_vault_index(&self, force: bool, cancel: CancellationToken) -> Result<()> {
        info!(force, "starting full reindex");

        if force {
            self.reset_collection().await?;
        }

        let files = self.collect_vault_files();
        info!(files = files.len(), "vault walk complete");

        let mut cancelled = false;
        for file in files {
            if cancel.is_cancelled() {
                info!("reindex cancelled");
                cancelled = true;
                break;
            }

            {
                let mut state = self.state.lock().expect("state lock");
                state.stats.total_documents += 1;
                state.current_file = Some(file.display().to_string());
            }

            let result = self.index_file_inner(&file).await;
            let status = DocumentStatus {
                path: file.display().to_string(),
                indexed: result.is_ok(),
                updated_at: Utc::now(),
                error: result.as_ref().err().map(ToString::to_string),
            };

            let mut state = self.state.lock().expect("state lock");
            match result {
                Ok(()) => state.stats.indexed_documents += 1,
                Err(e) => {
                    warn!(path = %file.display(), error = %e, "failed to index file");
                    state.stats.failed_documents += 1;
                    state.stats.last_error = Some(e.to_string());
                }
            }
            state.stats.documents.push(status);
        }

        let mut state = self.state.lock().expect("state lock");
        state.stats.status = if state.stats.failed_documents > 0 {
            IndexState::Error
        } else {
            IndexState::Idle
        };

        info!(
            total = state.stats.total_documents,
            indexed = state.stats.indexed_documents,
            failed = state.stats.failed_documents,
            cancelled,
            "full reindex finished"
        );
        Ok(())
    }

    /// Drop and recreate the collection, then restore payload indexes.
    /// Holds the write gate so no file-level operation sees the collection
    /// mid-reset.
    async fn reset_collection(&self) -> Result<()> {
        let _gate = self.reset_gate.write().await;
        let collection = self.collection();
        info!(collection, "resetting collection");

        if let Err(e) = self.store.delete_collection(collection).await {
            // The collection may not exist yet.
            warn!(error = %e, "failed to drop collection, continuing");
        }

        let distance = Distance::parse(&self.config.qdrant.distance).unwrap_or_default();
        self.store
            .create_collection(collection, self.config.embedding.dimensions, distance)
            .await
            .map_err(|e| VaultfindError::StoreUnavailable(e.to_string()))?;

        self.ensure_payload_indexes().await;
        Ok(())
    }

    /// Create the payload indexes used by by-path scrolls and tag filters.
    pub async fn ensure_payload_indexes(&self) {
        use crate::store::PayloadFieldType;
        let collection = self.collection();
        for (field, field_type) in [
            ("path", PayloadFieldType::Keyword),
            ("tags", PayloadFieldType::Keyword),
            ("chunk_index", PayloadFieldType::Integer),
        ] {
            if let Err(e) = self
                .store
                .create_payload_index(collection, field, field_type)
                .await
            {
                warn!(field, error = %e, "payload index creation failed");
            }
        }
    }

    /// All files in all vaults matching the include patterns, with excluded
    /// directories pruned.
    fn collect_vault_files(&self) -> Vec<PathBuf> {
        let include: Vec<glob::Pattern> = self
            .config
            .indexing
            .include_patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();
        let excluded_dirs: Vec<String> = self
            .config
            .indexing
            .exclude_patterns
            .iter()
            .filter_map(|p| p.strip_suffix("/*").map(str::to_string))
            .collect();

        let mut files = Vec::new();
        for vault in self.config.vault_paths() {
            if !vault.is_dir() {
                warn!(vault = %vault.display(), "vault path unreachable, skipping");
                continue;
            }

            let walk = WalkDir::new(vault).into_iter().filter_entry(|entry| {
                let name = entry.file_name().to_str().unwrap_or_default();
                !(entry.file_type().is_dir()
                    && (name.starts_with('.') || excluded_dirs.iter().any(|d| d == name)))
            });

            for entry in walk.filter_map(std::result::Result::ok) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_str().unwrap_or_default();
                if name.starts_with('.') {
                    continue;
                }
                if include.is_empty() || include.iter().any(|p| p.matches(name)) {
                    files.push(entry.into_path());
                }
            }
        }

        files.sort();
        files
    }

    fn record_document(&self, status: DocumentStatus) {
        let mut state = self.state.lock().expect("state lock");
        if let Some(existing) = state
            .stats
            .documents
            .iter_mut()
            .find(|d| d.path == status.path)
        {
            *existing = status;
        } else {
            state.stats.documents.push(status);
        }
    }
}

fn map_embedding_error(err: EmbeddingError) -> VaultfindError {
    match err {
        EmbeddingError::Mismatch { expected, actual } => {
            VaultfindError::EmbeddingMismatch { expected, actual }
        }
        other => VaultfindError::EmbeddingUnavailable(other.to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_point(
    chunk: &Chunk,
    vector: Vec<f32>,
    index: usize,
    total: usize,
    full_path: &Path,
    vault_path: &Path,
    vault_name: &str,
    relative: &str,
    doc: &markdown::Document,
) -> PointRecord {
    let id = chunk_point_id(vault_name, relative, index).to_string();

    let mut payload = std::collections::BTreeMap::new();
    payload.insert("path".to_string(), json!(relative));
    payload.insert("full_path".to_string(), json!(full_path.display().to_string()));
    payload.insert("vault_path".to_string(), json!(vault_path.display().to_string()));
    payload.insert("vault_name".to_string(), json!(vault_name));
    payload.insert("text".to_string(), json!(chunk.content));
    payload.insert("content".to_string(), json!(chunk.plain_text));
    payload.insert("title".to_string(), json!(chunk.title));
    payload.insert("section".to_string(), json!(chunk.section));
    payload.insert("tags".to_string(), json!(chunk.tags));
    payload.insert("chunk_index".to_string(), json!(index));
    payload.insert("total_chunks".to_string(), json!(total));

    for (key, value) in &doc.frontmatter {
        payload.insert(format!("fm_{key}"), value.clone());
    }

    PointRecord {
        id,
        vector,
        payload,
    }
}
