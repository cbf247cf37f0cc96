use super::*;
use std::result::Result;
use crate::config::Config;
use crate::embedding::EmbeddingError;
use crate::store::VectorStore as _;
use crate::test_support::{MemoryStore, ScriptedEmbedder};
use async_trait::async_trait;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

const COLLECTION: &str = "test-notes";

fn test_config(vault: &Path) -> Arc<Config> {
    let mut config = Config::default();
    config.paths.vault_paths = vec![vault.to_path_buf()];
    config.embedding.dimensions = 4;
    config.qdrant.collection = COLLECTION.to_string();
    config.indexing.chunk_strategy = "hybrid".to_string();
    config.indexing.max_chunk_size = 8;
    config.indexing.window_overlap = 0;
    Arc::new(config)
}

fn test_embedder() -> Arc<ScriptedEmbedder> {
    Arc::new(ScriptedEmbedder::new(
        "test-model",
        4,
        vec![
            ("alpha", vec![1.0, 0.0, 0.0, 0.0]),
            ("beta", vec![0.0, 1.0, 0.0, 0.0]),
            ("gamma", vec![0.0, 0.0, 1.0, 0.0]),
            ("same-content", vec![0.7, 0.7, 0.0, 0.0]),
            ("unrelated", vec![0.0, 0.0, 0.0, 1.0]),
        ],
    ))
}

async fn setup(vault: &Path) -> (Arc<IndexerService>, Arc<MemoryStore>, Arc<ScriptedEmbedder>) {
    let store = Arc::new(MemoryStore::new());
    store
        .create_collection(COLLECTION, 4, Distance::Cosine)
        .await
        .expect("create collection");

    let embedder = test_embedder();
    let service = Arc::new(IndexerService::new(
        test_config(vault),
        embedder.clone(),
        store.clone(),
    ));
    (service, store, embedder)
}

fn query_service(
    service_parts: &(Arc<IndexerService>, Arc<MemoryStore>, Arc<ScriptedEmbedder>),
    vault: &Path,
) -> QueryService {
    QueryService::new(
        service_parts.2.clone(),
        service_parts.1.clone(),
        COLLECTION.to_string(),
        vec![vault.to_path_buf()],
    )
}

async fn point_count(store: &MemoryStore) -> u64 {
    store
        .collection_info(COLLECTION)
        .await
        .expect("collection info")
        .points_count
}

#[tokio::test]
async fn index_single_file_creates_points() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("n.md");
    fs::write(&file, "# Title\n\nalpha\n\nbeta").expect("write");

    let parts = setup(vault.path()).await;
    let (service, store, _) = &parts;

    service.index_file(&file).await.expect("index");
    assert_eq!(point_count(store).await, 2);

    let query = query_service(&parts, vault.path());
    let options = SearchOptions {
        limit: 1,
        min_score: 0.0,
        ..SearchOptions::default()
    };
    let hits = query.search("alpha", &options).await.expect("search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "n.md");
    assert_eq!(hits[0].section, "Title");
    assert!((hits[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn reindexing_is_idempotent() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("n.md");
    fs::write(&file, "# Title\n\nalpha\n\nbeta").expect("write");

    let (service, store, _) = setup(vault.path()).await;

    service.index_file(&file).await.expect("first pass");
    let first: Vec<_> = store
        .get_points_by_path(COLLECTION, "n.md")
        .await
        .expect("points");

    service.index_file(&file).await.expect("second pass");
    let second: Vec<_> = store
        .get_points_by_path(COLLECTION, "n.md")
        .await
        .expect("points");

    assert_eq!(point_count(&store).await, 2);
    assert_eq!(first, second);
}

#[tokio::test]
async fn updating_a_file_replaces_stale_points() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("n.md");
    fs::write(&file, "# Title\n\nalpha\n\nbeta").expect("write");

    let parts = setup(vault.path()).await;
    let (service, store, _) = &parts;
    service.index_file(&file).await.expect("index");
    assert_eq!(point_count(store).await, 2);

    fs::write(&file, "# Title\n\ngamma").expect("rewrite");
    service.index_file(&file).await.expect("reindex");
    assert_eq!(point_count(store).await, 1);

    let query = query_service(&parts, vault.path());
    let options = SearchOptions::default();

    let hits = query.search("gamma", &options).await.expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].path, "n.md");

    // The old content no longer scores above the default threshold.
    let hits = query.search("alpha", &options).await.expect("search");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn removing_a_file_deletes_its_points() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("n.md");
    fs::write(&file, "# Title\n\nalpha\n\nbeta").expect("write");

    let parts = setup(vault.path()).await;
    let (service, store, _) = &parts;
    service.index_file(&file).await.expect("index");
    assert_eq!(point_count(store).await, 2);

    fs::remove_file(&file).expect("delete");
    service.remove_file(&file).await.expect("remove");

    assert_eq!(point_count(store).await, 0);
    assert!(store
        .get_points_by_path(COLLECTION, "n.md")
        .await
        .expect("points")
        .is_empty());

    // Searching afterwards yields an empty list, not an error.
    let query = query_service(&parts, vault.path());
    let hits = query
        .search("alpha", &SearchOptions::default())
        .await
        .expect("search");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn empty_document_changes_no_points() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("empty.md");
    fs::write(&file, "").expect("write");

    let (service, store, _) = setup(vault.path()).await;
    service.index_file(&file).await.expect("index");
    assert_eq!(point_count(&store).await, 0);
}

#[tokio::test]
async fn frontmatter_only_document_changes_no_points() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("fm.md");
    fs::write(&file, "---\ntitle: nothing else\n---\n").expect("write");

    let (service, store, _) = setup(vault.path()).await;
    service.index_file(&file).await.expect("index");
    assert_eq!(point_count(&store).await, 0);
}

#[tokio::test]
async fn missing_file_is_not_an_error() {
    let vault = TempDir::new().expect("tempdir");
    let (service, _, _) = setup(vault.path()).await;
    service
        .index_file(&vault.path().join("never-existed.md"))
        .await
        .expect("missing file is fine");
}

#[tokio::test]
async fn point_payload_carries_document_metadata() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("meta.md");
    fs::write(
        &file,
        "---\ntitle: Meta Note\ntags: [x, y]\nrating: 5\n---\n# Meta Note\n\nalpha\n",
    )
    .expect("write");

    let (service, store, _) = setup(vault.path()).await;
    service.index_file(&file).await.expect("index");

    let points = store
        .get_points_by_path(COLLECTION, "meta.md")
        .await
        .expect("points");
    assert_eq!(points.len(), 1);

    let payload = &points[0].payload;
    assert_eq!(payload["path"], "meta.md");
    assert_eq!(payload["full_path"], file.display().to_string());
    assert_eq!(
        payload["vault_name"],
        vault.path().file_name().unwrap().to_str().unwrap()
    );
    assert_eq!(payload["title"], "Meta Note");
    assert_eq!(payload["section"], "Meta Note");
    assert_eq!(payload["chunk_index"], 0);
    assert_eq!(payload["total_chunks"], 1);
    assert_eq!(payload["tags"], serde_json::json!(["x", "y"]));
    assert_eq!(payload["fm_title"], "Meta Note");
    assert_eq!(payload["fm_rating"], 5);

    // The id is the deterministic function of vault, path, and index.
    let expected = chunk_point_id(
        vault.path().file_name().unwrap().to_str().unwrap(),
        "meta.md",
        0,
    );
    assert_eq!(points[0].id, expected.to_string());
}

#[tokio::test]
async fn vault_resolution_uses_longest_prefix() {
    let outer = TempDir::new().expect("tempdir");
    let inner = outer.path().join("inner");
    fs::create_dir_all(&inner).expect("mkdir");
    let file = inner.join("n.md");
    fs::write(&file, "# T\n\nalpha\n").expect("write");

    let store = Arc::new(MemoryStore::new());
    store
        .create_collection(COLLECTION, 4, Distance::Cosine)
        .await
        .expect("create");

    let mut config = Config::default();
    config.paths.vault_paths = vec![outer.path().to_path_buf(), inner.clone()];
    config.embedding.dimensions = 4;
    config.qdrant.collection = COLLECTION.to_string();
    let service = IndexerService::new(Arc::new(config), test_embedder(), store.clone());

    service.index_file(&file).await.expect("index");

    let points = store
        .get_points_by_path(COLLECTION, "n.md")
        .await
        .expect("points");
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].payload["vault_name"], "inner");
}

struct MismatchedEmbedder;

#[async_trait]
impl crate::embedding::Embedder for MismatchedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.0; 4])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        // One short: triggers the count check.
        Ok(texts.iter().skip(1).map(|_| vec![0.0; 4]).collect())
    }

    fn dimensions(&self) -> usize {
        4
    }

    fn name(&self) -> String {
        "mismatched".to_string()
    }

    async fn close(&self) {}
}

#[tokio::test]
async fn embedding_count_mismatch_fails_the_file() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("n.md");
    fs::write(&file, "# Title\n\nalpha\n\nbeta").expect("write");

    let store = Arc::new(MemoryStore::new());
    store
        .create_collection(COLLECTION, 4, Distance::Cosine)
        .await
        .expect("create");
    let service = IndexerService::new(
        test_config(vault.path()),
        Arc::new(MismatchedEmbedder),
        store.clone(),
    );

    let result = service.index_file(&file).await;
    assert!(matches!(
        result,
        Err(VaultfindError::EmbeddingMismatch { expected: 2, actual: 1 })
    ));
    assert_eq!(point_count(&store).await, 0);

    // The failure is recorded in the per-document status list.
    let stats = service.stats();
    let doc = stats
        .documents
        .iter()
        .find(|d| d.path == file.display().to_string())
        .expect("document status");
    assert!(!doc.indexed);
    assert!(doc.error.is_some());
}

#[tokio::test]
async fn embedder_unavailable_marks_file_failed() {
    let vault = TempDir::new().expect("tempdir");
    let file = vault.path().join("n.md");
    fs::write(&file, "# Title\n\nalpha\n").expect("write");

    let parts = setup(vault.path()).await;
    let (service, _, embedder) = &parts;

    embedder.fail_always(true);
    let result = service.index_file(&file).await;
    assert!(matches!(
        result,
        Err(VaultfindError::EmbeddingUnavailable(_))
    ));
}

async fn wait_for_run(service: &IndexerService) {
    for _ in 0..200 {
        if !service.is_indexing() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("reindex did not finish in time");
}

#[tokio::test]
async fn full_reindex_with_force_rebuilds_the_collection() {
    let vault = TempDir::new().expect("tempdir");
    fs::write(vault.path().join("a.md"), "# A\n\nalpha\n").expect("write");
    fs::write(vault.path().join("b.md"), "# B\n\nbeta\n").expect("write");
    fs::create_dir_all(vault.path().join("sub")).expect("mkdir");
    fs::write(vault.path().join("sub/c.md"), "# C\n\ngamma\n").expect("write");
    fs::write(vault.path().join("skip.txt"), "not markdown").expect("write");

    let (service, store, _) = setup(vault.path()).await;

    // Pre-existing garbage that force must clear out.
    store
        .upsert_points(
            COLLECTION,
            vec![crate::store::PointRecord {
                id: "stale".to_string(),
                vector: vec![0.0; 4],
                payload: std::collections::BTreeMap::new(),
            }],
        )
        .await
        .expect("seed garbage");

    let shutdown = CancellationToken::new();
    service
        .clone()
        .start_background_reindex(true, &shutdown)
        .expect("start");
    wait_for_run(&service).await;

    let stats = service.stats();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.indexed_documents, 3);
    assert_eq!(stats.failed_documents, 0);
    assert_eq!(stats.status, IndexState::Idle);
    assert_eq!(stats.documents.len(), 3);
    assert!(stats.documents.iter().all(|d| d.indexed));

    // One chunk per file; the stale point is gone.
    assert_eq!(point_count(&store).await, 3);
}

#[tokio::test]
async fn full_reindex_counts_failures_without_aborting() {
    let vault = TempDir::new().expect("tempdir");
    fs::write(vault.path().join("good.md"), "# G\n\nalpha\n").expect("write");
    fs::write(vault.path().join("bad.md"), "# B\n\nbeta\n").expect("write");

    let (service, _, embedder) = setup(vault.path()).await;
    // First file processed fails, the second succeeds.
    embedder.fail_next(1);

    let shutdown = CancellationToken::new();
    service
        .clone()
        .start_background_reindex(false, &shutdown)
        .expect("start");
    wait_for_run(&service).await;

    let stats = service.stats();
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.indexed_documents, 1);
    assert_eq!(stats.failed_documents, 1);
    assert_eq!(stats.status, IndexState::Error);
    assert!(stats.last_error.is_some());
}

#[tokio::test]
async fn only_one_reindex_runs_at_a_time() {
    let vault = TempDir::new().expect("tempdir");
    fs::write(vault.path().join("a.md"), "# A\n\nalpha\n").expect("write");

    let (service, _, _) = setup(vault.path()).await;
    let shutdown = CancellationToken::new();

    let first = service.clone().start_background_reindex(false, &shutdown);
    let second = service.clone().start_background_reindex(false, &shutdown);

    assert!(first.is_ok());
    assert!(matches!(second, Err(VaultfindError::IndexingBusy)));

    wait_for_run(&service).await;

    // After the run completes a new one may start.
    assert!(service.clone().start_background_reindex(false, &shutdown).is_ok());
    wait_for_run(&service).await;
}

#[tokio::test]
async fn cancel_without_active_run_is_a_no_op() {
    let vault = TempDir::new().expect("tempdir");
    let (service, _, _) = setup(vault.path()).await;
    service.cancel_indexing();
    assert!(!service.is_indexing());
}

mod query {
    use super::*;
    use serde_json::json;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_collection(COLLECTION, 4, Distance::Cosine)
            .await
            .expect("create");

        let mut points = Vec::new();
        for (id, vector, path, tags) in [
            ("p0", vec![1.0, 0.0, 0.0, 0.0], "notes/alpha.md", vec!["work"]),
            ("p1", vec![0.9, 0.1, 0.0, 0.0], "notes/близко.md", vec!["home"]),
            ("p2", vec![0.0, 1.0, 0.0, 0.0], "journal/beta.md", vec!["work"]),
            ("p3", vec![0.5, 0.5, 0.0, 0.0], "notes/mixed.md", vec![]),
        ] {
            let mut payload = std::collections::BTreeMap::new();
            payload.insert("path".to_string(), json!(path));
            payload.insert("title".to_string(), json!(id));
            payload.insert("content".to_string(), json!(format!("content of {id}")));
            payload.insert("tags".to_string(), json!(tags));
            payload.insert("chunk_index".to_string(), json!(0));
            points.push(crate::store::PointRecord {
                id: id.to_string(),
                vector,
                payload,
            });
        }
        store.upsert_points(COLLECTION, points).await.expect("seed");
        store
    }

    fn query(store: Arc<MemoryStore>) -> QueryService {
        QueryService::new(
            test_embedder(),
            store,
            COLLECTION.to_string(),
            vec![PathBuf::from("/vault")],
        )
    }

    #[tokio::test]
    async fn results_are_sorted_and_truncated() {
        let query = query(seeded_store().await);
        let options = SearchOptions {
            limit: 2,
            min_score: 0.0,
            ..SearchOptions::default()
        };
        let hits = query.search("alpha", &options).await.expect("search");
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].path, "notes/alpha.md");
    }

    #[tokio::test]
    async fn min_score_filters_weak_matches() {
        let query = query(seeded_store().await);
        let options = SearchOptions {
            min_score: 0.8,
            ..SearchOptions::default()
        };
        let hits = query.search("alpha", &options).await.expect("search");
        assert!(hits.iter().all(|h| h.score >= 0.8));
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn path_prefix_and_tags_filter_results() {
        let query = query(seeded_store().await);
        let options = SearchOptions {
            min_score: 0.0,
            path_prefix: Some("notes/".to_string()),
            tags: vec!["work".to_string()],
            ..SearchOptions::default()
        };
        let hits = query.search("alpha", &options).await.expect("search");
        assert!(!hits.is_empty());
        for hit in &hits {
            assert!(hit.path.starts_with("notes/"));
            assert!(hit.tags.iter().any(|t| t == "work"));
        }
    }

    #[tokio::test]
    async fn missing_collection_yields_empty_results() {
        let store = Arc::new(MemoryStore::new());
        let query = query(store);
        let hits = query
            .search("alpha", &SearchOptions::default())
            .await
            .expect("search");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn unavailable_embedder_is_a_typed_error() {
        let store = seeded_store().await;
        let embedder = test_embedder();
        embedder.fail_always(true);
        let query = QueryService::new(
            embedder,
            store,
            COLLECTION.to_string(),
            vec![PathBuf::from("/vault")],
        );

        let result = query.search("alpha", &SearchOptions::default()).await;
        match result {
            Err(VaultfindError::EmbeddingUnavailable(message)) => {
                assert!(message.contains("Ollama"));
            }
            other => panic!("expected EmbeddingUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn excerpt_is_truncated_with_ellipsis() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_collection(COLLECTION, 4, Distance::Cosine)
            .await
            .expect("create");

        let mut payload = std::collections::BTreeMap::new();
        payload.insert("path".to_string(), json!("long.md"));
        payload.insert("content".to_string(), json!("x".repeat(400)));
        store
            .upsert_points(
                COLLECTION,
                vec![crate::store::PointRecord {
                    id: "long".to_string(),
                    vector: vec![1.0, 0.0, 0.0, 0.0],
                    payload,
                }],
            )
            .await
            .expect("seed");

        let query = query(store);
        let options = SearchOptions {
            min_score: 0.0,
            ..SearchOptions::default()
        };
        let hits = query.search("alpha", &options).await.expect("search");
        assert_eq!(hits[0].excerpt.chars().count(), 151);
        assert!(hits[0].excerpt.ends_with('…'));
        assert_eq!(hits[0].content.len(), 400);
    }
}

mod similar {
    use super::*;
    use std::fs;

    async fn indexed_vault() -> (TempDir, Arc<IndexerService>, Arc<MemoryStore>, QueryService) {
        let vault = TempDir::new().expect("tempdir");
        fs::write(vault.path().join("a.md"), "# A\n\nsame-content words\n").expect("write");
        fs::write(vault.path().join("b.md"), "# B\n\nsame-content words\n").expect("write");
        fs::write(vault.path().join("c.md"), "# C\n\nunrelated things\n").expect("write");

        let (service, store, embedder) = setup(vault.path()).await;
        for name in ["a.md", "b.md", "c.md"] {
            service
                .index_file(&vault.path().join(name))
                .await
                .expect("index");
        }

        let query = QueryService::new(
            embedder,
            store.clone(),
            COLLECTION.to_string(),
            vec![vault.path().to_path_buf()],
        );
        (vault, service, store, query)
    }

    #[tokio::test]
    async fn similar_excludes_self_and_ranks_by_similarity() {
        let (vault, _service, _store, query) = indexed_vault().await;

        let options = SearchOptions {
            min_score: 0.0,
            ..SearchOptions::default()
        };
        let hits = query
            .find_similar(
                vault.path().join("a.md").to_str().expect("utf8 path"),
                &options,
            )
            .await
            .expect("similar");

        assert!(hits.iter().all(|h| h.path != "a.md"));
        let b_pos = hits.iter().position(|h| h.path == "b.md").expect("b.md");
        let c_pos = hits.iter().position(|h| h.path == "c.md").expect("c.md");
        assert!(b_pos < c_pos);
        assert!(hits[b_pos].score > hits[c_pos].score);
    }

    #[tokio::test]
    async fn similar_accepts_vault_relative_paths() {
        let (_vault, _service, _store, query) = indexed_vault().await;
        let options = SearchOptions {
            min_score: 0.0,
            ..SearchOptions::default()
        };
        let hits = query.find_similar("a.md", &options).await.expect("similar");
        assert!(hits.iter().any(|h| h.path == "b.md"));
    }

    #[tokio::test]
    async fn unindexed_document_yields_empty_results() {
        let (_vault, _service, _store, query) = indexed_vault().await;
        let hits = query
            .find_similar("nope.md", &SearchOptions::default())
            .await
            .expect("similar");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn empty_collection_yields_a_hint() {
        let store = Arc::new(MemoryStore::new());
        store
            .create_collection(COLLECTION, 4, Distance::Cosine)
            .await
            .expect("create");
        let query = QueryService::new(
            test_embedder(),
            store,
            COLLECTION.to_string(),
            vec![PathBuf::from("/vault")],
        );

        let result = query.find_similar("a.md", &SearchOptions::default()).await;
        match result {
            Err(VaultfindError::DocumentNotIndexed(message)) => {
                assert!(message.contains("no vectors found"));
                assert!(message.contains("reindex"));
            }
            other => panic!("expected DocumentNotIndexed, got {other:?}"),
        }
    }
}

struct SlowEmbedder {
    inner: Arc<ScriptedEmbedder>,
    delay: Duration,
}

#[async_trait]
impl crate::embedding::Embedder for SlowEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn name(&self) -> String {
        self.inner.name()
    }

    async fn close(&self) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_reindex_stops_it_promptly() {
    let vault = TempDir::new().expect("tempdir");
    for i in 0..10 {
        fs::write(
            vault.path().join(format!("n{i:02}.md")),
            format!("# N{i}\n\nalpha {i}\n"),
        )
        .expect("write");
    }

    let store = Arc::new(MemoryStore::new());
    store
        .create_collection(COLLECTION, 4, Distance::Cosine)
        .await
        .expect("create");
    let embedder = Arc::new(SlowEmbedder {
        inner: test_embedder(),
        delay: Duration::from_millis(100),
    });
    let service = Arc::new(IndexerService::new(
        test_config(vault.path()),
        embedder,
        store,
    ));

    let shutdown = CancellationToken::new();
    service
        .clone()
        .start_background_reindex(false, &shutdown)
        .expect("start");
    assert!(service.is_indexing());

    tokio::time::sleep(Duration::from_millis(150)).await;
    service.cancel_indexing();
    wait_for_run(&service).await;

    let stats = service.stats();
    assert!(
        stats.indexed_documents < 10,
        "run should stop before all 10 files ({} indexed)",
        stats.indexed_documents
    );
    // No failures happened, so the run ends idle.
    assert_eq!(stats.status, IndexState::Idle);
    assert_eq!(
        stats.indexed_documents + stats.failed_documents,
        stats.total_documents
    );
}
