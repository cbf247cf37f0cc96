//! HTTP surface scenarios over a fully wired service stack (cache +
//! fallback embedders, in-memory store): provider failover visible in
//! /status, and the GET search parameter handling.

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use vaultfind::api::{server, ApiClient, ApiService, SearchRequest};
use vaultfind::config::Config;
use vaultfind::embedding::{CachedEmbedder, FallbackEmbedder};
use vaultfind::indexer::{IndexerService, QueryService};
use vaultfind::store::{Distance, VectorStore};
use vaultfind::test_support::{MemoryStore, ScriptedEmbedder};

const COLLECTION: &str = "api-scenarios";

struct Stack {
    base_url: String,
    primary: Arc<ScriptedEmbedder>,
    vault: TempDir,
    shutdown: CancellationToken,
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn scripted(name: &str) -> Arc<ScriptedEmbedder> {
    Arc::new(ScriptedEmbedder::new(
        name,
        4,
        vec![
            ("alpha", vec![1.0, 0.0, 0.0, 0.0]),
            ("beta", vec![0.0, 1.0, 0.0, 0.0]),
        ],
    ))
}

async fn stack() -> Stack {
    let vault = TempDir::new().expect("tempdir");
    fs::write(
        vault.path().join("note.md"),
        "---\ntags: [work]\n---\n# Note\n\nalpha\n",
    )
    .expect("write");
    fs::create_dir_all(vault.path().join("journal")).expect("mkdir");
    fs::write(
        vault.path().join("journal/other.md"),
        "# Other\n\nbeta\n",
    )
    .expect("write");

    let mut config = Config::default();
    config.paths.vault_paths = vec![vault.path().to_path_buf()];
    config.embedding.dimensions = 4;
    config.embedding.model_name = "primary-model".to_string();
    config.qdrant.collection = COLLECTION.to_string();
    let config = Arc::new(config);

    let store = Arc::new(MemoryStore::new());
    store
        .create_collection(COLLECTION, 4, Distance::Cosine)
        .await
        .expect("create collection");

    // The production embedder shape: cache wrapping an ordered fallback.
    let primary = scripted("primary-model");
    let secondary = scripted("backup-model");
    let fallback = Arc::new(
        FallbackEmbedder::new(vec![primary.clone(), secondary]).expect("providers"),
    );
    let embedder: Arc<dyn vaultfind::embedding::Embedder> =
        Arc::new(CachedEmbedder::new(fallback));

    let indexer = Arc::new(IndexerService::new(
        config.clone(),
        embedder.clone(),
        store.clone(),
    ));
    let query = Arc::new(QueryService::new(
        embedder.clone(),
        store.clone(),
        COLLECTION.to_string(),
        vec![vault.path().to_path_buf()],
    ));

    let shutdown = CancellationToken::new();
    let service = Arc::new(ApiService::new(
        config,
        indexer.clone(),
        query,
        embedder,
        store,
        shutdown.clone(),
    ));

    // Index both files up front.
    for name in ["note.md", "journal/other.md"] {
        let path = vault.path().join(name);
        indexer.index_file(&path).await.expect("index");
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr: SocketAddr = listener.local_addr().expect("addr");
    let app = server::router(service);
    let token = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .expect("serve");
    });

    Stack {
        base_url: format!("http://{addr}"),
        primary,
        vault,
        shutdown,
    }
}

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_failover_shows_up_in_status() {
    let stack = stack().await;

    let url = stack.base_url.clone();
    let status = blocking(move || ApiClient::new(&url).status())
        .await
        .expect("status");
    assert_eq!(
        status.config.get("embedding_model").map(String::as_str),
        Some("primary-model")
    );

    // The primary fails its next call; the search succeeds through the
    // backup and the active model changes.
    stack.primary.fail_next(1);
    let url = stack.base_url.clone();
    blocking(move || {
        ApiClient::new(&url).search(&SearchRequest {
            query: "fresh query through the fallback".to_string(),
            limit: 5,
            offset: 0,
            min_score: 0.0,
            tags: Vec::new(),
            path_prefix: None,
        })
    })
    .await
    .expect("search succeeds via backup");

    let url = stack.base_url.clone();
    let status = blocking(move || ApiClient::new(&url).status())
        .await
        .expect("status");
    assert_eq!(
        status.config.get("embedding_model").map(String::as_str),
        Some("backup-model")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn get_search_supports_repeated_tags_and_prefix() {
    let stack = stack().await;

    // Tag filter keeps only the frontmatter-tagged note.
    let url = format!(
        "{}/api/v1/search/query?q=alpha&min_score=0&tag=work&tag=other",
        stack.base_url
    );
    let hits: Vec<serde_json::Value> = blocking(move || {
        let agent: ureq::Agent = ureq::Agent::config_builder().build().into();
        agent
            .get(&url)
            .call()
            .expect("call")
            .body_mut()
            .read_json()
            .expect("json")
    })
    .await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["path"], "note.md");

    // Path prefix narrows to the journal subtree.
    let url = format!(
        "{}/api/v1/search/query?q=beta&min_score=0&path_prefix=journal/",
        stack.base_url
    );
    let hits: Vec<serde_json::Value> = blocking(move || {
        let agent: ureq::Agent = ureq::Agent::config_builder().build().into();
        agent
            .get(&url)
            .call()
            .expect("call")
            .body_mut()
            .read_json()
            .expect("json")
    })
    .await;
    assert!(!hits.is_empty());
    for hit in &hits {
        assert!(hit["path"].as_str().expect("path").starts_with("journal/"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn similar_over_http_excludes_the_reference_file() {
    let stack = stack().await;

    let url = stack.base_url.clone();
    let reference = stack
        .vault
        .path()
        .join("note.md")
        .display()
        .to_string();
    let hits = blocking(move || {
        ApiClient::new(&url).similar(&vaultfind::api::SimilarRequest {
            file_path: reference,
            limit: 10,
        })
    })
    .await
    .expect("similar");

    assert!(hits.iter().all(|h| h.path != "note.md"));
}
