use super::*;
use crate::test_support::ScriptedEmbedder;
use std::sync::Arc;

fn scripted(name: &str) -> Arc<ScriptedEmbedder> {
    Arc::new(ScriptedEmbedder::new(
        name,
        4,
        vec![
            ("alpha", vec![1.0, 0.0, 0.0, 0.0]),
            ("beta", vec![0.0, 1.0, 0.0, 0.0]),
            ("gamma", vec![0.0, 0.0, 1.0, 0.0]),
        ],
    ))
}

#[tokio::test]
async fn cache_skips_repeat_remote_calls() {
    let inner = scripted("m");
    let cached = CachedEmbedder::new(inner.clone());

    let first = cached.embed("alpha").await.expect("embed");
    let second = cached.embed("alpha").await.expect("embed");

    assert_eq!(first, second);
    assert_eq!(inner.call_count(), 1);
    assert_eq!(cached.cached_count(), 1);
}

#[tokio::test]
async fn cache_batch_mixes_hits_and_misses_in_order() {
    let inner = scripted("m");
    let cached = CachedEmbedder::new(inner.clone());

    cached.embed("alpha").await.expect("warm cache");
    assert_eq!(inner.call_count(), 1);

    let texts = vec![
        "beta".to_string(),
        "alpha".to_string(),
        "gamma".to_string(),
    ];
    let vectors = cached.embed_batch(&texts).await.expect("batch");

    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[0], vec![0.0, 1.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(vectors[2], vec![0.0, 0.0, 1.0, 0.0]);
    // Only one more remote call, covering the two misses.
    assert_eq!(inner.call_count(), 2);
}

#[tokio::test]
async fn cache_is_keyed_by_model() {
    let a = scripted("model-a");
    let cached_a = CachedEmbedder::new(a.clone());
    cached_a.embed("alpha").await.expect("embed");

    // A different model does not see model-a's entries.
    let b = scripted("model-b");
    let cached_b = CachedEmbedder::new(b.clone());
    cached_b.embed("alpha").await.expect("embed");
    assert_eq!(b.call_count(), 1);
}

#[tokio::test]
async fn cache_clears_on_close() {
    let inner = scripted("m");
    let cached = CachedEmbedder::new(inner.clone());
    cached.embed("alpha").await.expect("embed");
    assert_eq!(cached.cached_count(), 1);

    cached.close().await;
    assert_eq!(cached.cached_count(), 0);
}

#[tokio::test]
async fn fallback_uses_primary_when_healthy() {
    let primary = scripted("primary");
    let secondary = scripted("secondary");
    let fallback =
        FallbackEmbedder::new(vec![primary.clone(), secondary.clone()]).expect("providers");

    let vector = fallback.embed("alpha").await.expect("embed");
    assert_eq!(vector, vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(primary.call_count(), 1);
    assert_eq!(secondary.call_count(), 0);
    assert_eq!(fallback.name(), "primary");
}

#[tokio::test]
async fn fallback_promotes_working_provider() {
    let primary = scripted("primary");
    let secondary = scripted("secondary");
    let fallback =
        FallbackEmbedder::new(vec![primary.clone(), secondary.clone()]).expect("providers");

    primary.fail_next(1);
    let vector = fallback.embed("beta").await.expect("fallback succeeds");
    assert_eq!(vector, vec![0.0, 1.0, 0.0, 0.0]);
    assert_eq!(fallback.name(), "secondary");

    // Subsequent calls go straight to the promoted provider.
    fallback.embed("gamma").await.expect("embed");
    assert_eq!(primary.call_count(), 1);
    assert_eq!(secondary.call_count(), 2);
}

#[tokio::test]
async fn fallback_batch_promotes_too() {
    let primary = scripted("primary");
    let secondary = scripted("secondary");
    let fallback =
        FallbackEmbedder::new(vec![primary.clone(), secondary.clone()]).expect("providers");

    primary.fail_always(true);
    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let vectors = fallback.embed_batch(&texts).await.expect("batch");
    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0, 0.0]);
    assert_eq!(fallback.name(), "secondary");
    assert_eq!(fallback.dimensions(), 4);
}

#[tokio::test]
async fn fallback_reports_unavailable_when_all_fail() {
    let primary = scripted("primary");
    let secondary = scripted("secondary");
    primary.fail_always(true);
    secondary.fail_always(true);

    let fallback = FallbackEmbedder::new(vec![primary, secondary]).expect("providers");
    let result = fallback.embed("alpha").await;
    assert!(matches!(result, Err(EmbeddingError::Unavailable(_))));
}

#[test]
fn fallback_requires_at_least_one_provider() {
    assert!(FallbackEmbedder::new(Vec::new()).is_err());
}

#[tokio::test]
async fn cached_fallback_stack_composes() {
    // The production wiring: cache on the outside, fallback inside.
    let primary = scripted("primary");
    let secondary = scripted("secondary");
    let fallback = Arc::new(
        FallbackEmbedder::new(vec![primary.clone(), secondary.clone()]).expect("providers"),
    );
    let cached = CachedEmbedder::new(fallback);

    primary.fail_next(1);
    cached.embed("alpha").await.expect("embed");
    assert_eq!(cached.name(), "secondary");

    // The provider switch changes the cache key, so one repopulating call
    // goes through; afterwards the entry is served from cache.
    cached.embed("alpha").await.expect("embed");
    assert_eq!(secondary.call_count(), 2);
    cached.embed("alpha").await.expect("embed");
    assert_eq!(secondary.call_count(), 2);
}

mod ollama_http {
    use super::*;
    use crate::config::EmbeddingConfig;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ServerState {
        requests: AtomicUsize,
        fail_first: usize,
    }

    /// Answer each input with a vector encoding its batch arrival order, so
    /// reordering bugs are visible in the output.
    async fn embed_handler(
        State(state): State<Arc<ServerState>>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let request_number = state.requests.fetch_add(1, Ordering::SeqCst);
        if request_number < state.fail_first {
            return Json(json!({"embeddings": []}));
        }

        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        let embeddings: Vec<Vec<f32>> = inputs
            .iter()
            .map(|text| {
                let text = text.as_str().unwrap_or_default();
                let marker: f32 = text
                    .strip_prefix("text-")
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(-1.0);
                vec![marker, text.len() as f32]
            })
            .collect();
        Json(json!({"embeddings": embeddings}))
    }

    async fn spawn_server(fail_first: usize) -> (String, Arc<ServerState>) {
        let state = Arc::new(ServerState {
            requests: AtomicUsize::new(0),
            fail_first,
        });
        let app = Router::new()
            .route("/api/embed", post(embed_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        (format!("http://{addr}"), state)
    }

    fn config_for(url: &str, batch_size: usize, max_attempts: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            server_url: url.to_string(),
            dimensions: 2,
            batch_size,
            max_attempts,
            timeout_seconds: 5,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_results_preserve_input_order_across_slices() {
        let (url, state) = spawn_server(0).await;
        let embedder = OllamaEmbedder::new(&config_for(&url, 8, 2));

        let texts: Vec<String> = (0..20).map(|i| format!("text-{i}")).collect();
        let vectors = embedder.embed_batch(&texts).await.expect("batch");

        assert_eq!(vectors.len(), 20);
        for (i, vector) in vectors.iter().enumerate() {
            assert_eq!(vector[0], i as f32, "result {i} out of order");
        }
        // 20 inputs at batch size 8: three requests.
        assert_eq!(state.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn short_responses_are_retried_until_success() {
        let (url, state) = spawn_server(1).await;
        let embedder = OllamaEmbedder::new(&config_for(&url, 8, 3));

        let vector = embedder.embed("text-7").await.expect("embed");
        assert_eq!(vector[0], 7.0);
        assert_eq!(state.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn exhausted_retries_surface_as_mismatch() {
        let (url, _state) = spawn_server(usize::MAX).await;
        let embedder = OllamaEmbedder::new(&config_for(&url, 8, 2));

        let result = embedder.embed("text-1").await;
        assert!(matches!(
            result,
            Err(EmbeddingError::Mismatch { expected: 1, actual: 0 })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_server_is_unavailable() {
        // A port nothing listens on.
        let embedder = OllamaEmbedder::new(&config_for("http://127.0.0.1:1", 8, 1));
        let result = embedder.embed("text-1").await;
        assert!(matches!(result, Err(EmbeddingError::Unavailable(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn probe_checks_the_server() {
        let (url, _state) = spawn_server(0).await;
        let embedder = OllamaEmbedder::new(&config_for(&url, 8, 1));
        assert!(embedder.probe().await.is_ok());

        let dead = OllamaEmbedder::new(&config_for("http://127.0.0.1:1", 8, 1));
        assert!(dead.probe().await.is_err());
    }
}
