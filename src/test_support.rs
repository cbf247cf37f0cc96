//! Thin stub collaborators used only by tests: a scripted embedder and an
//! in-memory vector store. Production code constructs the real clients.

use crate::embedding::{Embedder, EmbeddingError};
use crate::store::{
    CollectionInfo, Distance, PayloadFieldType, PointRecord, ScoredPoint, SearchFilter,
    StoreError, VectorStore,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Embedder answering from a fixed substring → vector table.
///
/// Unmatched texts get a deterministic pseudo-vector derived from their
/// bytes. Failures can be scripted by setting a number of upcoming calls to
/// fail.
pub struct ScriptedEmbedder {
    model_name: String,
    dimensions: usize,
    script: Vec<(String, Vec<f32>)>,
    calls: AtomicUsize,
    fail_remaining: AtomicUsize,
    fail_always: std::sync::atomic::AtomicBool,
}

impl ScriptedEmbedder {
    pub fn new(model_name: &str, dimensions: usize, script: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            model_name: model_name.to_string(),
            dimensions,
            script: script
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            calls: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            fail_always: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Number of embed/embed_batch calls that reached this provider.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make the next `n` calls fail.
    pub fn fail_next(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    /// Make every call fail until cleared.
    pub fn fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    fn check_failure(&self) -> Result<(), EmbeddingError> {
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable(format!(
                "{} is scripted to fail",
                self.model_name
            )));
        }
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(EmbeddingError::Unavailable(format!(
                "{} is scripted to fail",
                self.model_name
            )));
        }
        Ok(())
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return vec![0.0; self.dimensions];
        }
        for (key, vector) in &self.script {
            if text.contains(key.as_str()) {
                return vector.clone();
            }
        }
        pseudo_vector(text, self.dimensions)
    }
}

/// Deterministic unit vector from text bytes; unrelated texts land far apart.
pub fn pseudo_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions.max(1)];
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        state ^= u64::from(byte);
        state = state.wrapping_mul(0x0000_0100_0000_01b3);
        vector[(state % dimensions.max(1) as u64) as usize] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> String {
        self.model_name.clone()
    }

    async fn close(&self) {}
}

struct MemoryCollection {
    dimensions: usize,
    distance: Distance,
    points: BTreeMap<String, PointRecord>,
}

/// Brute-force in-memory vector store.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn score(distance: Distance, query: &[f32], vector: &[f32]) -> f32 {
    if query.len() != vector.len() || query.is_empty() {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(vector).map(|(a, b)| a * b).sum();
    match distance {
        Distance::Dot => dot,
        Distance::Cosine => {
            let norm_q: f32 = query.iter().map(|v| v * v).sum::<f32>().sqrt();
            let norm_v: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm_q < f32::EPSILON || norm_v < f32::EPSILON {
                0.0
            } else {
                dot / (norm_q * norm_v)
            }
        }
        Distance::Euclid => {
            let dist: f32 = query
                .iter()
                .zip(vector)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            -dist
        }
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .lock()
            .expect("store lock")
            .contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), StoreError> {
        self.collections
            .lock()
            .expect("store lock")
            .entry(name.to_string())
            .or_insert_with(|| MemoryCollection {
                dimensions,
                distance,
                points: BTreeMap::new(),
            });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        self.collections.lock().expect("store lock").remove(name);
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, StoreError> {
        let collections = self.collections.lock().expect("store lock");
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        Ok(CollectionInfo {
            status: "green".to_string(),
            vectors_count: collection.points.len() as u64,
            points_count: collection.points.len() as u64,
        })
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().expect("store lock");
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        for point in points {
            if point.vector.len() != target.dimensions {
                return Err(StoreError::InvalidPayload(format!(
                    "vector of length {} in collection of dimension {}",
                    point.vector.len(),
                    target.dimensions
                )));
            }
            target.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut collections = self.collections.lock().expect("store lock");
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        for id in ids {
            target.points.remove(id);
        }
        Ok(())
    }

    async fn get_points(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<PointRecord>, StoreError> {
        let collections = self.collections.lock().expect("store lock");
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| target.points.get(id).cloned())
            .collect())
    }

    async fn get_points_by_path(
        &self,
        collection: &str,
        path: &str,
    ) -> Result<Vec<PointRecord>, StoreError> {
        let collections = self.collections.lock().expect("store lock");
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(target
            .points
            .values()
            .filter(|p| p.payload.get("path").and_then(|v| v.as_str()) == Some(path))
            .cloned()
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u64,
        offset: u64,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let collections = self.collections.lock().expect("store lock");
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut scored: Vec<ScoredPoint> = target
            .points
            .values()
            .filter(|point| {
                let Some(filter) = &filter else { return true };
                let Some(prefix) = &filter.path_prefix else {
                    return true;
                };
                point
                    .payload
                    .get("path")
                    .and_then(|v| v.as_str())
                    .is_some_and(|p| p.starts_with(prefix.as_str()))
            })
            .map(|point| ScoredPoint {
                id: point.id.clone(),
                score: score(target.distance, vector, &point.vector),
                payload: point.payload.clone(),
                vector: Some(point.vector.clone()),
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));

        Ok(scored
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn create_payload_index(
        &self,
        _collection: &str,
        _field: &str,
        _field_type: PayloadFieldType,
    ) -> Result<(), StoreError> {
        Ok(())
    }
}
