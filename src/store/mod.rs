pub mod embedded;
pub mod payload;
pub mod qdrant;


use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub use embedded::EmbeddedStoreServer;
pub use qdrant::QdrantStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Distance metric for a collection. Fixed at create time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "cosine" => Some(Self::Cosine),
            "dot" => Some(Self::Dot),
            "euclid" => Some(Self::Euclid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionInfo {
    pub status: String,
    pub vectors_count: u64,
    pub points_count: u64,
}

/// A stored point: vector plus JSON-shaped payload under a UUID id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: BTreeMap<String, Value>,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: BTreeMap<String, Value>,
    pub vector: Option<Vec<f32>>,
}

/// Server-side filter for search requests. Client-side post-filtering is the
/// query layer's job; this only narrows what the store scans.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub path_prefix: Option<String>,
}

impl SearchFilter {
    pub fn is_empty(&self) -> bool {
        self.path_prefix.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFieldType {
    Text,
    Keyword,
    Integer,
    Float,
}

/// Contract with the external vector-search engine.
///
/// Per-operation failures surface as typed errors; the store client itself
/// does not retry. Callers own retry policy for upserts.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError>;

    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), StoreError>;

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, StoreError>;

    /// Insert or overwrite points. Inputs larger than 100 points are split
    /// into sub-batches of 100 with bounded concurrency.
    async fn upsert_points(&self, collection: &str, points: Vec<PointRecord>)
        -> Result<(), StoreError>;

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), StoreError>;

    async fn get_points(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<PointRecord>, StoreError>;

    /// All points whose payload `path` equals the given value, paginated
    /// through the scroll cursor.
    async fn get_points_by_path(
        &self,
        collection: &str,
        path: &str,
    ) -> Result<Vec<PointRecord>, StoreError>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u64,
        offset: u64,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError>;

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        field_type: PayloadFieldType,
    ) -> Result<(), StoreError>;
}
