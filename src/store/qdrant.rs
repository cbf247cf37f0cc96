use super::payload::{from_store_payload, to_store_payload};
use super::{
    CollectionInfo, Distance, PayloadFieldType, PointRecord, ScoredPoint, SearchFilter,
    StoreError, VectorStore,
};
use crate::config::QdrantConfig;
use async_trait::async_trait;
use qdrant_client::qdrant::r#match::MatchValue;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance as StoreDistance, FieldType,
    Filter, GetPointsBuilder, PointId, PointStruct, PointsIdsList, RetrievedPoint,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    VectorsOutput,
};
use qdrant_client::{Payload, Qdrant};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const BATCH_SIZE: usize = 100;
const BATCH_CONCURRENCY: usize = 4;

/// Client for an external (or supervised embedded) Qdrant instance.
pub struct QdrantStore {
    client: Arc<Qdrant>,
}

impl QdrantStore {
    /// Connect and verify the server answers. Failure here is fatal to the
    /// daemon, per the startup policy.
    pub async fn connect(config: &QdrantConfig) -> Result<Self, StoreError> {
        let url = format!("http://{}:{}", config.host, config.port);
        debug!(%url, "connecting to vector store");

        let mut builder = Qdrant::from_url(&url);
        if !config.api_key.is_empty() {
            builder = builder.api_key(config.api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| StoreError::Unavailable(format!("failed to build client: {e}")))?;

        client
            .health_check()
            .await
            .map_err(|e| StoreError::Unavailable(format!("health check failed for {url}: {e}")))?;

        info!(%url, "connected to vector store");
        Ok(Self {
            client: Arc::new(client),
        })
    }

    fn map_err(err: qdrant_client::QdrantError) -> StoreError {
        StoreError::Unavailable(err.to_string())
    }
}

fn to_store_distance(distance: Distance) -> StoreDistance {
    match distance {
        Distance::Cosine => StoreDistance::Cosine,
        Distance::Dot => StoreDistance::Dot,
        Distance::Euclid => StoreDistance::Euclid,
    }
}

fn point_id_string(id: Option<&PointId>) -> String {
    match id.and_then(|p| p.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn vector_data(vectors: Option<&VectorsOutput>) -> Vec<f32> {
    match vectors.and_then(|v| v.vectors_options.as_ref()) {
        Some(VectorsOptions::Vector(vector)) => vector.data.clone(),
        _ => Vec::new(),
    }
}

fn to_point_struct(record: PointRecord) -> PointStruct {
    let mut payload = Payload::new();
    for (key, value) in to_store_payload(&record.payload) {
        payload.insert(key, value);
    }
    PointStruct::new(record.id, record.vector, payload)
}

fn to_point_record(point: RetrievedPoint) -> PointRecord {
    PointRecord {
        id: point_id_string(point.id.as_ref()),
        vector: vector_data(point.vectors.as_ref()),
        payload: from_store_payload(&point.payload),
    }
}

fn to_filter(filter: &SearchFilter) -> Option<Filter> {
    let prefix = filter.path_prefix.as_ref()?;
    Some(Filter::must([Condition::matches(
        "path",
        MatchValue::Text(prefix.clone()),
    )]))
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.client
            .collection_exists(name)
            .await
            .map_err(Self::map_err)
    }

    async fn create_collection(
        &self,
        name: &str,
        dimensions: usize,
        distance: Distance,
    ) -> Result<(), StoreError> {
        if self.collection_exists(name).await? {
            debug!(collection = name, "collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dimensions as u64,
                    to_store_distance(distance),
                )),
            )
            .await
            .map_err(Self::map_err)?;

        info!(collection = name, dimensions, "created collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), StoreError> {
        self.client
            .delete_collection(name)
            .await
            .map_err(Self::map_err)?;
        info!(collection = name, "deleted collection");
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo, StoreError> {
        let response = self
            .client
            .collection_info(name)
            .await
            .map_err(Self::map_err)?;

        let info = response
            .result
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        Ok(CollectionInfo {
            status: format!("{:?}", info.status()).to_lowercase(),
            vectors_count: info.vectors_count.unwrap_or_default(),
            points_count: info.points_count.unwrap_or_default(),
        })
    }

    async fn upsert_points(
        &self,
        collection: &str,
        points: Vec<PointRecord>,
    ) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let structs: Vec<PointStruct> = points.into_iter().map(to_point_struct).collect();

        if structs.len() <= BATCH_SIZE {
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, structs).wait(true))
                .await
                .map_err(Self::map_err)?;
            return Ok(());
        }

        debug!(
            collection,
            total = structs.len(),
            "upserting points in batches"
        );

        let semaphore = Arc::new(Semaphore::new(BATCH_CONCURRENCY));
        let mut tasks = JoinSet::new();

        let mut batches: Vec<Vec<PointStruct>> = Vec::new();
        let mut structs = structs;
        while !structs.is_empty() {
            let rest = structs.split_off(structs.len().min(BATCH_SIZE));
            batches.push(structs);
            structs = rest;
        }

        for batch in batches {
            let client = Arc::clone(&self.client);
            let semaphore = Arc::clone(&semaphore);
            let collection = collection.to_string();
            tasks.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore open");
                client
                    .upsert_points(UpsertPointsBuilder::new(collection, batch).wait(true))
                    .await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            joined
                .map_err(|e| StoreError::Unavailable(format!("batch task failed: {e}")))?
                .map_err(Self::map_err)?;
        }

        Ok(())
    }

    async fn delete_points(&self, collection: &str, ids: &[String]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }

        for batch in ids.chunks(BATCH_SIZE) {
            let point_ids: Vec<PointId> = batch.iter().map(|id| id.clone().into()).collect();
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection)
                        .points(PointsIdsList { ids: point_ids })
                        .wait(true),
                )
                .await
                .map_err(Self::map_err)?;
        }

        debug!(collection, count = ids.len(), "deleted points");
        Ok(())
    }

    async fn get_points(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<PointRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(ids.len());
        for batch in ids.chunks(BATCH_SIZE) {
            let point_ids: Vec<PointId> = batch.iter().map(|id| id.clone().into()).collect();
            let response = self
                .client
                .get_points(
                    GetPointsBuilder::new(collection, point_ids)
                        .with_payload(true)
                        .with_vectors(true),
                )
                .await
                .map_err(Self::map_err)?;
            records.extend(response.result.into_iter().map(to_point_record));
        }

        Ok(records)
    }

    async fn get_points_by_path(
        &self,
        collection: &str,
        path: &str,
    ) -> Result<Vec<PointRecord>, StoreError> {
        let filter = Filter::must([Condition::matches(
            "path",
            MatchValue::Keyword(path.to_string()),
        )]);

        let mut records = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .filter(filter.clone())
                .limit(BATCH_SIZE as u32)
                .with_payload(true)
                .with_vectors(true);
            if let Some(cursor) = offset.take() {
                builder = builder.offset(cursor);
            }

            let response = self.client.scroll(builder).await.map_err(Self::map_err)?;
            let page_len = response.result.len();
            records.extend(response.result.into_iter().map(to_point_record));

            match response.next_page_offset {
                Some(next) if page_len > 0 => offset = Some(next),
                _ => break,
            }
        }

        debug!(collection, path, count = records.len(), "fetched points by path");
        Ok(records)
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: u64,
        offset: u64,
        filter: Option<SearchFilter>,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let mut builder = SearchPointsBuilder::new(collection, vector.to_vec(), limit)
            .offset(offset)
            .with_payload(true)
            .with_vectors(true);

        if let Some(store_filter) = filter.as_ref().and_then(to_filter) {
            builder = builder.filter(store_filter);
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(Self::map_err)?;

        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredPoint {
                id: point_id_string(point.id.as_ref()),
                score: point.score,
                payload: from_store_payload(&point.payload),
                vector: {
                    let data = vector_data(point.vectors.as_ref());
                    if data.is_empty() {
                        None
                    } else {
                        Some(data)
                    }
                },
            })
            .collect())
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        field_type: PayloadFieldType,
    ) -> Result<(), StoreError> {
        let store_type = match field_type {
            PayloadFieldType::Text => FieldType::Text,
            PayloadFieldType::Keyword => FieldType::Keyword,
            PayloadFieldType::Integer => FieldType::Integer,
            PayloadFieldType::Float => FieldType::Float,
        };

        let result = self
            .client
            .create_field_index(
                CreateFieldIndexCollectionBuilder::new(collection, field, store_type).wait(true),
            )
            .await;

        // An index that already exists is not a failure worth surfacing.
        if let Err(e) = result {
            warn!(collection, field, error = %e, "payload index creation failed");
        }

        Ok(())
    }
}
