use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};
use uuid::Uuid;

use super::{EmbeddedRecord, SearchResult, VectorStore, VectorStoreError};
use crate::models::ReferenceCategory;

const ID_FIELD: &str = "doc_id";
const CATEGORY_FIELD: &str = "category";
const TEXT_FIELD: &str = "text";
const SOURCE_FIELD: &str = "source";

/// Qdrant-backed [`VectorStore`]. Record ids are mapped to deterministic UUID
/// point ids; the original id travels in the payload.
#[derive(Clone)]
pub struct QdrantStore {
    client: Qdrant,
    url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
    ) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .build()
            .map_err(|e| VectorStoreError::ConnectionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
            collection: collection.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Creates the collection (cosine distance) if it does not exist yet.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<(), VectorStoreError> {
        let create_failed = |e: qdrant_client::QdrantError| VectorStoreError::CreateCollectionFailed {
            collection: self.collection.clone(),
            message: e.to_string(),
        };

        if self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(create_failed)?
        {
            debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(vector_size, Distance::Cosine)),
            )
            .await
            .map_err(create_failed)?;

        info!(collection = %self.collection, vector_size, "created Qdrant collection");
        Ok(())
    }
}

/// Deterministic point id for a record id.
pub fn point_id(record_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes()).to_string()
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn upsert(&self, record: EmbeddedRecord) -> Result<(), VectorStoreError> {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(ID_FIELD.to_string(), record.id.clone().into());
        payload.insert(CATEGORY_FIELD.to_string(), record.category.as_str().into());
        payload.insert(TEXT_FIELD.to_string(), record.text.into());
        payload.insert(SOURCE_FIELD.to_string(), record.source.into());

        let point = PointStruct::new(point_id(&record.id), record.vector, payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]).wait(true))
            .await
            .map_err(|e| VectorStoreError::UpsertFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        category: ReferenceCategory,
        limit: u64,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let search = SearchPointsBuilder::new(&self.collection, vector.to_vec(), limit)
            .filter(Filter::must([Condition::matches(
                CATEGORY_FIELD,
                category.as_str().to_string(),
            )]))
            .with_payload(true);

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| VectorStoreError::SearchFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(response.result.into_iter().map(search_result).collect())
    }

    async fn delete(&self, id: &str) -> Result<(), VectorStoreError> {
        let points = PointsIdsList {
            ids: vec![PointId::from(point_id(id))],
        };

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(points)
                    .wait(true),
            )
            .await
            .map_err(|e| VectorStoreError::DeleteFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn delete_source(
        &self,
        category: ReferenceCategory,
        source: &str,
    ) -> Result<(), VectorStoreError> {
        let filter = Filter::must([
            Condition::matches(CATEGORY_FIELD, category.as_str().to_string()),
            Condition::matches(SOURCE_FIELD, source.to_string()),
        ]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| VectorStoreError::DeleteFailed {
                collection: self.collection.clone(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

fn search_result(point: ScoredPoint) -> SearchResult {
    let mut payload = point.payload;
    let mut take_str = |key: &str| {
        payload
            .remove(key)
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .unwrap_or_default()
    };

    let id = take_str(ID_FIELD);
    let category = take_str(CATEGORY_FIELD);
    let text = take_str(TEXT_FIELD);

    let metadata = payload
        .into_iter()
        .map(|(key, value)| (key, to_json(value)))
        .collect();

    SearchResult {
        id,
        score: point.score,
        text,
        category,
        metadata,
    }
}

fn to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(to_json).collect())
        }
        Some(Kind::StructValue(st)) => serde_json::Value::Object(
            st.fields
                .into_iter()
                .map(|(k, v)| (k, to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic_uuid() {
        let a = point_id("cv_rubric_rubric_chunk_0");
        let b = point_id("cv_rubric_rubric_chunk_0");
        let c = point_id("cv_rubric_rubric_chunk_1");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn test_search_result_splits_known_fields_from_metadata() {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert(ID_FIELD.to_string(), "case_study_brief_chunk_2".into());
        payload.insert(CATEGORY_FIELD.to_string(), "case_study".into());
        payload.insert(TEXT_FIELD.to_string(), "Build an evaluator".into());
        payload.insert("page".to_string(), 3i64.into());

        let point = ScoredPoint {
            payload,
            score: 0.87,
            ..Default::default()
        };

        let result = search_result(point);
        assert_eq!(result.id, "case_study_brief_chunk_2");
        assert_eq!(result.category, "case_study");
        assert_eq!(result.text, "Build an evaluator");
        assert_eq!(result.metadata.get("page"), Some(&serde_json::json!(3)));
        assert_eq!(result.metadata.len(), 1);
    }
}
