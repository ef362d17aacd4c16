use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EmbeddedRecord, SearchResult, VectorStore, VectorStoreError};
use crate::models::ReferenceCategory;

/// Brute-force cosine store for tests and local runs.
#[derive(Default)]
pub struct MemoryVectorStore {
    records: RwLock<HashMap<String, EmbeddedRecord>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, record: EmbeddedRecord) -> Result<(), VectorStoreError> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.values().next() {
            if existing.vector.len() != record.vector.len() {
                return Err(VectorStoreError::InvalidDimension {
                    expected: existing.vector.len(),
                    actual: record.vector.len(),
                });
            }
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        category: ReferenceCategory,
        limit: u64,
    ) -> Result<Vec<SearchResult>, VectorStoreError> {
        let records = self.records.read().await;
        let mut hits: Vec<SearchResult> = records
            .values()
            .filter(|r| r.category == category)
            .map(|r| SearchResult {
                id: r.id.clone(),
                score: cosine(vector, &r.vector),
                text: r.text.clone(),
                category: r.category.as_str().to_string(),
                metadata: serde_json::Map::from_iter([(
                    "source".to_string(),
                    serde_json::Value::String(r.source.clone()),
                )]),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<(), VectorStoreError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn delete_source(
        &self,
        category: ReferenceCategory,
        source: &str,
    ) -> Result<(), VectorStoreError> {
        self.records
            .write()
            .await
            .retain(|_, r| r.category != category || r.source != source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, category: ReferenceCategory, vector: Vec<f32>) -> EmbeddedRecord {
        EmbeddedRecord {
            id: id.to_string(),
            category,
            source: "rubric".to_string(),
            text: format!("text of {id}"),
            vector,
        }
    }

    #[tokio::test]
    async fn test_query_filters_by_category_and_ranks() {
        let store = MemoryVectorStore::new();
        store
            .upsert(record("jd_0", ReferenceCategory::JobDescription, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(record("jd_1", ReferenceCategory::JobDescription, vec![0.6, 0.8]))
            .await
            .unwrap();
        store
            .upsert(record("cs_0", ReferenceCategory::CaseStudy, vec![1.0, 0.0]))
            .await
            .unwrap();

        let hits = store
            .query(&[1.0, 0.0], ReferenceCategory::JobDescription, 5)
            .await
            .unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["jd_0", "jd_1"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!(hits.iter().all(|h| h.category == "job_description"));
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_source_removes() {
        let store = MemoryVectorStore::new();
        store
            .upsert(record("a", ReferenceCategory::CvRubric, vec![1.0]))
            .await
            .unwrap();
        store
            .upsert(record("a", ReferenceCategory::CvRubric, vec![2.0]))
            .await
            .unwrap();
        store
            .upsert(record("b", ReferenceCategory::ProjectRubric, vec![1.0]))
            .await
            .unwrap();
        assert_eq!(store.len().await, 2);

        store.delete("missing").await.unwrap();
        assert_eq!(store.len().await, 2);
        store
            .delete_source(ReferenceCategory::CvRubric, "rubric")
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
        let left = store
            .query(&[1.0], ReferenceCategory::ProjectRubric, 5)
            .await
            .unwrap();
        assert_eq!(left[0].id, "b");
        assert_eq!(left[0].metadata.get("source"), Some(&serde_json::json!("rubric")));

        store.delete("b").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let store = MemoryVectorStore::new();
        store
            .upsert(record("a", ReferenceCategory::CvRubric, vec![1.0, 0.0]))
            .await
            .unwrap();
        let err = store
            .upsert(record("b", ReferenceCategory::CvRubric, vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidDimension { expected: 2, actual: 1 }));
    }
}
