use std::cmp::Ordering;

use async_trait::async_trait;

use super::vector_store::{VectorStore, VectorStoreDocument, VectorStoreSearchResult};

/// Brute-force cosine similarity store. Documents keep their load order, which
/// breaks score ties.
#[derive(Debug, Clone, Default)]
pub struct InMemoryVectorStore {
    collection_name: String,
    documents: Vec<VectorStoreDocument>,
}

impl InMemoryVectorStore {
    pub fn new(collection_name: &str) -> Self {
        InMemoryVectorStore {
            collection_name: collection_name.to_string(),
            documents: Vec::new(),
        }
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn similarity_search_by_vector(&self, query_embedding: &[f32], k: usize) -> Vec<VectorStoreSearchResult> {
        let mut results: Vec<VectorStoreSearchResult> = self
            .documents
            .iter()
            .filter_map(|document| {
                document.vector.as_ref().map(|vector| VectorStoreSearchResult {
                    document: document.clone(),
                    score: cosine_similarity(query_embedding, vector),
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(k);
        results
    }

    async fn load_documents(&mut self, documents: Vec<VectorStoreDocument>, overwrite: bool) -> anyhow::Result<()> {
        if overwrite {
            self.documents.clear();
        }

        for document in documents {
            match self.documents.iter_mut().find(|d| d.id == document.id) {
                Some(existing) => *existing = document,
                None => self.documents.push(document),
            }
        }

        Ok(())
    }

    fn search_by_id(&self, id: &str) -> Option<VectorStoreDocument> {
        self.documents.iter().find(|d| d.id == id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn document(id: &str, vector: Option<Vec<f32>>) -> VectorStoreDocument {
        VectorStoreDocument {
            id: id.to_string(),
            text: None,
            vector,
            attributes: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_similarity_search_orders_by_cosine() {
        let mut store = InMemoryVectorStore::new("entities");
        store
            .load_documents(
                vec![
                    document("x", Some(vec![1.0, 0.0])),
                    document("y", Some(vec![0.0, 1.0])),
                    document("xy", Some(vec![1.0, 1.0])),
                    document("none", None),
                ],
                true,
            )
            .await
            .unwrap();

        let results = store.similarity_search_by_vector(&[1.0, 0.1], 2);
        let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "xy"]);
        assert!(results[0].score > results[1].score);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_load_without_overwrite_replaces_same_id() {
        let mut store = InMemoryVectorStore::new("entities");
        store.load_documents(vec![document("a", None)], true).await.unwrap();
        store
            .load_documents(vec![document("a", Some(vec![1.0])), document("b", None)], false)
            .await
            .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.search_by_id("a").unwrap().vector, Some(vec![1.0]));
    }

    #[test]
    fn test_cosine_similarity_edge_cases() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    }
}
