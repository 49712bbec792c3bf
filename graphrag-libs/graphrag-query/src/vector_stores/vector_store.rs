use std::collections::HashMap;

use async_trait::async_trait;
use graphrag_primitives::llm::base::BaseTextEmbedding;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorStoreSearchResult {
    pub document: VectorStoreDocument,
    /// Cosine similarity between the query and the document vector.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorStoreDocument {
    pub id: String,
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub attributes: HashMap<String, String>,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embeds `text` and returns the `k` most similar documents, best first.
    async fn similarity_search_by_text(
        &self,
        text: &str,
        text_embedder: &dyn BaseTextEmbedding,
        k: usize,
    ) -> anyhow::Result<Vec<VectorStoreSearchResult>> {
        let query_embedding = text_embedder.aembed(text).await?;
        Ok(self.similarity_search_by_vector(&query_embedding, k))
    }

    fn similarity_search_by_vector(&self, query_embedding: &[f32], k: usize) -> Vec<VectorStoreSearchResult>;

    async fn load_documents(&mut self, documents: Vec<VectorStoreDocument>, overwrite: bool) -> anyhow::Result<()>;

    fn search_by_id(&self, id: &str) -> Option<VectorStoreDocument>;
}
