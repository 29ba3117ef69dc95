//! Similarity-threshold retrieval over the vector index.
//!
//! The query is embedded with the same [`Embedder`] used at ingestion and
//! searched against the configured collection. Results are cut by a minimum
//! score and a maximum count, highest score first. An empty result is a
//! normal outcome: the answer step is told the context is empty.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::RagError;
use crate::models::RetrievedDocument;
use crate::vector_index::VectorIndex;

/// Anything that can supply context documents for a query.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Return at most `top_k` documents relevant to `query`, best first.
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>, RagError>;
}

/// Embeds the query and runs a thresholded search on one collection.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    score_threshold: f32,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        score_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            score_threshold,
        }
    }

    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self::new(
            embedder,
            index,
            config.vector_index.collection.clone(),
            config.retrieval.score_threshold,
        )
    }
}

#[async_trait]
impl ContextRetriever for Retriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedDocument>, RagError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        let points = self
            .index
            .search(&self.collection, &vector, top_k, self.score_threshold)
            .await?;

        // Backends are trusted to rank, not to honor the cut.
        let mut documents: Vec<RetrievedDocument> = points
            .into_iter()
            .filter(|p| p.score >= self.score_threshold)
            .map(RetrievedDocument::from)
            .collect();
        documents.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        documents.truncate(top_k);

        tracing::info!(
            count = documents.len(),
            threshold = self.score_threshold,
            "retrieved documents"
        );
        for (rank, doc) in documents.iter().enumerate() {
            tracing::debug!(
                rank = rank + 1,
                score = doc.score,
                source = %doc.metadata.source,
                page = doc.metadata.page,
                chunk = doc.metadata.chunk,
                "retrieved document"
            );
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::models::{ChunkPayload, IndexPoint};
    use crate::vector_index::{Distance, InMemoryIndex};

    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }
        fn dims(&self) -> usize {
            26
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|t| letters(t)).collect())
        }
    }

    fn letters(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; 26];
        for c in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
            v[(c - b'a') as usize] += 1.0;
        }
        v
    }

    const CORPUS: &[&str] = &[
        "grounding techniques for panic attacks",
        "sleep hygiene and evening routines",
        "talking to a friend when you feel lonely",
        "zzz",
        "box breathing in four counts",
        "managing stress at work",
        "writing a gratitude journal",
    ];

    async fn seeded_index() -> Arc<InMemoryIndex> {
        let index = Arc::new(InMemoryIndex::new());
        index
            .ensure_collection("docs", 26, Distance::Cosine)
            .await
            .unwrap();
        let points = CORPUS
            .iter()
            .enumerate()
            .map(|(i, text)| IndexPoint {
                id: format!("p{}", i),
                vector: letters(text),
                payload: ChunkPayload {
                    text: text.to_string(),
                    source: "corpus.pdf".to_string(),
                    page: 0,
                    chunk: i,
                },
            })
            .collect();
        index.upsert("docs", points).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_exact_text_is_top_hit() {
        let retriever = Retriever::new(Arc::new(LetterEmbedder), seeded_index().await, "docs", 0.6);

        let docs = retriever
            .retrieve("sleep hygiene and evening routines", 5)
            .await
            .unwrap();
        assert_eq!(docs[0].text, "sleep hygiene and evening routines");
        assert!(docs[0].score > 0.999);
    }

    #[tokio::test]
    async fn test_threshold_and_limit() {
        let retriever = Retriever::new(Arc::new(LetterEmbedder), seeded_index().await, "docs", 0.6);

        for query in ["panic", "breathing", "lonely friend", "stress"] {
            for top_k in 1..=CORPUS.len() {
                let docs = retriever.retrieve(query, top_k).await.unwrap();
                assert!(docs.len() <= top_k);
                assert!(docs.iter().all(|d| d.score >= 0.6));
                assert!(docs.windows(2).all(|w| w[0].score >= w[1].score));
            }
        }
    }

    #[tokio::test]
    async fn test_no_match_is_empty() {
        let retriever = Retriever::new(Arc::new(LetterEmbedder), seeded_index().await, "docs", 0.99);

        let docs = retriever.retrieve("qqqq", 5).await.unwrap();
        assert!(docs.is_empty());
        assert!(retriever.retrieve("anything", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_carried() {
        let retriever = Retriever::new(Arc::new(LetterEmbedder), seeded_index().await, "docs", 0.6);

        let docs = retriever.retrieve("zzz", 1).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].metadata.id, "p3");
        assert_eq!(docs[0].metadata.source, "corpus.pdf");
        assert_eq!(docs[0].metadata.chunk, 3);
    }
}
