//! Ingestion pipeline: document → pages → chunks → embeddings → index.
//!
//! Each document is processed independently. A document that cannot be
//! read, embedded, or stored is logged and skipped; the batch continues.
//!
//! With [`IdPolicy::Random`] every run writes fresh point ids, so ingesting
//! the same folder twice stores every chunk twice. Clear the collection
//! first or use [`IdPolicy::ContentHash`], which derives ids from the
//! chunk's source, position, and text so a re-run overwrites in place.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::chunk::{content_hash, Chunker};
use crate::config::{Config, IngestionConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{ConfigError, DocumentError, EmbeddingError, IndexError};
use crate::models::{DocumentChunk, IndexPoint};
use crate::source::{scan_folder, DocumentSource};
use crate::vector_index::{create_index, Distance, VectorIndex};

/// How point ids are assigned to chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdPolicy {
    /// A random UUID per chunk per run.
    #[default]
    Random,
    /// A UUID derived from (source, page, chunk index, text hash).
    ContentHash,
}

impl std::str::FromStr for IdPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(IdPolicy::Random),
            "content-hash" => Ok(IdPolicy::ContentHash),
            other => Err(ConfigError::Missing(format!(
                "known id policy (got '{}')",
                other
            ))),
        }
    }
}

/// Why a single document failed.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub documents_found: usize,
    pub documents_ingested: usize,
    pub documents_failed: usize,
    pub chunks_stored: usize,
    /// `(source id, error message)` for each skipped document.
    pub failures: Vec<(String, String)>,
}

/// Chunks, embeds, and stores documents into one collection.
pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    dims: usize,
    id_policy: IdPolicy,
    batch_size: usize,
    collection_ready: OnceCell<()>,
}

impl Ingestor {
    /// Build an ingestor. Fails if the embedder's width differs from `dims`.
    pub fn new(
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        dims: usize,
    ) -> Result<Self, ConfigError> {
        if embedder.dims() != dims {
            return Err(ConfigError::DimensionMismatch {
                model: embedder.model_name().to_string(),
                expected: dims,
                actual: embedder.dims(),
            });
        }
        Ok(Self {
            chunker,
            embedder,
            index,
            collection: collection.into(),
            dims,
            id_policy: IdPolicy::Random,
            batch_size: 64,
            collection_ready: OnceCell::new(),
        })
    }

    /// Build an ingestor from configuration.
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self, ConfigError> {
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let id_policy = config.ingestion.id_policy.parse()?;
        Ok(Self::new(
            chunker,
            embedder,
            index,
            config.vector_index.collection.clone(),
            config.vector_index.dims,
        )?
        .with_id_policy(id_policy)
        .with_batch_size(config.embedding.batch_size))
    }

    pub fn with_id_policy(mut self, id_policy: IdPolicy) -> Self {
        self.id_policy = id_policy;
        self
    }

    /// Maximum number of chunks sent to the embedder per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Create the backing collection (cosine metric) if it is missing.
    ///
    /// Runs against the index once per ingestor; a failed attempt is retried
    /// on the next call.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        self.collection_ready
            .get_or_try_init(|| async {
                self.index
                    .ensure_collection(&self.collection, self.dims, Distance::Cosine)
                    .await
            })
            .await
            .map(|_| ())
    }

    /// Ingest every matching file under `folder`.
    ///
    /// A missing folder is logged and produces an empty report.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        config: &IngestionConfig,
    ) -> Result<IngestReport, IndexError> {
        let sources = match scan_folder(folder, config) {
            Ok(sources) => sources,
            Err(e) => {
                tracing::error!(folder = %folder.display(), error = %e, "cannot scan document folder");
                return Ok(IngestReport::default());
            }
        };
        tracing::info!(count = sources.len(), folder = %folder.display(), "found documents");

        let sources: Vec<&dyn DocumentSource> =
            sources.iter().map(|s| s as &dyn DocumentSource).collect();
        self.ingest_all(&sources).await
    }

    /// Ingest a batch of documents, isolating per-document failures.
    ///
    /// Only a failure to create the collection aborts the batch.
    pub async fn ingest_all(
        &self,
        sources: &[&dyn DocumentSource],
    ) -> Result<IngestReport, IndexError> {
        self.ensure_collection().await?;

        let mut report = IngestReport {
            documents_found: sources.len(),
            ..IngestReport::default()
        };

        for source in sources {
            tracing::info!(source = source.id(), "starting ingestion");
            match self.ingest_document(*source).await {
                Ok(stored) => {
                    report.documents_ingested += 1;
                    report.chunks_stored += stored;
                    tracing::info!(source = source.id(), chunks = stored, "finished ingestion");
                }
                Err(e) => {
                    report.documents_failed += 1;
                    report.failures.push((source.id().to_string(), e.to_string()));
                    tracing::error!(source = source.id(), error = %e, "error processing document");
                }
            }
        }

        Ok(report)
    }

    /// Ingest one document, returning the number of chunks stored.
    ///
    /// Creates the collection first if this ingestor has not done so yet.
    pub async fn ingest_document(&self, source: &dyn DocumentSource) -> Result<usize, IngestError> {
        self.ensure_collection().await?;
        let pages = source.load()?;
        tracing::info!(source = source.id(), pages = pages.len(), "loaded pages");

        let mut stored = 0;
        for page in &pages {
            let chunks = self.chunk_page(source.id(), page.index, &page.text);
            if chunks.is_empty() {
                continue;
            }
            tracing::debug!(source = source.id(), page = page.index, chunks = chunks.len(), "split page");

            for batch in chunks.chunks(self.batch_size) {
                stored += self.store_batch(batch).await?;
            }
        }

        Ok(stored)
    }

    async fn store_batch(&self, batch: &[DocumentChunk]) -> Result<usize, IngestError> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::new(
                self.embedder.model_name(),
                format!("expected {} vectors, got {}", batch.len(), vectors.len()),
            )
            .into());
        }

        let points: Vec<IndexPoint> = batch
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexPoint {
                id: chunk.id.clone(),
                vector,
                payload: chunk.payload(),
            })
            .collect();

        self.index.upsert(&self.collection, points).await?;
        Ok(batch.len())
    }

    /// Split one page into identified chunks.
    ///
    /// Windows holding only whitespace are dropped, so a page of trailing
    /// blank space yields fewer chunks and its chunk indices may have gaps.
    pub fn chunk_page(&self, source: &str, page: usize, text: &str) -> Vec<DocumentChunk> {
        self.chunker
            .chunks(text)
            .enumerate()
            .filter(|(_, piece)| !piece.trim().is_empty())
            .map(|(chunk_index, piece)| DocumentChunk {
                id: self.point_id(source, page, chunk_index, piece),
                source: source.to_string(),
                page,
                chunk_index,
                text: piece.to_string(),
            })
            .collect()
    }

    fn point_id(&self, source: &str, page: usize, chunk_index: usize, piece: &str) -> String {
        let id = match self.id_policy {
            IdPolicy::Random => Uuid::new_v4(),
            IdPolicy::ContentHash => {
                let key = format!(
                    "{}\u{0}{}\u{0}{}\u{0}{}",
                    source,
                    page,
                    chunk_index,
                    content_hash(piece)
                );
                Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
            }
        };
        id.to_string()
    }
}

/// `diner ingest`: ingest the configured folder (or `folder`) with the
/// configured embedder and index. `dedup` forces content-hash ids.
pub async fn run_ingest(
    config: &Config,
    folder: Option<&Path>,
    dedup: bool,
) -> anyhow::Result<IngestReport> {
    let embedder = create_embedder(&config.embedding)?;
    let index = create_index(&config.vector_index)?;
    let mut ingestor = Ingestor::from_config(config, embedder, index)?;
    if dedup {
        ingestor = ingestor.with_id_policy(IdPolicy::ContentHash);
    }

    let folder = folder.unwrap_or(config.ingestion.folder.as_path());
    let report = ingestor.ingest_folder(folder, &config.ingestion).await?;

    tracing::info!(
        found = report.documents_found,
        ingested = report.documents_ingested,
        failed = report.documents_failed,
        chunks = report.chunks_stored,
        "ingestion complete"
    );
    Ok(report)
}
