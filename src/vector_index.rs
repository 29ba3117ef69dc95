//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers the three operations the pipeline needs
//! from a vector database: make sure a collection exists, upsert points, and
//! run a thresholded similarity search.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`QdrantIndex`] | Qdrant over gRPC via `qdrant-client` (production) |
//! | [`InMemoryIndex`] | brute-force search in process (tests, offline runs) |
//!
//! Chunk payloads are stored as flat Qdrant payload fields: `text`,
//! `source`, `page`, and `chunk`.

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CollectionInfo, CreateCollectionBuilder, Distance as QdrantDistance, PointStruct,
    ScoredPoint as QdrantScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant, QdrantError};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::config::VectorIndexConfig;
use crate::embedding::cosine_similarity;
use crate::error::{ConfigError, IndexError};
use crate::models::{ChunkPayload, IndexPoint, ScoredPoint};

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
}

impl Distance {
    fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => cosine_similarity(a, b),
        }
    }
}

impl From<Distance> for QdrantDistance {
    fn from(distance: Distance) -> Self {
        match distance {
            Distance::Cosine => QdrantDistance::Cosine,
        }
    }
}

/// A store of (id, vector, payload) points with similarity search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist yet.
    ///
    /// An existing collection with a different vector width is an error.
    async fn ensure_collection(
        &self,
        name: &str,
        dims: usize,
        distance: Distance,
    ) -> Result<(), IndexError>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<(), IndexError>;

    /// Return up to `top_k` points scoring at least `score_threshold`,
    /// ordered by descending score.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, IndexError>;
}

// ============ Qdrant ============

/// A [`VectorIndex`] backed by [Qdrant](https://qdrant.tech/).
///
/// Connects to the gRPC port (`http://localhost:6334` by default) and sends
/// `QDRANT_API_KEY` when it is set.
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    pub fn new(url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self, ConfigError> {
        let client = Qdrant::from_url(url)
            .api_key(api_key)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConfigError::Missing(format!("usable Qdrant client for {}: {}", url, e)))?;
        Ok(Self { client })
    }

    fn map_err(e: QdrantError) -> IndexError {
        IndexError::new("qdrant", e.to_string())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dims: usize,
        distance: Distance,
    ) -> Result<(), IndexError> {
        let exists = self.client.collection_exists(name).await.map_err(Self::map_err)?;
        if exists {
            let info = self.client.collection_info(name).await.map_err(Self::map_err)?;
            check_dims(name, info.result.as_ref().and_then(existing_dims), dims)?;
            tracing::info!(collection = name, "using existing collection");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dims as u64,
                    QdrantDistance::from(distance),
                )),
            )
            .await
            .map_err(Self::map_err)?;

        tracing::info!(collection = name, dims, "created new collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<(), IndexError> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points: Vec<PointStruct> = points.into_iter().map(to_point).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count, "upserted points to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(collection, vector.to_vec(), top_k as u64)
                    .score_threshold(score_threshold)
                    .with_payload(true),
            )
            .await
            .map_err(Self::map_err)?;

        response.result.into_iter().map(from_scored_point).collect()
    }
}

/// Vector width of a collection with a single unnamed vector.
fn existing_dims(info: &CollectionInfo) -> Option<u64> {
    let vectors = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match vectors.config.as_ref()? {
        VectorsConfigKind::Params(params) => Some(params.size),
        VectorsConfigKind::ParamsMap(_) => None,
    }
}

fn check_dims(name: &str, existing: Option<u64>, dims: usize) -> Result<(), IndexError> {
    match existing {
        Some(size) if size as usize != dims => Err(IndexError::new(
            "qdrant",
            format!(
                "collection '{}' has {} dims, embedder produces {}",
                name, size, dims
            ),
        )),
        _ => Ok(()),
    }
}

fn to_point(point: IndexPoint) -> PointStruct {
    let mut payload = Payload::new();
    payload.insert("text", point.payload.text);
    payload.insert("source", point.payload.source);
    payload.insert("page", point.payload.page as i64);
    payload.insert("chunk", point.payload.chunk as i64);
    PointStruct::new(point.id, point.vector, payload)
}

fn from_scored_point(point: QdrantScoredPoint) -> Result<ScoredPoint, IndexError> {
    let id = point
        .id
        .and_then(|pid| pid.point_id_options)
        .map(|options| match options {
            PointIdOptions::Uuid(s) => s,
            PointIdOptions::Num(n) => n.to_string(),
        })
        .unwrap_or_default();

    let missing = |field: &str| {
        IndexError::new("qdrant", format!("point {} has no '{}' in its payload", id, field))
    };
    let payload = ChunkPayload {
        text: payload_string(&point.payload, "text").unwrap_or_default(),
        source: payload_string(&point.payload, "source").ok_or_else(|| missing("source"))?,
        page: payload_usize(&point.payload, "page").ok_or_else(|| missing("page"))?,
        chunk: payload_usize(&point.payload, "chunk").ok_or_else(|| missing("chunk"))?,
    };

    Ok(ScoredPoint {
        id,
        score: point.score,
        payload,
    })
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_usize(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<usize> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(n) if *n >= 0 => Some(*n as usize),
        Kind::DoubleValue(d) if *d >= 0.0 && d.fract() == 0.0 => Some(*d as usize),
        _ => None,
    }
}

// ============ In-memory ============

struct Collection {
    dims: usize,
    distance: Distance,
    points: Vec<IndexPoint>,
}

/// In-process [`VectorIndex`] with brute-force scoring over all points.
///
/// Search ties keep insertion order.
#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points stored in a collection (0 if absent).
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, |c| c.points.len()))
            .unwrap_or(0)
    }

    /// Payloads of every stored point, in insertion order.
    pub fn payloads(&self, collection: &str) -> Vec<ChunkPayload> {
        self.collections
            .read()
            .map(|c| {
                c.get(collection)
                    .map(|c| c.points.iter().map(|p| p.payload.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

fn poisoned() -> IndexError {
    IndexError::new("memory", "index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dims: usize,
        distance: Distance,
    ) -> Result<(), IndexError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        match collections.get(name) {
            Some(existing) if existing.dims != dims => Err(IndexError::new(
                "memory",
                format!(
                    "collection '{}' has {} dims, embedder produces {}",
                    name, existing.dims, dims
                ),
            )),
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    name.to_string(),
                    Collection {
                        dims,
                        distance,
                        points: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<(), IndexError> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let target = collections.get_mut(collection).ok_or_else(|| {
            IndexError::new("memory", format!("collection not found: {}", collection))
        })?;

        for point in points {
            if point.vector.len() != target.dims {
                return Err(IndexError::new(
                    "memory",
                    format!(
                        "point {} has {} dims, collection expects {}",
                        point.id,
                        point.vector.len(),
                        target.dims
                    ),
                ));
            }
            match target.points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => target.points.push(point),
            }
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredPoint>, IndexError> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        let target = collections.get(collection).ok_or_else(|| {
            IndexError::new("memory", format!("collection not found: {}", collection))
        })?;

        let mut scored: Vec<ScoredPoint> = target
            .points
            .iter()
            .map(|p| ScoredPoint {
                id: p.id.clone(),
                score: target.distance.score(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .filter(|p| p.score >= score_threshold)
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Create the configured [`VectorIndex`].
pub fn create_index(config: &VectorIndexConfig) -> Result<Arc<dyn VectorIndex>, ConfigError> {
    match config.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantIndex::new(
            &config.url,
            std::env::var("QDRANT_API_KEY").ok(),
            config.timeout_secs,
        )?)),
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        other => Err(ConfigError::Missing(format!(
            "known vector index backend (got '{}')",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>) -> IndexPoint {
        IndexPoint {
            id: id.to_string(),
            vector,
            payload: ChunkPayload {
                text: format!("text of {}", id),
                source: "mem.pdf".to_string(),
                page: 0,
                chunk: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_search_orders_and_thresholds() {
        let index = InMemoryIndex::new();
        index.ensure_collection("c", 2, Distance::Cosine).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("far", vec![0.0, 1.0]),
                    point("near", vec![1.0, 0.1]),
                    point("exact", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0], 5, 0.6).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert!(hits.iter().all(|h| h.score >= 0.6));

        let top1 = index.search("c", &[1.0, 0.0], 1, 0.0).await.unwrap();
        assert_eq!(top1.len(), 1);
        assert_eq!(top1[0].id, "exact");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let index = InMemoryIndex::new();
        index.ensure_collection("c", 2, Distance::Cosine).await.unwrap();
        index.upsert("c", vec![point("a", vec![1.0, 0.0])]).await.unwrap();
        index.upsert("c", vec![point("a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.len("c"), 1);
    }

    #[tokio::test]
    async fn test_dimension_checks() {
        let index = InMemoryIndex::new();
        index.ensure_collection("c", 3, Distance::Cosine).await.unwrap();
        assert!(index.ensure_collection("c", 3, Distance::Cosine).await.is_ok());
        assert!(index.ensure_collection("c", 4, Distance::Cosine).await.is_err());
        assert!(index.upsert("c", vec![point("a", vec![1.0])]).await.is_err());
    }

    #[test]
    fn test_qdrant_point_payload() {
        let id = "6f1c1c5e-7b7a-4a43-9a4c-1f2e3d4c5b6a";
        let qpoint = to_point(IndexPoint {
            id: id.to_string(),
            vector: vec![0.5, 0.5],
            payload: ChunkPayload {
                text: "Warm milk before bed.".to_string(),
                source: "sleep.pdf".to_string(),
                page: 2,
                chunk: 7,
            },
        });

        assert!(matches!(
            qpoint.id.and_then(|p| p.point_id_options),
            Some(PointIdOptions::Uuid(ref s)) if s == id
        ));
        let kind = |key: &str| qpoint.payload.get(key).and_then(|v| v.kind.clone());
        assert_eq!(kind("source"), Some(Kind::StringValue("sleep.pdf".into())));
        assert_eq!(kind("page"), Some(Kind::IntegerValue(2)));
        assert_eq!(kind("chunk"), Some(Kind::IntegerValue(7)));
    }

    #[test]
    fn test_qdrant_scored_point_parsing() {
        let mut payload = HashMap::new();
        payload.insert("source".to_string(), QdrantValue::from("night.md"));
        payload.insert("page".to_string(), QdrantValue::from(0_i64));
        payload.insert("chunk".to_string(), QdrantValue::from(3.0_f64));
        let point = QdrantScoredPoint {
            id: Some(42_u64.into()),
            payload,
            score: 0.87,
            ..Default::default()
        };

        let parsed = from_scored_point(point).unwrap();
        assert_eq!(parsed.id, "42");
        assert_eq!(parsed.payload.text, "");
        assert_eq!(parsed.payload.source, "night.md");
        assert_eq!(parsed.payload.chunk, 3);
        assert!((parsed.score - 0.87).abs() < 1e-6);

        let bare = QdrantScoredPoint {
            id: Some(7_u64.into()),
            score: 0.9,
            ..Default::default()
        };
        let err = from_scored_point(bare).unwrap_err();
        assert!(err.message.contains("source"));
    }

    #[test]
    fn test_qdrant_existing_collection_dims() {
        use qdrant_client::qdrant::{CollectionConfig, CollectionParams, VectorParams, VectorsConfig};

        let info = CollectionInfo {
            config: Some(CollectionConfig {
                params: Some(CollectionParams {
                    vectors_config: Some(VectorsConfig {
                        config: Some(VectorsConfigKind::Params(VectorParams {
                            size: 384,
                            distance: QdrantDistance::Cosine.into(),
                            ..Default::default()
                        })),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(existing_dims(&info), Some(384));
        assert_eq!(existing_dims(&CollectionInfo::default()), None);
        assert!(check_dims("docs", Some(384), 384).is_ok());
        assert!(check_dims("docs", None, 384).is_ok());
        let err = check_dims("docs", Some(384), 768).unwrap_err();
        assert!(err.message.contains("384"));
        assert!(err.message.contains("768"));
    }

    #[tokio::test]
    async fn test_missing_collection() {
        let index = InMemoryIndex::new();
        assert!(index.search("nope", &[1.0], 3, 0.0).await.is_err());
        assert_eq!(index.len("nope"), 0);
    }
}
