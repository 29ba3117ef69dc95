//! TOML configuration.
//!
//! Non-secret settings live in the config file; API keys and client secrets
//! are read from the environment (a `.env` file is loaded at startup).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_score_threshold() -> f32 {
    0.6
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexConfig {
    /// `qdrant` or `memory`.
    #[serde(default = "default_index_backend")]
    pub backend: String,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Vector width of the collection. Must match the embedder.
    #[serde(default = "default_index_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: default_qdrant_url(),
            collection: default_collection(),
            dims: default_index_dims(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_backend() -> String {
    "qdrant".to_string()
}
fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection() -> String {
    "midnight-diner".to_string()
}
fn default_index_dims() -> usize {
    384
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `anthropic` or `ollama`.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_retries(),
            url: None,
        }
    }
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}
fn default_llm_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_retries() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_folder")]
    pub folder: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// `random` (fresh ids every run) or `content-hash` (stable ids).
    #[serde(default = "default_id_policy")]
    pub id_policy: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            id_policy: default_id_policy(),
        }
    }
}

fn default_folder() -> PathBuf {
    PathBuf::from("./data")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}
fn default_id_policy() -> String {
    "random".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Auth0 tenant settings. The client secret is read from `AUTH0_CLIENT_SECRET`.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub domain: String,
    pub audience: String,
    pub client_id: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    #[serde(default = "default_connection")]
    pub connection: String,
}

fn default_algorithm() -> String {
    "RS256".to_string()
}
fn default_connection() -> String {
    "Username-Password-Authentication".to_string()
}

impl EmbeddingConfig {
    /// Model name, falling back to the provider's default.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "openai" => "text-embedding-3-small".to_string(),
            "ollama" => "nomic-embed-text".to_string(),
            _ => "all-minilm-l6-v2".to_string(),
        })
    }
}

impl Config {
    /// A config with defaults everywhere and the given database path.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_index: VectorIndexConfig::default(),
            llm: LlmConfig::default(),
            ingestion: IngestionConfig::default(),
            server: ServerConfig::default(),
            auth: None,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.chunk_overlap,
            config.chunking.chunk_size
        );
    }

    // Validate retrieval
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&config.retrieval.score_threshold) {
        anyhow::bail!("retrieval.score_threshold must be in [-1.0, 1.0]");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    // Validate index
    match config.vector_index.backend.as_str() {
        "qdrant" | "memory" => {}
        other => anyhow::bail!(
            "Unknown vector index backend: '{}'. Must be qdrant or memory.",
            other
        ),
    }
    if config.vector_index.collection.trim().is_empty() {
        anyhow::bail!("vector_index.collection must not be empty");
    }
    if config.vector_index.dims == 0 {
        anyhow::bail!("vector_index.dims must be > 0");
    }

    // Validate LLM
    match config.llm.provider.as_str() {
        "anthropic" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown LLM provider: '{}'. Must be anthropic or ollama.",
            other
        ),
    }

    match config.ingestion.id_policy.as_str() {
        "random" | "content-hash" => {}
        other => anyhow::bail!(
            "Unknown ingestion.id_policy: '{}'. Must be random or content-hash.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/diner.sqlite"
"#;

    #[test]
    fn test_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.chunking.chunk_size, 500);
        assert_eq!(cfg.chunking.chunk_overlap, 100);
        assert_eq!(cfg.retrieval.top_k, 5);
        assert!((cfg.retrieval.score_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(cfg.vector_index.dims, 384);
        assert_eq!(cfg.embedding.model_or_default(), "all-minilm-l6-v2");
        assert_eq!(cfg.ingestion.include_globs, vec!["**/*.pdf"]);
        assert!(cfg.auth.is_none());
    }

    #[test]
    fn test_rejects_bad_overlap() {
        let content = format!("{MINIMAL}\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n");
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn test_rejects_unknown_providers() {
        let content = format!("{MINIMAL}\n[llm]\nprovider = \"mystery\"\n");
        assert!(parse_config(&content).is_err());

        let content = format!("{MINIMAL}\n[vector_index]\nbackend = \"faiss\"\n");
        assert!(parse_config(&content).is_err());

        let content = format!("{MINIMAL}\n[ingestion]\nid_policy = \"sometimes\"\n");
        assert!(parse_config(&content).is_err());
    }

    #[test]
    fn test_auth_section() {
        let content = format!(
            "{MINIMAL}\n[auth]\ndomain = \"diner.eu.auth0.com\"\naudience = \"https://api.diner\"\nclient_id = \"abc\"\n"
        );
        let cfg = parse_config(&content).unwrap();
        let auth = cfg.auth.unwrap();
        assert_eq!(auth.algorithm, "RS256");
        assert_eq!(auth.connection, "Username-Password-Authentication");
    }
}
