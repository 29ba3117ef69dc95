//! Error taxonomy for the retrieval and generation core.
//!
//! Each component reports a narrow error type; [`RagError`] aggregates the
//! failures that can abort a single chat request. The CLI and server edges
//! convert these into `anyhow::Error` or HTTP responses.

use thiserror::Error;

/// Invalid or missing configuration. Fatal for the component being built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Chunk window parameters that cannot produce a valid sequence.
    #[error("invalid chunk configuration: overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidConfiguration { size: usize, overlap: usize },

    /// The embedder and the vector collection disagree on vector width.
    #[error("embedding dimension mismatch: model '{model}' produces {actual} dims, collection expects {expected}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// A required setting or secret is absent.
    #[error("missing setting: {0}")]
    Missing(String),
}

/// A document that could not be read or parsed. Ingestion skips it.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF {path}: {message}")]
    Pdf { path: String, message: String },

    #[error("unsupported document type: {0}")]
    Unsupported(String),
}

/// Failure talking to an embedding backend.
#[derive(Debug, Error)]
#[error("embedding error ({provider}): {message}")]
pub struct EmbeddingError {
    pub provider: String,
    pub message: String,
}

impl EmbeddingError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Failure talking to the vector index.
#[derive(Debug, Error)]
#[error("vector index error ({backend}): {message}")]
pub struct IndexError {
    pub backend: String,
    pub message: String,
}

impl IndexError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// An LLM call failed. Propagated to the caller; never retried by the
/// orchestrator.
#[derive(Debug, Error)]
#[error("generation failed ({provider}): {message}")]
pub struct GenerationError {
    pub provider: String,
    pub message: String,
}

impl GenerationError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// A chat turn that cannot cross the persistence boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown role type: {0}")]
    UnknownRole(String),

    #[error("cannot serialize turn with role '{0}'")]
    UnsupportedTurnType(String),
}

/// Persistence failures in the history and user stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("stored history is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Authentication and identity provider failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer ...` header on a protected route.
    #[error("authorization header missing")]
    MissingHeader,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("no signing key matches kid '{0}'")]
    KeyNotFound(String),

    #[error("failed to fetch JWKS: {0}")]
    JwksFetch(String),

    /// The identity provider rejected a sign-up or login.
    #[error("{operation} failed: {message}")]
    Provider { operation: String, message: String },

    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}

/// Any failure that aborts a single chat request.
#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),
}
