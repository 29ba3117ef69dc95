//! Core data models shared by ingestion, retrieval, and the chat pipeline.

use serde::{Deserialize, Serialize};

/// One page of raw text extracted from a document source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub text: String,
}

/// A chunk of page text ready for embedding.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub id: String,
    pub source: String,
    pub page: usize,
    pub chunk_index: usize,
    pub text: String,
}

impl DocumentChunk {
    pub fn payload(&self) -> ChunkPayload {
        ChunkPayload {
            text: self.text.clone(),
            source: self.source.clone(),
            page: self.page,
            chunk: self.chunk_index,
        }
    }
}

/// Payload stored alongside every vector in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    #[serde(default)]
    pub text: String,
    pub source: String,
    pub page: usize,
    pub chunk: usize,
}

/// A point written to the vector index.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A point returned from a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// A retrieved chunk with its provenance and similarity score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub metadata: DocumentMetadata,
    pub score: f32,
}

/// Provenance of a retrieved chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub id: String,
    pub source: String,
    pub page: usize,
    pub chunk: usize,
}

impl From<ScoredPoint> for RetrievedDocument {
    fn from(point: ScoredPoint) -> Self {
        Self {
            text: point.payload.text,
            metadata: DocumentMetadata {
                id: point.id,
                source: point.payload.source,
                page: point.payload.page,
                chunk: point.payload.chunk,
            },
            score: point.score,
        }
    }
}

/// Persona the user picked for the assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    #[default]
    Girl,
    Boy,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Girl => "girl",
            Persona::Boy => "boy",
        }
    }
}

impl std::str::FromStr for Persona {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "girl" => Ok(Persona::Girl),
            "boy" => Ok(Persona::Boy),
            other => Err(format!("invalid character selection: {}", other)),
        }
    }
}

/// A user record owned by the user store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub identity_id: String,
    pub email: Option<String>,
    pub selected_character: Option<Persona>,
    pub metadata: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_parse() {
        assert_eq!("boy".parse::<Persona>(), Ok(Persona::Boy));
        assert_eq!("girl".parse::<Persona>(), Ok(Persona::Girl));
        assert!("robot".parse::<Persona>().is_err());
        assert_eq!(Persona::default().as_str(), "girl");
    }

    #[test]
    fn test_scored_point_into_document() {
        let point = ScoredPoint {
            id: "p1".into(),
            score: 0.91,
            payload: ChunkPayload {
                text: "breathe slowly".into(),
                source: "data/calm.pdf".into(),
                page: 2,
                chunk: 4,
            },
        };
        let doc = RetrievedDocument::from(point);
        assert_eq!(doc.text, "breathe slowly");
        assert_eq!(doc.metadata.page, 2);
        assert_eq!(doc.metadata.chunk, 4);
        assert_eq!(doc.metadata.id, "p1");
    }
}
