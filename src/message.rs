//! Chat turns and their persistence codec.
//!
//! A [`ChatTurn`] carries an explicit [`Role`] tag. [`encode`] and
//! [`decode`] map turns to and from [`MessageRecord`], the plain JSON shape
//! stored per user:
//!
//! ```json
//! { "role": "human", "content": "...", "additional_kwargs": {}, "response_metadata": {} }
//! ```
//!
//! Only `human`, `system` and `ai` turns are persisted. `tool` turns are
//! transient and fail to encode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Human,
    System,
    Ai,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::System => "system",
            Role::Ai => "ai",
            Role::Tool => "tool",
        }
    }

    /// Speaker label used when rendering history into a prompt.
    pub fn speaker(&self) -> &'static str {
        match self {
            Role::Human => "Human",
            Role::System => "System",
            Role::Ai => "AI",
            Role::Tool => "Tool",
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    pub additional_kwargs: Map<String, Value>,
    pub response_metadata: Map<String, Value>,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            additional_kwargs: Map::new(),
            response_metadata: Map::new(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self::new(Role::Human, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self::new(Role::Ai, content)
    }
}

/// Storage form of a [`ChatTurn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub additional_kwargs: Map<String, Value>,
    #[serde(default)]
    pub response_metadata: Map<String, Value>,
}

/// Convert a turn into its storage record.
pub fn encode(turn: &ChatTurn) -> Result<MessageRecord, CodecError> {
    match turn.role {
        Role::Human | Role::System | Role::Ai => Ok(MessageRecord {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
            additional_kwargs: turn.additional_kwargs.clone(),
            response_metadata: turn.response_metadata.clone(),
        }),
        Role::Tool => Err(CodecError::UnsupportedTurnType(
            turn.role.as_str().to_string(),
        )),
    }
}

/// Convert a storage record back into a turn.
pub fn decode(record: &MessageRecord) -> Result<ChatTurn, CodecError> {
    let role = match record.role.as_str() {
        "human" => Role::Human,
        "system" => Role::System,
        "ai" => Role::Ai,
        other => return Err(CodecError::UnknownRole(other.to_string())),
    };
    Ok(ChatTurn {
        role,
        content: record.content.clone(),
        additional_kwargs: record.additional_kwargs.clone(),
        response_metadata: record.response_metadata.clone(),
    })
}

/// Encode a whole history, failing on the first unsupported turn.
pub fn encode_all(turns: &[ChatTurn]) -> Result<Vec<MessageRecord>, CodecError> {
    turns.iter().map(encode).collect()
}

/// Decode a whole history, failing on the first unknown role.
pub fn decode_all(records: &[MessageRecord]) -> Result<Vec<ChatTurn>, CodecError> {
    records.iter().map(decode).collect()
}
