//! Chat-turn orchestration: reformulate → retrieve → answer.
//!
//! A [`Conversation`] holds no per-user state; the caller passes the history
//! in and persists the result with [`record_exchange`].
//!
//! Two equivalent entry points exist:
//!
//! - [`Conversation::handle_message`] runs the composed [`RetrievalChain`]
//!   (history-aware retriever feeding the answer step). The HTTP API uses it.
//! - [`Conversation::chat`] runs the same three steps one at a time and is
//!   used by `diner ask --stepwise`.
//!
//! For the same inputs and collaborators both produce the same prompts, the
//! same retrieval query, and the same answer.

use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::{ConfigError, GenerationError, RagError};
use crate::llm::{create_chat_model, ChatModel};
use crate::message::{ChatTurn, Role};
use crate::models::RetrievedDocument;
use crate::prompt::{answer_prompt, reformulation_prompt};
use crate::retriever::{ContextRetriever, Retriever};
use crate::vector_index::{create_index, Distance};

/// Opening system turn stored at the head of every persisted history.
pub const GREETING: &str = "Hello! How can I help you today?";

/// Restate `input` as a standalone question.
///
/// With no history the message is already standalone and the model is not
/// called. A blank model reply also falls back to the original message.
async fn reformulate(
    model: &dyn ChatModel,
    history: &[ChatTurn],
    input: &str,
) -> Result<String, GenerationError> {
    if history.is_empty() {
        return Ok(input.to_string());
    }

    let rephrased = model.complete(&reformulation_prompt(history, input)).await?;
    let rephrased = rephrased.trim();
    if rephrased.is_empty() {
        tracing::warn!("empty reformulation, using original message");
        return Ok(input.to_string());
    }
    tracing::debug!(original = input, rephrased, "reformulated question");
    Ok(rephrased.to_string())
}

async fn generate_answer(
    model: &dyn ChatModel,
    context: &[RetrievedDocument],
    history: &[ChatTurn],
    input: &str,
) -> Result<String, GenerationError> {
    let answer = model.complete(&answer_prompt(context, history, input)).await?;
    Ok(answer.trim().to_string())
}

/// Retriever that first rewrites the message in light of the history.
pub struct HistoryAwareRetriever {
    model: Arc<dyn ChatModel>,
    retriever: Arc<dyn ContextRetriever>,
    top_k: usize,
}

impl HistoryAwareRetriever {
    pub async fn invoke(
        &self,
        input: &str,
        history: &[ChatTurn],
    ) -> Result<Vec<RetrievedDocument>, RagError> {
        let query = reformulate(self.model.as_ref(), history, input).await?;
        self.retriever.retrieve(&query, self.top_k).await
    }
}

/// Result of one run of the [`RetrievalChain`].
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub context: Vec<RetrievedDocument>,
    pub answer: String,
}

/// History-aware retrieval composed with the answer step.
pub struct RetrievalChain {
    retriever: HistoryAwareRetriever,
    model: Arc<dyn ChatModel>,
}

impl RetrievalChain {
    pub async fn invoke(&self, input: &str, history: &[ChatTurn]) -> Result<ChainOutput, RagError> {
        let context = self.retriever.invoke(input, history).await?;
        let answer = generate_answer(self.model.as_ref(), &context, history, input).await?;
        Ok(ChainOutput {
            context,
            answer,
        })
    }
}

/// Stateless chat orchestrator shared across requests.
pub struct Conversation {
    model: Arc<dyn ChatModel>,
    retriever: Arc<dyn ContextRetriever>,
    top_k: usize,
    chain: RetrievalChain,
}

impl Conversation {
    pub fn new(model: Arc<dyn ChatModel>, retriever: Arc<dyn ContextRetriever>, top_k: usize) -> Self {
        let chain = RetrievalChain {
            retriever: HistoryAwareRetriever {
                model: model.clone(),
                retriever: retriever.clone(),
                top_k,
            },
            model: model.clone(),
        };
        Self {
            model,
            retriever,
            top_k,
            chain,
        }
    }

    /// Build the production pipeline: configured embedder, vector index,
    /// and chat model. Creates the collection if it is missing.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        if embedder.dims() != config.vector_index.dims {
            return Err(ConfigError::DimensionMismatch {
                model: embedder.model_name().to_string(),
                expected: config.vector_index.dims,
                actual: embedder.dims(),
            }
            .into());
        }

        let index = create_index(&config.vector_index)?;
        index
            .ensure_collection(
                &config.vector_index.collection,
                config.vector_index.dims,
                Distance::Cosine,
            )
            .await?;

        let retriever = Retriever::from_config(config, embedder, index);
        let model = create_chat_model(&config.llm)?;
        tracing::info!(model = model.model_name(), "chat model ready");

        Ok(Self::new(model, Arc::new(retriever), config.retrieval.top_k))
    }

    /// Answer `message` through the composed retrieval chain.
    pub async fn handle_message(&self, message: &str, history: &[ChatTurn]) -> Result<String, RagError> {
        tracing::info!(history_len = history.len(), "handling message");
        let output = self.chain.invoke(message, history).await?;
        tracing::info!(context_docs = output.context.len(), "generated response");
        Ok(output.answer)
    }

    /// Answer `message` by running each step explicitly.
    pub async fn chat(&self, message: &str, history: &[ChatTurn]) -> Result<String, RagError> {
        let question = self.reformulate_question(message, history).await?;
        let context = self.retriever.retrieve(&question, self.top_k).await?;
        let answer = self.answer(&context, history, message).await?;
        tracing::info!(context_docs = context.len(), "generated response");
        Ok(answer)
    }

    pub async fn reformulate_question(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, GenerationError> {
        reformulate(self.model.as_ref(), history, message).await
    }

    /// Generate the reply from retrieved context, history, and the original message.
    pub async fn answer(
        &self,
        context: &[RetrievedDocument],
        history: &[ChatTurn],
        message: &str,
    ) -> Result<String, GenerationError> {
        generate_answer(self.model.as_ref(), context, history, message).await
    }
}

/// Append a completed exchange to `history`.
///
/// Seeds [`GREETING`] as a system turn first when the history does not
/// already open with one.
pub fn record_exchange(history: &mut Vec<ChatTurn>, message: &str, answer: &str) {
    if history.first().map(|t| t.role) != Some(Role::System) {
        history.insert(0, ChatTurn::system(GREETING));
    }
    history.push(ChatTurn::human(message));
    history.push(ChatTurn::ai(answer));
}
