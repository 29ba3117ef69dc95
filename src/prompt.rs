//! Prompt templates for the two LLM calls of a chat turn.

use crate::message::ChatTurn;
use crate::models::RetrievedDocument;

const REFORMULATE_INSTRUCTIONS: &str = "\
You are a supportive and thoughtful therapist assistant. Your task is to rephrase the user's latest question \
to make it clear and understandable without prior conversation context. \
Do NOT answer the question; simply restate it in a compassionate and clear way.";

const ANSWER_INSTRUCTIONS: &str = "\
You are a compassionate assistant for therapy support. Using the retrieved information, \
provide a thoughtful and concise response to the user's concern. If the context is incomplete, \
acknowledge this gently, and encourage the user to share more if they feel comfortable. \
Keep each response supportive, concise, and empathetic.";

/// Prompt asking the model to restate `input` as a standalone question.
pub fn reformulation_prompt(history: &[ChatTurn], input: &str) -> String {
    format!(
        "{}\n\nChat History:\n{}\n\nLatest Question:\n{}\n\nRephrased Question:\n",
        REFORMULATE_INSTRUCTIONS,
        format_history(history),
        input
    )
}

/// Prompt asking the model to answer `input` from the retrieved context.
pub fn answer_prompt(context: &[RetrievedDocument], history: &[ChatTurn], input: &str) -> String {
    format!(
        "{}\n\nRetrieved Context:\n{}\n\nChat History:\n{}\n\nUser Question:\n{}\n\nResponse:\n",
        ANSWER_INSTRUCTIONS,
        format_context(context),
        format_history(history),
        input
    )
}

/// One `Speaker: content` line per turn.
pub fn format_history(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("{}: {}", turn.role.speaker(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Document texts separated by blank lines. Empty when nothing was retrieved.
pub fn format_context(context: &[RetrievedDocument]) -> String {
    context
        .iter()
        .map(|doc| doc.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
