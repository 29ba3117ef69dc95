//! Orchestrator over a real retriever and in-memory index.

mod common;

use std::sync::Arc;

use common::{LetterEmbedder, ScriptedModel};
use midnight_diner::chunk::Chunker;
use midnight_diner::conversation::{record_exchange, Conversation};
use midnight_diner::ingest::Ingestor;
use midnight_diner::message::ChatTurn;
use midnight_diner::models::Page;
use midnight_diner::retriever::Retriever;
use midnight_diner::source::DocumentSource;
use midnight_diner::error::DocumentError;
use midnight_diner::vector_index::InMemoryIndex;

struct Snippets(Vec<&'static str>);

impl DocumentSource for Snippets {
    fn id(&self) -> &str {
        "snippets.pdf"
    }

    fn load(&self) -> Result<Vec<Page>, DocumentError> {
        Ok(self
            .0
            .iter()
            .enumerate()
            .map(|(index, text)| Page {
                index,
                text: text.to_string(),
            })
            .collect())
    }
}

async fn indexed() -> Arc<InMemoryIndex> {
    let index = Arc::new(InMemoryIndex::new());
    let ingestor = Ingestor::new(
        Chunker::default(),
        Arc::new(LetterEmbedder),
        index.clone(),
        "diner",
        26,
    )
    .unwrap();
    let source = Snippets(vec![
        "loneliness at night",
        "panic attack grounding",
        "qqq xxx zzz",
    ]);
    let sources: [&dyn DocumentSource; 1] = [&source];
    ingestor.ingest_all(&sources).await.unwrap();
    index
}

fn conversation(model: Arc<ScriptedModel>, index: Arc<InMemoryIndex>) -> Conversation {
    let retriever = Retriever::new(Arc::new(LetterEmbedder), index, "diner", 0.6);
    Conversation::new(model, Arc::new(retriever), 5)
}

#[tokio::test]
async fn test_both_paths_give_the_same_answer() {
    let index = indexed().await;
    let history = vec![
        ChatTurn::system("Hello! How can I help you today?"),
        ChatTurn::human("I live alone"),
        ChatTurn::ai("That can feel heavy."),
    ];

    let composed_model = Arc::new(ScriptedModel::default());
    let stepwise_model = Arc::new(ScriptedModel::default());

    let composed = conversation(composed_model.clone(), index.clone())
        .handle_message("loneliness at night", &history)
        .await
        .unwrap();
    let stepwise = conversation(stepwise_model.clone(), index)
        .chat("loneliness at night", &history)
        .await
        .unwrap();

    assert_eq!(composed, stepwise);
    assert!(composed.contains("loneliness at night"));
    assert_eq!(
        *composed_model.prompts.lock().unwrap(),
        *stepwise_model.prompts.lock().unwrap()
    );
}

#[tokio::test]
async fn test_nothing_relevant_still_answers() {
    let model = Arc::new(ScriptedModel::default());
    let conversation = conversation(model.clone(), indexed().await);

    let answer = conversation.handle_message("bbbb", &[]).await.unwrap();
    assert_eq!(answer, "context:");

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Retrieved Context:\n\n\nChat History:"));
}

#[tokio::test]
async fn test_multi_turn_history_grows() {
    let model = Arc::new(ScriptedModel::default());
    let conversation = conversation(model.clone(), indexed().await);
    let mut history = Vec::new();

    for message in ["panic attack grounding", "and at night?"] {
        let answer = conversation.handle_message(message, &history).await.unwrap();
        record_exchange(&mut history, message, &answer);
    }

    assert_eq!(history.len(), 5);
    // One answer prompt for the first turn, reformulate + answer for the second
    assert_eq!(model.prompt_count(), 3);
    let prompts = model.prompts.lock().unwrap();
    assert!(prompts[1].contains("Human: panic attack grounding"));
}
