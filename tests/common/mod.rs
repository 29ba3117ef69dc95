//! Shared test doubles: a deterministic embedder, a scripted chat model,
//! a static token verifier, a fake identity provider, a PDF builder, and a
//! log capture.
#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::{Arc, Mutex};

use midnight_diner::auth::{Claims, CreatedIdentity, IdentityProvider, TokenVerifier};
use midnight_diner::embedding::Embedder;
use midnight_diner::error::{AuthError, EmbeddingError, GenerationError};
use midnight_diner::llm::ChatModel;

/// Letter-frequency vectors: identical texts score 1.0, no model needed.
pub struct LetterEmbedder;

pub fn letters(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; 26];
    for c in text.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
        v[(c - b'a') as usize] += 1.0;
    }
    v
}

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

/// Records every prompt. Reformulation prompts get the latest question
/// back unchanged; answer prompts get the retrieved context echoed.
#[derive(Default)]
pub struct ScriptedModel {
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

fn section<'a>(prompt: &'a str, start: &str, end: &str) -> &'a str {
    prompt
        .split(start)
        .nth(1)
        .and_then(|rest| rest.split(end).next())
        .unwrap_or_default()
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if prompt.contains("Rephrased Question:") {
            Ok(section(prompt, "Latest Question:\n", "\n\n").to_string())
        } else {
            Ok(format!(
                "context: {}",
                section(prompt, "Retrieved Context:\n", "\n\nChat History:")
            ))
        }
    }
}

pub struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::new("failing", "upstream returned 529 overloaded"))
    }
}

/// Accepts `token-<user>` and yields `sub = auth0|<user>`.
pub struct StaticVerifier;

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let user = token
            .strip_prefix("token-")
            .ok_or_else(|| AuthError::InvalidToken("signature mismatch".into()))?;
        Ok(Claims {
            sub: format!("auth0|{}", user),
            iss: None,
            aud: serde_json::Value::Null,
            exp: None,
            email: None,
        })
    }
}

/// Accepts any password except `wrong`.
pub struct FakeIdentity;

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_up(&self, email: &str, password: &str) -> Result<CreatedIdentity, AuthError> {
        if password == "wrong" {
            return Err(AuthError::Provider {
                operation: "sign-up".into(),
                message: "status 400 Bad Request".into(),
            });
        }
        Ok(CreatedIdentity {
            user_id: format!("auth0|{}", email.split('@').next().unwrap_or_default()),
            metadata: serde_json::json!({}),
        })
    }

    async fn login(&self, email: &str, password: &str) -> Result<serde_json::Value, AuthError> {
        if password == "wrong" {
            return Err(AuthError::Provider {
                operation: "login".into(),
                message: "status 403 Forbidden".into(),
            });
        }
        Ok(serde_json::json!({
            "access_token": format!("token-{}", email.split('@').next().unwrap_or_default()),
            "token_type": "Bearer",
        }))
    }
}

/// A PDF with one page per entry of `pages`, built with lopdf.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(Object::from(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Collects plain-text `tracing` output for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A subscriber writing INFO and above into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .with_writer(move || sink.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
