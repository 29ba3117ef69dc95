//! # Midnight Diner
//!
//! A retrieval-augmented chat backend for late-night emotional support.
//!
//! Documents are split into overlapping chunks, embedded, and stored in a
//! vector index. Each chat turn rewrites the user's message into a standalone
//! question, retrieves the closest chunks above a similarity threshold, and
//! asks an LLM for a grounded, empathetic answer. Per-user history lives in
//! SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌──────────────┐
//! │  Folder  │──▶│ Chunk + Embed │──▶│ Vector Index │
//! │ PDF/text │   │   (ingest)    │   │ Qdrant / mem │
//! └──────────┘   └───────────────┘   └──────┬───────┘
//!                                           │ retrieve
//!                ┌──────────────┐    ┌──────▼───────┐
//!                │ HTTP (axum)  │───▶│ Conversation │──▶ LLM
//!                │ CLI (diner)  │    │  orchestrator│
//!                └──────┬───────┘    └──────────────┘
//!                       │ history, profiles
//!                   ┌───▼────┐
//!                   │ SQLite │
//!                   └────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping text windows |
//! | [`extract`] | PDF and text page extraction |
//! | [`source`] | Document sources and folder scanning |
//! | [`http`] | HTTP client construction and retrying JSON calls |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Vector index abstraction (Qdrant, in-memory) |
//! | [`ingest`] | Ingestion pipeline |
//! | [`retriever`] | Thresholded similarity retrieval |
//! | [`llm`] | Chat model clients |
//! | [`prompt`] | Prompt templates |
//! | [`conversation`] | Reformulate → retrieve → answer |
//! | [`message`] | Chat turns and their persistence codec |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`history`] | Per-user chat history |
//! | [`users`] | User profiles |
//! | [`auth`] | JWT verification and the identity provider client |
//! | [`server`] | HTTP API |

pub mod auth;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod history;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod message;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod retriever;
pub mod server;
pub mod source;
pub mod users;
pub mod vector_index;
