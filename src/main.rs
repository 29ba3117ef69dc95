//! # Midnight Diner CLI (`diner`)
//!
//! ## Usage
//!
//! ```bash
//! diner --config ./config/diner.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `diner init` | Create the SQLite database and the vector collection |
//! | `diner ingest` | Chunk, embed, and index the document folder |
//! | `diner ask "<message>"` | Answer one message |
//! | `diner chat` | Interactive late-night chat session |
//! | `diner serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Index ./data, overwriting chunks already indexed from the same files
//! diner ingest --dedup
//!
//! # One-off question through the step-by-step pipeline
//! diner ask "I can't stop overthinking at night" --stepwise
//!
//! # Continue a stored conversation
//! diner ask "what else can I try?" --user auth0|123
//! ```

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use midnight_diner::config::{self, Config};
use midnight_diner::conversation::{record_exchange, Conversation};
use midnight_diner::db::Database;
use midnight_diner::history::{HistoryStore, SqliteHistoryStore};
use midnight_diner::message::ChatTurn;
use midnight_diner::vector_index::{create_index, Distance};
use midnight_diner::{ingest, server};

/// Midnight Diner: a late-night, retrieval-grounded support chatbot.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/diner.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "diner",
    about = "Midnight Diner: retrieval-augmented support chat over your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/diner.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and the vector collection.
    ///
    /// Safe to run repeatedly.
    Init,

    /// Ingest documents into the vector index.
    ///
    /// Unreadable or corrupt documents are logged and skipped. Without
    /// `--dedup`, re-ingesting a folder stores its chunks again.
    Ingest {
        /// Folder to scan instead of `[ingestion].folder`.
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Derive point ids from content so re-runs overwrite instead of duplicate.
        #[arg(long)]
        dedup: bool,
    },

    /// Answer a single message.
    Ask {
        message: String,

        /// Run reformulate, retrieve, and answer as separate steps.
        #[arg(long)]
        stepwise: bool,

        /// Load and update the stored history of this user id.
        #[arg(long)]
        user: Option<String>,
    },

    /// Start an interactive chat session. Type `exit` to leave.
    Chat,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&cfg).await?,
        Commands::Ingest { folder, dedup } => {
            let report = ingest::run_ingest(&cfg, folder.as_deref(), dedup).await?;
            println!(
                "Ingested {}/{} documents ({} chunks, {} failed)",
                report.documents_ingested,
                report.documents_found,
                report.chunks_stored,
                report.documents_failed
            );
            for (source, error) in &report.failures {
                println!("  skipped {}: {}", source, error);
            }
        }
        Commands::Ask {
            message,
            stepwise,
            user,
        } => run_ask(&cfg, &message, stepwise, user.as_deref()).await?,
        Commands::Chat => run_chat(&cfg).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> anyhow::Result<()> {
    let db = Database::open(cfg).await?;
    db.close().await;

    let index = create_index(&cfg.vector_index)?;
    index
        .ensure_collection(&cfg.vector_index.collection, cfg.vector_index.dims, Distance::Cosine)
        .await?;

    println!("Database initialized at {}", cfg.db.path.display());
    println!(
        "Collection '{}' ready ({} dims)",
        cfg.vector_index.collection, cfg.vector_index.dims
    );
    Ok(())
}

async fn run_ask(cfg: &Config, message: &str, stepwise: bool, user: Option<&str>) -> anyhow::Result<()> {
    let conversation = Conversation::from_config(cfg).await?;

    let store = match user {
        Some(_) => Some(SqliteHistoryStore::new(Database::open(cfg).await?)),
        None => None,
    };
    let mut history = match (&store, user) {
        (Some(store), Some(user_id)) => store.get_history(user_id).await?,
        _ => Vec::new(),
    };

    let answer = if stepwise {
        conversation.chat(message, &history).await?
    } else {
        conversation.handle_message(message, &history).await?
    };
    println!("{}", answer);

    if let (Some(store), Some(user_id)) = (&store, user) {
        record_exchange(&mut history, message, &answer);
        store.save_history(user_id, &history).await?;
    }
    Ok(())
}

async fn run_chat(cfg: &Config) -> anyhow::Result<()> {
    let conversation = Conversation::from_config(cfg).await?;
    let mut history: Vec<ChatTurn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Welcome to Midnight Diner, your late-night therapy assistant. Type 'exit' to end the conversation.");
    loop {
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") {
            println!("Thank you for sharing with Midnight Diner. Take care!");
            break;
        }
        if input.is_empty() {
            continue;
        }

        match conversation.handle_message(input, &history).await {
            Ok(answer) => {
                println!("AI: {}", answer);
                record_exchange(&mut history, input, &answer);
            }
            Err(e) => {
                tracing::error!(error = %e, "chat turn failed");
                println!("AI: Something went wrong, please try again.");
            }
        }
    }
    Ok(())
}
