//! # RagSphere CLI (`rags`)
//!
//! The `rags` binary drives the ingestion and query pipeline from the
//! command line. Document text arrives pre-extracted (PDF/HTML parsing
//! lives upstream); everything after that — segmentation, embedding,
//! indexing, multi-source context assembly — happens here.
//!
//! ## Usage
//!
//! ```bash
//! rags --config ./config/ragsphere.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rags init` | Create the vector collection and graph schema |
//! | `rags ingest <file> --user <id>` | Segment, embed, and index a document |
//! | `rags chat "<message>" --user <id>` | Ask a question with multi-source context |
//! | `rags documents --user <id>` | List a user's documents with chat counts |
//! | `rags delete <document-id> --user <id>` | Cascading delete of one document |
//! | `rags count --user <id>` | Count stored vectors for a user |
//!
//! ## Examples
//!
//! ```bash
//! # One-time setup (idempotent)
//! rags init
//!
//! # Ingest extracted text
//! rags ingest ./report.txt --user alice --name "Q3 report"
//!
//! # Document-grounded chat with web search
//! rags chat "What were the Q3 risks?" --user alice --document <id> --web
//! ```
//!
//! Secrets come from the environment (or a `.env` file): `CEREBRAS_API_KEY`,
//! `TAVILY_API_KEY`, `QDRANT_API_KEY`, `NEO4J_URI`, `NEO4J_USER`,
//! `NEO4J_PASSWORD`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragsphere::assemble::Assembler;
use ragsphere::completion::CompletionClient;
use ragsphere::config::{self, Config};
use ragsphere::documents;
use ragsphere::embedding;
use ragsphere::graph::GraphStore;
use ragsphere::ingest::ingest_document;
use ragsphere::models::ChatRequest;
use ragsphere::persist::PersistenceWorker;
use ragsphere::vector::VectorIndex;
use ragsphere::websearch::WebSearch;

/// RagSphere — multi-source retrieval-augmented context assembly for
/// document Q&A.
#[derive(Parser)]
#[command(
    name = "rags",
    about = "RagSphere — retrieval-augmented document Q&A with web search and a knowledge graph",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/ragsphere.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize backend schemas.
    ///
    /// Creates the vector collection (with tenant payload indexes) and
    /// the graph constraints/indexes. Idempotent — safe to re-run.
    Init,

    /// Ingest a document's extracted text.
    ///
    /// Segments the text into overlapping windows, embeds each window,
    /// upserts the vectors, and records document metadata in the graph.
    Ingest {
        /// Path to a file containing the extracted document text.
        file: PathBuf,

        /// Owning user id.
        #[arg(long)]
        user: String,

        /// Display name for the document (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Ask a question, grounded in documents, history, web, and graph.
    Chat {
        /// The question to answer.
        message: String,

        /// Querying user id.
        #[arg(long)]
        user: String,

        /// Scope retrieval and history to this document.
        #[arg(long)]
        document: Option<String>,

        /// Also consult live web search.
        #[arg(long)]
        web: bool,
    },

    /// List a user's documents with per-document chat counts.
    Documents {
        #[arg(long)]
        user: String,
    },

    /// Delete a document and everything derived from it.
    Delete {
        /// The document id to delete.
        document_id: String,

        #[arg(long)]
        user: String,
    },

    /// Count stored chunk vectors for a user.
    Count {
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragsphere=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { file, user, name } => run_ingest(&config, &file, &user, name).await,
        Commands::Chat {
            message,
            user,
            document,
            web,
        } => run_chat(config, message, user, document, web).await,
        Commands::Documents { user } => run_documents(&user).await,
        Commands::Delete { document_id, user } => run_delete(&config, &document_id, &user).await,
        Commands::Count { user } => run_count(&config, &user).await,
    }
}

fn vector_index(config: &Config) -> Result<VectorIndex> {
    let dims = embedding::resolved_dims(&config.embedding)?;
    Ok(VectorIndex::new(&config.vector, dims)?)
}

async fn run_init(config: &Config) -> Result<()> {
    let vector = vector_index(config)?;
    vector.ensure_collection().await?;
    println!("vector collection ready: {}", config.vector.collection);

    let graph = GraphStore::connect_from_env().await;
    if graph.is_configured() {
        graph.init_schema().await?;
        println!("graph schema ready");
    } else {
        println!("graph store not configured (set NEO4J_URI/NEO4J_USER/NEO4J_PASSWORD)");
    }

    println!("ok");
    Ok(())
}

async fn run_ingest(
    config: &Config,
    file: &PathBuf,
    user: &str,
    name: Option<String>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document text: {}", file.display()))?;
    let file_name = name.unwrap_or_else(|| {
        file.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    let vector = vector_index(config)?;
    let graph = GraphStore::connect_from_env().await;

    let report = ingest_document(config, &vector, &graph, user, &file_name, &text).await?;

    println!("ingested {}", report.file_name);
    println!("  document id: {}", report.document_id);
    println!("  chunks: {}", report.chunk_count);
    println!("ok");
    Ok(())
}

async fn run_chat(
    config: Config,
    message: String,
    user: String,
    document: Option<String>,
    web: bool,
) -> Result<()> {
    let vector = vector_index(&config)?;
    let graph = GraphStore::connect_from_env().await;
    let web_client = WebSearch::from_env(&config.search);
    let completion = CompletionClient::from_env(&config.completion)?;

    let worker = PersistenceWorker::spawn(graph.clone(), completion.clone());
    let assembler = Assembler::new(
        config,
        vector,
        graph,
        web_client,
        completion,
        worker.handle(),
    );

    let reply = assembler
        .answer(ChatRequest {
            user_id: user,
            document_id: document,
            message,
            use_web_search: web,
        })
        .await;

    // Flush pending persistence before exiting, whatever the outcome.
    drop(assembler);
    let reply = match reply {
        Ok(reply) => reply,
        Err(e) => {
            worker.close().await;
            anyhow::bail!("Failed to generate response: {e}");
        }
    };

    println!("{}", reply.answer);
    println!();
    println!("sources:");
    println!("  document context: {}", reply.sources.has_document_context);
    println!("  web search: {}", reply.sources.has_web_search);
    println!("  knowledge graph: {}", reply.sources.has_knowledge_graph);
    for result in &reply.sources.web_results {
        println!("  - {} <{}>", result.title, result.url);
    }

    worker.close().await;
    Ok(())
}

async fn run_documents(user: &str) -> Result<()> {
    let graph = GraphStore::connect_from_env().await;
    let docs = documents::list_documents(&graph, user).await;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for doc in docs {
        let uploaded = doc
            .uploaded_at_millis
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{} / {}", doc.document_id, doc.file_name);
        println!(
            "    chunks: {}  chats: {}  uploaded: {}",
            doc.chunk_count, doc.chat_count, uploaded
        );
    }
    Ok(())
}

async fn run_delete(config: &Config, document_id: &str, user: &str) -> Result<()> {
    let vector = vector_index(config)?;
    let graph = GraphStore::connect_from_env().await;

    documents::delete_document(&vector, &graph, user, document_id).await?;
    println!("deleted {document_id}");
    println!("ok");
    Ok(())
}

async fn run_count(config: &Config, user: &str) -> Result<()> {
    let vector = vector_index(config)?;
    let count = vector.count_for_user(user).await?;
    println!("{count}");
    Ok(())
}
