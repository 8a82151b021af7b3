use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, loaded from a TOML file.
///
/// Every section has defaults, so an empty file (or no file at all) yields
/// a working local setup: a local 384-dim embedding model, a Qdrant-style
/// vector index on `localhost:6333`, and sliding-window chunking of
/// 1000 characters with 200 overlap. Secrets (completion and web-search
/// API keys, graph credentials) are read from the environment, never from
/// this file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
}

/// Sliding-window segmentation parameters (characters, not bytes).
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_window_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

/// Embedding provider settings.
///
/// `provider` selects the backend: `"local"` (fastembed, default) or
/// `"openai"` (any OpenAI-compatible `/v1/embeddings` endpoint via `url`).
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `"openai"` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_embed_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Vector index (Qdrant) connection and collection settings.
///
/// `size` must match the embedding model's dimensionality; the mismatch is
/// rejected at client construction, not per request.
#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_vector_size")]
    pub size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: default_vector_url(),
            collection: default_collection(),
            size: default_vector_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_vector_url() -> String {
    "http://localhost:6333".to_string()
}
fn default_collection() -> String {
    "ragsphere_documents".to_string()
}
fn default_vector_size() -> usize {
    384
}

/// Web search (Tavily) settings. The API key comes from `TAVILY_API_KEY`;
/// without it the client reports itself unconfigured rather than erroring.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub url: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: default_search_url(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_url() -> String {
    "https://api.tavily.com".to_string()
}
fn default_max_results() -> usize {
    5
}
fn default_search_timeout_secs() -> u64 {
    15
}

/// Completion provider settings (OpenAI-compatible chat completions).
/// The bearer token comes from `CEREBRAS_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_url")]
    pub url: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_completion_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            url: default_completion_url(),
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_completion_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

fn default_completion_url() -> String {
    "https://api.cerebras.ai/v1".to_string()
}
fn default_completion_model() -> String {
    "llama-3.3-70b".to_string()
}
fn default_temperature() -> f64 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_completion_retries() -> u32 {
    2
}
fn default_completion_timeout_secs() -> u64 {
    60
}

/// Query-time retrieval limits.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Nearest-neighbor chunks fetched per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Conversation turns pulled into the provider context.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_history_limit() -> usize {
    5
}

/// Ingestion pipeline settings.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Windows embedded per batch, dispatched in strict input order.
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_ingest_batch_size(),
        }
    }
}

fn default_ingest_batch_size() -> usize {
    10
}

/// Context-assembly settings.
#[derive(Debug, Deserialize, Clone)]
pub struct AssemblyConfig {
    /// Per-source retrieval budget; exceeding it degrades that source to
    /// "absent", identically to a backend failure.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout_secs(),
        }
    }
}

fn default_source_timeout_secs() -> u64 {
    10
}

/// Load configuration from a TOML file. A missing file falls back to
/// defaults; a present-but-invalid file is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
