//! Embedding generation with a process-wide, lazily-initialized model.
//!
//! Two providers are supported, selected by `embedding.provider`:
//! - **`local`** (default) — fastembed running entirely in-process. The
//!   model is expensive to load, so it lives behind a single-flight async
//!   cell: the first caller triggers the load, every concurrent caller
//!   awaits the same in-flight initialization, a successful load is
//!   cached for the process lifetime, and a failed load leaves the cell
//!   empty so the next call retries instead of being permanently
//!   poisoned.
//! - **`openai`** — any OpenAI-compatible `/v1/embeddings` endpoint,
//!   with exponential backoff on 429/5xx and network errors.
//!
//! All vectors are mean-pooled and L2-normalized before return, so
//! downstream cosine similarity is well-defined.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::config::EmbeddingConfig;
use crate::error::RagError;

const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

/// Embed a batch of texts, returning one vector per input in input order.
pub async fn embed_texts(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, RagError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let embeddings = match config.provider.as_str() {
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => embed_local(config, texts).await?,
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => {
            return Err(RagError::Configuration(
                "local embedding provider requires --features local-embeddings-fastembed"
                    .to_string(),
            ))
        }
        "openai" => embed_openai(config, texts).await?,
        "disabled" => {
            return Err(RagError::Configuration(
                "embedding provider is disabled".to_string(),
            ))
        }
        other => {
            return Err(RagError::Configuration(format!(
                "unknown embedding provider: {other}"
            )))
        }
    };

    if embeddings.len() != texts.len() {
        return Err(RagError::Embedding(format!(
            "provider returned {} vectors for {} inputs",
            embeddings.len(),
            texts.len()
        )));
    }

    Ok(embeddings.into_iter().map(l2_normalize).collect())
}

/// Embed a single query text.
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>, RagError> {
    let texts = [text.to_string()];
    let results = embed_texts(config, &texts).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
}

/// Resolve the vector dimensionality the configured provider will
/// produce. The vector index is sized against this at construction; a
/// mismatch there is a fatal configuration error, not a per-request one.
pub fn resolved_dims(config: &EmbeddingConfig) -> Result<usize, RagError> {
    if let Some(dims) = config.dims {
        return Ok(dims);
    }
    match config.provider.as_str() {
        "local" => Ok(local_dims_for(local_model_name(config))),
        "openai" => Err(RagError::Configuration(
            "embedding.dims is required for the openai provider".to_string(),
        )),
        "disabled" => Err(RagError::Configuration(
            "embedding provider is disabled".to_string(),
        )),
        other => Err(RagError::Configuration(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

fn local_model_name(config: &EmbeddingConfig) -> &str {
    config.model.as_deref().unwrap_or(DEFAULT_LOCAL_MODEL)
}

fn local_dims_for(name: &str) -> usize {
    match name {
        "all-minilm-l6-v2" => 384,
        "bge-small-en-v1.5" => 384,
        "bge-base-en-v1.5" => 768,
        "multilingual-e5-small" => 384,
        _ => 384,
    }
}

// ============ Local provider (fastembed) ============

/// Single-flight cell holding the loaded model. `get_or_try_init` gives
/// exactly the lifecycle the pipeline needs: concurrent first callers
/// share one initialization future, success is memoized, and failure
/// leaves the cell uninitialized so a later call retries.
#[cfg(feature = "local-embeddings-fastembed")]
static LOCAL_MODEL: OnceCell<Arc<Mutex<fastembed::TextEmbedding>>> = OnceCell::const_new();

#[cfg(feature = "local-embeddings-fastembed")]
fn fastembed_model_for(name: &str) -> Result<fastembed::EmbeddingModel, RagError> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => Err(RagError::Configuration(format!(
            "unknown local embedding model: '{other}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small"
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
async fn shared_model(
    config: &EmbeddingConfig,
) -> Result<Arc<Mutex<fastembed::TextEmbedding>>, RagError> {
    let model = fastembed_model_for(local_model_name(config))?;
    LOCAL_MODEL
        .get_or_try_init(|| async move {
            let loaded = tokio::task::spawn_blocking(move || {
                fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
            })
            .await
            .map_err(|e| RagError::Embedding(format!("model load task failed: {e}")))?
            .map_err(|e| {
                RagError::Embedding(format!("failed to initialize local embedding model: {e}"))
            })?;
            Ok(Arc::new(Mutex::new(loaded)))
        })
        .await
        .map(Arc::clone)
}

#[cfg(feature = "local-embeddings-fastembed")]
async fn embed_local(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, RagError> {
    let model = shared_model(config).await?;
    let texts = texts.to_vec();
    let batch_size = config.batch_size;

    tokio::task::spawn_blocking(move || {
        let mut guard = model
            .lock()
            .map_err(|_| RagError::Embedding("embedding model lock poisoned".to_string()))?;
        guard
            .embed(texts, Some(batch_size))
            .map_err(|e| RagError::Embedding(format!("local embedding failed: {e}")))
    })
    .await
    .map_err(|e| RagError::Embedding(format!("embedding task failed: {e}")))?
}

// ============ OpenAI-compatible provider ============

/// Call an OpenAI-compatible embeddings endpoint with retry/backoff.
///
/// Retry strategy:
/// - HTTP 429 or 5xx → retry with exponential backoff
/// - HTTP 4xx (not 429) → fail immediately
/// - Network error → retry
async fn embed_openai(
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, RagError> {
    let model = config.model.as_ref().ok_or_else(|| {
        RagError::Configuration("embedding.model is required for the openai provider".to_string())
    })?;
    let base_url = config.url.as_deref().unwrap_or("https://api.openai.com");
    let api_key = std::env::var("OPENAI_API_KEY").ok();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| RagError::Embedding(e.to_string()))?;

    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });

    let mut last_err = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client
            .post(format!("{}/v1/embeddings", base_url.trim_end_matches('/')))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(ref key) = api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let json: serde_json::Value = response
                        .json()
                        .await
                        .map_err(|e| RagError::Embedding(e.to_string()))?;
                    return parse_openai_response(&json);
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = RagError::Embedding(format!("embedding API error {status}: {body_text}"));

                // Rate limited or server error — retry
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }

                // Client error (not 429) — don't retry
                return Err(err);
            }
            Err(e) => {
                last_err = Some(RagError::Embedding(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| RagError::Embedding("embedding failed after retries".to_string())))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, RagError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::Embedding("invalid response: missing data array".to_string()))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RagError::Embedding("invalid response: missing embedding".to_string())
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        embeddings.push(vec);
    }

    Ok(embeddings)
}

// ============ Vector utilities ============

/// Scale a vector to unit L2 norm. Idempotent for already-normalized
/// vectors; zero vectors pass through unchanged.
pub fn l2_normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
