//! Completion provider client (OpenAI-compatible chat completions).
//!
//! The one backend whose failure is allowed to fail a query: without a
//! completion there is no answer to return. Retries transient errors
//! (429, 5xx, network) with exponential backoff; other client errors
//! fail immediately.

use std::time::Duration;

use serde_json::{json, Value};

use crate::config::CompletionConfig;
use crate::error::RagError;
use crate::models::ChatMessage;

/// Environment variable holding the provider bearer token.
const API_KEY_VAR: &str = "CEREBRAS_API_KEY";

/// Client for a single chat-completions endpoint. Cheap to clone; the
/// underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    max_retries: u32,
}

impl CompletionClient {
    /// Build the client, requiring the bearer token in the environment.
    pub fn from_env(config: &CompletionConfig) -> Result<Self, RagError> {
        let api_key = std::env::var(API_KEY_VAR).map_err(|_| {
            RagError::Configuration(format!("{API_KEY_VAR} environment variable not set"))
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self, RagError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
        })
    }

    /// Submit the ordered message list for a single non-streaming
    /// completion and return the assistant's text.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, RagError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = self
                .http
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let data: Value = response
                            .json()
                            .await
                            .map_err(|e| RagError::Completion(e.to_string()))?;
                        return extract_content(&data);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = RagError::Completion(format!(
                        "completion API error {status}: {body_text}"
                    ));

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(RagError::Completion(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::Completion("completion failed after retries".to_string())))
    }
}

fn extract_content(data: &Value) -> Result<String, RagError> {
    data.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| {
            RagError::Completion("completion response missing message content".to_string())
        })
}
