//! Web search client (Tavily).
//!
//! Normalizes the provider's response into titled results with bodies
//! truncated to 300 characters, plus an optional synthesized answer.
//! A missing API key makes the client report itself unconfigured; any
//! transport or HTTP failure is logged and collapses to an empty result.
//! This source can degrade the answer, never the request.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::warn;

use crate::config::SearchConfig;
use crate::models::{truncate_chars, WebResult};

/// Result bodies are clipped to this many characters.
const CONTENT_CHARS: usize = 300;

/// Outcome of a web search.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// No API key configured — the caller omits this source.
    Unconfigured,
    /// The search ran (possibly degrading to no results on failure).
    Fetched {
        answer: Option<String>,
        results: Vec<WebResult>,
    },
}

/// Client for the external search API.
#[derive(Debug, Clone)]
pub struct WebSearch {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
}

impl WebSearch {
    /// Build the client, reading the API key from `TAVILY_API_KEY`.
    pub fn from_env(config: &SearchConfig) -> Self {
        Self::new(config, std::env::var("TAVILY_API_KEY").ok())
    }

    pub fn new(config: &SearchConfig, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key,
            max_results: config.max_results,
        }
    }

    /// Run one search. Never returns an error: unconfigured and failed
    /// searches both degrade (distinguishably) instead.
    pub async fn search(&self, text: &str) -> SearchOutcome {
        let Some(api_key) = &self.api_key else {
            return SearchOutcome::Unconfigured;
        };

        let body = json!({
            "api_key": api_key,
            "query": text,
            "search_depth": "basic",
            "include_answer": true,
            "max_results": self.max_results,
        });

        let response = match self
            .http
            .post(format!("{}/search", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "web search transport failed; continuing without web context");
                return SearchOutcome::Fetched {
                    answer: None,
                    results: Vec::new(),
                };
            }
        };

        if !response.status().is_success() {
            warn!(
                status = %response.status(),
                "web search API error; continuing without web context"
            );
            return SearchOutcome::Fetched {
                answer: None,
                results: Vec::new(),
            };
        }

        match response.json::<Value>().await {
            Ok(data) => {
                let (answer, results) = normalize_response(&data);
                SearchOutcome::Fetched { answer, results }
            }
            Err(e) => {
                warn!(error = %e, "web search response unreadable; continuing without web context");
                SearchOutcome::Fetched {
                    answer: None,
                    results: Vec::new(),
                }
            }
        }
    }
}

/// Pull the synthesized answer and ranked results out of the provider
/// response, truncating each result body.
fn normalize_response(data: &Value) -> (Option<String>, Vec<WebResult>) {
    let answer = data
        .get("answer")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from);

    let results = data
        .get("results")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| WebResult {
                    title: item
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    url: item
                        .get("url")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    content: truncate_chars(
                        item.get("content").and_then(Value::as_str).unwrap_or_default(),
                        CONTENT_CHARS,
                    ),
                })
                .collect()
        })
        .unwrap_or_default();

    (answer, results)
}
