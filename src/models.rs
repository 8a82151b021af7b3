//! Core data models used throughout RagSphere.
//!
//! These types represent the chunks, conversation turns, entities, and
//! retrieval results that flow through the ingestion and assembly
//! pipeline. Wire payloads use camelCase field names — the vector index
//! filters on the `userId` and `documentId` payload keys, so the rename
//! is part of the storage contract, not cosmetics.

use serde::{Deserialize, Serialize};

/// Immutable payload stored alongside each chunk vector.
///
/// Written once at ingestion and never partially updated — a chunk is
/// inserted or deleted as a unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub text: String,
    pub user_id: String,
    pub document_id: String,
    pub file_name: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// A point ready for upsert into the vector index.
#[derive(Debug, Clone, Serialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A nearest-neighbor hit returned from the vector index.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub score: f32,
    pub payload: ChunkPayload,
}

/// One append-only conversation exchange, keyed to a user and document.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub user_id: String,
    pub document_id: String,
    pub user_message: String,
    pub assistant_message: String,
    /// Epoch milliseconds; the canonical ordering key for history.
    pub timestamp_millis: i64,
}

/// A past exchange as retrieved for provider context, oldest-first.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub user_message: String,
    pub assistant_message: String,
    pub timestamp_millis: i64,
}

/// A named entity extracted from a conversation, deduplicated across the
/// graph by its (name, type) identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// A knowledge-graph hit: an entity plus the user message it surfaced in.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMatch {
    pub name: String,
    pub entity_type: String,
    /// Originating user message, truncated to 200 characters.
    pub context: String,
}

/// A normalized web search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub url: String,
    /// Result body, truncated to 300 characters.
    pub content: String,
}

/// A document owned by a user, with its derived counters.
#[derive(Debug, Clone)]
pub struct DocumentSummary {
    pub document_id: String,
    pub file_name: String,
    pub chunk_count: i64,
    pub uploaded_at_millis: Option<i64>,
    pub chat_count: i64,
}

/// One role/content message sent to the completion provider.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// A query against the assembly pipeline.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_id: String,
    pub document_id: Option<String>,
    pub message: String,
    pub use_web_search: bool,
}

/// The answer plus a compact provenance summary for source attribution.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub answer: String,
    pub sources: SourceSummary,
}

/// Which context sources actually contributed to the answer.
#[derive(Debug, Clone, Default)]
pub struct SourceSummary {
    pub has_document_context: bool,
    pub has_web_search: bool,
    pub has_knowledge_graph: bool,
    pub web_results: Vec<WebResult>,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub document_id: String,
    pub file_name: String,
    pub chunk_count: usize,
}

/// Truncate a string to at most `max` characters, respecting char
/// boundaries (snippets come from arbitrary user text).
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
