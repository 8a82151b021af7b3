//! Context assembly and fusion orchestration.
//!
//! The top-level query path: fan out to the vector index, conversation
//! history, web search, and knowledge graph — each independently
//! fallible, each under its own timeout — then fuse whatever survived
//! into a single bounded prompt for the completion provider.
//!
//! Source ordering in the composed prompt is fixed regardless of which
//! retrieval finished first: document grounding is authoritative, web
//! search is supplementary, graph context is exploratory. A source that
//! fails, times out, or yields only whitespace contributes nothing — its
//! section is omitted entirely rather than rendered empty.
//!
//! Only two failures surface to the caller: an empty user message, and a
//! completion-provider error. Everything else degrades.

use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::completion::CompletionClient;
use crate::config::Config;
use crate::embedding;
use crate::error::RagError;
use crate::graph::{GraphStore, KnowledgeAnswer};
use crate::models::{
    ChatMessage, ChatReply, ChatRequest, ConversationTurn, EntityMatch, HistoryTurn,
    SourceSummary, WebResult,
};
use crate::persist::PersistenceHandle;
use crate::vector::VectorIndex;
use crate::websearch::{SearchOutcome, WebSearch};

const BASE_INSTRUCTION: &str = "You are RagSphere, an assistant that helps users understand \
their documents.\nYou answer questions accurately based on the provided context. If the \
context doesn't contain enough information, say so honestly.\nFormat your responses using \
Markdown for better readability.";

/// Separator between retrieved chunks in the document section.
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// The fusion orchestrator. Holds one client per context source plus the
/// persistence handle for post-response writes.
pub struct Assembler {
    config: Config,
    vector: VectorIndex,
    graph: GraphStore,
    web: WebSearch,
    completion: CompletionClient,
    persistence: PersistenceHandle,
}

impl Assembler {
    pub fn new(
        config: Config,
        vector: VectorIndex,
        graph: GraphStore,
        web: WebSearch,
        completion: CompletionClient,
        persistence: PersistenceHandle,
    ) -> Self {
        Self {
            config,
            vector,
            graph,
            web,
            completion,
            persistence,
        }
    }

    /// Answer one query: retrieve, fuse, complete, and hand the exchange
    /// to the persistence worker.
    pub async fn answer(&self, request: ChatRequest) -> Result<ChatReply, RagError> {
        if request.message.trim().is_empty() {
            return Err(RagError::InvalidRequest("no message provided".to_string()));
        }

        let budget = Duration::from_secs(self.config.assembly.source_timeout_secs);

        // Document-scoped retrieval and history run concurrently; each
        // degrades on its own without touching the other.
        let (document_context, history) = match request.document_id.as_deref() {
            Some(document_id) => tokio::join!(
                self.document_context(&request.user_id, document_id, &request.message, budget),
                self.recent_history(&request.user_id, document_id, budget),
            ),
            None => (None, Vec::new()),
        };

        let (web_context, web_results) = if request.use_web_search {
            self.web_context(&request.message, budget).await
        } else {
            (None, Vec::new())
        };

        let knowledge_context = self
            .knowledge_context(&request.user_id, &request.message, budget)
            .await;

        let sources = SourceSummary {
            has_document_context: document_context.is_some(),
            has_web_search: web_context.is_some(),
            has_knowledge_graph: knowledge_context.is_some(),
            web_results,
        };

        let system = compose_system_prompt(
            document_context.as_deref(),
            web_context.as_deref(),
            knowledge_context.as_deref(),
        );
        let messages = build_messages(system, &history, &request.message);
        let answer = self.completion.complete(&messages).await?;

        // The response is final at this point; persistence happens on the
        // worker's lifetime, not this request's.
        if let Some(document_id) = request.document_id {
            self.persistence.enqueue(ConversationTurn {
                user_id: request.user_id,
                document_id,
                user_message: request.message,
                assistant_message: answer.clone(),
                timestamp_millis: Utc::now().timestamp_millis(),
            });
        }

        Ok(ChatReply { answer, sources })
    }

    /// Top-k chunks for this user and document, joined into one block.
    async fn document_context(
        &self,
        user_id: &str,
        document_id: &str,
        message: &str,
        budget: Duration,
    ) -> Option<String> {
        let retrieval = async {
            let vector = embedding::embed_query(&self.config.embedding, message).await?;
            self.vector
                .search(&vector, user_id, Some(document_id), self.config.retrieval.top_k)
                .await
        };

        match timeout(budget, retrieval).await {
            Ok(Ok(chunks)) => {
                let joined = chunks
                    .iter()
                    .map(|chunk| chunk.payload.text.as_str())
                    .collect::<Vec<_>>()
                    .join(CHUNK_SEPARATOR);
                if joined.trim().is_empty() {
                    None
                } else {
                    debug!(chunks = chunks.len(), "document context retrieved");
                    Some(joined)
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "document retrieval failed; continuing without document context");
                None
            }
            Err(_) => {
                warn!("document retrieval timed out; continuing without document context");
                None
            }
        }
    }

    /// Last `history_limit` turns, oldest-first. The graph client already
    /// degrades internally; the timeout covers a hung connection.
    async fn recent_history(
        &self,
        user_id: &str,
        document_id: &str,
        budget: Duration,
    ) -> Vec<HistoryTurn> {
        match timeout(
            budget,
            self.graph
                .history(user_id, document_id, self.config.retrieval.history_limit),
        )
        .await
        {
            Ok(turns) => turns,
            Err(_) => {
                warn!("history retrieval timed out; continuing without history");
                Vec::new()
            }
        }
    }

    /// Web context plus the raw result list for source attribution.
    async fn web_context(&self, message: &str, budget: Duration) -> (Option<String>, Vec<WebResult>) {
        match timeout(budget, self.web.search(message)).await {
            Ok(SearchOutcome::Unconfigured) => {
                debug!("web search not configured; skipping");
                (None, Vec::new())
            }
            Ok(SearchOutcome::Fetched { answer, results }) => {
                let context = web_context_text(answer.as_deref(), &results);
                (context, results)
            }
            Err(_) => {
                warn!("web search timed out; continuing without web context");
                (None, Vec::new())
            }
        }
    }

    /// Knowledge-graph context; unconfigured and empty lookups contribute
    /// nothing rather than polluting the prompt.
    async fn knowledge_context(
        &self,
        user_id: &str,
        message: &str,
        budget: Duration,
    ) -> Option<String> {
        match timeout(budget, self.graph.query_related(user_id, message)).await {
            Ok(KnowledgeAnswer::Found(matches)) => knowledge_context_text(&matches),
            Ok(KnowledgeAnswer::Unconfigured) | Ok(KnowledgeAnswer::Empty) => None,
            Err(_) => {
                warn!("knowledge graph lookup timed out; continuing without graph context");
                None
            }
        }
    }
}

/// Prefer the provider's synthesized answer; fall back to numbered
/// "title: content" lines when only raw results exist.
fn web_context_text(answer: Option<&str>, results: &[WebResult]) -> Option<String> {
    if let Some(answer) = answer.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(format!("Web Search Answer: {answer}"));
    }
    if results.is_empty() {
        return None;
    }
    let lines = results
        .iter()
        .enumerate()
        .map(|(i, result)| format!("{}. {}: {}", i + 1, result.title, result.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    if lines.trim().is_empty() {
        None
    } else {
        Some(lines)
    }
}

fn knowledge_context_text(matches: &[EntityMatch]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let lines = matches
        .iter()
        .map(|m| format!("- {} ({}): {}", m.name, m.entity_type, m.context))
        .collect::<Vec<_>>()
        .join("\n");
    Some(lines)
}

/// Concatenate the base instruction and the surviving context sections in
/// fixed order: document, then web, then knowledge graph. A section whose
/// trimmed content is empty is omitted entirely.
fn compose_system_prompt(
    document: Option<&str>,
    web: Option<&str>,
    knowledge: Option<&str>,
) -> String {
    let mut prompt = BASE_INSTRUCTION.to_string();

    let sections = [
        ("DOCUMENT CONTEXT", document),
        ("WEB SEARCH RESULTS", web),
        ("KNOWLEDGE GRAPH CONTEXT", knowledge),
    ];
    for (header, content) in sections {
        if let Some(content) = content.map(str::trim).filter(|c| !c.is_empty()) {
            prompt.push_str("\n\n");
            prompt.push_str(header);
            prompt.push_str(":\n");
            prompt.push_str(content);
        }
    }

    prompt
}

/// System message, then history as alternating user/assistant turns
/// (oldest first), then the new user message.
fn build_messages(system: String, history: &[HistoryTurn], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(ChatMessage::system(system));
    for turn in history {
        messages.push(ChatMessage::user(turn.user_message.clone()));
        messages.push(ChatMessage::assistant(turn.assistant_message.clone()));
    }
    messages.push(ChatMessage::user(message));
    messages
}
