//! Graph store client (Neo4j via bolt).
//!
//! Persists the knowledge graph: users own documents, users had
//! conversation turns, turns are about documents and mention entities.
//! Entities are deduplicated by (name, type) across the whole graph;
//! every read is still rooted at the querying user's own nodes, so one
//! tenant's conversation text never reaches another.
//!
//! The store is built from `NEO4J_URI` / `NEO4J_USER` / `NEO4J_PASSWORD`.
//! When those are absent or the connection fails, it degrades to a
//! disconnected store: reads return empty results or the
//! [`KnowledgeAnswer::Unconfigured`] sentinel, writes are no-ops, and
//! nothing throws into the query pipeline.

use std::collections::HashSet;

use neo4rs::{query, Graph};
use tracing::{debug, warn};

use crate::error::RagError;
use crate::models::{truncate_chars, ConversationTurn, DocumentSummary, Entity, EntityMatch, HistoryTurn};

/// Maximum entity matches returned by a knowledge-graph lookup.
const RELATED_LIMIT: usize = 10;
/// Context snippets are clipped to this many characters.
const SNIPPET_CHARS: usize = 200;

/// Result of a knowledge-graph lookup.
///
/// `Unconfigured` and `Empty` are distinct so the context assembler can
/// omit this source entirely instead of injecting placeholder text.
#[derive(Debug, Clone, PartialEq)]
pub enum KnowledgeAnswer {
    /// The graph store has no configured backend.
    Unconfigured,
    /// The lookup ran but matched nothing.
    Empty,
    /// Distinct entity matches with context snippets.
    Found(Vec<EntityMatch>),
}

/// Client for the conversation/entity property graph.
#[derive(Clone)]
pub struct GraphStore {
    graph: Option<Graph>,
}

impl GraphStore {
    /// Connect using the standard environment variables. Missing
    /// credentials or a failed connection yield a disconnected store —
    /// degraded, not fatal.
    pub async fn connect_from_env() -> Self {
        let uri = std::env::var("NEO4J_URI").ok();
        let user = std::env::var("NEO4J_USER").ok();
        let password = std::env::var("NEO4J_PASSWORD").ok();

        let (Some(uri), Some(user), Some(password)) = (uri, user, password) else {
            warn!("graph store credentials not configured; knowledge graph disabled");
            return Self::disconnected();
        };

        match Graph::new(&uri, &user, &password).await {
            Ok(graph) => Self { graph: Some(graph) },
            Err(e) => {
                warn!(error = %e, "graph store connection failed; knowledge graph disabled");
                Self::disconnected()
            }
        }
    }

    /// A store with no backend: reads are empty, writes are no-ops.
    pub fn disconnected() -> Self {
        Self { graph: None }
    }

    pub fn is_configured(&self) -> bool {
        self.graph.is_some()
    }

    /// Create uniqueness constraints and indexes. Idempotent.
    pub async fn init_schema(&self) -> Result<(), RagError> {
        let Some(graph) = &self.graph else {
            return Ok(());
        };

        let statements = [
            "CREATE CONSTRAINT IF NOT EXISTS FOR (u:User) REQUIRE u.userId IS UNIQUE",
            "CREATE CONSTRAINT IF NOT EXISTS FOR (d:Document) REQUIRE d.documentId IS UNIQUE",
            "CREATE INDEX IF NOT EXISTS FOR (c:Conversation) ON (c.timestamp)",
            "CREATE INDEX IF NOT EXISTS FOR (e:Entity) ON (e.name)",
        ];
        for statement in statements {
            graph
                .run(query(statement))
                .await
                .map_err(|e| RagError::Persistence(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    /// Merge-write document metadata under its owner. Never duplicates a
    /// User or Document node for the same identity key.
    pub async fn store_document(
        &self,
        user_id: &str,
        document_id: &str,
        file_name: &str,
        chunk_count: usize,
    ) -> Result<(), RagError> {
        let Some(graph) = &self.graph else {
            return Ok(());
        };

        graph
            .run(
                query(
                    "MERGE (u:User {userId: $userId}) \
                     MERGE (d:Document {documentId: $documentId}) \
                     SET d.fileName = $fileName, d.chunkCount = $chunkCount, \
                         d.uploadedAt = $uploadedAt \
                     MERGE (u)-[:OWNS]->(d)",
                )
                .param("userId", user_id)
                .param("documentId", document_id)
                .param("fileName", file_name)
                .param("chunkCount", chunk_count as i64)
                .param("uploadedAt", chrono::Utc::now().timestamp_millis()),
            )
            .await
            .map_err(|e| RagError::Persistence(format!("document metadata write failed: {e}")))
    }

    /// Record one immutable conversation turn and link its entities.
    ///
    /// Entities are merged (never duplicated) by (name, type); duplicate
    /// entries in the input are collapsed before linking. Returns an
    /// opaque turn id for error correlation, or `None` when the store is
    /// unconfigured.
    pub async fn record_turn(
        &self,
        turn: &ConversationTurn,
        entities: &[Entity],
    ) -> Result<Option<String>, RagError> {
        let Some(graph) = &self.graph else {
            return Ok(None);
        };

        let mut stream = graph
            .execute(
                query(
                    "MERGE (u:User {userId: $userId}) \
                     MERGE (d:Document {documentId: $documentId}) \
                     MERGE (u)-[:OWNS]->(d) \
                     CREATE (c:Conversation { \
                         timestamp: $timestamp, \
                         userMessage: $userMessage, \
                         assistantMessage: $assistantMessage, \
                         userId: $userId, \
                         documentId: $documentId \
                     }) \
                     MERGE (u)-[:HAD]->(c) \
                     MERGE (c)-[:ABOUT]->(d) \
                     RETURN elementId(c) AS turnId",
                )
                .param("userId", turn.user_id.as_str())
                .param("documentId", turn.document_id.as_str())
                .param("userMessage", turn.user_message.as_str())
                .param("assistantMessage", turn.assistant_message.as_str())
                .param("timestamp", turn.timestamp_millis),
            )
            .await
            .map_err(|e| RagError::Persistence(format!("turn write failed: {e}")))?;

        let row = stream
            .next()
            .await
            .map_err(|e| RagError::Persistence(format!("turn write failed: {e}")))?
            .ok_or_else(|| RagError::Persistence("turn write returned no id".to_string()))?;
        let turn_id: String = row
            .get("turnId")
            .map_err(|e| RagError::Persistence(format!("turn id missing: {e}")))?;

        let distinct: HashSet<&Entity> = entities.iter().collect();
        for entity in distinct {
            graph
                .run(
                    query(
                        "MATCH (c) WHERE elementId(c) = $turnId \
                         MERGE (e:Entity {name: $name, type: $type}) \
                         CREATE (c)-[:MENTIONS]->(e)",
                    )
                    .param("turnId", turn_id.as_str())
                    .param("name", entity.name.as_str())
                    .param("type", entity.entity_type.as_str()),
                )
                .await
                .map_err(|e| RagError::Persistence(format!("entity link failed: {e}")))?;
        }

        debug!(turn_id = %turn_id, entities = entities.len(), "recorded conversation turn");
        Ok(Some(turn_id))
    }

    /// The most recent `limit` turns for a (user, document) pair,
    /// returned oldest-first for provider context building. Failures
    /// degrade to an empty history with a warning.
    pub async fn history(&self, user_id: &str, document_id: &str, limit: usize) -> Vec<HistoryTurn> {
        let Some(graph) = &self.graph else {
            return Vec::new();
        };

        let result = graph
            .execute(
                query(
                    "MATCH (u:User {userId: $userId})-[:HAD]->(c:Conversation)\
                     -[:ABOUT]->(d:Document {documentId: $documentId}) \
                     RETURN c.userMessage AS userMessage, \
                            c.assistantMessage AS assistantMessage, \
                            c.timestamp AS timestamp \
                     ORDER BY c.timestamp DESC \
                     LIMIT $limit",
                )
                .param("userId", user_id)
                .param("documentId", document_id)
                .param("limit", limit as i64),
            )
            .await;

        let mut stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "history retrieval failed; continuing without history");
                return Vec::new();
            }
        };

        let mut turns = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(row)) => {
                    let turn = (|| -> Result<HistoryTurn, neo4rs::DeError> {
                        Ok(HistoryTurn {
                            user_message: row.get("userMessage")?,
                            assistant_message: row.get("assistantMessage")?,
                            timestamp_millis: row.get("timestamp")?,
                        })
                    })();
                    match turn {
                        Ok(turn) => turns.push(turn),
                        Err(e) => warn!(error = %e, "skipping malformed history row"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "history stream failed; returning partial history");
                    break;
                }
            }
        }

        // Stored newest-first; the composed context wants oldest-first.
        turns.reverse();
        turns
    }

    /// All documents owned by a user, newest upload first, each with a
    /// computed conversation count. Failures degrade to an empty list.
    pub async fn list_documents(&self, user_id: &str) -> Vec<DocumentSummary> {
        let Some(graph) = &self.graph else {
            return Vec::new();
        };

        let result = graph
            .execute(
                query(
                    "MATCH (u:User {userId: $userId})-[:OWNS]->(d:Document) \
                     OPTIONAL MATCH (d)<-[:ABOUT]-(c:Conversation) \
                     WITH d, count(c) AS chatCount \
                     RETURN d.documentId AS documentId, d.fileName AS fileName, \
                            d.chunkCount AS chunkCount, d.uploadedAt AS uploadedAt, \
                            chatCount \
                     ORDER BY d.uploadedAt DESC",
                )
                .param("userId", user_id),
            )
            .await;

        let mut stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "document listing failed");
                return Vec::new();
            }
        };

        let mut documents = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(row)) => {
                    let summary = (|| -> Result<DocumentSummary, neo4rs::DeError> {
                        Ok(DocumentSummary {
                            document_id: row.get("documentId")?,
                            file_name: row.get::<Option<String>>("fileName")?.unwrap_or_default(),
                            chunk_count: row.get::<Option<i64>>("chunkCount")?.unwrap_or(0),
                            uploaded_at_millis: row.get("uploadedAt")?,
                            chat_count: row.get("chatCount")?,
                        })
                    })();
                    match summary {
                        Ok(summary) => documents.push(summary),
                        Err(e) => warn!(error = %e, "skipping malformed document row"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "document stream failed; returning partial list");
                    break;
                }
            }
        }
        documents
    }

    /// Cascading delete of a document and its conversation turns.
    ///
    /// DETACH DELETE removes the turn-to-entity MENTIONS edges with the
    /// turns; shared Entity nodes themselves survive. Idempotent.
    pub async fn delete_document(&self, user_id: &str, document_id: &str) -> Result<(), RagError> {
        let Some(graph) = &self.graph else {
            return Ok(());
        };

        graph
            .run(
                query(
                    "MATCH (u:User {userId: $userId})-[:OWNS]->\
                     (d:Document {documentId: $documentId}) \
                     OPTIONAL MATCH (d)<-[:ABOUT]-(c:Conversation) \
                     DETACH DELETE c, d",
                )
                .param("userId", user_id)
                .param("documentId", document_id),
            )
            .await
            .map_err(|e| RagError::Persistence(format!("document delete failed: {e}")))
    }

    /// Knowledge-graph lookup: case-insensitive substring match of the
    /// query against entity names and the user's own historical messages.
    /// Query failures are logged and reported as [`KnowledgeAnswer::Empty`]
    /// so this exploratory source can never poison the prompt.
    pub async fn query_related(&self, user_id: &str, needle: &str) -> KnowledgeAnswer {
        let Some(graph) = &self.graph else {
            return KnowledgeAnswer::Unconfigured;
        };

        let result = graph
            .execute(
                query(
                    "MATCH (u:User {userId: $userId})-[:HAD]->(c:Conversation)\
                     -[:MENTIONS]->(e:Entity) \
                     WHERE toLower(e.name) CONTAINS toLower($needle) \
                        OR toLower(c.userMessage) CONTAINS toLower($needle) \
                     RETURN DISTINCT e.name AS entity, e.type AS entityType, \
                            c.userMessage AS context \
                     LIMIT $limit",
                )
                .param("userId", user_id)
                .param("needle", needle)
                .param("limit", RELATED_LIMIT as i64),
            )
            .await;

        let mut stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "knowledge graph lookup failed; treating as empty");
                return KnowledgeAnswer::Empty;
            }
        };

        let mut matches = Vec::new();
        loop {
            match stream.next().await {
                Ok(Some(row)) => {
                    let entry = (|| -> Result<EntityMatch, neo4rs::DeError> {
                        let context: String = row.get("context")?;
                        Ok(EntityMatch {
                            name: row.get("entity")?,
                            entity_type: row.get("entityType")?,
                            context: truncate_chars(&context, SNIPPET_CHARS),
                        })
                    })();
                    match entry {
                        Ok(entry) => matches.push(entry),
                        Err(e) => warn!(error = %e, "skipping malformed entity row"),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "knowledge graph stream failed; using partial matches");
                    break;
                }
            }
        }

        if matches.is_empty() {
            KnowledgeAnswer::Empty
        } else {
            KnowledgeAnswer::Found(matches)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_store_degrades() {
        let store = GraphStore::disconnected();
        assert!(!store.is_configured());
        assert!(store.history("u1", "d1", 5).await.is_empty());
        assert!(store.list_documents("u1").await.is_empty());
        assert_eq!(
            store.query_related("u1", "anything").await,
            KnowledgeAnswer::Unconfigured
        );
    }

    #[tokio::test]
    async fn test_disconnected_store_writes_are_noops() {
        let store = GraphStore::disconnected();
        store.init_schema().await.unwrap();
        store.store_document("u1", "d1", "notes.txt", 3).await.unwrap();
        store.delete_document("u1", "d1").await.unwrap();

        let turn = ConversationTurn {
            user_id: "u1".into(),
            document_id: "d1".into(),
            user_message: "hi".into(),
            assistant_message: "hello".into(),
            timestamp_millis: 1,
        };
        assert_eq!(store.record_turn(&turn, &[]).await.unwrap(), None);
    }

    #[test]
    fn test_unconfigured_distinct_from_empty() {
        assert_ne!(KnowledgeAnswer::Unconfigured, KnowledgeAnswer::Empty);
        assert_ne!(KnowledgeAnswer::Empty, KnowledgeAnswer::Found(Vec::new()));
    }
}
