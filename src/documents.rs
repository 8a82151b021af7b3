//! Document listing and cascading deletion.
//!
//! A document's vectors and graph nodes are created together at upload
//! and destroyed together here. The two deletes run concurrently; the
//! vector delete is authoritative (its failure surfaces), while a graph
//! failure is logged and absorbed — conversation nodes without a parent
//! document are unreachable from every query path.

use tracing::warn;

use crate::error::RagError;
use crate::graph::GraphStore;
use crate::models::DocumentSummary;
use crate::vector::VectorIndex;

/// All documents owned by a user, with computed conversation counts.
pub async fn list_documents(graph: &GraphStore, user_id: &str) -> Vec<DocumentSummary> {
    graph.list_documents(user_id).await
}

/// Delete a document everywhere: vectors, graph metadata, and its
/// conversation turns. Idempotent — deleting twice ends in the same
/// state as deleting once.
pub async fn delete_document(
    vector: &VectorIndex,
    graph: &GraphStore,
    user_id: &str,
    document_id: &str,
) -> Result<(), RagError> {
    let (vector_result, graph_result) = tokio::join!(
        vector.delete_by_document(user_id, document_id),
        graph.delete_document(user_id, document_id),
    );

    if let Err(e) = graph_result {
        warn!(error = %e, document_id = %document_id, "graph delete failed");
    }

    vector_result
}
