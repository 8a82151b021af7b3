//! Ingestion pipeline orchestration.
//!
//! Coordinates the upload flow: segmentation → batched embedding →
//! vector upsert → graph metadata. Batches are embedded in strict input
//! order so chunk indices always reflect original text order, and the
//! upsert waits for durability before the report is returned. The graph
//! metadata write is non-fatal — the vectors are already searchable.

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding;
use crate::error::RagError;
use crate::graph::GraphStore;
use crate::models::{ChunkPayload, IngestReport, VectorPoint};
use crate::segment::segment;
use crate::vector::VectorIndex;

/// Ingest one document's extracted text for a user.
///
/// The text arrives pre-extracted (upstream extraction is an external
/// collaborator); empty text is rejected rather than producing an
/// unsearchable zero-chunk document.
pub async fn ingest_document(
    config: &Config,
    vector: &VectorIndex,
    graph: &GraphStore,
    user_id: &str,
    file_name: &str,
    text: &str,
) -> Result<IngestReport, RagError> {
    let windows = segment(
        text,
        config.chunking.window_size,
        config.chunking.overlap,
    )?;
    if windows.is_empty() {
        return Err(RagError::InvalidRequest(
            "document text is empty".to_string(),
        ));
    }

    let document_id = Uuid::new_v4().to_string();
    let total_chunks = windows.len();
    let mut points = Vec::with_capacity(total_chunks);

    for (batch_index, batch) in windows.chunks(config.ingest.batch_size.max(1)).enumerate() {
        let embeddings = embedding::embed_texts(&config.embedding, batch).await?;

        for (offset, (window, embedding)) in batch.iter().zip(embeddings).enumerate() {
            points.push(VectorPoint {
                id: Uuid::new_v4().to_string(),
                vector: embedding,
                payload: ChunkPayload {
                    text: window.clone(),
                    user_id: user_id.to_string(),
                    document_id: document_id.clone(),
                    file_name: file_name.to_string(),
                    chunk_index: batch_index * config.ingest.batch_size.max(1) + offset,
                    total_chunks,
                },
            });
        }
    }

    vector.upsert(&points).await?;

    // Metadata write is best-effort: a missing graph store must not
    // undo an ingestion whose vectors are already durable.
    if let Err(e) = graph
        .store_document(user_id, &document_id, file_name, total_chunks)
        .await
    {
        warn!(error = %e, document_id = %document_id, "document metadata write failed");
    }

    info!(
        document_id = %document_id,
        chunks = total_chunks,
        file_name = %file_name,
        "document ingested"
    );

    Ok(IngestReport {
        document_id,
        file_name: file_name.to_string(),
        chunk_count: total_chunks,
    })
}
