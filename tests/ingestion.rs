//! Ingestion pipeline tests: segmentation through durable upsert
//! against mocked backends.

use httpmock::prelude::*;
use serde_json::json;

use ragsphere::config::{ChunkingConfig, Config, EmbeddingConfig, IngestConfig, VectorConfig};
use ragsphere::graph::GraphStore;
use ragsphere::ingest::ingest_document;
use ragsphere::vector::VectorIndex;

fn test_config(embed_server: &MockServer, vector_server: &MockServer) -> Config {
    Config {
        chunking: ChunkingConfig {
            window_size: 10,
            overlap: 2,
        },
        embedding: EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("test-embedder".to_string()),
            dims: Some(4),
            url: Some(embed_server.base_url()),
            max_retries: 0,
            timeout_secs: 5,
            ..EmbeddingConfig::default()
        },
        vector: VectorConfig {
            url: vector_server.base_url(),
            collection: "test_docs".to_string(),
            size: 4,
            timeout_secs: 5,
        },
        ingest: IngestConfig { batch_size: 2 },
        ..Config::default()
    }
}

fn embedding_response(count: usize) -> serde_json::Value {
    let data: Vec<_> = (0..count)
        .map(|_| json!({ "embedding": [0.1, 0.2, 0.3, 0.4] }))
        .collect();
    json!({ "data": data })
}

#[tokio::test]
async fn ingest_segments_embeds_and_upserts_in_order() {
    let embed_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;

    // 26 chars, window 10, overlap 2 => windows at 0, 8, and 16 (the
    // last one reaching the end): 3 chunks, embedded in batches of 2.
    let text = "abcdefghijklmnopqrstuvwxyz";

    let embed_first_batch = embed_server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .body_contains("\"input\":[\"abcdefghij\",\"ijklmnopqr\"]");
            then.status(200).json_body(embedding_response(2));
        })
        .await;
    let embed_final_batch = embed_server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .body_contains("\"input\":[\"qrstuvwxyz\"]");
            then.status(200).json_body(embedding_response(1));
        })
        .await;
    vector_server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/test_docs");
            then.status(200).json_body(json!({ "result": {} }));
        })
        .await;
    let upsert = vector_server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/collections/test_docs/points")
                .query_param("wait", "true")
                .body_contains("\"userId\":\"user-a\"")
                .body_contains("\"fileName\":\"alphabet.txt\"")
                .body_contains("abcdefghij")
                .body_contains("\"chunkIndex\":2")
                .body_contains("\"totalChunks\":3");
            then.status(200).json_body(json!({ "result": { "status": "completed" } }));
        })
        .await;

    let config = test_config(&embed_server, &vector_server);
    let vector = VectorIndex::new(&config.vector, 4).unwrap();
    let graph = GraphStore::disconnected();

    let report = ingest_document(&config, &vector, &graph, "user-a", "alphabet.txt", text)
        .await
        .unwrap();

    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.file_name, "alphabet.txt");
    assert!(!report.document_id.is_empty());

    // Two embedding batches in input order, one durable upsert.
    embed_first_batch.assert_async().await;
    embed_final_batch.assert_async().await;
    upsert.assert_async().await;
}

#[tokio::test]
async fn ingest_fails_when_upsert_fails() {
    let embed_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;

    embed_server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200).json_body(embedding_response(1));
        })
        .await;
    vector_server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/test_docs");
            then.status(200).json_body(json!({ "result": {} }));
        })
        .await;
    vector_server
        .mock_async(|when, then| {
            when.method(PUT).path("/collections/test_docs/points");
            then.status(503).body("write unavailable");
        })
        .await;

    let config = test_config(&embed_server, &vector_server);
    let vector = VectorIndex::new(&config.vector, 4).unwrap();
    let graph = GraphStore::disconnected();

    let err = ingest_document(&config, &vector, &graph, "user-a", "doc.txt", "0123456789")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ragsphere::error::RagError::RetrievalUnavailable { .. }
    ));
}

#[tokio::test]
async fn ingest_fails_when_embedding_fails() {
    let embed_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;

    embed_server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(400).body("bad model");
        })
        .await;

    let config = test_config(&embed_server, &vector_server);
    let vector = VectorIndex::new(&config.vector, 4).unwrap();
    let graph = GraphStore::disconnected();

    let err = ingest_document(&config, &vector, &graph, "user-a", "doc.txt", "0123456789")
        .await
        .unwrap_err();
    assert!(matches!(err, ragsphere::error::RagError::Embedding(_)));
}
