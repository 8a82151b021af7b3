//! End-to-end fusion tests: the assembler against mocked backends.
//!
//! Exercises the query pipeline's contract — fixed context ordering,
//! per-source degradation, provenance reporting, and post-response
//! persistence — without any real vector index, graph store, or
//! completion provider.

use httpmock::prelude::*;
use serde_json::json;

use ragsphere::assemble::Assembler;
use ragsphere::completion::CompletionClient;
use ragsphere::config::{
    AssemblyConfig, CompletionConfig, Config, EmbeddingConfig, SearchConfig, VectorConfig,
};
use ragsphere::error::RagError;
use ragsphere::graph::GraphStore;
use ragsphere::models::ChatRequest;
use ragsphere::persist::PersistenceWorker;
use ragsphere::vector::VectorIndex;
use ragsphere::websearch::WebSearch;

/// Config with every remote pointed at mock servers and short budgets.
fn base_config(completion_server: &MockServer, vector_server: &MockServer) -> Config {
    Config {
        completion: CompletionConfig {
            url: completion_server.base_url(),
            max_retries: 0,
            timeout_secs: 5,
            ..CompletionConfig::default()
        },
        embedding: EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("test-embedder".to_string()),
            dims: Some(4),
            url: Some(completion_server.base_url()),
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
        assembly: AssemblyConfig {
            source_timeout_secs: 5,
        },
        ..Config::default()
    }
}

fn build_assembler(
    config: Config,
    graph: GraphStore,
    web: WebSearch,
) -> (Assembler, PersistenceWorker) {
    let vector = VectorIndex::new(&config.vector, 4).unwrap();
    let completion = CompletionClient::new(&config.completion, "test-key".into()).unwrap();
    let worker = PersistenceWorker::spawn(graph.clone(), completion.clone());
    let assembler = Assembler::new(config, vector, graph, web, completion, worker.handle());
    (assembler, worker)
}

/// Mock an answer for the main (non-extraction) completion call.
async fn mock_answer<'a>(
    server: &'a MockServer,
    required_fragment: &str,
    answer: &str,
) -> httpmock::Mock<'a> {
    let required = required_fragment.to_string();
    let answer = answer.to_string();
    server
        .mock_async(move |when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("You are RagSphere")
                .body_contains(&required);
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": answer } }]
            }));
        })
        .await
}

/// Mock the entity-extraction completion call made by the worker.
async fn mock_extraction(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("Return ONLY the JSON array");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "[]" } }]
            }));
        })
        .await
}

#[tokio::test]
async fn bare_query_uses_base_instruction_only() {
    let completion_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;

    let answer = mock_answer(&completion_server, "You are RagSphere", "A plain answer.").await;

    let config = base_config(&completion_server, &vector_server);
    let web = WebSearch::new(&config.search, None);
    let (assembler, worker) = build_assembler(config, GraphStore::disconnected(), web);

    let reply = assembler
        .answer(ChatRequest {
            user_id: "user-a".into(),
            document_id: None,
            message: "hello there".into(),
            use_web_search: false,
        })
        .await
        .unwrap();

    assert_eq!(reply.answer, "A plain answer.");
    assert!(!reply.sources.has_document_context);
    assert!(!reply.sources.has_web_search);
    assert!(!reply.sources.has_knowledge_graph);
    assert!(reply.sources.web_results.is_empty());
    answer.assert_async().await;

    // No document id — nothing to persist, no vector traffic.
    drop(assembler);
    worker.close().await;
}

#[tokio::test]
async fn document_query_grounds_prompt_in_retrieved_chunks() {
    let completion_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;

    let embed = completion_server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200)
                .json_body(json!({ "data": [{ "embedding": [0.1, 0.2, 0.3, 0.4] }] }));
        })
        .await;
    vector_server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/test_docs");
            then.status(200).json_body(json!({ "result": {} }));
        })
        .await;
    let search = vector_server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/collections/test_docs/points/search")
                .body_contains("\"value\":\"user-a\"")
                .body_contains("\"value\":\"doc-1\"");
            then.status(200).json_body(json!({
                "result": [
                    {
                        "id": "p1", "score": 0.9,
                        "payload": {
                            "text": "the quarterly revenue grew",
                            "userId": "user-a", "documentId": "doc-1",
                            "fileName": "report.txt", "chunkIndex": 0, "totalChunks": 2
                        }
                    },
                    {
                        "id": "p2", "score": 0.8,
                        "payload": {
                            "text": "risks include supply delays",
                            "userId": "user-a", "documentId": "doc-1",
                            "fileName": "report.txt", "chunkIndex": 1, "totalChunks": 2
                        }
                    }
                ]
            }));
        })
        .await;

    // The completion only matches if the document section made it into
    // the system prompt with the retrieved chunk text.
    let answer = mock_answer(&completion_server, "DOCUMENT CONTEXT", "Grounded answer.").await;
    let extraction = mock_extraction(&completion_server).await;

    let config = base_config(&completion_server, &vector_server);
    let web = WebSearch::new(&config.search, None);
    let (assembler, worker) = build_assembler(config, GraphStore::disconnected(), web);

    let reply = assembler
        .answer(ChatRequest {
            user_id: "user-a".into(),
            document_id: Some("doc-1".into()),
            message: "what grew last quarter?".into(),
            use_web_search: false,
        })
        .await
        .unwrap();

    assert_eq!(reply.answer, "Grounded answer.");
    assert!(reply.sources.has_document_context);
    assert!(!reply.sources.has_web_search);
    assert!(!reply.sources.has_knowledge_graph);

    embed.assert_async().await;
    search.assert_async().await;
    answer.assert_async().await;

    // The turn is persisted off the request path; draining the worker
    // runs entity extraction exactly once.
    drop(assembler);
    worker.close().await;
    extraction.assert_async().await;
}

#[tokio::test]
async fn web_query_prefers_synthesized_answer() {
    let completion_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;
    let web_server = MockServer::start_async().await;

    web_server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({
                "answer": "Paris is the capital of France.",
                "results": [
                    { "title": "Wikipedia", "url": "https://en.wikipedia.org/wiki/Paris",
                      "content": "Paris facts" }
                ]
            }));
        })
        .await;

    let answer = mock_answer(
        &completion_server,
        "Web Search Answer: Paris is the capital of France.",
        "It's Paris.",
    )
    .await;

    let mut config = base_config(&completion_server, &vector_server);
    config.search = SearchConfig {
        url: web_server.base_url(),
        max_results: 5,
        timeout_secs: 5,
    };
    let web = WebSearch::new(&config.search, Some("web-key".into()));
    let (assembler, worker) = build_assembler(config, GraphStore::disconnected(), web);

    let reply = assembler
        .answer(ChatRequest {
            user_id: "user-a".into(),
            document_id: None,
            message: "capital of France?".into(),
            use_web_search: true,
        })
        .await
        .unwrap();

    assert_eq!(reply.answer, "It's Paris.");
    assert!(reply.sources.has_web_search);
    assert_eq!(reply.sources.web_results.len(), 1);
    assert_eq!(reply.sources.web_results[0].title, "Wikipedia");
    answer.assert_async().await;

    drop(assembler);
    worker.close().await;
}

#[tokio::test]
async fn dead_vector_backend_degrades_to_plain_answer() {
    let completion_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;

    // Embedding works, but the vector index is down.
    completion_server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(200)
                .json_body(json!({ "data": [{ "embedding": [0.1, 0.2, 0.3, 0.4] }] }));
        })
        .await;
    vector_server
        .mock_async(|when, then| {
            when.method(GET).path("/collections/test_docs");
            then.status(500).body("index unavailable");
        })
        .await;

    let answer = mock_answer(&completion_server, "You are RagSphere", "Best effort answer.").await;
    let extraction = mock_extraction(&completion_server).await;

    let config = base_config(&completion_server, &vector_server);
    let web = WebSearch::new(&config.search, None);
    let (assembler, worker) = build_assembler(config, GraphStore::disconnected(), web);

    let reply = assembler
        .answer(ChatRequest {
            user_id: "user-a".into(),
            document_id: Some("doc-1".into()),
            message: "what does the report say?".into(),
            use_web_search: false,
        })
        .await
        .unwrap();

    // The query still succeeds; the document source simply went absent.
    assert_eq!(reply.answer, "Best effort answer.");
    assert!(!reply.sources.has_document_context);
    assert!(!reply.sources.has_web_search);
    assert!(!reply.sources.has_knowledge_graph);
    answer.assert_async().await;

    drop(assembler);
    worker.close().await;
    extraction.assert_async().await;
}

#[tokio::test]
async fn empty_message_is_rejected_before_any_retrieval() {
    let completion_server = MockServer::start_async().await;
    let vector_server = MockServer::start_async().await;

    let completion = completion_server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "unused" } }]
            }));
        })
        .await;

    let config = base_config(&completion_server, &vector_server);
    let web = WebSearch::new(&config.search, None);
    let (assembler, worker) = build_assembler(config, GraphStore::disconnected(), web);

    let err = assembler
        .answer(ChatRequest {
            user_id: "user-a".into(),
            document_id: None,
            message: "   ".into(),
            use_web_search: false,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::InvalidRequest(_)));
    assert_eq!(completion.hits_async().await, 0);

    drop(assembler);
    worker.close().await;
}
