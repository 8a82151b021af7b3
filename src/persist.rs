//! Background persistence of conversation turns.
//!
//! The answer returned to the caller must never wait on — or fail
//! because of — graph writes. Instead of an unawaited future, turns are
//! handed to an explicit worker task over an unbounded channel. The
//! worker runs entity extraction and the graph write on its own
//! lifetime, detached from any request's cancellation scope, and logs
//! failures on its own error channel. Once enqueued, a job runs to
//! completion or failure even if the response has long been flushed.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::completion::CompletionClient;
use crate::entities::extract_entities;
use crate::graph::GraphStore;
use crate::models::ConversationTurn;

/// Cheap cloneable sender for persistence jobs.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<ConversationTurn>,
}

impl PersistenceHandle {
    /// Enqueue a turn for persistence. Never blocks and never fails the
    /// caller; a closed worker drops the job with a warning.
    pub fn enqueue(&self, turn: ConversationTurn) {
        if self.tx.send(turn).is_err() {
            warn!("persistence worker closed; dropping conversation turn");
        }
    }
}

/// Owns the worker task. Keep it alive for the process lifetime and
/// [`close`](PersistenceWorker::close) it on shutdown to drain pending
/// jobs (all other handles must be dropped first — the queue closes when
/// the last sender goes away).
pub struct PersistenceWorker {
    handle: PersistenceHandle,
    task: JoinHandle<()>,
}

impl PersistenceWorker {
    /// Spawn the worker over the given graph store and completion client
    /// (the latter performs entity extraction).
    pub fn spawn(graph: GraphStore, completion: CompletionClient) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ConversationTurn>();

        let task = tokio::spawn(async move {
            while let Some(turn) = rx.recv().await {
                let combined = format!("{} {}", turn.user_message, turn.assistant_message);
                let entities = extract_entities(&completion, &combined).await;

                match graph.record_turn(&turn, &entities).await {
                    Ok(Some(turn_id)) => {
                        debug!(turn_id = %turn_id, entities = entities.len(), "persisted turn");
                    }
                    Ok(None) => {
                        debug!("graph store unconfigured; turn not persisted");
                    }
                    Err(e) => {
                        error!(error = %e, document_id = %turn.document_id, "turn persistence failed");
                    }
                }
            }
        });

        Self {
            handle: PersistenceHandle { tx },
            task,
        }
    }

    pub fn handle(&self) -> PersistenceHandle {
        self.handle.clone()
    }

    /// Drop this worker's sender and wait for the queue to drain.
    pub async fn close(self) {
        let PersistenceWorker { handle, task } = self;
        drop(handle);
        if let Err(e) = task.await {
            error!(error = %e, "persistence worker task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionConfig;
    use httpmock::prelude::*;

    fn turn() -> ConversationTurn {
        ConversationTurn {
            user_id: "u1".into(),
            document_id: "d1".into(),
            user_message: "what is rust?".into(),
            assistant_message: "a systems language".into(),
            timestamp_millis: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_worker_extracts_entities_and_drains() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(serde_json::json!({
                    "choices": [{ "message": { "role": "assistant",
                        "content": "[{\"name\":\"Rust\",\"type\":\"concept\"}]" } }]
                }));
            })
            .await;

        let config = CompletionConfig {
            url: server.base_url(),
            ..CompletionConfig::default()
        };
        let completion = CompletionClient::new(&config, "test-key".into()).unwrap();

        // Disconnected graph: the write becomes a no-op, but the full
        // job (including extraction) still runs to completion.
        let worker = PersistenceWorker::spawn(GraphStore::disconnected(), completion);
        worker.handle().enqueue(turn());
        worker.close().await;

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_death_does_not_panic() {
        let server = MockServer::start_async().await;
        let config = CompletionConfig {
            url: server.base_url(),
            ..CompletionConfig::default()
        };
        let completion = CompletionClient::new(&config, "test-key".into()).unwrap();

        let PersistenceWorker { handle, task } =
            PersistenceWorker::spawn(GraphStore::disconnected(), completion);
        task.abort();
        let _ = task.await;

        // The worker is gone; the job is dropped with a warning.
        handle.enqueue(turn());
    }
}
