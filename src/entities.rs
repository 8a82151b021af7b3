//! Best-effort named-entity extraction.
//!
//! Asks the completion provider for a constrained JSON array of
//! `{name, type}` objects, strips any Markdown code fencing the model
//! wraps around it, and parses defensively. Extraction is enrichment,
//! never a correctness requirement: any provider or parse failure yields
//! an empty list.

use tracing::warn;

use crate::completion::CompletionClient;
use crate::models::{ChatMessage, Entity};

const EXTRACTION_INSTRUCTION: &str = "Extract named entities (people, places, organizations, \
     dates, concepts) from the text. Return a JSON array with objects containing \"name\" and \
     \"type\" keys. Return ONLY the JSON array, no other text.";

/// Extract entities from `text`. Always succeeds; failures degrade to an
/// empty list with a warning.
pub async fn extract_entities(completion: &CompletionClient, text: &str) -> Vec<Entity> {
    let messages = [
        ChatMessage::system(EXTRACTION_INSTRUCTION),
        ChatMessage::user(text),
    ];

    match completion.complete(&messages).await {
        Ok(raw) => parse_entity_json(&raw),
        Err(e) => {
            warn!(error = %e, "entity extraction call failed; storing turn without entities");
            Vec::new()
        }
    }
}

/// Parse the model's reply, tolerating ```json fencing. Anything that is
/// not a valid entity array becomes an empty list.
fn parse_entity_json(raw: &str) -> Vec<Entity> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();

    match serde_json::from_str::<Vec<Entity>>(cleaned) {
        Ok(entities) => entities,
        Err(e) => {
            warn!(error = %e, "entity extraction returned unparseable JSON");
            Vec::new()
        }
    }
}
