//! Long-term memory: after each exchange the model is asked for one fact
//! about the user worth remembering across sessions.

use crate::context::render_transcript;
use crate::prompts::{insight_request, INSIGHT_EXTRACTION_PROMPT, NO_INSIGHT};
use anyhow::Result;
use providers::ChatModel;
use services::CompanionStore;
use shared::agent_api::ChatRequest;
use tracing::{debug, warn};

/// Messages from the end of the session shown to the memory module
pub const INSIGHT_WINDOW: usize = 6;
/// Replies this short are treated as noise
const MIN_INSIGHT_LEN: usize = 5;

/// Cleans a memory-module reply; `None` when there is nothing to store
pub fn accept_insight(reply: &str) -> Option<String> {
    let insight = reply.trim();
    if insight == NO_INSIGHT || insight.chars().count() <= MIN_INSIGHT_LEN {
        return None;
    }
    Some(insight.to_string())
}

/// Runs extraction for a session and stores the result. Returns the stored
/// insight, if any.
pub async fn extract_and_save(
    store: &CompanionStore,
    model: &dyn ChatModel,
    session_id: i64,
) -> Result<Option<String>> {
    let messages = store.messages(session_id)?;
    if messages.len() < 2 {
        return Ok(None);
    }
    let window = &messages[messages.len().saturating_sub(INSIGHT_WINDOW)..];

    let request = ChatRequest {
        system_instruction: Some(INSIGHT_EXTRACTION_PROMPT.to_string()),
        history: Vec::new(),
        message: insight_request(&render_transcript(window)),
        temperature: None,
    };
    let reply = model.generate(&request).await?;

    match accept_insight(&reply) {
        Some(insight) => {
            store.save_insight(&insight)?;
            debug!("Saved new insight: {}", insight);
            Ok(Some(insight))
        }
        None => Ok(None),
    }
}

/// Same as [`extract_and_save`] but never fails; errors are logged
pub async fn extract_quietly(store: &CompanionStore, model: &dyn ChatModel, session_id: i64) {
    if let Err(e) = extract_and_save(store, model, session_id).await {
        warn!("Error extracting insight for session {}: {:#}", session_id, e);
    }
}
