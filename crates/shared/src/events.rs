//! Events flowing from providers and background tasks to the front end.

use serde::{Deserialize, Serialize};

/// One piece of a streamed model reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamChunk {
    /// Incremental text
    Text(String),
    /// Stream finished; `finish_reason` as reported by the provider
    Done { finish_reason: Option<String> },
    /// Failure after streaming started
    Error(String),
}

/// Status updates for a chat screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// The outgoing message matched the crisis screen
    CrisisDetected,
    /// Accumulated reply text so far
    Streaming(String),
    /// Reply stored; the model is idle again
    Completed { message_id: i64 },
    /// User-facing failure banner
    Failed(String),
}
