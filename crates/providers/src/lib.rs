//! Hosted language-model clients.
//!
//! The companion talks to models through [`ChatModel`] so the orchestration
//! code can be exercised without the network.

pub mod gemini;
pub mod sse;

use anyhow::Result;
use async_trait::async_trait;
use shared::agent_api::ChatRequest;
use shared::events::StreamChunk;
use tokio::sync::mpsc::UnboundedSender;

pub use gemini::GeminiClient;

/// A model advertised by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModel {
    /// Name without the `models/` prefix, e.g. "gemini-1.5-flash"
    pub name: String,
    pub supported_generation_methods: Vec<String>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Name of the model requests are sent to
    fn model_name(&self) -> &str;

    /// One-shot generation; returns the reply text (possibly empty)
    async fn generate(&self, request: &ChatRequest) -> Result<String>;

    /// Streaming generation.
    ///
    /// Contract: if the request fails before any chunk is sent this returns
    /// `Err(...)`. Once streaming starts, failures are reported through
    /// `StreamChunk::Error` and the method returns `Ok(())`. The last chunk
    /// sent is always terminal.
    async fn generate_stream(
        &self,
        request: &ChatRequest,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()>;

    /// Models the provider offers; empty when the provider cannot tell
    async fn list_models(&self) -> Result<Vec<RemoteModel>> {
        Ok(Vec::new())
    }
}
