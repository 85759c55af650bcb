//! Scripted model used by the unit tests in this crate.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use providers::{ChatModel, RemoteModel};
use shared::agent_api::ChatRequest;
use shared::events::StreamChunk;
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedSender;

/// What the scripted model does for one call
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(String),
    /// Streams the text, then reports an error mid-stream
    BreakAfter(String),
}

pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ChatRequest>>,
    models: Option<Vec<RemoteModel>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
            models: None,
        }
    }

    pub fn replying(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Step::Reply(r.to_string())).collect())
    }

    pub fn with_models(mut self, models: Vec<RemoteModel>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    fn next_step(&self, request: &ChatRequest) -> Step {
        self.requests.lock().push(request.clone());
        self.steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| Step::Reply("NONE".to_string()))
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ChatRequest) -> Result<String> {
        match self.next_step(request) {
            Step::Reply(text) | Step::BreakAfter(text) => Ok(text),
            Step::Fail(e) => Err(anyhow!(e)),
        }
    }

    async fn generate_stream(
        &self,
        request: &ChatRequest,
        tx: UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        match self.next_step(request) {
            Step::Reply(text) => {
                for word in text.split_inclusive(' ') {
                    let _ = tx.send(StreamChunk::Text(word.to_string()));
                }
                let _ = tx.send(StreamChunk::Done {
                    finish_reason: Some("STOP".into()),
                });
                Ok(())
            }
            Step::BreakAfter(text) => {
                let _ = tx.send(StreamChunk::Text(text));
                let _ = tx.send(StreamChunk::Error("stream read error: reset".into()));
                Ok(())
            }
            Step::Fail(e) => Err(anyhow!(e)),
        }
    }

    async fn list_models(&self) -> Result<Vec<RemoteModel>> {
        self.models
            .clone()
            .ok_or_else(|| anyhow!("gemini error: 503 Service Unavailable"))
    }
}
