//! Chat orchestration: screens the message, assembles context, calls the
//! model, persists both sides of the exchange and updates long-term memory.

use crate::catalogue;
use crate::context::{history_to_turns, system_instruction_from_store};
use crate::insight::extract_quietly;
use parking_lot::RwLock;
use providers::ChatModel;
use services::{scan, CompanionStore, CrisisScan};
use shared::agent_api::ChatRequest;
use shared::events::{ChatEvent, StreamChunk};
use shared::models::{Message, Sender, Session};
use shared::settings::UserProfile;
use shared::CompanionError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of a completed exchange
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// Crisis screen of the user's message
    pub crisis: CrisisScan,
    /// The stored model reply
    pub reply: Message,
}

/// Store errors keep their typed variant when they carry one
fn storage(e: anyhow::Error) -> CompanionError {
    match e.downcast::<CompanionError>() {
        Ok(err) => err,
        Err(e) => CompanionError::Storage(e),
    }
}

pub struct CompanionChat {
    store: Arc<CompanionStore>,
    model: RwLock<Arc<dyn ChatModel>>,
    profile: RwLock<UserProfile>,
}

impl CompanionChat {
    pub fn new(store: Arc<CompanionStore>, model: Arc<dyn ChatModel>, profile: UserProfile) -> Self {
        Self {
            store,
            model: RwLock::new(model),
            profile: RwLock::new(profile),
        }
    }

    pub fn store(&self) -> &Arc<CompanionStore> {
        &self.store
    }

    pub fn set_profile(&self, profile: UserProfile) {
        *self.profile.write() = profile;
    }

    pub fn set_model(&self, model: Arc<dyn ChatModel>) {
        info!("Switching chat model to {}", model.model_name());
        *self.model.write() = model;
    }

    pub fn model_name(&self) -> String {
        self.model.read().model_name().to_string()
    }

    fn current_model(&self) -> Arc<dyn ChatModel> {
        Arc::clone(&self.model.read())
    }

    /// Local crisis screen; nothing leaves the process
    pub fn screen(&self, text: &str) -> CrisisScan {
        scan(text)
    }

    // ── Sessions ───────────────────────────────────────────────────────

    pub fn create_session(&self) -> Result<Session, CompanionError> {
        let id = self.store.create_session().map_err(storage)?;
        self.store
            .session(id)
            .map_err(storage)?
            .ok_or(CompanionError::SessionNotFound { session_id: id })
    }

    pub fn sessions(&self) -> Result<Vec<Session>, CompanionError> {
        self.store.sessions().map_err(storage)
    }

    pub fn messages(&self, session_id: i64) -> Result<Vec<Message>, CompanionError> {
        self.store.messages(session_id).map_err(storage)
    }

    pub fn rename_session(&self, session_id: i64, title: &str) -> Result<(), CompanionError> {
        self.store.rename_session(session_id, title.trim()).map_err(storage)
    }

    pub fn delete_session(&self, session_id: i64) -> Result<(), CompanionError> {
        if self.store.delete_session(session_id).map_err(storage)? {
            Ok(())
        } else {
            Err(CompanionError::SessionNotFound { session_id })
        }
    }

    pub async fn available_models(&self) -> Vec<String> {
        let model = self.current_model();
        catalogue::available_models(model.as_ref()).await
    }

    // ── Messaging ──────────────────────────────────────────────────────

    /// Validates and screens the message, stores it and builds the request.
    /// History is read before the new message is stored so it is not sent
    /// twice.
    fn prepare(
        &self,
        session_id: i64,
        text: &str,
    ) -> Result<(CrisisScan, ChatRequest), CompanionError> {
        let crisis = self.screen(text);
        let text = text.trim();
        if text.is_empty() {
            return Err(CompanionError::EmptyMessage);
        }
        if self.store.session(session_id).map_err(storage)?.is_none() {
            return Err(CompanionError::SessionNotFound { session_id });
        }
        if crisis.is_crisis() {
            warn!(
                "Crisis keywords detected in session {} ({} matches)",
                session_id,
                crisis.matched.len()
            );
        }

        let history = self.store.messages(session_id).map_err(storage)?;
        self.store
            .add_message(session_id, Sender::User, text)
            .map_err(storage)?;
        let system_instruction = {
            let profile = self.profile.read();
            system_instruction_from_store(&self.store, &profile).map_err(storage)?
        };

        let request = ChatRequest {
            system_instruction: Some(system_instruction),
            history: history_to_turns(&history),
            message: text.to_string(),
            temperature: None,
        };
        Ok((crisis, request))
    }

    /// Stores the reply and refreshes long-term memory
    async fn finish(
        &self,
        model: &dyn ChatModel,
        session_id: i64,
        reply: &str,
    ) -> Result<Message, CompanionError> {
        if reply.trim().is_empty() {
            return Err(CompanionError::EmptyResponse);
        }
        let message = self
            .store
            .add_message(session_id, Sender::Ai, reply)
            .map_err(storage)?;
        extract_quietly(&self.store, model, session_id).await;
        Ok(message)
    }

    /// Sends a message and waits for the whole reply
    pub async fn send_message(
        &self,
        session_id: i64,
        text: &str,
    ) -> Result<SendOutcome, CompanionError> {
        let (crisis, request) = self.prepare(session_id, text)?;
        let model = self.current_model();
        debug!("Sending message to {}", model.model_name());

        let reply = model
            .generate(&request)
            .await
            .map_err(CompanionError::Provider)?;
        let reply = self.finish(model.as_ref(), session_id, &reply).await?;
        Ok(SendOutcome { crisis, reply })
    }

    /// Streaming variant of [`send_message`](Self::send_message).
    ///
    /// `ChatEvent::CrisisDetected` is emitted before the model is contacted,
    /// followed by `Streaming` with the accumulated text and finally
    /// `Completed` or `Failed`.
    pub async fn send_message_stream(
        &self,
        session_id: i64,
        text: &str,
        events: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<SendOutcome, CompanionError> {
        let (crisis, request) = self.prepare(session_id, text)?;
        if crisis.is_crisis() {
            let _ = events.send(ChatEvent::CrisisDetected);
        }

        let result = self.stream_reply(session_id, &request, &events).await;
        match &result {
            Ok(reply) => {
                let _ = events.send(ChatEvent::Completed {
                    message_id: reply.id,
                });
            }
            Err(e) => {
                let _ = events.send(ChatEvent::Failed(e.user_message()));
            }
        }
        result.map(|reply| SendOutcome { crisis, reply })
    }

    async fn stream_reply(
        &self,
        session_id: i64,
        request: &ChatRequest,
        events: &mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<Message, CompanionError> {
        let model = self.current_model();
        debug!("Streaming message to {}", model.model_name());
        let (tx, mut rx) = mpsc::unbounded_channel::<StreamChunk>();

        let producer = model.generate_stream(request, tx);
        let consumer = async {
            let mut full = String::new();
            let mut failure = None;
            while let Some(chunk) = rx.recv().await {
                match chunk {
                    StreamChunk::Text(text) => {
                        full.push_str(&text);
                        let _ = events.send(ChatEvent::Streaming(full.clone()));
                    }
                    StreamChunk::Done { finish_reason } => {
                        debug!("Stream finished: {:?}", finish_reason);
                    }
                    StreamChunk::Error(e) => failure = Some(e),
                }
            }
            (full, failure)
        };
        let (result, (full, failure)) = tokio::join!(producer, consumer);

        result.map_err(CompanionError::Provider)?;
        if let Some(e) = failure {
            return Err(CompanionError::Provider(anyhow::anyhow!(e)));
        }
        self.finish(model.as_ref(), session_id, &full).await
    }
}
