//! Which Gemini models the user can pick from.

use providers::{ChatModel, RemoteModel};
use tracing::warn;

/// Model selected when the settings do not name one
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Offered when the models endpoint fails or returns nothing usable
pub const FALLBACK_MODELS: &[&str] = &[
    "gemini-2.0-flash-exp",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "gemini-3-flash-preview",
];

fn family_rank(name: &str) -> u8 {
    if name.contains("flash") {
        0
    } else if name.contains("pro") {
        1
    } else {
        2
    }
}

/// Keeps Gemini chat models and orders them flash, then pro, then the rest
pub fn select_chat_models(models: Vec<RemoteModel>) -> Vec<String> {
    let mut names: Vec<String> = models
        .into_iter()
        .filter(|m| {
            m.name.contains("gemini")
                && m
                    .supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
        })
        .map(|m| m.name)
        .collect();
    names.sort_by_key(|name| family_rank(name));
    names
}

fn fallback() -> Vec<String> {
    FALLBACK_MODELS.iter().map(|s| s.to_string()).collect()
}

/// Lists selectable models, falling back to a fixed list on failure
pub async fn available_models(model: &dyn ChatModel) -> Vec<String> {
    match model.list_models().await {
        Ok(models) => {
            let names = select_chat_models(models);
            if names.is_empty() {
                warn!("Model list contained no usable Gemini models, using fallback list");
                fallback()
            } else {
                names
            }
        }
        Err(e) => {
            warn!("Error fetching models: {:#}", e);
            fallback()
        }
    }
}
