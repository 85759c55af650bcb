//! Companion - the supportive chat assistant
//!
//! This crate wires the store and the model together:
//! - Screens every outgoing message for crisis language
//! - Builds the conversation context from profile, moods, journal and memory
//! - Streams replies and persists both sides of the exchange
//! - Distils long-term insights after each exchange
//! - Runs the box-breathing timer

pub mod breathing;
pub mod catalogue;
pub mod chat;
pub mod context;
pub mod insight;
pub mod prompts;

#[cfg(test)]
mod testing;

pub use breathing::{BreathingExercise, BreathingPhase};
pub use catalogue::{available_models, DEFAULT_MODEL, FALLBACK_MODELS};
pub use chat::{CompanionChat, SendOutcome};
pub use prompts::DEFAULT_COMPANION_PROMPT;
