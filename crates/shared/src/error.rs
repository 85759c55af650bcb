//! Typed errors surfaced to front ends.

/// Companion error types
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: i64 },

    #[error("Journal entry not found: {entry_id}")]
    EntryNotFound { entry_id: i64 },

    #[error("Mood value {value} is outside 1..=5")]
    InvalidMood { value: i32 },

    #[error("Response blocked or empty")]
    EmptyResponse,

    #[error("Storage failed: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("Provider failed: {0}")]
    Provider(#[source] anyhow::Error),
}

impl CompanionError {
    /// Short message suitable for a banner in the chat screen
    pub fn user_message(&self) -> String {
        match self {
            CompanionError::Provider(e) => describe_provider_error(&e.to_string()),
            CompanionError::EmptyResponse => describe_provider_error("finishReason"),
            other => format!("❌ Error: {}", other),
        }
    }
}

/// Maps a raw provider failure onto the wording shown to the user.
pub fn describe_provider_error(error: &str) -> String {
    if error.contains("429") {
        "⚠️ Traffic Limit (429): Please wait a moment.".to_string()
    } else if error.contains("Quota") {
        "⚠️ API Quota Exceeded.".to_string()
    } else if error.contains("503") {
        "⚠️ Service Unavailable (503). Try again.".to_string()
    } else if error.contains("finishReason") {
        "⚠️ Stopped by Safety Filters.".to_string()
    } else if error.trim().is_empty() {
        "❌ Error: Unknown error".to_string()
    } else {
        format!("❌ Error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_message() {
        let msg = describe_provider_error("gemini error: 429 Too Many Requests");
        assert!(msg.contains("Traffic Limit"));
    }

    #[test]
    fn test_quota_and_unavailable() {
        assert_eq!(describe_provider_error("Quota exhausted"), "⚠️ API Quota Exceeded.");
        assert!(describe_provider_error("status 503").contains("Service Unavailable"));
    }

    #[test]
    fn test_safety_block() {
        let err = CompanionError::EmptyResponse;
        assert_eq!(err.user_message(), "⚠️ Stopped by Safety Filters.");
    }

    #[test]
    fn test_generic_fallback() {
        assert_eq!(describe_provider_error("boom"), "❌ Error: boom");
        assert_eq!(describe_provider_error(""), "❌ Error: Unknown error");

        let err = CompanionError::InvalidMood { value: 9 };
        assert!(err.user_message().contains("outside 1..=5"));
    }
}
