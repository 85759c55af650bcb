//! Records kept on the device: sessions, messages, moods, journal entries
//! and long-term insights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Title given to a session until the user renames it
pub const DEFAULT_SESSION_TITLE: &str = "New Session";

/// Lowest and highest accepted mood values (1 = very sad, 5 = very happy)
pub const MOOD_MIN: i32 = 1;
pub const MOOD_MAX: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Ai,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "USER",
            Sender::Ai => "AI",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Sender::User),
            "AI" => Ok(Sender::Ai),
            other => Err(anyhow::anyhow!("unknown sender: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub title: Option<String>,
}

impl Session {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_SESSION_TITLE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: i64,
    pub session_id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender: Sender,
    pub sentiment_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoodRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub value: i32,
    pub note: Option<String>,
}

impl MoodRecord {
    pub fn is_valid_value(value: i32) -> bool {
        (MOOD_MIN..=MOOD_MAX).contains(&value)
    }

    pub fn label(&self) -> &'static str {
        match self.value {
            1 => "Very sad",
            2 => "Sad",
            3 => "Neutral",
            4 => "Happy",
            5 => "Very happy",
            _ => "Unknown",
        }
    }
}

/// A private journal entry. `id == 0` means "not stored yet".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JournalEntry {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl JournalEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: title.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A fact about the user distilled from past conversations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Insight {
    pub id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_round_trips_through_text() {
        assert_eq!("USER".parse::<Sender>().unwrap(), Sender::User);
        assert_eq!(Sender::Ai.to_string(), "AI");
        assert!("BOT".parse::<Sender>().is_err());
    }

    #[test]
    fn test_mood_bounds() {
        assert!(MoodRecord::is_valid_value(1));
        assert!(MoodRecord::is_valid_value(5));
        assert!(!MoodRecord::is_valid_value(0));
        assert!(!MoodRecord::is_valid_value(6));
    }

    #[test]
    fn test_session_default_title() {
        let session = Session {
            id: 1,
            started_at: Utc::now(),
            title: None,
        };
        assert_eq!(session.display_title(), "New Session");
    }
}
