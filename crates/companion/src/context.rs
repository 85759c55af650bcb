//! Conversation context assembly.
//!
//! Everything the model should know about the user is rendered into one
//! system instruction: persona, profile, then recent moods, journal entries
//! and remembered insights. Empty sections are left out entirely.

use crate::prompts::DEFAULT_COMPANION_PROMPT;
use anyhow::Result;
use chrono::{DateTime, Utc};
use services::CompanionStore;
use shared::agent_api::ChatTurn;
use shared::models::{Insight, JournalEntry, Message, MoodRecord, Sender};
use shared::settings::UserProfile;

/// Mood check-ins included in the context
pub const MOOD_CONTEXT_LIMIT: usize = 5;
/// Journal entries included in the context
pub const JOURNAL_CONTEXT_LIMIT: usize = 3;

fn format_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn mood_section(moods: &[MoodRecord]) -> String {
    if moods.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = moods
        .iter()
        .map(|m| format!("- Value: {} (at {})", m.value, format_time(&m.timestamp)))
        .collect();
    format!("RECENT MOOD HISTORY (1=Sad, 5=Happy):\n{}", lines.join("\n"))
}

fn journal_section(entries: &[JournalEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let blocks: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "Title: {}\nDate: {}\nContent: {}",
                e.title,
                format_time(&e.timestamp),
                e.content
            )
        })
        .collect();
    format!(
        "RECENT JOURNAL ENTRIES (User's private thoughts):\n{}",
        blocks.join("\n\n")
    )
}

fn memory_section(insights: &[Insight]) -> String {
    if insights.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = insights.iter().map(|i| format!("- {}", i.content)).collect();
    format!(
        "LONG-TERM MEMORY (Important facts from past sessions):\n{}",
        lines.join("\n")
    )
}

/// Renders the system instruction for a chat request
pub fn build_system_instruction(
    profile: &UserProfile,
    moods: &[MoodRecord],
    journal: &[JournalEntry],
    insights: &[Insight],
) -> String {
    let mut sections = vec![
        DEFAULT_COMPANION_PROMPT.to_string(),
        format!(
            "USER PROFILE CONTEXT:\nName: {}\nAge: {}\nMain Concern: {}",
            profile.name, profile.age, profile.main_concern
        ),
    ];
    sections.extend(
        [
            mood_section(moods),
            journal_section(journal),
            memory_section(insights),
        ]
        .into_iter()
        .filter(|s| !s.is_empty()),
    );
    sections.join("\n\n")
}

/// Loads the recent records from the store and renders the instruction
pub fn system_instruction_from_store(
    store: &CompanionStore,
    profile: &UserProfile,
) -> Result<String> {
    let moods = store.recent_moods(MOOD_CONTEXT_LIMIT)?;
    let journal = store.recent_entries(JOURNAL_CONTEXT_LIMIT)?;
    let insights = store.recent_insights()?;
    Ok(build_system_instruction(profile, &moods, &journal, &insights))
}

/// Converts stored messages into model turns
pub fn history_to_turns(messages: &[Message]) -> Vec<ChatTurn> {
    messages
        .iter()
        .map(|m| match m.sender {
            Sender::User => ChatTurn::user(m.content.clone()),
            Sender::Ai => ChatTurn::model(m.content.clone()),
        })
        .collect()
}

/// `SENDER: content` lines, as read by the memory module
pub fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::agent_api::Role;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn profile() -> UserProfile {
        UserProfile::new("Maria", 29, "anxiety at work")
    }

    #[test]
    fn test_profile_only() {
        let prompt = build_system_instruction(&profile(), &[], &[], &[]);
        assert!(prompt.starts_with(DEFAULT_COMPANION_PROMPT));
        assert!(prompt.contains("USER PROFILE CONTEXT:\nName: Maria\nAge: 29\nMain Concern: anxiety at work"));
        assert!(!prompt.contains("RECENT MOOD HISTORY"));
        assert!(!prompt.contains("RECENT JOURNAL ENTRIES"));
        assert!(!prompt.contains("LONG-TERM MEMORY"));
    }

    #[test]
    fn test_all_sections() {
        let moods = vec![MoodRecord {
            id: 1,
            timestamp: at(0),
            value: 2,
            note: None,
        }];
        let journal = vec![
            JournalEntry {
                id: 1,
                title: "Sunday".into(),
                content: "Slept badly".into(),
                timestamp: at(60),
            },
            JournalEntry {
                id: 2,
                title: "Monday".into(),
                content: "Meeting went ok".into(),
                timestamp: at(120),
            },
        ];
        let insights = vec![Insight {
            id: 1,
            content: "User is afraid of flying".into(),
            timestamp: at(0),
        }];

        let prompt = build_system_instruction(&profile(), &moods, &journal, &insights);
        assert!(prompt.contains(
            "RECENT MOOD HISTORY (1=Sad, 5=Happy):\n- Value: 2 (at 1970-01-01 00:00 UTC)"
        ));
        assert!(prompt.contains(
            "Title: Sunday\nDate: 1970-01-01 00:01 UTC\nContent: Slept badly\n\nTitle: Monday"
        ));
        assert!(prompt.contains(
            "LONG-TERM MEMORY (Important facts from past sessions):\n- User is afraid of flying"
        ));

        let mood_at = prompt.find("RECENT MOOD").unwrap();
        let journal_at = prompt.find("RECENT JOURNAL").unwrap();
        let memory_at = prompt.find("LONG-TERM MEMORY").unwrap();
        assert!(mood_at < journal_at && journal_at < memory_at);
    }

    #[test]
    fn test_context_limits_from_store() {
        let store = CompanionStore::open_in_memory().unwrap();
        for value in [1, 2, 3, 4, 5, 5, 4] {
            store.save_mood(value, None).unwrap();
        }
        for i in 0..5 {
            store
                .save_entry(&JournalEntry::new(format!("entry {}", i), "text"))
                .unwrap();
        }
        let prompt = system_instruction_from_store(&store, &profile()).unwrap();
        assert_eq!(prompt.matches("- Value: ").count(), MOOD_CONTEXT_LIMIT);
        assert_eq!(prompt.matches("Title: ").count(), JOURNAL_CONTEXT_LIMIT);
    }

    #[test]
    fn test_history_roles() {
        let message = |sender, content: &str| Message {
            id: 0,
            session_id: 1,
            content: content.into(),
            timestamp: at(0),
            sender,
            sentiment_score: None,
        };
        let messages = vec![message(Sender::User, "hi"), message(Sender::Ai, "hello")];

        let turns = history_to_turns(&messages);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Model);
        assert_eq!(render_transcript(&messages), "USER: hi\nAI: hello");
    }
}
