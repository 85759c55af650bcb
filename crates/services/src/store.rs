//! On-device storage for the companion.
//!
//! A single SQLite file holds chat sessions, their messages, mood check-ins,
//! journal entries and the long-term insights extracted from conversations.

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use shared::models::{
    Insight, JournalEntry, Message, MoodRecord, Sender, Session, DEFAULT_SESSION_TITLE,
};
use shared::CompanionError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// How many insights are fed back to the model as long-term memory
pub const INSIGHT_MEMORY_LIMIT: usize = 20;

const DB_FILE_NAME: &str = "companion.db";

pub struct CompanionStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        started_at: from_millis(row.get(1)?),
        title: row.get(2)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let sender: String = row.get(4)?;
    let sender = sender.parse::<Sender>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        timestamp: from_millis(row.get(3)?),
        sender,
        sentiment_score: row.get::<_, Option<f64>>(5)?.map(|s| s as f32),
    })
}

fn mood_from_row(row: &Row<'_>) -> rusqlite::Result<MoodRecord> {
    Ok(MoodRecord {
        id: row.get(0)?,
        timestamp: from_millis(row.get(1)?),
        value: row.get(2)?,
        note: row.get(3)?,
    })
}

fn journal_from_row(row: &Row<'_>) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        timestamp: from_millis(row.get(3)?),
    })
}

fn insight_from_row(row: &Row<'_>) -> rusqlite::Result<Insight> {
    Ok(Insight {
        id: row.get(0)?,
        content: row.get(1)?,
        timestamp: from_millis(row.get(2)?),
    })
}

impl CompanionStore {
    /// Open (or create) the database inside `data_dir`
    pub fn new(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join(DB_FILE_NAME);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        info!("Opened companion store at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path),
        })
    }

    /// Volatile store, used by tests and by front ends in demo mode
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_time INTEGER NOT NULL,
                title TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                sender TEXT NOT NULL,
                sentiment_score REAL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, timestamp);

            CREATE TABLE IF NOT EXISTS moods (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp INTEGER NOT NULL,
                mood_value INTEGER NOT NULL,
                note TEXT
            );

            CREATE TABLE IF NOT EXISTS journal_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS insights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    // ── Sessions ───────────────────────────────────────────────────────

    pub fn create_session(&self) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (start_time, title) VALUES (?1, ?2)",
            params![to_millis(Utc::now()), DEFAULT_SESSION_TITLE],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Created session {}", id);
        Ok(id)
    }

    /// All sessions, newest first
    pub fn sessions(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, start_time, title FROM sessions ORDER BY start_time DESC, id DESC",
        )?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    pub fn session(&self, session_id: i64) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        let session = conn
            .query_row(
                "SELECT id, start_time, title FROM sessions WHERE id = ?1",
                params![session_id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    pub fn rename_session(&self, session_id: i64, title: &str) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE sessions SET title = ?1 WHERE id = ?2",
            params![title, session_id],
        )?;
        if updated == 0 {
            return Err(CompanionError::SessionNotFound { session_id }.into());
        }
        Ok(())
    }

    /// Deletes the session and its messages. Returns false if it did not exist.
    pub fn delete_session(&self, session_id: i64) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            params![session_id],
        )?;
        let removed = tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        tx.commit()?;
        debug!("Deleted session {} (existed: {})", session_id, removed > 0);
        Ok(removed > 0)
    }

    // ── Messages ───────────────────────────────────────────────────────

    pub fn add_message(&self, session_id: i64, sender: Sender, content: &str) -> Result<Message> {
        let timestamp = Utc::now();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO messages (session_id, content, timestamp, sender)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, content, to_millis(timestamp), sender.as_str()],
        )?;
        Ok(Message {
            id: conn.last_insert_rowid(),
            session_id,
            content: content.to_string(),
            timestamp: from_millis(to_millis(timestamp)),
            sender,
            sentiment_score: None,
        })
    }

    /// Messages of a session in the order they were written
    pub fn messages(&self, session_id: i64) -> Result<Vec<Message>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, content, timestamp, sender, sentiment_score
             FROM messages WHERE session_id = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let messages = stmt
            .query_map(params![session_id], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    // ── Moods ──────────────────────────────────────────────────────────

    pub fn save_mood(&self, value: i32, note: Option<&str>) -> Result<MoodRecord> {
        if !MoodRecord::is_valid_value(value) {
            return Err(CompanionError::InvalidMood { value }.into());
        }
        let timestamp = Utc::now();
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO moods (timestamp, mood_value, note) VALUES (?1, ?2, ?3)",
            params![to_millis(timestamp), value, note],
        )?;
        Ok(MoodRecord {
            id: conn.last_insert_rowid(),
            timestamp: from_millis(to_millis(timestamp)),
            value,
            note: note.map(str::to_string),
        })
    }

    /// Every mood check-in, newest first
    pub fn all_moods(&self) -> Result<Vec<MoodRecord>> {
        self.query_moods(None)
    }

    pub fn recent_moods(&self, limit: usize) -> Result<Vec<MoodRecord>> {
        self.query_moods(Some(limit))
    }

    /// The last `limit` mood values, oldest first, ready to be charted
    pub fn mood_trend(&self, limit: usize) -> Result<Vec<MoodRecord>> {
        let mut moods = self.recent_moods(limit)?;
        moods.reverse();
        Ok(moods)
    }

    fn query_moods(&self, limit: Option<usize>) -> Result<Vec<MoodRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, mood_value, note FROM moods
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let moods = stmt
            .query_map(params![limit], mood_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(moods)
    }

    // ── Journal ────────────────────────────────────────────────────────

    /// Inserts a new entry (`id == 0`) or replaces the stored one. Returns the id.
    pub fn save_entry(&self, entry: &JournalEntry) -> Result<i64> {
        let conn = self.conn.lock();
        if entry.id == 0 {
            conn.execute(
                "INSERT INTO journal_entries (title, content, timestamp) VALUES (?1, ?2, ?3)",
                params![entry.title, entry.content, to_millis(entry.timestamp)],
            )?;
            Ok(conn.last_insert_rowid())
        } else {
            conn.execute(
                "INSERT OR REPLACE INTO journal_entries (id, title, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.id, entry.title, entry.content, to_millis(entry.timestamp)],
            )?;
            Ok(entry.id)
        }
    }

    pub fn entry_by_id(&self, entry_id: i64) -> Result<Option<JournalEntry>> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT id, title, content, timestamp FROM journal_entries WHERE id = ?1",
                params![entry_id],
                journal_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Every journal entry, newest first
    pub fn all_entries(&self) -> Result<Vec<JournalEntry>> {
        self.query_entries(None)
    }

    pub fn recent_entries(&self, limit: usize) -> Result<Vec<JournalEntry>> {
        self.query_entries(Some(limit))
    }

    fn query_entries(&self, limit: Option<usize>) -> Result<Vec<JournalEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, title, content, timestamp FROM journal_entries
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let entries = stmt
            .query_map(params![limit], journal_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn delete_entry(&self, entry_id: i64) -> Result<()> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM journal_entries WHERE id = ?1",
            params![entry_id],
        )?;
        if removed == 0 {
            return Err(CompanionError::EntryNotFound { entry_id }.into());
        }
        Ok(())
    }

    // ── Insights ───────────────────────────────────────────────────────

    pub fn save_insight(&self, content: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO insights (content, timestamp) VALUES (?1, ?2)",
            params![content, to_millis(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// The most recent insights used as long-term memory, newest first
    pub fn recent_insights(&self) -> Result<Vec<Insight>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, content, timestamp FROM insights
             ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let insights = stmt
            .query_map(params![INSIGHT_MEMORY_LIMIT as i64], insight_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(insights)
    }

    pub fn clear_insights(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM insights", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = CompanionStore::new(temp_dir.path()).unwrap();
        assert!(store.sessions().unwrap().is_empty());
        assert!(temp_dir.path().join("companion.db").exists());
    }

    #[test]
    fn test_data_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = CompanionStore::new(temp_dir.path()).unwrap();
            let id = store.create_session().unwrap();
            store.add_message(id, Sender::User, "hello").unwrap();
        }
        let store = CompanionStore::new(temp_dir.path()).unwrap();
        let sessions = store.sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(store.messages(sessions[0].id).unwrap()[0].content, "hello");
    }

    #[test]
    fn test_session_lifecycle() {
        let store = CompanionStore::open_in_memory().unwrap();
        let first = store.create_session().unwrap();
        let second = store.create_session().unwrap();

        let sessions = store.sessions().unwrap();
        assert_eq!(sessions[0].id, second);
        assert_eq!(sessions[1].display_title(), "New Session");

        store.rename_session(first, "Work stress").unwrap();
        assert_eq!(
            store.session(first).unwrap().unwrap().title.as_deref(),
            Some("Work stress")
        );

        let err = store.rename_session(999, "nope").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompanionError>(),
            Some(CompanionError::SessionNotFound { session_id: 999 })
        ));
    }

    #[test]
    fn test_delete_session_removes_messages() {
        let store = CompanionStore::open_in_memory().unwrap();
        let id = store.create_session().unwrap();
        store.add_message(id, Sender::User, "hi").unwrap();
        store.add_message(id, Sender::Ai, "hello there").unwrap();

        assert!(store.delete_session(id).unwrap());
        assert!(store.messages(id).unwrap().is_empty());
        assert!(store.session(id).unwrap().is_none());
        assert!(!store.delete_session(id).unwrap());
    }

    #[test]
    fn test_messages_keep_write_order() {
        let store = CompanionStore::open_in_memory().unwrap();
        let id = store.create_session().unwrap();
        let other = store.create_session().unwrap();
        store.add_message(id, Sender::User, "one").unwrap();
        store.add_message(id, Sender::Ai, "two").unwrap();
        store.add_message(other, Sender::User, "elsewhere").unwrap();
        store.add_message(id, Sender::User, "three").unwrap();

        let messages = store.messages(id).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
        assert_eq!(messages[1].sender, Sender::Ai);
    }

    #[test]
    fn test_moods() {
        let store = CompanionStore::open_in_memory().unwrap();
        for value in [2, 3, 5] {
            store.save_mood(value, None).unwrap();
        }
        let saved = store.save_mood(4, Some("  after a walk ")).unwrap();
        assert_eq!(saved.note.as_deref(), Some("after a walk"));

        let recent = store.recent_moods(2).unwrap();
        let values: Vec<i32> = recent.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![4, 5]);

        let trend = store.mood_trend(3).unwrap();
        let values: Vec<i32> = trend.iter().map(|m| m.value).collect();
        assert_eq!(values, vec![3, 5, 4]);

        assert_eq!(store.all_moods().unwrap().len(), 4);
    }

    #[test]
    fn test_invalid_mood_rejected() {
        let store = CompanionStore::open_in_memory().unwrap();
        let err = store.save_mood(0, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompanionError>(),
            Some(CompanionError::InvalidMood { value: 0 })
        ));
        assert!(store.all_moods().unwrap().is_empty());
    }

    #[test]
    fn test_journal_crud() {
        let store = CompanionStore::open_in_memory().unwrap();
        let mut entry = JournalEntry::new("Monday", "Long day at work");
        entry.timestamp = from_millis(1_000);
        let first = store.save_entry(&entry).unwrap();

        let mut later = JournalEntry::new("Tuesday", "Better");
        later.timestamp = from_millis(2_000);
        let second = store.save_entry(&later).unwrap();

        let all = store.all_entries().unwrap();
        assert_eq!(all[0].id, second);
        assert_eq!(all[1].id, first);

        let mut edited = store.entry_by_id(first).unwrap().unwrap();
        edited.content = "Long day, but fine".into();
        assert_eq!(store.save_entry(&edited).unwrap(), first);
        assert_eq!(
            store.entry_by_id(first).unwrap().unwrap().content,
            "Long day, but fine"
        );

        assert_eq!(store.recent_entries(1).unwrap().len(), 1);

        store.delete_entry(first).unwrap();
        assert!(store.entry_by_id(first).unwrap().is_none());
        assert!(store.delete_entry(first).is_err());
    }

    #[test]
    fn test_insight_memory_is_capped() {
        let store = CompanionStore::open_in_memory().unwrap();
        for i in 0..25 {
            store.save_insight(&format!("fact {}", i)).unwrap();
        }
        let insights = store.recent_insights().unwrap();
        assert_eq!(insights.len(), INSIGHT_MEMORY_LIMIT);
        assert_eq!(insights[0].content, "fact 24");

        store.clear_insights().unwrap();
        assert!(store.recent_insights().unwrap().is_empty());
    }
}
