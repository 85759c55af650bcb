//! Utility functions for the Companion terminal app
//!
//! Settings locations and the small text renderers shared by the commands.

use chrono::{DateTime, Local, Utc};
use shared::models::MoodRecord;
use shared::settings::{AppSettings, Helpline};
use std::path::PathBuf;
use tracing::warn;

/// Number of check-ins shown by `/moods`
pub const MOOD_CHART_LEN: usize = 10;

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com.local", "Companion", "Companion")
}

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|proj| proj.config_dir().join("settings.json"))
}

/// Directory holding `companion.db`
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|proj| proj.data_dir().to_path_buf())
}

/// Load settings from disk or return defaults
pub fn load_settings_or_default() -> (AppSettings, bool) {
    match config_path() {
        Some(path) => AppSettings::load_or_default(&path),
        None => (AppSettings::default(), true),
    }
}

/// Save settings to disk
pub fn save_settings(settings: &AppSettings) {
    if let Some(path) = config_path() {
        if let Err(e) = settings.save(&path) {
            warn!("Failed to save settings to {}: {:#}", path.display(), e);
        }
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string()
}

/// One bar per check-in, oldest first
pub fn mood_sparkline(trend: &[MoodRecord]) -> String {
    const BARS: [char; 5] = ['▁', '▃', '▄', '▆', '█'];
    trend
        .iter()
        .map(|m| {
            let idx = (m.value.clamp(1, 5) - 1) as usize;
            BARS[idx]
        })
        .collect()
}

/// Text shown when a message trips the crisis screen
pub fn crisis_banner(helplines: &[Helpline]) -> String {
    let mut banner = String::from(
        "It sounds like you are going through something really hard. You don't have to face it alone.\n\
         If you are in danger, please reach out now:",
    );
    for line in helplines {
        banner.push_str(&format!("\n  📞 {} - {}", line.number, line.label));
    }
    banner
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::settings::CrisisResources;

    fn mood(value: i32) -> MoodRecord {
        MoodRecord {
            id: 0,
            timestamp: Utc::now(),
            value,
            note: None,
        }
    }

    #[test]
    fn test_sparkline() {
        let trend: Vec<MoodRecord> = [1, 3, 5, 2].into_iter().map(mood).collect();
        assert_eq!(mood_sparkline(&trend), "▁▄█▃");
        assert_eq!(mood_sparkline(&[]), "");
    }

    #[test]
    fn test_crisis_banner_lists_helplines() {
        let banner = crisis_banner(&CrisisResources::default().helplines);
        assert!(banner.contains("10306"));
        assert!(banner.contains("166"));
    }
}
