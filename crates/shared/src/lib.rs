pub mod error;
pub mod events;
pub mod models;

pub use error::CompanionError;

pub mod settings {
    use anyhow::Result;
    use serde::{Deserialize, Serialize};
    use std::fs;
    use std::path::Path;
    use tracing::warn;

    fn default_temperature() -> f32 {
        0.7
    }

    fn default_phase_seconds() -> u64 {
        4
    }

    #[derive(Debug, Clone, Serialize, Deserialize, Default)]
    pub struct ProviderAuth {
        pub api_key: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ModelSettings {
        pub selected_model: String, // e.g., "gemini-3-flash-preview"
        #[serde(default = "default_temperature")]
        pub temperature: f32,
        /// Override for the Generative Language endpoint (tests, proxies)
        #[serde(default)]
        pub base_url: Option<String>,
        #[serde(default)]
        pub gemini_auth: ProviderAuth,
    }

    /// Profile gathered on first launch and injected into every conversation
    #[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
    pub struct UserProfile {
        pub name: String,
        pub age: u32,
        pub main_concern: String,
        #[serde(default)]
        pub completed: bool,
    }

    impl UserProfile {
        pub fn new(name: impl Into<String>, age: u32, main_concern: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                age,
                main_concern: main_concern.into(),
                completed: true,
            }
        }
    }

    /// A phone line surfaced when a message trips the crisis screen
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Helpline {
        pub label: String,
        pub number: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CrisisResources {
        pub helplines: Vec<Helpline>,
    }

    impl Default for CrisisResources {
        fn default() -> Self {
            Self {
                helplines: vec![
                    Helpline {
                        label: "Mental health support line".into(),
                        number: "10306".into(),
                    },
                    Helpline {
                        label: "Emergency medical service".into(),
                        number: "166".into(),
                    },
                ],
            }
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct BreathingSettings {
        #[serde(default = "default_phase_seconds")]
        pub phase_seconds: u64,
    }

    impl Default for BreathingSettings {
        fn default() -> Self {
            Self {
                phase_seconds: default_phase_seconds(),
            }
        }
    }

    /// Which screen a front end should open first
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum StartDestination {
        ProfileSetup,
        Sessions,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        pub model: ModelSettings,
        #[serde(default)]
        pub user_profile: UserProfile,
        #[serde(default)]
        pub crisis: CrisisResources,
        #[serde(default)]
        pub breathing: BreathingSettings,
    }

    impl Default for ModelSettings {
        fn default() -> Self {
            Self {
                selected_model: "gemini-3-flash-preview".into(),
                temperature: default_temperature(),
                base_url: None,
                gemini_auth: ProviderAuth::default(),
            }
        }
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                model: ModelSettings::default(),
                user_profile: UserProfile::default(),
                crisis: CrisisResources::default(),
                breathing: BreathingSettings::default(),
            }
        }
    }

    impl AppSettings {
        /// Reads settings from `path`. The flag is true only when no file
        /// exists yet. An unreadable or unparseable file yields defaults with
        /// the flag false and is copied to `settings.json.bak` first, so a
        /// later save cannot lose its contents.
        pub fn load_or_default(path: &Path) -> (Self, bool) {
            if !path.exists() {
                return (Self::default(), true);
            }
            match fs::read(path).map_err(anyhow::Error::from).and_then(|bytes| {
                serde_json::from_slice::<AppSettings>(&bytes).map_err(anyhow::Error::from)
            }) {
                Ok(settings) => (settings, false),
                Err(e) => {
                    let backup = path.with_extension("json.bak");
                    warn!(
                        "Ignoring unreadable settings file {} (copied to {}): {:#}",
                        path.display(),
                        backup.display(),
                        e
                    );
                    if let Err(e) = fs::copy(path, &backup) {
                        warn!("Failed to back up settings file: {}", e);
                    }
                    (Self::default(), false)
                }
            }
        }

        pub fn save(&self, path: &Path) -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_vec_pretty(self)?;
            fs::write(path, json)?;
            Ok(())
        }

        pub fn start_destination(&self) -> StartDestination {
            if self.user_profile.completed {
                StartDestination::Sessions
            } else {
                StartDestination::ProfileSetup
            }
        }

        pub fn save_profile(&mut self, name: &str, age: &str, concern: &str) {
            let age = age.trim().parse().unwrap_or(0);
            self.user_profile = UserProfile::new(name.trim(), age, concern.trim());
        }

        pub fn clear_profile(&mut self) {
            self.user_profile = UserProfile::default();
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_missing_file_gives_defaults() {
            let dir = TempDir::new().unwrap();
            let (settings, fresh) = AppSettings::load_or_default(&dir.path().join("settings.json"));
            assert!(fresh);
            assert_eq!(settings.model.selected_model, "gemini-3-flash-preview");
            assert_eq!(settings.crisis.helplines.len(), 2);
            assert_eq!(settings.start_destination(), StartDestination::ProfileSetup);
        }

        #[test]
        fn test_save_and_reload() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("nested").join("settings.json");
            let mut settings = AppSettings::default();
            settings.save_profile("Eleni", "34", "sleep");
            settings.save(&path).unwrap();

            let (loaded, fresh) = AppSettings::load_or_default(&path);
            assert!(!fresh);
            assert_eq!(loaded.user_profile.name, "Eleni");
            assert_eq!(loaded.user_profile.age, 34);
            assert_eq!(loaded.start_destination(), StartDestination::Sessions);
        }

        #[test]
        fn test_unparseable_age_becomes_zero() {
            let mut settings = AppSettings::default();
            settings.save_profile("Nikos", "thirty", "stress");
            assert_eq!(settings.user_profile.age, 0);
            assert!(settings.user_profile.completed);

            settings.clear_profile();
            assert!(!settings.user_profile.completed);
        }

        #[test]
        fn test_corrupt_file_falls_back_without_overwrite() {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("settings.json");
            fs::write(&path, b"{ not json").unwrap();
            let (settings, fresh) = AppSettings::load_or_default(&path);
            assert!(!fresh);
            assert_eq!(settings.model.selected_model, "gemini-3-flash-preview");
            assert_eq!(fs::read(&path).unwrap(), b"{ not json");
            assert_eq!(
                fs::read(dir.path().join("settings.json.bak")).unwrap(),
                b"{ not json"
            );

            // valid JSON that lacks the required model block
            fs::write(&path, br#"{"user_profile":{"name":"Eleni","age":34,"main_concern":"sleep"}}"#)
                .unwrap();
            let (_, fresh) = AppSettings::load_or_default(&path);
            assert!(!fresh);
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    /// Who authored a turn on the wire
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Model,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ChatTurn {
        pub role: Role,
        pub content: String,
    }

    impl ChatTurn {
        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: Role::User,
                content: content.into(),
            }
        }

        pub fn model(content: impl Into<String>) -> Self {
            Self {
                role: Role::Model,
                content: content.into(),
            }
        }
    }

    /// A full request for the hosted model: persona, history, and the new message
    #[derive(Debug, Clone, Default)]
    pub struct ChatRequest {
        pub system_instruction: Option<String>,
        pub history: Vec<ChatTurn>,
        pub message: String,
        pub temperature: Option<f32>,
    }
}
