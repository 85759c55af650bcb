//! Companion - terminal front end
//!
//! A line-based chat with the companion plus mood check-ins, journaling and
//! a box-breathing timer. Settings live in the platform config directory and
//! everything else in `companion.db` under the data directory.

mod commands;
mod utils;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use commands::{Command, HELP};
use companion::{BreathingExercise, BreathingPhase, CompanionChat};
use providers::{ChatModel, GeminiClient};
use services::CompanionStore;
use shared::agent_api::ChatRequest;
use shared::events::{ChatEvent, StreamChunk};
use shared::models::JournalEntry;
use shared::settings::{AppSettings, StartDestination};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use utils::*;

type InputLines = Lines<BufReader<Stdin>>;

/// Stands in for the Gemini client until an API key is configured
struct MissingKey {
    model: String,
}

#[async_trait]
impl ChatModel for MissingKey {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _request: &ChatRequest) -> Result<String> {
        Err(anyhow!("No Gemini API key configured. Use /key <api key>"))
    }

    async fn generate_stream(
        &self,
        _request: &ChatRequest,
        _tx: mpsc::UnboundedSender<StreamChunk>,
    ) -> Result<()> {
        Err(anyhow!("No Gemini API key configured. Use /key <api key>"))
    }
}

fn build_model(settings: &AppSettings) -> Arc<dyn ChatModel> {
    match GeminiClient::from_settings(&settings.model) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("Gemini client unavailable: {:#}", e);
            Arc::new(MissingKey {
                model: settings.model.selected_model.clone(),
            })
        }
    }
}

struct CompanionApp {
    settings: AppSettings,
    chat: CompanionChat,
    breathing: BreathingExercise,
    current_session: Option<i64>,
}

fn prompt(text: &str) {
    print!("{}", text);
    let _ = std::io::stdout().flush();
}

async fn ask(lines: &mut InputLines, question: &str) -> Result<Option<String>> {
    prompt(question);
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

/// Prints streamed text as it arrives
async fn print_events(mut rx: mpsc::UnboundedReceiver<ChatEvent>, banner: String) {
    let mut printed = 0;
    while let Some(event) = rx.recv().await {
        match event {
            ChatEvent::CrisisDetected => println!("\n{}\n", banner),
            ChatEvent::Streaming(full) => {
                if printed == 0 {
                    prompt("companion> ");
                }
                if let Some(delta) = full.get(printed..) {
                    prompt(delta);
                }
                printed = full.len();
            }
            ChatEvent::Completed { .. } => println!(),
            ChatEvent::Failed(message) => {
                if printed > 0 {
                    println!();
                }
                println!("{}", message);
            }
        }
    }
}

impl CompanionApp {
    async fn setup_profile(&mut self, lines: &mut InputLines) -> Result<()> {
        println!("Let's get to know each other first.");
        let Some(name) = ask(lines, "Your name: ").await? else {
            return Ok(());
        };
        let age = ask(lines, "Your age: ").await?.unwrap_or_default();
        let concern = ask(lines, "What brings you here? ").await?.unwrap_or_default();
        self.settings.save_profile(&name, &age, &concern);
        save_settings(&self.settings);
        self.chat.set_profile(self.settings.user_profile.clone());
        println!("Thank you, {}. Type /help to see what I can do.", self.settings.user_profile.name);
        Ok(())
    }

    fn session_id(&mut self) -> Result<i64> {
        if let Some(id) = self.current_session {
            return Ok(id);
        }
        let session = self.chat.create_session()?;
        println!("(started session #{})", session.id);
        self.current_session = Some(session.id);
        Ok(session.id)
    }

    async fn say(&mut self, text: &str) -> Result<()> {
        let session_id = self.session_id()?;
        let banner = crisis_banner(&self.settings.crisis.helplines);
        let (tx, rx) = mpsc::unbounded_channel();
        let (result, _) = tokio::join!(
            self.chat.send_message_stream(session_id, text, tx),
            print_events(rx, banner)
        );
        if let Err(e) = result {
            info!("Message not completed: {}", e);
        }
        Ok(())
    }

    fn switch_model(&mut self, name: &str) {
        self.settings.model.selected_model = name.to_string();
        save_settings(&self.settings);
        self.chat.set_model(build_model(&self.settings));
        println!("Now using {}", self.chat.model_name());
    }

    fn toggle_breathing(&self) {
        if !self.breathing.toggle() {
            println!("Breathing exercise stopped.");
            return;
        }
        println!("Box breathing started. Type /breathe again to stop.");
        let mut rx = self.breathing.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let phase = *rx.borrow_and_update();
                if phase == BreathingPhase::Idle {
                    break;
                }
                println!("  ~ {}", phase.instruction());
            }
        });
    }

    /// Returns false when the app should exit
    async fn handle(&mut self, command: Command, lines: &mut InputLines) -> Result<bool> {
        let store = Arc::clone(self.chat.store());
        match command {
            Command::Empty => {}
            Command::Say(text) => self.say(&text).await?,
            Command::NewSession => {
                let session = self.chat.create_session()?;
                self.current_session = Some(session.id);
                println!("Started session #{}", session.id);
            }
            Command::ListSessions => {
                let sessions = self.chat.sessions()?;
                if sessions.is_empty() {
                    println!("No sessions yet. Just start typing.");
                }
                for s in sessions {
                    let marker = if Some(s.id) == self.current_session { "*" } else { " " };
                    println!(
                        "{} #{:<4} {}  {}",
                        marker,
                        s.id,
                        format_timestamp(&s.started_at),
                        s.display_title()
                    );
                }
            }
            Command::OpenSession(id) => match store.session(id)? {
                Some(session) => {
                    self.current_session = Some(id);
                    println!("── {} ──", session.display_title());
                    for m in self.chat.messages(id)? {
                        println!("{}: {}", m.sender, m.content);
                    }
                }
                None => println!("No session #{}", id),
            },
            Command::RenameSession(title) => match self.current_session {
                Some(id) => {
                    self.chat.rename_session(id, &title)?;
                    println!("Renamed.");
                }
                None => println!("Open a session first."),
            },
            Command::DeleteSession(id) => match self.chat.delete_session(id) {
                Ok(()) => {
                    if self.current_session == Some(id) {
                        self.current_session = None;
                    }
                    println!("Deleted session #{}", id);
                }
                Err(e) => println!("{}", e.user_message()),
            },
            Command::Mood { value, note } => match store.save_mood(value, note.as_deref()) {
                Ok(record) => println!("Logged mood: {}", record.label()),
                Err(e) => println!("{}", e),
            },
            Command::MoodHistory => {
                let trend = store.mood_trend(MOOD_CHART_LEN)?;
                if trend.is_empty() {
                    println!("No mood check-ins yet. Try /mood 3");
                } else {
                    println!("Last {} check-ins: {}", trend.len(), mood_sparkline(&trend));
                    if let Some(last) = trend.last() {
                        println!("Latest: {} ({})", last.label(), format_timestamp(&last.timestamp));
                    }
                }
            }
            Command::JournalAdd { title, content } => {
                let id = store.save_entry(&JournalEntry::new(title, content))?;
                println!("Saved journal entry #{}", id);
            }
            Command::JournalList => {
                for entry in store.all_entries()? {
                    println!(
                        "#{:<4} {}  {}",
                        entry.id,
                        format_timestamp(&entry.timestamp),
                        entry.title
                    );
                }
            }
            Command::JournalShow(id) => match store.entry_by_id(id)? {
                Some(entry) => println!(
                    "{}\n{}\n\n{}",
                    entry.title,
                    format_timestamp(&entry.timestamp),
                    entry.content
                ),
                None => println!("No journal entry #{}", id),
            },
            Command::JournalDelete(id) => match store.delete_entry(id) {
                Ok(()) => println!("Deleted journal entry #{}", id),
                Err(e) => println!("{}", e),
            },
            Command::Breathe => self.toggle_breathing(),
            Command::Profile => {
                let p = &self.settings.user_profile;
                println!("Name: {}\nAge: {}\nMain concern: {}", p.name, p.age, p.main_concern);
            }
            Command::ResetProfile => {
                self.settings.clear_profile();
                save_settings(&self.settings);
                self.setup_profile(lines).await?;
            }
            Command::Models => {
                let current = self.chat.model_name();
                for name in self.chat.available_models().await {
                    let marker = if name == current { "*" } else { " " };
                    println!("{} {}", marker, name);
                }
            }
            Command::UseModel(name) => self.switch_model(&name),
            Command::SetApiKey(key) => {
                self.settings.model.gemini_auth.api_key = Some(key);
                let model = self.settings.model.selected_model.clone();
                self.switch_model(&model);
            }
            Command::ForgetInsights => {
                store.clear_insights()?;
                println!("Long-term memory cleared.");
            }
            Command::Help => println!("{}", HELP),
            Command::Usage(usage) => println!("Usage: {}", usage),
            Command::Unknown(name) => println!("Unknown command /{}. Type /help.", name),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let (settings, fresh) = load_settings_or_default();
    if fresh {
        save_settings(&settings);
    }
    let data_dir = data_dir().context("Could not determine a data directory")?;
    let store = Arc::new(CompanionStore::new(&data_dir)?);
    info!("Using database {:?}", store.db_path());

    let chat = CompanionChat::new(
        store,
        build_model(&settings),
        settings.user_profile.clone(),
    );
    let breathing = BreathingExercise::new(Duration::from_secs(settings.breathing.phase_seconds));
    let mut app = CompanionApp {
        settings,
        chat,
        breathing,
        current_session: None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if app.settings.start_destination() == StartDestination::ProfileSetup {
        app.setup_profile(&mut lines).await?;
    } else {
        println!(
            "Welcome back, {}. Type /help for commands.",
            app.settings.user_profile.name
        );
    }

    loop {
        prompt("you> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match app.handle(commands::parse(&line), &mut lines).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("❌ Error: {:#}", e),
        }
    }

    app.breathing.stop();
    println!("Take care.");
    Ok(())
}
