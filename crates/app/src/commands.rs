//! Slash commands understood by the terminal front end.

/// A parsed line of user input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Plain text for the current session
    Say(String),
    NewSession,
    ListSessions,
    OpenSession(i64),
    RenameSession(String),
    DeleteSession(i64),
    Mood { value: i32, note: Option<String> },
    MoodHistory,
    JournalAdd { title: String, content: String },
    JournalList,
    JournalShow(i64),
    JournalDelete(i64),
    Breathe,
    Profile,
    ResetProfile,
    Models,
    UseModel(String),
    SetApiKey(String),
    ForgetInsights,
    Help,
    Quit,
    /// Recognised command with bad arguments; carries the usage line
    Usage(&'static str),
    Unknown(String),
    Empty,
}

pub const HELP: &str = "\
Commands:
  /new                      start a new session
  /sessions                 list sessions
  /open <id>                continue a session
  /rename <title>           rename the current session
  /delete <id>              delete a session and its messages
  /mood <1-5> [note]        log how you feel
  /moods                    show your recent mood trend
  /journal add <title> | <text>
  /journal list             list journal entries
  /journal show <id>        read an entry
  /journal delete <id>      delete an entry
  /breathe                  start or stop box breathing
  /profile                  show your profile
  /reset-profile            clear your profile
  /models                   list available models
  /model <name>             switch model
  /key <api key>            store your Gemini API key
  /forget                   clear long-term memory
  /help                     show this help
  /quit                     exit
Anything else is sent to your companion.";

fn parse_id(arg: &str, usage: &'static str, command: fn(i64) -> Command) -> Command {
    match arg.trim().parse::<i64>() {
        Ok(id) => command(id),
        Err(_) => Command::Usage(usage),
    }
}

fn parse_journal(args: &str) -> Command {
    let (sub, rest) = args.split_once(' ').unwrap_or((args, ""));
    match sub {
        "add" => match rest.split_once('|') {
            Some((title, content)) if !title.trim().is_empty() => Command::JournalAdd {
                title: title.trim().to_string(),
                content: content.trim().to_string(),
            },
            _ => Command::Usage("/journal add <title> | <text>"),
        },
        "list" | "" => Command::JournalList,
        "show" => parse_id(rest, "/journal show <id>", Command::JournalShow),
        "delete" => parse_id(rest, "/journal delete <id>", Command::JournalDelete),
        _ => Command::Usage("/journal add|list|show|delete"),
    }
}

fn parse_mood(args: &str) -> Command {
    let (value, note) = args.split_once(' ').unwrap_or((args, ""));
    match value.parse::<i32>() {
        Ok(value) => Command::Mood {
            value,
            note: Some(note.trim().to_string()).filter(|n| !n.is_empty()),
        },
        Err(_) => Command::Usage("/mood <1-5> [note]"),
    }
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(body) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let (name, args) = body.split_once(' ').unwrap_or((body, ""));
    let args = args.trim();

    match name {
        "new" => Command::NewSession,
        "sessions" => Command::ListSessions,
        "open" => parse_id(args, "/open <id>", Command::OpenSession),
        "rename" if !args.is_empty() => Command::RenameSession(args.to_string()),
        "rename" => Command::Usage("/rename <title>"),
        "delete" => parse_id(args, "/delete <id>", Command::DeleteSession),
        "mood" => parse_mood(args),
        "moods" => Command::MoodHistory,
        "journal" => parse_journal(args),
        "breathe" => Command::Breathe,
        "profile" => Command::Profile,
        "reset-profile" => Command::ResetProfile,
        "models" => Command::Models,
        "model" if !args.is_empty() => Command::UseModel(args.to_string()),
        "model" => Command::Usage("/model <name>"),
        "key" if !args.is_empty() => Command::SetApiKey(args.to_string()),
        "key" => Command::Usage("/key <api key>"),
        "forget" => Command::ForgetInsights,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Unknown(other.to_string()),
    }
}
