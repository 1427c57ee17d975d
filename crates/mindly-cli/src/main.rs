//! Mindly CLI - Command-line interface for the Mindly mood journal
//!
//! Capture, browse, and follow journal entries from the terminal.

mod session_store;

use std::env;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use mindly_core::auth::{AuthError, FirebaseAuth};
use mindly_core::config::{RemoteConfig, ResolvedRemoteConfig};
use mindly_core::db::{DbError, FirebaseJournal, JournalBackend};
use mindly_core::{Entry, JournalStore, Mood, Session, SessionManager};
use serde::Serialize;
use thiserror::Error;

use session_store::SessionStore;

const JOURNAL_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "mindly")]
#[command(about = "Mood journaling from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Register {
        /// Display name for the new account
        #[arg(long)]
        name: String,
        /// Email address
        #[arg(long)]
        email: String,
        /// Password
        #[arg(long)]
        password: String,
    },
    /// Sign in with email and password
    Login {
        /// Email address
        #[arg(long)]
        email: String,
        /// Password
        #[arg(long)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Create a new journal entry
    #[command(alias = "new")]
    Add {
        /// Entry title
        #[arg(long)]
        title: String,
        /// Mood to record
        #[arg(long, value_enum, default_value_t = MoodArg::Happy)]
        mood: MoodArg,
        /// Entry content; omit to pipe stdin or open $EDITOR
        content: Vec<String>,
    },
    /// List journal entries, newest first
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing entry
    Edit {
        /// Entry ID or unique ID prefix
        id: String,
        /// Replacement title
        #[arg(long)]
        title: Option<String>,
        /// Replacement mood
        #[arg(long, value_enum)]
        mood: Option<MoodArg>,
    },
    /// Delete an existing entry
    Delete {
        /// Entry ID or unique ID prefix
        id: String,
    },
    /// Follow the journal and reprint it on every change
    Watch,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Not signed in. Run `mindly login` first.")]
    NotSignedIn,
    #[error("Sign-in failed; check your email and password.")]
    SignInRejected,
    #[error("Sign-up failed; the account may already exist.")]
    SignUpRejected,
    #[error("Sign-out failed; the stored session could not be cleared.")]
    SignOutFailed,
    #[error("Entry title cannot be empty")]
    EmptyTitle,
    #[error("No entry content provided")]
    EmptyContent,
    #[error("Edited entry content cannot be empty")]
    EmptyEditedContent,
    #[error("Entry ID cannot be empty")]
    EmptyEntryId,
    #[error("Entry not found for id/prefix: {0}")]
    EntryNotFound(String),
    #[error("{0}")]
    AmbiguousEntryId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Timed out waiting for the journal to load")]
    JournalLoadTimeout,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum MoodArg {
    Happy,
    Sad,
    Angry,
    Anxious,
}

impl MoodArg {
    fn to_mood(self) -> Mood {
        match self {
            Self::Happy => Mood::happy(),
            Self::Sad => Mood::sad(),
            Self::Angry => Mood::angry(),
            Self::Anxious => Mood::anxious(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mindly=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = RemoteConfig::from_env().resolve().map_err(CliError::Config)?;

    match cli.command {
        Commands::Register {
            name,
            email,
            password,
        } => run_register(&config, &name, &email, &password).await?,
        Commands::Login { email, password } => run_login(&config, &email, &password).await?,
        Commands::Logout => run_logout(&config).await?,
        Commands::Whoami => run_whoami(&config).await?,
        Commands::Add {
            title,
            mood,
            content,
        } => {
            let store = connect_journal(&config).await?;
            run_add(&store, &title, mood, &content).await?;
        }
        Commands::List { limit, json } => {
            let store = connect_journal(&config).await?;
            run_list(&store, limit, json).await?;
        }
        Commands::Edit { id, title, mood } => {
            let store = connect_journal(&config).await?;
            run_edit(&store, &id, title.as_deref(), mood).await?;
        }
        Commands::Delete { id } => {
            let store = connect_journal(&config).await?;
            run_delete(&store, &id).await?;
        }
        Commands::Watch => {
            let store = connect_journal(&config).await?;
            run_watch(&store).await?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

fn auth_client(config: &ResolvedRemoteConfig) -> Result<FirebaseAuth<SessionStore>, CliError> {
    Ok(FirebaseAuth::new(config.api_key.as_str(), SessionStore::new())?)
}

async fn run_register(
    config: &ResolvedRemoteConfig,
    name: &str,
    email: &str,
    password: &str,
) -> Result<(), CliError> {
    let manager = SessionManager::new(auth_client(config)?);
    let session = manager.sign_up(name, email, password).await;

    if session.last_attempt_failed {
        return Err(CliError::SignUpRejected);
    }
    println!("Signed in as {}", describe_session(&session));
    Ok(())
}

async fn run_login(
    config: &ResolvedRemoteConfig,
    email: &str,
    password: &str,
) -> Result<(), CliError> {
    let manager = SessionManager::new(auth_client(config)?);
    let session = manager.sign_in(email, password).await;

    if session.last_attempt_failed {
        return Err(CliError::SignInRejected);
    }
    println!("Signed in as {}", describe_session(&session));
    Ok(())
}

async fn run_logout(config: &ResolvedRemoteConfig) -> Result<(), CliError> {
    let manager = SessionManager::new(auth_client(config)?);
    let session = manager.sign_out().await;

    if session.signed_in {
        return Err(CliError::SignOutFailed);
    }
    println!("Signed out");
    Ok(())
}

async fn run_whoami(config: &ResolvedRemoteConfig) -> Result<(), CliError> {
    let manager = SessionManager::new(auth_client(config)?);
    let session = manager.check_session().await;

    if session.signed_in {
        println!("{}", describe_session(&session));
        if let Some(uid) = session.user_id() {
            println!("uid: {uid}");
        }
    } else {
        println!("Not signed in");
    }
    Ok(())
}

/// Restore the stored session and open the journal for its user.
async fn connect_journal(
    config: &ResolvedRemoteConfig,
) -> Result<JournalStore<FirebaseJournal>, CliError> {
    let auth = auth_client(config)?;
    let Some(session) = auth.restore_session().await? else {
        return Err(CliError::NotSignedIn);
    };
    tracing::info!("Session restored for '{}'", session.user.uid);

    let backend = FirebaseJournal::new(&config.database_url, session.id_token.as_str())?;
    Ok(JournalStore::open(backend, Some(session.user.uid)).await)
}

async fn loaded_entries<B: JournalBackend>(
    store: &JournalStore<B>,
) -> Result<Vec<Entry>, CliError> {
    tokio::time::timeout(JOURNAL_LOAD_TIMEOUT, store.wait_loaded())
        .await
        .map_err(|_| CliError::JournalLoadTimeout)?;
    Ok(store.entries())
}

async fn run_add<B: JournalBackend>(
    store: &JournalStore<B>,
    title: &str,
    mood: MoodArg,
    content_parts: &[String],
) -> Result<(), CliError> {
    let title = normalize_title(title)?;
    let content = resolve_entry_content(content_parts)?;

    let Some(entry) = store.add(title, content, mood.to_mood()).await else {
        return Err(CliError::NotSignedIn);
    };
    tracing::info!("Journal entry '{}' added", entry.id);

    println!("{}", entry.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct EntryListItem {
    id: String,
    title: String,
    content: String,
    mood: Mood,
    created_at: i64,
    relative_time: String,
}

async fn run_list<B: JournalBackend>(
    store: &JournalStore<B>,
    limit: usize,
    as_json: bool,
) -> Result<(), CliError> {
    let entries = loaded_entries(store).await?;
    let shown = &entries[..limit.min(entries.len())];

    if as_json {
        let json_items = shown
            .iter()
            .map(entry_to_list_item)
            .collect::<Vec<EntryListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if shown.is_empty() {
        println!("No journal entries yet");
    } else {
        for line in format_entry_lines(shown) {
            println!("{line}");
        }
    }

    Ok(())
}

async fn run_edit<B: JournalBackend>(
    store: &JournalStore<B>,
    id: &str,
    title: Option<&str>,
    mood: Option<MoodArg>,
) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let entries = loaded_entries(store).await?;
    let entry = resolve_entry(&normalized_id, &entries)?;

    let Some(edited_content) = capture_editor_input_with_initial(&entry.content)? else {
        return Err(CliError::EmptyEditedContent);
    };

    let new_title = match title {
        Some(title) => normalize_title(title)?,
        None => entry.title.clone(),
    };
    let new_mood = mood.map_or_else(|| entry.mood.clone(), MoodArg::to_mood);

    if edited_content == entry.content && new_title == entry.title && new_mood == entry.mood {
        println!("{}", entry.id);
        return Ok(());
    }

    let Some(updated) = store.update(entry, new_title, edited_content, new_mood).await else {
        return Err(CliError::NotSignedIn);
    };
    println!("{}", updated.id);
    Ok(())
}

async fn run_delete<B: JournalBackend>(
    store: &JournalStore<B>,
    id: &str,
) -> Result<(), CliError> {
    let normalized_id = normalize_entry_identifier(id)?;
    let entries = loaded_entries(store).await?;
    let entry = resolve_entry(&normalized_id, &entries)?;

    store.delete(entry).await;
    println!("{}", entry.id);
    Ok(())
}

async fn run_watch<B: JournalBackend>(store: &JournalStore<B>) -> Result<(), CliError> {
    let entries = loaded_entries(store).await?;
    let mut watcher = store.watch();

    println!("Watching the journal; press Ctrl-C to stop");
    print_watch_frame(&entries);

    loop {
        tokio::select! {
            changed = watcher.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let entries = watcher.borrow_and_update().clone();
                print_watch_frame(&entries);
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                return Ok(());
            }
        }
    }
}

fn print_watch_frame(entries: &[Entry]) {
    println!("-- {} entries --", entries.len());
    for line in format_entry_lines(entries) {
        println!("{line}");
    }
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "mindly", buffer);
}

fn describe_session(session: &Session) -> String {
    match (session.name.is_empty(), session.email.is_empty()) {
        (false, false) => format!("{} <{}>", session.name, session.email),
        (false, true) => session.name.clone(),
        (true, false) => session.email.clone(),
        (true, true) => session.user_id().unwrap_or("unknown user").to_string(),
    }
}

fn resolve_entry<'a>(entry_query: &str, entries: &'a [Entry]) -> Result<&'a Entry, CliError> {
    if let Some(entry) = entries.iter().find(|entry| entry.id.as_str() == entry_query) {
        return Ok(entry);
    }

    let matches: Vec<&'a Entry> = entries
        .iter()
        .filter(|entry| entry.id.as_str().starts_with(entry_query))
        .collect();

    match matches.len() {
        0 => Err(CliError::EntryNotFound(entry_query.to_string())),
        1 => Ok(matches[0]),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|entry| entry.id.as_str().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousEntryId(format!(
                "ID prefix '{entry_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn format_entry_lines(entries: &[Entry]) -> Vec<String> {
    let now = Utc::now().timestamp();
    entries
        .iter()
        .map(|entry| {
            let id = entry.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let title = title_preview(&entry.title, 32);
            let relative_time = format_relative_time(entry.created_at, now);
            format!(
                "{short_id:<13}  {}  {title:<32}  {relative_time}",
                entry.mood.emoji
            )
        })
        .collect()
}

fn entry_to_list_item(entry: &Entry) -> EntryListItem {
    let now = Utc::now().timestamp();
    EntryListItem {
        id: entry.id.to_string(),
        title: entry.title.clone(),
        content: entry.content.clone(),
        mood: entry.mood.clone(),
        created_at: entry.created_at,
        relative_time: format_relative_time(entry.created_at, now),
    }
}

fn title_preview(title: &str, max_chars: usize) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp: i64, now: i64) -> String {
    let diff = now.saturating_sub(timestamp);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn resolve_entry_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input()? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_title(title: &str) -> Result<String, CliError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyTitle)
    } else {
        Ok(trimmed.to_string())
    }
}

fn normalize_entry_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyEntryId)
    } else {
        Ok(trimmed.to_string())
    }
}

fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

fn capture_editor_input() -> Result<Option<String>, CliError> {
    capture_editor_input_with_initial("")
}

fn capture_editor_input_with_initial(initial_content: &str) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_entry_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let entry_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&entry_content))
}

fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    match Command::new(editor).arg(file_path).status() {
        Ok(status) => {
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            // Fallback for editor commands with args, e.g. "code --wait"
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };

            let mut command = Command::new(program);
            command.args(parts).arg(file_path);

            let status = command.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(CliError::EditorFailed(format!(
                    "`{editor}` exited with status {status}"
                )))
            }
        }
        Err(err) => Err(CliError::Io(err)),
    }
}

fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_entry_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("mindly-entry-{}-{now}.md", std::process::id()))
}
