use crate::cli::Commands;
use crate::config::Config;
use crate::error::{kind_of, Result, ThreadkeepError};
use crate::storage::{self, SessionSummary};
use crate::store::{SessionListing, SessionStore};
use colored::Colorize;
use prettytable::{format, Table};

const TITLE_COLUMN_CHARS: usize = 40;

/// Handle session maintenance commands
pub fn handle_sessions(command: Commands, config: &Config, owner: Option<&str>) -> Result<()> {
    let open = || SessionStore::open(config, owner);

    match command {
        Commands::Backend => show_backend(config)?,
        Commands::List => {
            let store = open()?;
            let sessions = store.list_all()?;
            if sessions.is_empty() {
                println!("{}", "No sessions found.".yellow());
                return Ok(());
            }
            println!("\nSessions ({} backend):", store.backend_kind());
            listing_table(&sessions).printstd();
            println!();
        }
        Commands::Search { query } => match open()?.search_by_text(&query) {
            Ok(hits) if hits.is_empty() => {
                println!("{}", format!("No sessions mention '{}'.", query).yellow());
            }
            Ok(hits) => {
                println!("\nSessions mentioning '{}':", query);
                summary_table(&hits).printstd();
                println!();
            }
            Err(e) => match kind_of(&e) {
                Some(ThreadkeepError::UnsupportedOperation(reason)) => {
                    println!("{}", reason.yellow());
                }
                _ => return Err(e),
            },
        },
        Commands::Stats => {
            let store = open()?;
            let stats = store.stats()?;
            println!("Backend:           {}", store.backend_kind().to_string().cyan());
            println!("Total sessions:    {}", stats.total_sessions);
            println!("Total messages:    {}", stats.total_messages);
            println!("Resident sessions: {}", stats.sessions_resident);
        }
        Commands::Delete { id } => {
            if open()?.delete(&id)? {
                println!("{}", format!("Deleted session {}", id).green());
            } else {
                println!("{}", format!("No session {}", id).yellow());
            }
        }
        Commands::Rename { id, title } => {
            if open()?.rename(&id, &title)? {
                println!("{}", format!("Renamed session {} to '{}'", id, title).green());
            } else {
                println!("{}", format!("No session {}", id).yellow());
            }
        }
    }

    Ok(())
}

fn show_backend(config: &Config) -> Result<()> {
    let selection = storage::select_backend(&config.storage)?;
    println!("Backend: {}", selection.kind.to_string().cyan());
    match &selection.fallback_reason {
        Some(reason) => println!("Fallback reason: {}", reason.yellow()),
        None => println!("{}", "Database reachable".green()),
    }
    Ok(())
}

fn short_title(title: &str) -> String {
    if title.chars().count() > TITLE_COLUMN_CHARS {
        let head: String = title.chars().take(TITLE_COLUMN_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        title.to_string()
    }
}

fn listing_table(sessions: &[SessionListing]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "",
        "ID".bold(),
        "Title".bold(),
        "Messages".bold(),
        "Last Updated".bold()
    ]);

    for listing in sessions {
        let marker = if listing.is_current { "*" } else { "" };
        let session = &listing.summary;
        table.add_row(prettytable::row![
            marker,
            session.id.cyan(),
            short_title(&session.title),
            session.message_count,
            session.updated_at.format("%Y-%m-%d %H:%M")
        ]);
    }
    table
}

fn summary_table(sessions: &[SessionSummary]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Owner".bold(),
        "Messages".bold()
    ]);

    for session in sessions {
        table.add_row(prettytable::row![
            session.id.cyan(),
            short_title(&session.title),
            session.owner.as_deref().unwrap_or("-"),
            session.message_count
        ]);
    }
    table
}
