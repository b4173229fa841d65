use std::{error::Error, io::Write};

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{AccountStatus, Engine, EngineError, generate_code, sanitize_invite_code};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

const INVITE_ATTEMPTS: usize = 5;

#[derive(Parser, Debug)]
#[command(name = "kwh_admin")]
#[command(about = "Admin utilities for the kWh manager (invites, admins, accounts)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL", default_value = migration::DEFAULT_DATABASE_URL)]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Invite(Invite),
    Account(Account),
    /// Print account and ledger totals.
    Stats,
}

#[derive(Args, Debug)]
struct Invite {
    #[command(subcommand)]
    command: InviteCommand,
}

#[derive(Subcommand, Debug)]
enum InviteCommand {
    /// Generate a fresh invite code.
    Create(InviteCreateArgs),
    /// List every invite, newest first.
    List,
    /// Deactivate an unused invite.
    Revoke { code: String },
}

#[derive(Args, Debug)]
struct InviteCreateArgs {
    #[arg(long)]
    notes: Option<String>,
    /// Telegram id recorded as creator.
    #[arg(long, default_value_t = 0)]
    created_by: i64,
}

#[derive(Args, Debug)]
struct Account {
    #[command(subcommand)]
    command: AccountCommand,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Create an active admin, or promote and activate an existing account.
    MakeAdmin(MakeAdminArgs),
    /// Remove an account. Its ledger entries are kept.
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
struct MakeAdminArgs {
    #[arg(long)]
    telegram_id: i64,
    #[arg(long, default_value = "Admin")]
    first_name: String,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    #[arg(long)]
    telegram_id: i64,
    /// Skip the confirmation prompt.
    #[arg(long)]
    yes: bool,
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self, Box<dyn Error + Send + Sync>> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Single keypress yes/no prompt; anything but `y` answers no.
fn confirm(prompt: &str) -> Result<bool, Box<dyn Error + Send + Sync>> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt),
        Print(" [y/N] ")
    )?;
    out.flush()?;

    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        let answer = match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                return Err("interrupted".into());
            }
            KeyCode::Char('y') | KeyCode::Char('Y') => true,
            KeyCode::Char(_) | KeyCode::Enter | KeyCode::Esc => false,
            _ => continue,
        };
        execute!(out, Print(if answer { "y\r\n" } else { "n\r\n" }))?;
        out.flush()?;
        return Ok(answer);
    }
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::Invite(Invite {
            command: InviteCommand::Create(args),
        }) => {
            let now = Utc::now();
            for attempt in 1..=INVITE_ATTEMPTS {
                match engine
                    .create_invite(&generate_code(), args.created_by, args.notes.as_deref(), now)
                    .await
                {
                    Ok(invite) => {
                        println!(
                            "created invite: {} (expires {})",
                            invite.code,
                            invite.expires_at.format("%d/%m/%Y %H:%M")
                        );
                        return Ok(());
                    }
                    Err(EngineError::ExistingKey(_)) if attempt < INVITE_ATTEMPTS => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            eprintln!("could not generate a unique invite code");
            std::process::exit(1);
        }
        Command::Invite(Invite {
            command: InviteCommand::List,
        }) => {
            let now = Utc::now();
            let invites = engine.invites().await?;
            if invites.is_empty() {
                println!("no invites");
            }
            for invite in invites {
                let state = match (invite.used_by, invite.is_active) {
                    (Some(user), _) => format!("used by {user}"),
                    (None, false) => "revoked".to_string(),
                    (None, true) if invite.is_expired(now) => "expired".to_string(),
                    (None, true) => "active".to_string(),
                };
                println!(
                    "{}  {:<14} expires {}  {}",
                    invite.code,
                    state,
                    invite.expires_at.format("%d/%m/%Y"),
                    invite.notes.as_deref().unwrap_or("")
                );
            }
        }
        Command::Invite(Invite {
            command: InviteCommand::Revoke { code },
        }) => {
            let Some(code) = sanitize_invite_code(&code) else {
                eprintln!("invalid invite code: {code}");
                std::process::exit(2);
            };
            let invite = engine.revoke_invite(&code).await?;
            println!("revoked invite: {}", invite.code);
        }
        Command::Account(Account {
            command: AccountCommand::MakeAdmin(args),
        }) => {
            let account = engine
                .ensure_admin(args.telegram_id, &args.first_name, Utc::now())
                .await?;
            println!("admin ready: {} ({})", account.display_name(), account.id);
        }
        Command::Account(Account {
            command: AccountCommand::Delete(args),
        }) => {
            let Some(account) = engine.find_account(args.telegram_id).await? else {
                eprintln!("account not found: {}", args.telegram_id);
                std::process::exit(1);
            };
            let prompt = format!(
                "Delete {} ({}), balance {}?",
                account.display_name(),
                account.id,
                account.balance
            );
            if !args.yes && !confirm(&prompt)? {
                println!("aborted");
                return Ok(());
            }
            engine.delete_account(account.id).await?;
            println!("deleted account: {}", account.id);
        }
        Command::Stats => {
            let stats = engine.stats().await?;
            println!("accounts:       {}", stats.total_accounts());
            for status in AccountStatus::ALL {
                println!("  {:<12} {}", status.as_str(), stats.accounts(status));
            }
            println!("admins:         {}", stats.admins);
            println!("charges:        {}", stats.charges);
            println!("usages:         {}", stats.usages);
            println!("pending usages: {}", stats.pending_usages);
            println!("total charged:  {}", stats.total_charged);
            println!("total used:     {}", stats.total_used);
            println!("total balance:  {}", stats.total_balance);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn database_default_matches_the_migrator() {
        let command = Cli::command();
        let arg = command
            .get_arguments()
            .find(|arg| arg.get_id() == "database_url")
            .unwrap();
        assert_eq!(
            arg.get_default_values()[0].to_str(),
            Some(migration::DEFAULT_DATABASE_URL)
        );
    }
}
