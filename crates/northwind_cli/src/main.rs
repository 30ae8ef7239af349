//! Command-line entry point for local Northwind maintenance.
//!
//! # Responsibility
//! - Verify `northwind_core` linkage (`ping`, `version`).
//! - Print the client metadata document (`metadata`).
//! - Reset session-added rows (`reset [options] [--session <uuid>]`).
//!
//! Configuration comes from `NORTHWIND_DB_PATH`, `NORTHWIND_LOG_LEVEL` and
//! `NORTHWIND_LOG_DIR`.

use clap::{Parser, Subcommand};
use log::warn;
use northwind_core::{NorthwindConfig, NorthwindRepository};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "northwind")]
#[command(about = "Northwind session-scoped store maintenance", long_about = None)]
struct Cli {
    /// Defaults to `ping` when omitted.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Print a liveness probe
    Ping,
    /// Print the core crate version
    Version,
    /// Print the client metadata document
    Metadata,
    /// Delete rows added by a session, or by every session with `fullreset`
    Reset {
        /// Reset options, e.g. `fullreset`
        options: Vec<String>,
        /// Session whose rows are deleted; the guest session when omitted
        #[arg(long)]
        session: Option<Uuid>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command.unwrap_or(Command::Ping)) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("Error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<String, String> {
    match command {
        Command::Ping => Ok(format!("northwind_core ping={}", northwind_core::ping())),
        Command::Version => Ok(format!(
            "northwind_core version={}",
            northwind_core::core_version()
        )),
        Command::Metadata => {
            let repo = open_repository()?;
            repo.metadata().map_err(|err| err.to_string())
        }
        Command::Reset { options, session } => {
            let mut repo = open_repository()?;
            if let Some(session) = session {
                repo.set_user_session_id(session);
            }
            repo.reset(&options.join(" ")).map_err(|err| err.to_string())
        }
    }
}

fn open_repository() -> Result<NorthwindRepository, String> {
    let config = NorthwindConfig::from_env().map_err(|err| err.to_string())?;
    if let Err(err) = config.init_logging() {
        eprintln!("logging disabled: {err}");
    }
    config.open_repository().map_err(|err| {
        warn!(
            "event=cli_open module=cli status=error db_path={}",
            config.db_path.display()
        );
        format!("failed to open `{}`: {err}", config.db_path.display())
    })
}
