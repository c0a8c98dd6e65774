mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recollect::config::RecollectConfig;

#[derive(Parser)]
#[command(name = "recollect", version, about = "Adaptive cross-session memory for conversational assistants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the expired-memory reaper until Ctrl-C
    Reaper,
    /// Purge expired cross-session memories once
    Cleanup {
        /// List what would be deleted without deleting it
        #[arg(long)]
        dry_run: bool,
    },
    /// Show store statistics, or one user's insights
    Stats {
        #[arg(long)]
        user: Option<String>,
    },
    /// Show a stored profile or session
    Inspect {
        #[command(subcommand)]
        target: InspectTarget,
    },
    /// Export everything stored for a user as JSON to stdout
    Export {
        #[arg(long)]
        user: String,
    },
    /// Check database integrity and schema version
    Doctor,
}

#[derive(Subcommand)]
enum InspectTarget {
    /// A user profile
    Profile { user_id: String },
    /// A session transcript
    Session { session_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RecollectConfig::load()?;

    // Log to stderr so stdout stays clean for `export`.
    let filter = EnvFilter::try_new(&config.service.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Reaper => cli::maintenance::reaper(&config).await?,
        Command::Cleanup { dry_run } => cli::maintenance::cleanup(&config, dry_run)?,
        Command::Stats { user } => cli::stats::stats(&config, user.as_deref())?,
        Command::Inspect { target } => match target {
            InspectTarget::Profile { user_id } => cli::inspect::inspect_profile(&config, &user_id)?,
            InspectTarget::Session { session_id } => {
                cli::inspect::inspect_session(&config, &session_id)?
            }
        },
        Command::Export { user } => cli::export::export(&config, &user)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
