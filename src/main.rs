//! revflow - branch-aware schema migration revision manager
//!
//! Evolves a database schema through an ordered chain of migration
//! revisions while teams work on parallel feature branches. The headline
//! operation is `squash`: compacting the current branch's trailing
//! revisions into a single equivalent revision without corrupting shared
//! history or losing the net schema effect.

mod apply;
mod author;
mod backend;
mod branch;
mod commands;
mod config;
mod db;
mod diff;
mod drift;
mod error;
mod registry;
mod revision;
mod schema;
mod squash;

use crate::config::Settings;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "revflow", version, about = "Branch-aware schema migration revision manager")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drop a database schema and everything in it (irreversible)
    Drop {
        /// Name of the schema to drop
        schema: String,
    },
    /// Author a revision if the models changed, then apply to head
    Upgrade {
        /// Label for the authored revision (defaults to the branch name)
        #[arg(long)]
        message: Option<String>,
    },
    /// Apply forward to head without authoring
    Migrate {
        /// Scope script execution to a named schema
        #[arg(long, default_value = "")]
        schema: String,
    },
    /// Reverse the most recent revisions and delete their artifacts
    Downgrade {
        /// Number of revisions to reverse
        #[arg(long, default_value_t = 1)]
        levels: usize,
    },
    /// Squash the current branch's trailing revisions into one
    Squash {
        /// Allow squashing on a protected branch
        #[arg(long)]
        force: bool,
    },
    /// Show the marker, chain head, and pending drift
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load()?;

    match cli.command {
        Command::Drop { schema } => commands::drop(&settings, &schema).await?,
        Command::Upgrade { message } => {
            commands::upgrade(&settings, message.as_deref()).await?
        }
        Command::Migrate { schema } => commands::migrate(&settings, &schema).await?,
        Command::Downgrade { levels } => commands::downgrade(&settings, levels).await?,
        Command::Squash { force } => commands::squash(&settings, force).await?,
        Command::Status => commands::status(&settings).await?,
    }

    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,revflow=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .compact(),
        )
        .init();
}
