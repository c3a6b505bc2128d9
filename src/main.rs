use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "sw")]
#[command(about = "Safewatch - personal-safety watchers that dispatch AI agents")]
#[command(version)]
struct Cli {
    /// Path to the safewatch data directory (default: .safewatch in current dir)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Output as JSON for machine consumption
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new safewatch data directory
    Init,

    /// Manage scheduled trips in the local task book
    Trip {
        #[command(subcommand)]
        command: TripCommands,
    },

    /// Run a watcher, continuously unless --once
    Watch {
        #[command(subcommand)]
        command: WatchCommands,
    },

    /// Analyze recent device snapshots for emergency conditions
    Report {
        /// Look back this many hours of snapshot history
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Send a test message through the fallback notification channel
    Notify {
        /// Message text (HTML formatting allowed)
        message: String,
    },
}

#[derive(Subcommand)]
enum TripCommands {
    /// Add a trip to the book
    Add {
        /// Departure time, e.g. "2025-06-01T18:00:00Z" or "2025-06-01 18:00" (UTC)
        depart: String,

        /// Starting point
        source: String,

        /// Destination
        destination: String,

        /// Task ID (auto-generated if not provided)
        #[arg(long)]
        id: Option<String>,
    },

    /// List all trips
    List,

    /// Remove a trip from the book
    Remove {
        /// Task ID to remove
        id: String,
    },
}

#[derive(Subcommand)]
enum WatchCommands {
    /// Watch the local trip book and dispatch safety reminders
    Trips {
        /// Run one evaluate/dispatch cycle and exit
        #[arg(long)]
        once: bool,

        /// Poll interval in minutes (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Poll the SOS server and dispatch emergency responses
    Sos {
        /// Run one evaluate/dispatch cycle and exit
        #[arg(long)]
        once: bool,

        /// Poll interval in seconds (overrides config)
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let dir = cli.dir.unwrap_or_else(|| PathBuf::from(".safewatch"));

    match cli.command {
        Commands::Init => commands::init::run(&dir),
        Commands::Trip { command } => match command {
            TripCommands::Add {
                depart,
                source,
                destination,
                id,
            } => commands::trip::add(
                &dir,
                &depart,
                &source,
                &destination,
                id.as_deref(),
                cli.json,
            ),
            TripCommands::List => commands::trip::list(&dir, cli.json),
            TripCommands::Remove { id } => commands::trip::remove(&dir, &id),
        },
        Commands::Watch { command } => match command {
            WatchCommands::Trips { once, interval } => {
                commands::watch::trips(&dir, once, interval)
            }
            WatchCommands::Sos { once, interval } => commands::watch::sos(&dir, once, interval),
        },
        Commands::Report { hours } => commands::report::run(&dir, hours, cli.json),
        Commands::Notify { message } => commands::notify::run(&message),
    }
}
