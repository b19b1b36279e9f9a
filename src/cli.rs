use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fee-watch")]
#[command(about = "Patent annual-fee lookup and deadline watch-list", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Search patents through the signed search API.
    Search {
        query: String,
        /// 1-based page index
        #[arg(long, default_value_t = 1)]
        page: i64,
        /// Page size, clamped to 1..=10
        #[arg(long, default_value_t = 10)]
        size: i64,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up fees due on the portal, one browser per patent.
    Fees {
        /// Application or patent numbers
        patents: Vec<String>,
        /// Take the patents from the first page of a search instead
        #[arg(short, long)]
        query: Option<String>,
        /// Show the browser window (also enabled by PORTAL_HEADFUL)
        #[arg(long)]
        headful: bool,
        /// Add every record found to the watch-list
        #[arg(long)]
        watch: bool,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Run fee extraction over a saved result page.
    Extract {
        file: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or edit the watch-list.
    Monitor {
        #[command(subcommand)]
        command: MonitorCommand,
    },

    /// Manage the saved portal session.
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Subcommand)]
pub enum MonitorCommand {
    /// Watched fees ordered by urgency.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove the entry at a storage position (as shown by `list`).
    Remove { position: usize },
    /// Remove every entry.
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Whether a saved session exists and what it holds.
    Status,
    /// Validate a session file without saving it.
    Verify { file: PathBuf },
    /// Validate a session file and make it the saved session.
    Import { file: PathBuf },
    /// Sign in through a visible browser and save the session.
    Login,
}
