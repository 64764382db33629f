//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `download`: submit a job and follow its lifecycle events
//! - `tools`: external tag utility diagnostics

mod download;
mod tools;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

pub use download::cmd_download;
pub use tools::cmd_check_tools;

use crate::model::ContentType;
use crate::quality::Quality;

/// Quaver CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Download a single track
    Track {
        /// Catalog track id
        id: String,
        /// Quality format id: 27 (24/192), 7 (24/96), 6 (CD), 5 (MP3)
        #[arg(short, long, default_value = "6")]
        quality: Quality,
    },
    /// Download a full album
    Album {
        /// Catalog album id
        id: String,
        #[arg(short, long, default_value = "6")]
        quality: Quality,
    },
    /// Download every track of a playlist
    Playlist {
        /// Catalog playlist id
        id: String,
        #[arg(short, long, default_value = "6")]
        quality: Quality,
    },
    /// Download an artist's albums
    Artist {
        /// Catalog artist id
        id: String,
        #[arg(short, long, default_value = "6")]
        quality: Quality,
    },
    /// Check availability of external tools
    CheckTools,
}

/// Execute the given CLI command, if any. Returns whether a command ran.
pub fn run_command(cli: &Cli) -> anyhow::Result<bool> {
    let Some(command) = &cli.command else {
        return Ok(false);
    };

    let config = crate::config::load();
    let rt = Runtime::new()?;

    match command {
        Commands::Track { id, quality } => {
            rt.block_on(cmd_download(&config, ContentType::Track, id, *quality))?;
        }
        Commands::Album { id, quality } => {
            rt.block_on(cmd_download(&config, ContentType::Album, id, *quality))?;
        }
        Commands::Playlist { id, quality } => {
            rt.block_on(cmd_download(&config, ContentType::Playlist, id, *quality))?;
        }
        Commands::Artist { id, quality } => {
            rt.block_on(cmd_download(&config, ContentType::Artist, id, *quality))?;
        }
        Commands::CheckTools => cmd_check_tools(),
    }

    Ok(true)
}
