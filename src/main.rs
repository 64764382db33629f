//! Quaver - a download manager for a remote music catalog.
//!
//! Negotiates a quality tier for each requested track, streams the audio to
//! disk, and rewrites the container metadata (tags, cover art, lyrics) with
//! a fallback ladder that never corrupts the audio. Albums, playlists and
//! artist discographies expand into per-track downloads inside one job.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod enricher;
pub mod error;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod quality;
pub mod queue;
pub mod tagger;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("quaver=info".parse().unwrap()))
        .init();

    cli::run_command(&args)?;
    Ok(())
}
