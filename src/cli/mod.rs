//! Command-line interface for quaver.
//!
//! This module provides the submission-boundary commands: download content
//! by catalog id and follow the job to completion, inspect configuration,
//! and probe for the external tag utility.

mod commands;

pub use commands::{run_command, Cli, Commands};
