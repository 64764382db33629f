//! External tool diagnostics.

use crate::tagger::TagWriter;

/// Report whether the external tag utility is installed.
pub fn cmd_check_tools() {
    println!("Checking external tools...\n");

    match TagWriter::new().external_utility_version() {
        Some(version) => {
            println!("  metaflac: {version}");
            println!("\nTag embedding will prefer the external utility.");
        }
        None => {
            println!("  metaflac: not found");
            println!("\nTag embedding will use the built-in rewriter.");
            println!("Install the FLAC tools to prefer the external utility:");
            println!("  Windows: https://xiph.org/flac/download.html");
            println!("  macOS:   brew install flac");
            println!("  Linux:   apt install flac");
        }
    }
}
