//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// Covault account daemon.
///
/// Reads commands as JSON lines on stdin and streams progress and terminal
/// events as JSON lines on stdout.
#[derive(Parser, Debug)]
#[command(name = "covault", version, about)]
pub struct Cli {
    /// Data directory holding local account state
    #[arg(long, env = "COVAULT_DATA_DIR", default_value = "covault-data")]
    pub data_dir: PathBuf,
}
