//! Command-line arguments for the `deskexec` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "deskexec",
    version,
    about = "Run allow-listed commands in a project directory and stream their output"
)]
pub struct Cli {
    /// Path to a deskexec.toml (overrides DESKEXEC_CONFIG_PATH)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Start the HTTP execution service
    ///
    /// Examples:
    ///   deskexec serve
    ///   deskexec serve --bind 0.0.0.0:3030 --root ~/projects/site --timeout 120
    Serve {
        /// Address to listen on
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,

        /// Directory every command is confined to
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Wall-clock limit per command in seconds (0 disables it)
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
    },

    /// Open an interactive terminal console
    ///
    /// Connects to a running server unless --local is given, in which case
    /// commands run in this process.
    Console {
        /// Base URL of the server (defaults to the configured bind address)
        #[arg(long, conflicts_with = "local")]
        url: Option<String>,

        /// Run commands in-process instead of through a server
        #[arg(long)]
        local: bool,

        /// Directory commands run in, relative to the project root
        #[arg(long)]
        cwd: Option<String>,

        /// Project root for --local
        #[arg(long, value_name = "DIR", requires = "local")]
        root: Option<PathBuf>,
    },

    /// Validate a command line and resolve its directory without running it
    ///
    /// Examples:
    ///   deskexec check git status
    ///   deskexec check --cwd src ls -la
    Check {
        /// Directory relative to the project root
        #[arg(long)]
        cwd: Option<String>,

        /// Project root to resolve against
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// The command line to check
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}
