//! Root CLI structure for ips-rs

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ips-rs")]
#[command(about = "Command-line tools for IPS binary patches", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// IPS patch operations
    #[command(flatten)]
    Ips(crate::commands::ips::IpsCommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
