//! Command-line interface for `staffgate`.

mod commands;

use clap::{Parser, Subcommand};

/// Staffgate - account authentication service
#[derive(Parser)]
#[command(name = "staffgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the token prune job (default)
    #[command(alias = "daemon")]
    Serve,

    /// Apply pending database migrations and exit
    Migrate,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Mark an account as verified without the email round trip
    VerifyAccount {
        /// Email address of the account
        email: String,
    },

    /// Delete expired refresh tokens past the retention window
    PruneTokens,
}

pub use commands::*;
