pub mod commands;
pub mod context;
pub mod output;

use clap::{Parser, Subcommand};

/// Keep GPG-encrypted secrets at home. Relay them safely anywhere.
#[derive(Parser, Debug)]
#[command(name = "passrelay", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Base directory (default: ~/.passrelay)
    #[arg(long, global = true, env = "PASSRELAY_HOME")]
    pub home: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode: only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the passrelay base directory
    Init,

    /// Manage private keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },

    /// Manage encrypted secrets
    Secrets {
        #[command(subcommand)]
        action: SecretsAction,
    },

    /// Unlock a secret and print its plaintext
    Show {
        /// Name of the secret (usually a hostname)
        name: String,
    },

    /// Inspect the injectable relay program
    Relay {
        #[command(subcommand)]
        action: RelayAction,
    },

    /// Show operation history
    Log {
        /// Filter by action (e.g. secret_show, key_add)
        #[arg(long)]
        action: Option<String>,
        /// Filter entries since this date (ISO 8601)
        #[arg(long)]
        since: Option<String>,
        /// Show last N entries
        #[arg(long)]
        last: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
pub enum KeysAction {
    /// Add a private key from an armored file
    Add {
        /// Path to the armored private key file
        file: String,
    },
    /// List stored keys
    List,
    /// Remove a key by its id
    Remove {
        /// Key id (16 hex characters)
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SecretsAction {
    /// Add an encrypted secret from an armored file
    Add {
        /// Path to the armored message file
        file: String,
        /// Secret name (default: file name up to the first ".gpg")
        #[arg(long)]
        name: Option<String>,
    },
    /// List stored secrets
    List,
    /// Remove a secret by name
    Remove {
        /// Name of the secret
        name: String,
    },
    /// Rename a secret
    Rename {
        /// Current name
        old: String,
        /// New name
        new: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum RelayAction {
    /// Print the injectable program as a javascript: link
    Link,
    /// Print the program's integrity hash
    Hash,
    /// Answer one relay request read as JSON from stdin (for embedding
    /// hosts; replies are written as JSON to stdout)
    Respond,
}
