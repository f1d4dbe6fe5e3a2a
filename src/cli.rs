use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

/// `dawn node` subcommands.
#[derive(Subcommand, Debug)]
pub enum NodeCommands {
    /// Start the node: load (or generate) its identity, join the mesh,
    /// and serve locally-hosted agents until interrupted.
    Start {
        /// Path to the node config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the effective node configuration (after YAML + env layering)
    /// and exit.
    ShowConfig {
        /// Path to the node config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print this node's identity (node id, derived from its Ed25519
    /// public key) and exit. Generates the identity file if it doesn't
    /// exist yet.
    Id {
        /// Path to the node config file.
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "dawn",
    about = "A decentralized multi-agent P2P runtime node",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node, inspect its configuration, or print its identity.
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Generate shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "dawn", &mut std::io::stdout());
}
