mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, NodeCommands};
use dawn_identity::NodeIdentity;
use dawn_node::swarm;
use dawn_node::NodeRouter;
use dawn_registry::PeerRegistry;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Completions { shell }) => {
            cli::print_completions(shell);
            Ok(())
        }
        Some(Commands::Node { command }) => run_node_command(command),
        None => {
            eprintln!("no subcommand given — run `dawn node start` to start a node, or `dawn --help`");
            std::process::exit(1);
        }
    };

    match result {
        Ok(()) => {}
        Err(StartupFailure(msg)) => {
            eprintln!("dawn: {msg}");
            std::process::exit(1);
        }
    }
}

/// Raised for any error that prevents the node from starting at all
/// (bad config, unreadable/corrupt identity file, listen address already
/// in use). Distinguished from an unrecoverable internal error — a panic
/// inside the running swarm loop — which a caught panic hook maps to
/// exit code 2 instead.
struct StartupFailure(String);

impl<E: std::fmt::Display> From<E> for StartupFailure {
    fn from(e: E) -> Self {
        StartupFailure(e.to_string())
    }
}

fn run_node_command(cmd: NodeCommands) -> Result<(), StartupFailure> {
    match cmd {
        NodeCommands::ShowConfig { config } => {
            let cfg = dawn_config::load(config.as_deref())?;
            println!("{}", serde_yaml::to_string(&cfg).unwrap_or_default());
            Ok(())
        }
        NodeCommands::Id { config } => {
            let cfg = dawn_config::load(config.as_deref())?;
            let identity = NodeIdentity::load_or_create(&cfg.identity_path)?;
            println!("{}", identity.node_id());
            Ok(())
        }
        NodeCommands::Start { config } => start_node(config),
    }
}

fn start_node(config_path: Option<std::path::PathBuf>) -> Result<(), StartupFailure> {
    let config = dawn_config::load(config_path.as_deref())?;
    let identity = NodeIdentity::load_or_create(&config.identity_path)?;
    tracing::info!(node_id = %identity.node_id(), listen = %config.listen_address, "starting dawn node");

    let registry = PeerRegistry::new();
    let router = Arc::new(NodeRouter::new(identity, registry));
    dawn_node::builtin::register_builtin_agents(&router);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| StartupFailure(format!("failed to start tokio runtime: {e}")))?;

    runtime.block_on(async move {
        let client_attach_addr: std::net::SocketAddr = config
            .client_attach_address
            .parse()
            .map_err(|e| StartupFailure(format!("bad client_attach_address: {e}")))?;

        let (handle, shutdown, forwards) = swarm::spawn(router.clone(), config)?;

        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received interrupt, shutting down");
            shutdown.shutdown().await;
        });

        tokio::spawn(async move {
            if let Err(e) = dawn_node::client::serve(client_attach_addr, router, forwards).await {
                tracing::error!(error = %e, "client-attach listener stopped");
            }
        });

        match handle.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StartupFailure(e.to_string())),
            Err(e) => {
                // The swarm task panicked — an unrecoverable internal
                // error rather than a startup failure. Exit 2 directly
                // instead of returning, so the caller sees the distinct
                // code.
                eprintln!("dawn: node task panicked: {e}");
                std::process::exit(2);
            }
        }
    })
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
