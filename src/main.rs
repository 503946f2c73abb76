mod adapters;
mod cli;
mod config;
mod core;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    cli::context::init(args.home.as_deref());

    let result = match &args.command {
        Commands::Init => cli::commands::init::execute(args.verbose),
        Commands::Keys { action } => cli::commands::keys::execute(action),
        Commands::Secrets { action } => cli::commands::secrets::execute(action),
        Commands::Show { name } => cli::commands::show::execute(name),
        Commands::Relay { action } => cli::commands::relay::execute(action),
        Commands::Log {
            action,
            since,
            last,
        } => cli::commands::log::execute(action.as_deref(), since.as_deref(), *last),
    };

    if let Err(e) = result {
        cli::output::error(&format!("Error: {e}"));
        std::process::exit(1);
    }
}
