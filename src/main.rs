mod cli;
mod error;
mod identity;
mod layout;
mod metadata;
mod models;
mod planner;
mod reconciler;
mod settings;
mod sheet;
mod tree;
mod watcher;

use clap::Parser;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let (settings, ws) = cli.workspace();

    let result = match cli.command {
        None => cli::sync::run(&ws, false),
        Some(Commands::Sync { dry_run }) => cli::sync::run(&ws, dry_run),
        Some(Commands::Init) => cli::init::run(settings, cli.root.as_deref(), cli.sheet.as_deref()),
        Some(Commands::Status) => cli::status::run(&ws),
        Some(Commands::Watch { cooldown, max_wait }) => cli::watch::run(&settings, &ws, cooldown, max_wait),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
