use anyhow::Result;
use clap::Parser;
use colored::*;

use catapult::cli::{Cli, Command};
use catapult::{commands, logging};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Watch mode is long-running and gets a structured log file alongside
    // the console; one-shot commands log to the console only.
    let log_dir = match &cli.command {
        Command::Sync { watch: true } => logging::default_log_dir(),
        _ => None,
    };
    let _guard = logging::init(log_dir.as_deref(), "info")?;

    match cli.command {
        Command::Init => commands::init(cli.config).await,
        Command::Sync { watch } => commands::sync(cli.config, watch).await,
        Command::Status => commands::status(cli.config).await,
        Command::Open => commands::open(cli.config),
        Command::Issues { command } => commands::issues(cli.config, command).await,
        Command::Service { command } => commands::service(command),
        Command::Version => {
            commands::version();
            Ok(())
        }
    }
}
