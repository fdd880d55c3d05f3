use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "catapult",
    version,
    about = "Keep a local folder synchronized with a private repository"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authenticate against the remote host and prepare the repository
    Init,
    /// Run one synchronization pass
    Sync {
        /// Keep running: watch the folder and sync continuously
        #[arg(short, long)]
        watch: bool,
    },
    /// Show the synchronization status of every tracked file
    Status,
    /// Open the synchronized folder in the platform file manager
    Open,
    /// Inspect or toggle automatic problem reports
    Issues {
        #[command(subcommand)]
        command: IssuesCommand,
    },
    /// Control the background synchronization service
    Service {
        #[command(subcommand)]
        command: ServiceCommand,
    },
    /// Print version information
    Version,
}

#[derive(Debug, Subcommand)]
pub enum IssuesCommand {
    /// List currently open problem reports
    List,
    /// Turn automatic problem reports on
    Enable,
    /// Turn automatic problem reports off
    Disable,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ServiceCommand {
    /// Install the service so syncing starts at login
    Install,
    /// Remove the installed service
    Uninstall,
    /// Start the service now
    Start,
    /// Stop the service
    Stop,
    /// Restart the service
    Restart,
    /// Show whether the service is running
    Status,
    /// Show recent service log output
    Logs,
}
