//! Command implementations behind the CLI surface.

use anyhow::{bail, Context, Result};
use catapult_core::{state, status, Config, FileManager, IgnoreSet, IssueStore, RemoteStore};
use catapult_github::{DeviceFlow, GitHubClient, GitHubIssues};
use catapult_sync::{
    tracker, AutoSyncManager, IssueTracker, OperationQueue, Syncer,
};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::cli::{IssuesCommand, ServiceCommand};
use crate::error_display;
use crate::platform;

fn resolve_config_path(config: Option<PathBuf>) -> Result<PathBuf> {
    match config {
        Some(path) => Ok(path),
        None => Ok(Config::default_path()?),
    }
}

fn load_config(config: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = resolve_config_path(config)?;
    let loaded = Config::load(Some(&path))
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok((loaded, path))
}

fn require_token(config: &Config) -> Result<()> {
    if config.remote.token.is_empty() {
        bail!("not authenticated yet; run `catapult init` first");
    }
    Ok(())
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .expect("static template"),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// `catapult init`: write the config if missing, run device-flow
/// authentication, make sure the repository exists, seed empty state.
pub async fn init(config: Option<PathBuf>) -> Result<()> {
    let path = resolve_config_path(config)?;
    let mut config = Config::load(Some(&path))?;

    if !path.exists() {
        config.save(&path)?;
        println!("Created configuration at {}", path.display());
    }

    if config.remote.client_id.is_empty() {
        bail!(
            "remote.client_id is empty in {}; register an OAuth application and fill it in",
            path.display()
        );
    }

    let flow = DeviceFlow::new(config.remote.client_id.clone(), config.remote.scopes.clone())?;
    let auth = flow.start().await?;
    println!();
    println!("  Open {}", auth.verification_uri.bold());
    println!("  and enter the code: {}", auth.user_code.bold().cyan());
    println!();

    let wait = spinner("Waiting for authorization...");
    let token = flow.poll(&auth).await?;
    wait.finish_with_message("Authorized");

    config.remote.token = token;
    config.save(&path)?;

    let prep = spinner("Preparing the remote repository...");
    let client = GitHubClient::connect(&config.remote.token, &config.repository.name).await?;
    client.ensure_repository_exists().await?;
    prep.finish_with_message("Repository ready");

    std::fs::create_dir_all(&config.storage.base_dir)?;
    if !config.storage.state_path.exists() {
        state::save_records(&config.storage.state_path, &HashMap::new())?;
    }

    println!();
    println!(
        "{} Drop files into {} and run {} to mirror them.",
        "✓".green().bold(),
        config.storage.base_dir.display().to_string().bold(),
        "catapult sync".bold()
    );
    Ok(())
}

/// `catapult sync` and `catapult sync --watch`.
pub async fn sync(config: Option<PathBuf>, watch_mode: bool) -> Result<()> {
    let (config, _) = load_config(config)?;
    require_token(&config)?;

    let mut files = FileManager::with_ignores(
        config.storage.base_dir.clone(),
        IgnoreSet::default(),
    );
    files.load(&config.storage.state_path)?;

    let client: Arc<dyn RemoteStore> = Arc::new(
        GitHubClient::connect(&config.remote.token, &config.repository.name).await?,
    );

    let issue_tracker = if config.issues.enabled {
        let issues =
            GitHubIssues::connect(&config.remote.token, config.issue_repository()).await?;
        Some(Arc::new(IssueTracker::new(
            config.issues.clone(),
            Arc::new(issues),
        )))
    } else {
        None
    };

    if watch_mode {
        let queue = OperationQueue::load(
            config.storage.queue_path.clone(),
            config.sync.max_queue_size,
        )?;
        let manager = AutoSyncManager::new(config, files, client, queue, issue_tracker);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        });

        manager.run(shutdown_rx).await?;
        return Ok(());
    }

    let syncer = Syncer::new(client);
    let outcome = syncer.sync_all(&mut files).await?;
    files.save(&config.storage.state_path)?;

    println!("{outcome}");
    for failure in &outcome.failures {
        error_display::print_failure(failure);
    }
    if let Some(tracker) = &issue_tracker {
        tracker.report_failures(&outcome.failures).await?;
    }
    Ok(())
}

/// `catapult status`: read-only view, never mutates persisted state.
pub async fn status(config: Option<PathBuf>) -> Result<()> {
    let (config, _) = load_config(config)?;
    require_token(&config)?;

    let mut files = FileManager::with_ignores(
        config.storage.base_dir.clone(),
        IgnoreSet::default(),
    );
    files.load(&config.storage.state_path)?;
    // Refresh hashes in memory so local edits show up; nothing is written.
    files.scan()?;

    let client =
        GitHubClient::connect(&config.remote.token, &config.repository.name).await?;
    let manifest = client.get_all_files_with_content().await?;

    let report = status::report(files.records(), &manifest, |p| files.relative_path(p));
    if report.is_empty() {
        println!("Nothing tracked yet.");
        return Ok(());
    }

    for (path, file_status) in report {
        println!("  {} {}", render_status(&file_status), path);
    }
    Ok(())
}

fn render_status(file_status: &status::FileStatus) -> ColoredString {
    use status::FileStatus::*;
    match file_status {
        SyncError(message) => {
            let category = tracker::categorize_message(message);
            format!("[Sync Error ({category})]").red().bold()
        }
        Conflicted => "[Conflict]".red(),
        Synced => "[Synced]".green(),
        ModifiedLocally => "[Modified Locally]".yellow(),
        ModifiedInRepository => "[Modified in Repository]".yellow(),
        other => format!("[{}]", other.label()).normal(),
    }
}

/// `catapult open`.
pub fn open(config: Option<PathBuf>) -> Result<()> {
    let (config, _) = load_config(config)?;
    platform::open_in_file_manager(&config.storage.base_dir)
}

/// `catapult issues ...`.
pub async fn issues(config: Option<PathBuf>, command: IssuesCommand) -> Result<()> {
    let (mut config, path) = load_config(config)?;

    match command {
        IssuesCommand::List => {
            require_token(&config)?;
            let issues =
                GitHubIssues::connect(&config.remote.token, config.issue_repository()).await?;
            let open = issues.list_open_issues(&config.issues.labels).await?;
            if open.is_empty() {
                println!("No open problem reports.");
            } else {
                for issue in open {
                    println!("  #{} {} ({})", issue.number, issue.title.bold(), issue.url);
                }
            }
        }
        IssuesCommand::Enable => {
            config.issues.enabled = true;
            config.save(&path)?;
            println!("Problem reports enabled.");
        }
        IssuesCommand::Disable => {
            config.issues.enabled = false;
            config.save(&path)?;
            println!("Problem reports disabled.");
        }
    }
    Ok(())
}

/// `catapult service ...`.
pub fn service(command: ServiceCommand) -> Result<()> {
    match command {
        ServiceCommand::Install => platform::service::install(),
        ServiceCommand::Uninstall => platform::service::uninstall(),
        ServiceCommand::Start => platform::service::start(),
        ServiceCommand::Stop => platform::service::stop(),
        ServiceCommand::Restart => {
            platform::service::stop()?;
            platform::service::start()
        }
        ServiceCommand::Status => platform::service::status(),
        ServiceCommand::Logs => platform::service::logs(),
    }
}

/// `catapult version`.
pub fn version() {
    println!(
        "catapult {} (commit {}, built {})",
        env!("CARGO_PKG_VERSION"),
        option_env!("CATAPULT_GIT_COMMIT").unwrap_or("unknown"),
        option_env!("CATAPULT_BUILD_DATE").unwrap_or("unknown"),
    );
}
