//! Command-line surface contracts.

use catapult::cli::{Cli, Command, IssuesCommand, ServiceCommand};
use clap::Parser;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args.iter().copied()).expect("arguments should parse")
}

#[test]
fn sync_defaults_to_one_shot() {
    let cli = parse(&["catapult", "sync"]);
    assert!(matches!(cli.command, Command::Sync { watch: false }));
}

#[test]
fn sync_watch_flag_long_and_short() {
    let cli = parse(&["catapult", "sync", "--watch"]);
    assert!(matches!(cli.command, Command::Sync { watch: true }));

    let cli = parse(&["catapult", "sync", "-w"]);
    assert!(matches!(cli.command, Command::Sync { watch: true }));
}

#[test]
fn config_flag_is_global() {
    let cli = parse(&["catapult", "status", "--config", "/tmp/alt.yaml"]);
    assert_eq!(
        cli.config.as_deref(),
        Some(std::path::Path::new("/tmp/alt.yaml"))
    );
}

#[test]
fn issues_subcommands() {
    let cli = parse(&["catapult", "issues", "list"]);
    assert!(matches!(
        cli.command,
        Command::Issues { command: IssuesCommand::List }
    ));

    let cli = parse(&["catapult", "issues", "disable"]);
    assert!(matches!(
        cli.command,
        Command::Issues { command: IssuesCommand::Disable }
    ));
}

#[test]
fn service_subcommands() {
    for (arg, want) in [
        ("install", ServiceCommand::Install),
        ("uninstall", ServiceCommand::Uninstall),
        ("start", ServiceCommand::Start),
        ("stop", ServiceCommand::Stop),
        ("restart", ServiceCommand::Restart),
        ("status", ServiceCommand::Status),
        ("logs", ServiceCommand::Logs),
    ] {
        let cli = parse(&["catapult", "service", arg]);
        match cli.command {
            Command::Service { command } => {
                assert_eq!(std::mem::discriminant(&command), std::mem::discriminant(&want));
            }
            other => panic!("expected service command, got {other:?}"),
        }
    }
}

#[test]
fn missing_subcommand_is_an_error() {
    assert!(Cli::try_parse_from(["catapult"]).is_err());
}
