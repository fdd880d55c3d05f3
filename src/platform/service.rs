//! Service supervisor.
//!
//! Installs the running binary as a login service that invokes
//! `catapult sync --watch`: a launchd agent on macOS, a systemd user unit
//! on Linux. Windows service management is not wired up.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Command;

#[cfg(target_os = "macos")]
const LAUNCHD_LABEL: &str = "com.catapult.sync";
#[cfg(all(unix, not(target_os = "macos")))]
const UNIT_NAME: &str = "catapult.service";

fn current_exe() -> Result<PathBuf> {
    std::env::current_exe().context("cannot determine the running binary's path")
}

fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("HOME directory not found")
}

fn run(description: &str, program: &str, args: &[&str]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("failed to run {program}"))?;
    if !status.success() {
        bail!("{description} failed ({program} exited with {status})");
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn agent_path() -> Result<PathBuf> {
    Ok(home_dir()?
        .join("Library/LaunchAgents")
        .join(format!("{LAUNCHD_LABEL}.plist")))
}

#[cfg(target_os = "macos")]
pub fn install() -> Result<()> {
    let exe = current_exe()?;
    let plist = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LAUNCHD_LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{exe}</string>
        <string>sync</string>
        <string>--watch</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
</dict>
</plist>
"#,
        exe = exe.display()
    );
    let path = agent_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, plist)?;
    run("loading the launch agent", "launchctl", &["load", "-w", &path.to_string_lossy()])?;
    println!("Installed launch agent at {}", path.display());
    Ok(())
}

#[cfg(target_os = "macos")]
pub fn uninstall() -> Result<()> {
    let path = agent_path()?;
    if path.exists() {
        let _ = run("unloading the launch agent", "launchctl", &["unload", "-w", &path.to_string_lossy()]);
        std::fs::remove_file(&path)?;
    }
    println!("Launch agent removed.");
    Ok(())
}

#[cfg(target_os = "macos")]
pub fn start() -> Result<()> {
    run("starting the service", "launchctl", &["start", LAUNCHD_LABEL])
}

#[cfg(target_os = "macos")]
pub fn stop() -> Result<()> {
    run("stopping the service", "launchctl", &["stop", LAUNCHD_LABEL])
}

#[cfg(target_os = "macos")]
pub fn status() -> Result<()> {
    run("querying the service", "launchctl", &["list", LAUNCHD_LABEL])
}

#[cfg(all(unix, not(target_os = "macos")))]
fn unit_path() -> Result<PathBuf> {
    Ok(home_dir()?.join(".config/systemd/user").join(UNIT_NAME))
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn install() -> Result<()> {
    let exe = current_exe()?;
    let unit = format!(
        r#"[Unit]
Description=Catapult folder synchronization
After=network-online.target

[Service]
ExecStart={exe} sync --watch
Restart=on-failure
RestartSec=10

[Install]
WantedBy=default.target
"#,
        exe = exe.display()
    );
    let path = unit_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, unit)?;
    run("reloading systemd", "systemctl", &["--user", "daemon-reload"])?;
    run("enabling the unit", "systemctl", &["--user", "enable", UNIT_NAME])?;
    println!("Installed systemd unit at {}", path.display());
    Ok(())
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn uninstall() -> Result<()> {
    let _ = run("disabling the unit", "systemctl", &["--user", "disable", "--now", UNIT_NAME]);
    let path = unit_path()?;
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    run("reloading systemd", "systemctl", &["--user", "daemon-reload"])?;
    println!("Systemd unit removed.");
    Ok(())
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn start() -> Result<()> {
    run("starting the service", "systemctl", &["--user", "start", UNIT_NAME])
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn stop() -> Result<()> {
    run("stopping the service", "systemctl", &["--user", "stop", UNIT_NAME])
}

#[cfg(all(unix, not(target_os = "macos")))]
pub fn status() -> Result<()> {
    run("querying the service", "systemctl", &["--user", "status", UNIT_NAME])
}

#[cfg(windows)]
pub fn install() -> Result<()> {
    bail!("service installation is not supported on this platform yet");
}

#[cfg(windows)]
pub fn uninstall() -> Result<()> {
    bail!("service management is not supported on this platform yet");
}

#[cfg(windows)]
pub fn start() -> Result<()> {
    bail!("service management is not supported on this platform yet");
}

#[cfg(windows)]
pub fn stop() -> Result<()> {
    bail!("service management is not supported on this platform yet");
}

#[cfg(windows)]
pub fn status() -> Result<()> {
    bail!("service management is not supported on this platform yet");
}

/// Show the tail of the most recent service log file.
pub fn logs() -> Result<()> {
    let dir = crate::logging::default_log_dir().context("HOME directory not found")?;
    let mut entries: Vec<PathBuf> = match std::fs::read_dir(&dir) {
        Ok(read) => read.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    };
    entries.sort();

    let newest = match entries.last() {
        Some(path) => path,
        None => {
            println!("No log files under {} yet.", dir.display());
            return Ok(());
        }
    };

    println!("==> {} <==", newest.display());
    let content = std::fs::read_to_string(newest)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(50);
    for line in &lines[start..] {
        println!("{line}");
    }
    Ok(())
}
