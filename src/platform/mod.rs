//! Platform-specific glue: opening the file manager and controlling the
//! background service.

pub mod service;

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Open a directory in the platform's file manager.
pub fn open_in_file_manager(path: &Path) -> Result<()> {
    #[cfg(target_os = "macos")]
    let program = "open";
    #[cfg(target_os = "windows")]
    let program = "explorer";
    #[cfg(all(unix, not(target_os = "macos")))]
    let program = "xdg-open";

    Command::new(program)
        .arg(path)
        .spawn()
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(())
}
