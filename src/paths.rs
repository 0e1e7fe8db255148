//! Application path management.
//!
//! Resolves where the configuration file and the logs directory live:
//!
//! - **Dev mode** (debug builds): if `config.yaml` exists in the current
//!   working directory, everything stays next to it.
//! - **Installed mode** (default): the platform config directory, e.g.
//!   `~/.config/live-monitor-gw` on Linux or `%APPDATA%\live-monitor-gw`.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory name under the platform config directory
const APP_NAME: &str = "live-monitor-gw";

/// Application paths for config and logs.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Path to the configuration file
    pub config: PathBuf,
    /// Where the OSC traffic log rolls
    pub logs_dir: PathBuf,
    /// Whether the working directory override is active
    pub is_dev: bool,
}

impl AppPaths {
    /// Detect the appropriate paths based on environment.
    ///
    /// Called before logging is initialized, hence the eprintln diagnostics.
    pub fn detect() -> Self {
        #[cfg(debug_assertions)]
        {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            if cwd.join("config.yaml").exists() {
                eprintln!(
                    "[paths] Running in DEV mode (config.yaml found in cwd: {})",
                    cwd.display()
                );
                return Self::rooted_at(&cwd, true);
            }
        }

        let base = dirs::config_dir()
            .unwrap_or_else(|| {
                eprintln!("[paths] WARNING: dirs::config_dir() returned None, using cwd");
                PathBuf::from(".")
            })
            .join(APP_NAME);

        #[cfg(debug_assertions)]
        eprintln!("[paths] Running in INSTALLED mode (config dir: {})", base.display());

        Self::rooted_at(&base, false)
    }

    /// `config.yaml` and `logs/` under one directory
    pub fn rooted_at(base: &Path, is_dev: bool) -> Self {
        Self {
            config: base.join("config.yaml"),
            logs_dir: base.join("logs"),
            is_dev,
        }
    }

    /// Get the base directory (for displaying in logs)
    pub fn base_dir(&self) -> PathBuf {
        self.config
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Create the config and logs directories if missing
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [self.base_dir(), self.logs_dir.clone()] {
            if !dir.exists() {
                debug!("Creating directory: {}", dir.display());
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        Ok(())
    }
}
