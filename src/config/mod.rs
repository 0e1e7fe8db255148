//! Configuration management for Live Monitor GW
//!
//! Handles loading, parsing, validation and saving of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub osc: OscConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// OSC endpoint of the Live remote script
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OscConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Port Live listens on
    #[serde(default = "default_send_port")]
    pub send_port: u16,
    /// Port replies come back on
    #[serde(default = "default_receive_port")]
    pub receive_port: u16,
}

/// Request deadlines and timer periods
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimingConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_test_timeout")]
    pub test_timeout_ms: u64,
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_ms: u64,
    #[serde(default = "default_clip_state_poll")]
    pub clip_state_poll_ms: u64,
    #[serde(default = "default_clip_position_poll")]
    pub clip_position_poll_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write every OSC message to a rolling file in the logs directory
    #[serde(default)]
    pub osc_log: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

/// Items to monitor at startup (watch mode)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitorConfig {
    /// Looper ids in `track-device` form
    #[serde(default)]
    pub loopers: Vec<String>,
    #[serde(default)]
    pub clips: Vec<ClipSelection>,
    /// Discover every Looper device on startup and monitor all of them
    #[serde(default)]
    pub discover_loopers: bool,
}

/// A clip slot picked by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClipSelection {
    pub track: i32,
    pub scene: i32,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            send_port: default_send_port(),
            receive_port: default_receive_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            test_timeout_ms: default_test_timeout(),
            broadcast_interval_ms: default_broadcast_interval(),
            clip_state_poll_ms: default_clip_state_poll(),
            clip_position_poll_ms: default_clip_position_poll(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            osc_log: false,
            log_dir: None,
        }
    }
}

impl TimingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn clip_state_poll(&self) -> Duration {
        Duration::from_millis(self.clip_state_poll_ms)
    }

    pub fn clip_position_poll(&self) -> Duration {
        Duration::from_millis(self.clip_position_poll_ms)
    }
}

/// Parse a looper id of the form `track-device`
pub fn parse_looper_id(id: &str) -> Option<(i32, i32)> {
    let (track, device) = id.trim().split_once('-')?;
    Some((track.parse().ok()?, device.parse().ok()?))
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            info!("No config file at {}, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.osc.host.trim().is_empty() {
            anyhow::bail!("OSC host cannot be empty");
        }
        if self.osc.send_port == 0 || self.osc.receive_port == 0 {
            anyhow::bail!("OSC ports must be non-zero");
        }
        if self.osc.send_port == self.osc.receive_port {
            anyhow::bail!(
                "OSC send_port and receive_port must differ (both {})",
                self.osc.send_port
            );
        }

        let timers = [
            ("request_timeout_ms", self.timing.request_timeout_ms),
            ("test_timeout_ms", self.timing.test_timeout_ms),
            ("broadcast_interval_ms", self.timing.broadcast_interval_ms),
            ("clip_state_poll_ms", self.timing.clip_state_poll_ms),
            ("clip_position_poll_ms", self.timing.clip_position_poll_ms),
        ];
        for (name, value) in timers {
            if value == 0 {
                anyhow::bail!("timing.{} must be greater than 0", name);
            }
        }

        for id in &self.monitor.loopers {
            match parse_looper_id(id) {
                Some((track, device)) if track >= 0 && device >= 0 => {}
                _ => anyhow::bail!("Invalid looper id '{}' (expected track-device, e.g. 0-1)", id),
            }
        }

        for clip in &self.monitor.clips {
            if clip.track < 0 || clip.scene < 0 {
                anyhow::bail!(
                    "Invalid clip selection track={} scene={} (indices start at 0)",
                    clip.track,
                    clip.scene
                );
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_host() -> String { "localhost".to_string() }
fn default_send_port() -> u16 { 11000 }
fn default_receive_port() -> u16 { 11001 }
fn default_request_timeout() -> u64 { 5000 }
fn default_test_timeout() -> u64 { 3000 }
fn default_broadcast_interval() -> u64 { 50 }
fn default_clip_state_poll() -> u64 { 100 }
fn default_clip_position_poll() -> u64 { 25 }
fn default_log_level() -> String { "info".to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_live_remote_script() {
        let config = AppConfig::default();
        assert_eq!(config.osc.host, "localhost");
        assert_eq!(config.osc.send_port, 11000);
        assert_eq!(config.osc.receive_port, 11001);
        assert_eq!(config.timing.request_timeout_ms, 5000);
        assert_eq!(config.timing.broadcast_interval_ms, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
osc:
  host: "192.168.1.20"
monitor:
  loopers: ["0-1", "3-0"]
  clips:
    - { track: 2, scene: 4 }
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.osc.host, "192.168.1.20");
        assert_eq!(config.osc.send_port, 11000);
        assert_eq!(config.timing.clip_position_poll_ms, 25);
        assert_eq!(config.monitor.loopers.len(), 2);
        assert_eq!(config.monitor.clips[0], ClipSelection { track: 2, scene: 4 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.osc.receive_port = config.osc.send_port;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.timing.clip_state_poll_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.monitor.loopers = vec!["looper".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_looper_id() {
        assert_eq!(parse_looper_id("0-1"), Some((0, 1)));
        assert_eq!(parse_looper_id(" 12-3 "), Some((12, 3)));
        assert_eq!(parse_looper_id("clip-0-1"), None);
        assert_eq!(parse_looper_id("7"), None);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("config.yaml");
        let path = path.to_string_lossy().to_string();

        let mut config = AppConfig::default();
        config.osc.host = "studio.local".to_string();
        config.monitor.discover_loopers = true;
        config.save(&path).await?;

        let loaded = AppConfig::load(&path).await?;
        assert_eq!(loaded.osc.host, "studio.local");
        assert!(loaded.monitor.discover_loopers);
        Ok(())
    }

    #[tokio::test]
    async fn test_load_or_default_without_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("missing.yaml");
        let config = AppConfig::load_or_default(&path.to_string_lossy()).await?;
        assert_eq!(config.osc, OscConfig::default());
        Ok(())
    }
}
