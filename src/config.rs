//! # Configuration Module
//!
//! Data directory setup and the settings file.
//!
//! ## Data Storage
//!
//! Moodtune keeps its database and settings in the platform data directory:
//! - Linux: `~/.local/share/moodtune/`
//! - macOS: `~/Library/Application Support/moodtune/`
//! - Windows: `%APPDATA%\moodtune\`
//!
//! ## Settings
//!
//! `config.json` in that directory (or the file named by `MOODTUNE_CONFIG`)
//! may override any field of [`Settings`]; missing fields keep their
//! defaults and a missing file means all defaults. Command-line flags are
//! applied on top by the binary.

use crate::emotion::PlayMode;
use crate::player;
use crate::recommend::DEFAULT_LIMIT;
use crate::session::SessionConfig;
use crate::stats::DEFAULT_TOP_N;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";

/// Returns the platform-appropriate data directory for Moodtune,
/// creating it if needed.
///
/// # Errors
///
/// Fails when the platform has no data directory or it cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let moodtune_dir = data_dir.join("moodtune");
    fs::create_dir_all(&moodtune_dir).with_context(|| {
        format!(
            "Failed to create Moodtune data directory at {}. Please check file permissions.",
            moodtune_dir.display()
        )
    })?;

    Ok(moodtune_dir)
}

/// Path of the SQLite database, `moodtune.db` in the data directory.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("moodtune.db"))
}

/// Path of the settings file, `config.json` in the data directory.
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("config.json"))
}

/// Everything the binary can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the mood service
    pub server_url: String,
    pub countdown: u32,
    pub tick_budget: u32,
    pub tick_interval_ms: u64,
    pub warmup_ms: u64,
    pub settle_ms: u64,
    pub top_n: usize,
    pub recommendation_limit: usize,
    pub play_mode: PlayMode,
    pub classify_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Capture command, must write a JPEG to `{output}`
    pub camera_command: Vec<String>,
    /// Re-encode command from `{input}` to `{output}`
    pub compress_command: Vec<String>,
    /// Player command, `{source}` is the URL or file to play
    pub player_command: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            countdown: session.countdown,
            tick_budget: session.tick_budget,
            tick_interval_ms: millis(session.tick),
            warmup_ms: millis(session.warmup),
            settle_ms: millis(session.settle),
            top_n: DEFAULT_TOP_N,
            recommendation_limit: DEFAULT_LIMIT,
            play_mode: PlayMode::Auto,
            classify_timeout_secs: 60,
            request_timeout_secs: 30,
            camera_command: strings(&[
                "ffmpeg", "-loglevel", "error", "-y", "-f", "v4l2", "-video_size", "320x240",
                "-i", "/dev/video0", "-frames:v", "1", "-q:v", "10", "{output}",
            ]),
            compress_command: strings(&[
                "ffmpeg", "-loglevel", "error", "-y", "-i", "{input}", "-q:v", "20", "{output}",
            ]),
            player_command: player::default_command(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write the settings as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, text).with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            countdown: self.countdown,
            tick_budget: self.tick_budget,
            tick: Duration::from_millis(self.tick_interval_ms.max(1)),
            warmup: Duration::from_millis(self.warmup_ms),
            settle: Duration::from_millis(self.settle_ms),
            top_n: self.top_n,
            mode: self.play_mode,
        }
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}
