//! Player configuration with persistence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{BackendKind, DispatchOptions, LaunchOptions};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to access config file: {0}")]
  Io(#[from] std::io::Error),
  #[error("Failed to parse config file: {0}")]
  Json(#[from] serde_json::Error),
  #[error("Invalid configuration: {0}")]
  Invalid(String),
}

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
  /// Which player drives playback.
  #[serde(default = "default_backend")]
  pub backend: BackendKind,

  /// Custom MPlayer executable path (None = auto-detect).
  #[serde(default)]
  pub mplayer_path: Option<String>,

  /// Custom mpv executable path (None = auto-detect).
  #[serde(default)]
  pub mpv_path: Option<String>,

  /// Additional player command-line arguments.
  #[serde(default)]
  pub extra_args: Vec<String>,

  /// Where screenshots are saved. The player runs in this directory.
  #[serde(default = "default_screenshot_dir")]
  pub screenshot_dir: Option<PathBuf>,

  /// Keep the styling of ASS/SSA subtitles.
  #[serde(default = "default_true")]
  pub use_ass_subtitles: bool,

  /// Lines to wait for a pending answer before giving up on it.
  #[serde(default = "default_answer_guard_lines")]
  pub answer_guard_lines: u32,

  /// Fail the session if the player prints nothing for this long.
  #[serde(default = "default_startup_timeout_secs")]
  pub startup_timeout_secs: u32,

  /// How long `stop` waits for the player to quit before killing it.
  #[serde(default = "default_quit_timeout_ms")]
  pub quit_timeout_ms: u32,

  /// Show an on-screen notice for actions the player cannot do.
  #[serde(default = "default_true")]
  pub notify_unsupported: bool,

  /// End disc titles just before the boundary (MPlayer).
  #[serde(default = "default_true")]
  pub title_countdown: bool,

  /// Tracks and titles announced through the mpv templates.
  #[serde(default = "default_max_announced_tracks")]
  pub max_announced_tracks: u32,

  /// Default optical drive.
  #[serde(default)]
  pub dvd_device: Option<String>,
}

fn default_backend() -> BackendKind {
  BackendKind::Mplayer
}

fn default_screenshot_dir() -> Option<PathBuf> {
  dirs::picture_dir()
}

fn default_true() -> bool {
  true
}

fn default_answer_guard_lines() -> u32 {
  120
}

fn default_startup_timeout_secs() -> u32 {
  30
}

fn default_quit_timeout_ms() -> u32 {
  2000
}

fn default_max_announced_tracks() -> u32 {
  16
}

impl Default for PlayerConfig {
  fn default() -> Self {
    Self {
      backend: default_backend(),
      mplayer_path: None,
      mpv_path: None,
      extra_args: Vec::new(),
      screenshot_dir: default_screenshot_dir(),
      use_ass_subtitles: true,
      answer_guard_lines: default_answer_guard_lines(),
      startup_timeout_secs: default_startup_timeout_secs(),
      quit_timeout_ms: default_quit_timeout_ms(),
      notify_unsupported: true,
      title_countdown: true,
      max_announced_tracks: default_max_announced_tracks(),
      dvd_device: None,
    }
  }
}

impl PlayerConfig {
  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(1..=10_000).contains(&self.answer_guard_lines) {
      return Err(ConfigError::Invalid(
        "Answer guard must be between 1 and 10000 lines".to_string(),
      ));
    }
    if self.startup_timeout_secs < 1 {
      return Err(ConfigError::Invalid(
        "Startup timeout must be at least 1 second".to_string(),
      ));
    }
    if self.max_announced_tracks < 1 || self.max_announced_tracks > 256 {
      return Err(ConfigError::Invalid(
        "Announced tracks must be between 1 and 256".to_string(),
      ));
    }
    if self.extra_args.iter().any(|arg| arg.trim().is_empty()) {
      return Err(ConfigError::Invalid("Extra arguments cannot be empty".to_string()));
    }
    Ok(())
  }

  /// `<config dir>/slavectl/config.json`
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("slavectl").join("config.json"))
  }

  /// Read and validate a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: PlayerConfig = serde_json::from_str(&content)?;
    config.validate()?;
    log::info!("Loaded config from {}", path.display());
    Ok(config)
  }

  pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
    self.validate()?;
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(self)?;
    std::fs::write(path, json)?;
    log::info!("Saved config to {}", path.display());
    Ok(())
  }

  /// Configured executable for the selected backend, if any.
  pub fn binary_path(&self) -> Option<PathBuf> {
    let configured = match self.backend {
      BackendKind::Mplayer => &self.mplayer_path,
      BackendKind::Mpv => &self.mpv_path,
    };
    configured
      .as_ref()
      .filter(|s| !s.trim().is_empty())
      .map(PathBuf::from)
  }

  pub fn launch_options(&self) -> LaunchOptions {
    LaunchOptions {
      use_ass: self.use_ass_subtitles,
      dvd_device: self.dvd_device.clone().filter(|s| !s.is_empty()),
      extra_args: self.extra_args.clone(),
      max_announced_tracks: self.max_announced_tracks,
      title_countdown: self.title_countdown,
    }
  }

  pub fn dispatch_options(&self) -> DispatchOptions {
    DispatchOptions {
      answer_guard: self.answer_guard_lines,
      notify_unsupported: self.notify_unsupported,
      screenshot_dir: self.screenshot_dir.clone(),
    }
  }

  pub fn startup_timeout(&self) -> Duration {
    Duration::from_secs(u64::from(self.startup_timeout_secs))
  }

  pub fn quit_timeout(&self) -> Duration {
    Duration::from_millis(u64::from(self.quit_timeout_ms))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_fields_use_defaults() {
    let config: PlayerConfig = serde_json::from_str(r#"{"backend": "mpv", "mpvPath": "/opt/mpv"}"#).unwrap();
    assert_eq!(config.backend, BackendKind::Mpv);
    assert_eq!(config.answer_guard_lines, 120);
    assert_eq!(config.quit_timeout(), Duration::from_secs(2));
    assert!(config.title_countdown);
    assert_eq!(config.binary_path(), Some(PathBuf::from("/opt/mpv")));
  }

  #[test]
  fn test_validate_rejects_guard_out_of_range() {
    let mut config = PlayerConfig {
      answer_guard_lines: 0,
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    config.answer_guard_lines = 10_001;
    assert!(config.validate().is_err());
    config.answer_guard_lines = 10_000;
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_empty_path_means_autodetect() {
    let config = PlayerConfig {
      mplayer_path: Some("  ".into()),
      ..Default::default()
    };
    assert_eq!(config.binary_path(), None);
  }

  #[test]
  fn test_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let config = PlayerConfig {
      backend: BackendKind::Mpv,
      extra_args: vec!["--hwdec=auto".into()],
      dvd_device: Some("/dev/sr0".into()),
      ..Default::default()
    };
    config.save(&path).unwrap();
    assert_eq!(PlayerConfig::load(&path).unwrap(), config);
  }

  #[test]
  fn test_load_rejects_invalid_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"answerGuardLines": 0}"#).unwrap();
    assert!(matches!(PlayerConfig::load(&path), Err(ConfigError::Invalid(_))));

    std::fs::write(&path, "not json").unwrap();
    assert!(matches!(PlayerConfig::load(&path), Err(ConfigError::Json(_))));
  }
}
