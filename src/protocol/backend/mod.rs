//! Backend adapters.
//!
//! - `mplayer.rs` - MPlayer in slave + identify mode
//! - `mpv.rs` - mpv driven over stdin with terminal message templates
//! - `backstep.rs` - frame back-step emulation state machine
//! - `countdown.rs` - title boundary countdown state machine

mod backstep;
mod countdown;
mod mplayer;
mod mpv;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::action::{Action, EncodeContext, Encoded};
use super::classify::LineError;
use super::dispatcher::SessionCore;
use super::notify::Notification;
use crate::media::{MediaKind, MediaSource, SelectOutcome, TrackKind};

pub use backstep::{frame_duration, BackStep};
pub use countdown::TitleCountdown;
pub use mplayer::MplayerBackend;
pub use mpv::MpvBackend;

/// The supported external players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
  Mplayer,
  Mpv,
}

impl BackendKind {
  /// Executable name looked up on `PATH`.
  pub fn binary_name(self) -> &'static str {
    match self {
      BackendKind::Mplayer => "mplayer",
      BackendKind::Mpv => "mpv",
    }
  }

  /// Build the adapter for this backend.
  pub fn create(self, options: &LaunchOptions) -> Box<dyn Backend> {
    match self {
      BackendKind::Mplayer => Box::new(MplayerBackend::new(options.title_countdown)),
      BackendKind::Mpv => Box::new(MpvBackend::new(options.max_announced_tracks)),
    }
  }
}

impl fmt::Display for BackendKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BackendKind::Mplayer => write!(f, "MPlayer"),
      BackendKind::Mpv => write!(f, "mpv"),
    }
  }
}

impl std::str::FromStr for BackendKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "mplayer" => Ok(BackendKind::Mplayer),
      "mpv" => Ok(BackendKind::Mpv),
      other => Err(format!("unknown backend: {}", other)),
    }
  }
}

/// A query whose answer arrives as `ANS_<answer>=<value>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
  pub answer: &'static str,
  pub command: &'static str,
}

/// Options that shape the process command line.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
  /// Render subtitles with their own styling.
  pub use_ass: bool,
  /// Default optical drive, overridden by a device in the target.
  pub dvd_device: Option<String>,
  /// User arguments appended before the target.
  pub extra_args: Vec<String>,
  /// How many tracks and titles the mpv templates announce.
  pub max_announced_tracks: u32,
  /// End disc titles early instead of crossing the boundary.
  pub title_countdown: bool,
}

impl Default for LaunchOptions {
  fn default() -> Self {
    Self {
      use_ass: true,
      dvd_device: None,
      extra_args: Vec::new(),
      max_announced_tracks: 16,
      title_countdown: true,
    }
  }
}

/// Backend-specific half of the protocol.
pub trait Backend: Send {
  fn kind(&self) -> BackendKind;

  /// Try every backend pattern on `line`. Returns whether it was consumed.
  fn recognize_line(&mut self, line: &str, core: &mut SessionCore) -> Result<bool, LineError>;

  /// Flags and target needed to launch the process in protocol mode.
  fn startup_arguments(&self, source: &MediaSource, options: &LaunchOptions) -> Vec<String>;

  /// Translate an action into this backend's vocabulary.
  fn encode_command(&self, action: &Action, ctx: &EncodeContext<'_>) -> Encoded;

  /// Start a multi-step emulation for an action encoded as [`Encoded::Emulated`].
  fn begin_emulation(&mut self, action: &Action, core: &mut SessionCore) {
    log::warn!("{} cannot emulate {}", self.kind(), action.name());
    let _ = core;
  }

  /// One-time queries once playback is confirmed.
  fn on_steady_state_entered(&mut self, core: &mut SessionCore);

  /// Query used to re-check the duration, `None` if the backend reports it
  /// on its own.
  fn duration_query(&self) -> Option<Query>;

  /// Whether a line marks the end of the media.
  fn detect_end_of_file(&self, line: &str) -> bool;

  /// Command that shows `text` on screen.
  fn show_text(&self, text: &str, duration_ms: u32) -> String;

  fn next_deadline(&self) -> Option<Instant> {
    None
  }

  fn on_timer(&mut self, now: Instant, core: &mut SessionCore) {
    let _ = (now, core);
  }
}

/// Disc target as both backends write it, e.g. `dvd://2`.
fn disc_target(source: &MediaSource, bluray_scheme: &str) -> String {
  let title = source
    .disc
    .as_ref()
    .and_then(|disc| disc.title)
    .map(|title| title.to_string())
    .unwrap_or_default();
  match source.kind {
    MediaKind::Dvd => format!("dvd://{}", title),
    MediaKind::DvdNav => "dvdnav://".to_string(),
    MediaKind::Bluray => format!("{}://{}", bluray_scheme, title),
    MediaKind::Vcd => format!("vcd://{}", title),
    MediaKind::AudioCd => format!("cdda://{}", title),
    MediaKind::Tv | MediaKind::File | MediaKind::Stream => source.location.clone(),
  }
}

/// Device flag for disc media, if a device is known.
fn disc_device<'a>(source: &'a MediaSource, options: &'a LaunchOptions) -> Option<&'a str> {
  if !source.kind.is_disc() {
    return None;
  }
  source
    .disc
    .as_ref()
    .and_then(|disc| disc.device.as_deref())
    .or(options.dvd_device.as_deref())
}

/// Notify about a selection, including the track it had to create.
fn report_selection(core: &mut SessionCore, kind: TrackKind, outcome: SelectOutcome) {
  if outcome.added {
    core.tracks_changed(kind);
  }
  if outcome.changed {
    core.selection_changed(kind);
  }
}

/// Report a saved screenshot. Relative names are resolved against the
/// screenshot directory the process was started in.
fn screenshot_taken(name: &str, core: &mut SessionCore) {
  let path = Path::new(name);
  let path = match core.screenshot_dir() {
    Some(dir) if path.is_relative() => dir.join(path),
    _ => PathBuf::from(path),
  };
  log::info!("Screenshot saved to {}", path.display());
  core.notify(Notification::ScreenshotTaken(path));
}

/// Parse an integer that some backends print as a float (`1500.000000`).
fn lenient_u32(text: &str) -> Option<u32> {
  let value: f64 = text.trim().parse().ok()?;
  (value.is_finite() && value >= 0.0).then(|| value.round() as u32)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_disc_targets() {
    assert_eq!(disc_target(&MediaSource::parse("dvd://3"), "br"), "dvd://3");
    assert_eq!(disc_target(&MediaSource::parse("br://1"), "bd"), "bd://1");
    assert_eq!(disc_target(&MediaSource::parse("dvdnav://"), "br"), "dvdnav://");
    assert_eq!(disc_target(&MediaSource::parse("a.mkv"), "br"), "a.mkv");
  }

  #[test]
  fn test_disc_device_prefers_target() {
    let options = LaunchOptions {
      dvd_device: Some("/dev/dvd".into()),
      ..Default::default()
    };
    let source = MediaSource::parse("dvd://1/dev/sr1");
    assert_eq!(disc_device(&source, &options), Some("/dev/sr1"));
    let source = MediaSource::parse("dvd://1");
    assert_eq!(disc_device(&source, &options), Some("/dev/dvd"));
    let source = MediaSource::parse("a.mkv");
    assert_eq!(disc_device(&source, &options), None);
  }

  #[test]
  fn test_lenient_u32() {
    assert_eq!(lenient_u32("1500.000000"), Some(1500));
    assert_eq!(lenient_u32("48000"), Some(48000));
    assert_eq!(lenient_u32("-1"), None);
    assert_eq!(lenient_u32("n/a"), None);
  }

  #[test]
  fn test_backend_kind_parsing() {
    assert_eq!("MPlayer".parse::<BackendKind>(), Ok(BackendKind::Mplayer));
    assert_eq!("mpv".parse::<BackendKind>(), Ok(BackendKind::Mpv));
    assert!("vlc".parse::<BackendKind>().is_err());
  }
}
