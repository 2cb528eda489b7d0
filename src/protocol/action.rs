//! High-level player actions and their encoding context.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::timing::{to_backend_time, RolloverTracker};
use crate::media::{MediaState, SubtitleId};

/// How a seek target is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeekMode {
  /// Seconds relative to the current position.
  Relative,
  /// Percentage of the duration.
  Percent,
  /// Absolute gui time in seconds.
  Absolute,
}

/// Which filter chain a filter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterChain {
  Video,
  Audio,
}

/// Something the shell wants the player to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Action {
  Seek {
    target: f64,
    mode: SeekMode,
    precise: bool,
  },
  TogglePause,
  FrameStep,
  FrameBackStep,
  SetVolume {
    volume: u32,
  },
  Mute {
    muted: bool,
  },
  SetVideoTrack {
    id: i32,
  },
  SetAudioTrack {
    id: i32,
  },
  /// `None` turns subtitles off.
  SetSubtitle {
    id: Option<SubtitleId>,
  },
  SetSubtitleDelay {
    seconds: f64,
  },
  SetAudioDelay {
    seconds: f64,
  },
  SetSpeed {
    speed: f64,
  },
  AddFilter {
    chain: FilterChain,
    name: String,
    options: Option<String>,
  },
  RemoveFilter {
    chain: FilterChain,
    name: String,
  },
  Screenshot,
  SetTitle {
    id: u32,
  },
  SetChapter {
    id: u32,
  },
  SetAngle {
    id: u32,
  },
  ShowText {
    text: String,
    duration_ms: u32,
  },
  LoadSubtitle {
    path: PathBuf,
  },
  Quit,
}

impl Action {
  /// Short name for logs and unsupported-action notices.
  pub fn name(&self) -> &'static str {
    match self {
      Action::Seek { .. } => "seek",
      Action::TogglePause => "pause",
      Action::FrameStep => "frame step",
      Action::FrameBackStep => "frame back step",
      Action::SetVolume { .. } => "volume",
      Action::Mute { .. } => "mute",
      Action::SetVideoTrack { .. } => "video track",
      Action::SetAudioTrack { .. } => "audio track",
      Action::SetSubtitle { .. } => "subtitle track",
      Action::SetSubtitleDelay { .. } => "subtitle delay",
      Action::SetAudioDelay { .. } => "audio delay",
      Action::SetSpeed { .. } => "speed",
      Action::AddFilter { .. } => "add filter",
      Action::RemoveFilter { .. } => "remove filter",
      Action::Screenshot => "screenshot",
      Action::SetTitle { .. } => "title",
      Action::SetChapter { .. } => "chapter",
      Action::SetAngle { .. } => "angle",
      Action::ShowText { .. } => "show text",
      Action::LoadSubtitle { .. } => "load subtitle",
      Action::Quit => "quit",
    }
  }
}

/// Result of encoding an action for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
  /// Literal command lines, in order.
  Commands(Vec<String>),
  /// The backend emulates the action with a multi-step sequence.
  Emulated,
  /// The backend cannot do this.
  Unsupported,
}

impl Encoded {
  pub fn one(command: impl Into<String>) -> Self {
    Encoded::Commands(vec![command.into()])
  }
}

/// Read-only view an encoder needs.
pub struct EncodeContext<'a> {
  pub media: &'a MediaState,
  pub rollover: Option<&'a RolloverTracker>,
}

impl EncodeContext<'_> {
  /// Gui time to the timestamp the backend expects.
  pub fn backend_time(&self, gui_time: f64) -> f64 {
    let unwrapped = to_backend_time(gui_time, self.media.start_offset);
    match self.rollover {
      Some(tracker) => tracker.to_raw(unwrapped),
      None => unwrapped,
    }
  }
}

/// Format seconds the way both backends accept them.
pub fn format_seconds(value: f64) -> String {
  let text = format!("{:.3}", value);
  let text = text.trim_end_matches('0').trim_end_matches('.');
  if text.is_empty() || text == "-" || text == "-0" {
    "0".to_string()
  } else {
    text.to_string()
  }
}

/// Quote a string argument, escaping quotes and backslashes.
pub fn quote(text: &str) -> String {
  let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
  format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::media::MediaSource;

  #[test]
  fn test_format_seconds() {
    assert_eq!(format_seconds(9.96), "9.96");
    assert_eq!(format_seconds(10.0), "10");
    assert_eq!(format_seconds(0.0), "0");
    assert_eq!(format_seconds(-0.0001), "0");
    assert_eq!(format_seconds(-5.5), "-5.5");
  }

  #[test]
  fn test_quote_escapes() {
    assert_eq!(quote(r#"say "hi""#), r#""say \"hi\"""#);
    assert_eq!(quote(r"C:\subs\a.srt"), r#""C:\\subs\\a.srt""#);
  }

  #[test]
  fn test_backend_time_applies_start_offset() {
    let mut media = MediaState::new(&MediaSource::parse("a.ts"));
    media.set_start_offset(1000.0);
    let ctx = EncodeContext {
      media: &media,
      rollover: None,
    };
    assert_eq!(ctx.backend_time(10.0), 1010.0);
  }

  #[test]
  fn test_action_deserializes_from_json() {
    let action: Action =
      serde_json::from_str(r#"{"action":"seek","target":30.0,"mode":"absolute","precise":true}"#).unwrap();
    assert_eq!(
      action,
      Action::Seek {
        target: 30.0,
        mode: SeekMode::Absolute,
        precise: true
      }
    );
  }
}
