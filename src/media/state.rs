//! Media state of one playback session.

use serde::Serialize;
use std::collections::HashMap;

use super::titles::{ChapterTable, TitleTable};
use super::tracks::{SubtitleId, TrackTable};

/// What is being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
  File,
  Stream,
  Tv,
  Dvd,
  DvdNav,
  Vcd,
  AudioCd,
  Bluray,
}

impl MediaKind {
  pub fn is_disc(self) -> bool {
    matches!(
      self,
      MediaKind::Dvd | MediaKind::DvdNav | MediaKind::Vcd | MediaKind::AudioCd | MediaKind::Bluray
    )
  }
}

/// Which disc and title a session was started on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscIdentity {
  /// URL scheme as typed by the user, e.g. `dvd` or `br`.
  pub protocol: String,
  /// Requested title or track, `None` for the disc menu / first title.
  pub title: Option<u32>,
  /// Device path or image file.
  pub device: Option<String>,
}

/// What the shell asked to play.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSource {
  pub kind: MediaKind,
  /// Filename, URL or the original disc target.
  pub location: String,
  pub disc: Option<DiscIdentity>,
  /// Start playback at this position (gui time, seconds).
  pub start_at: Option<f64>,
}

impl MediaSource {
  /// Classify a target such as `movie.mkv`, `http://...` or `dvd://2`.
  pub fn parse(target: &str) -> Self {
    let (scheme, rest) = match target.split_once("://") {
      Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
      None => {
        return Self {
          kind: MediaKind::File,
          location: target.to_string(),
          disc: None,
          start_at: None,
        }
      }
    };

    let kind = match scheme.as_str() {
      "dvd" => MediaKind::Dvd,
      "dvdnav" => MediaKind::DvdNav,
      "vcd" => MediaKind::Vcd,
      "cdda" => MediaKind::AudioCd,
      "br" | "bd" | "bluray" => MediaKind::Bluray,
      "tv" | "dvb" => MediaKind::Tv,
      "file" => MediaKind::File,
      _ => MediaKind::Stream,
    };

    let disc = kind.is_disc().then(|| {
      // dvd://2/dev/sr0 carries the device after the title
      let (title, device) = match rest.split_once('/') {
        Some((title, device)) => (title, Some(format!("/{}", device))),
        None => (rest, None),
      };
      DiscIdentity {
        protocol: scheme.clone(),
        title: title.parse().ok(),
        device,
      }
    });

    let location = if kind == MediaKind::File {
      rest.to_string()
    } else {
      target.to_string()
    };

    Self {
      kind,
      location,
      disc,
      start_at: None,
    }
  }

  /// Start playback at a given position.
  pub fn starting_at(mut self, seconds: f64) -> Self {
    self.start_at = Some(seconds);
    self
  }
}

/// Video stream properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
  pub format: String,
  pub codec: String,
  pub bitrate: u32,
  pub width: u32,
  pub height: u32,
  pub fps: f64,
  pub aspect: f64,
  /// Video output driver.
  pub output: String,
}

/// Audio stream properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioInfo {
  pub format: String,
  pub codec: String,
  pub bitrate: u32,
  pub rate: u32,
  pub channels: u32,
  /// Audio output driver.
  pub output: String,
}

/// Mutable record of one playback session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
  pub kind: MediaKind,
  pub filename: String,
  /// Backend timestamp of the first frame.
  pub start_offset: f64,
  /// Zero-based position in seconds.
  pub position: f64,
  pub duration: f64,
  pub demuxer: String,
  pub paused: bool,
  pub no_video: bool,
  pub video: VideoInfo,
  pub audio: AudioInfo,
  pub disc: Option<DiscIdentity>,
  pub metadata: HashMap<String, String>,
  pub video_tracks: TrackTable<i32>,
  pub audio_tracks: TrackTable<i32>,
  pub subtitles: TrackTable<SubtitleId>,
  pub titles: TitleTable,
  pub chapters: ChapterTable,
}

impl MediaState {
  /// Fresh state for a new playback attempt.
  pub fn new(source: &MediaSource) -> Self {
    Self {
      kind: source.kind,
      filename: source.location.clone(),
      start_offset: 0.0,
      position: 0.0,
      duration: 0.0,
      demuxer: String::new(),
      paused: false,
      no_video: false,
      video: VideoInfo::default(),
      audio: AudioInfo::default(),
      disc: source.disc.clone(),
      metadata: HashMap::new(),
      video_tracks: TrackTable::new(),
      audio_tracks: TrackTable::new(),
      subtitles: TrackTable::new(),
      titles: TitleTable::new(),
      chapters: ChapterTable::new(),
    }
  }

  /// Raise the duration. Smaller or invalid values are ignored.
  pub fn set_duration(&mut self, duration: f64) -> bool {
    if !duration.is_finite() || duration <= self.duration {
      return false;
    }
    self.duration = duration;
    true
  }

  /// Replace the duration even if it shrinks, for backends known to
  /// over-report it early on.
  pub fn correct_duration(&mut self, duration: f64) -> bool {
    if !duration.is_finite() || duration <= 0.0 || duration == self.duration {
      return false;
    }
    self.duration = duration;
    true
  }

  pub fn set_position(&mut self, position: f64) -> bool {
    update(&mut self.position, position)
  }

  pub fn set_start_offset(&mut self, offset: f64) -> bool {
    if !offset.is_finite() {
      return false;
    }
    update(&mut self.start_offset, offset)
  }

  pub fn set_paused(&mut self, paused: bool) -> bool {
    update(&mut self.paused, paused)
  }

  pub fn set_metadata(&mut self, key: &str, value: &str) -> bool {
    if self.metadata.get(key).map(String::as_str) == Some(value) {
      return false;
    }
    self.metadata.insert(key.to_string(), value.to_string());
    true
  }

  /// Title number of the disc being played, if any.
  pub fn disc_title(&self) -> Option<u32> {
    self
      .titles
      .selected()
      .or_else(|| self.disc.as_ref().and_then(|disc| disc.title))
  }
}

/// Store `value` into `slot`, reporting whether it differed.
pub fn update<T: PartialEq>(slot: &mut T, value: T) -> bool {
  if *slot == value {
    return false;
  }
  *slot = value;
  true
}

/// String flavour of [`update`] that avoids allocating when unchanged.
pub fn update_str(slot: &mut String, value: &str) -> bool {
  if slot == value {
    return false;
  }
  *slot = value.to_string();
  true
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_targets() {
    let file = MediaSource::parse("/videos/movie.mkv");
    assert_eq!(file.kind, MediaKind::File);
    assert_eq!(file.location, "/videos/movie.mkv");

    let dvd = MediaSource::parse("dvd://3");
    assert_eq!(dvd.kind, MediaKind::Dvd);
    assert_eq!(dvd.disc.as_ref().and_then(|d| d.title), Some(3));

    let dvd_dev = MediaSource::parse("dvd://2/dev/sr0");
    let disc = dvd_dev.disc.unwrap();
    assert_eq!(disc.title, Some(2));
    assert_eq!(disc.device.as_deref(), Some("/dev/sr0"));

    let nav = MediaSource::parse("dvdnav://");
    assert_eq!(nav.kind, MediaKind::DvdNav);
    assert_eq!(nav.disc.unwrap().title, None);

    assert_eq!(MediaSource::parse("br://1").kind, MediaKind::Bluray);
    assert_eq!(MediaSource::parse("cdda://4").kind, MediaKind::AudioCd);
    assert_eq!(MediaSource::parse("https://example.com/a.m3u8").kind, MediaKind::Stream);
    assert_eq!(MediaSource::parse("file:///tmp/a.mp4").location, "/tmp/a.mp4");
  }

  #[test]
  fn test_duration_is_monotonic_unless_corrected() {
    let mut state = MediaState::new(&MediaSource::parse("a.mp3"));
    assert!(state.set_duration(200.0));
    assert!(!state.set_duration(150.0));
    assert_eq!(state.duration, 200.0);
    assert!(!state.set_duration(f64::NAN));
    assert!(state.correct_duration(180.0));
    assert_eq!(state.duration, 180.0);
  }

  #[test]
  fn test_metadata_updates_report_changes() {
    let mut state = MediaState::new(&MediaSource::parse("a.mp3"));
    assert!(state.set_metadata("Title", "Song"));
    assert!(!state.set_metadata("Title", "Song"));
    assert!(state.set_metadata("Title", "Other"));
  }
}
