//! mpv adapter.
//!
//! mpv has no identify mode. Instead the launch arguments install
//! `--term-playing-msg` and `--term-status-msg` templates that print the
//! same kind of `INFO_<NAME>=<value>` and `STATUS:` lines on the terminal.
//! Commands are read from stdin in mpv's input.conf syntax.

use regex::Captures;
use std::sync::LazyLock;

use super::{
  disc_device, disc_target, lenient_u32, report_selection, screenshot_taken, Backend, BackendKind,
  LaunchOptions, Query,
};
use crate::media::{MediaKind, MediaSource, SubtitleId, SubtitleOrigin, TrackKind};
use crate::protocol::action::{format_seconds, quote, Action, EncodeContext, Encoded, FilterChain, SeekMode};
use crate::protocol::classify::{field, flag, seconds, text, Classifier, LineError};
use crate::protocol::dispatcher::SessionCore;
use crate::protocol::notify::{ExitReason, Notification};

/// Seconds a title length may differ from the reported duration and still
/// identify the title.
const TITLE_MATCH_TOLERANCE: f64 = 1.0;

/// Status durations closer than this are the same duration.
const DURATION_EPSILON: f64 = 0.001;

const METADATA_KEYS: &[&str] = &["title", "artist", "album", "genre", "date", "track", "comment"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
  Status,
  Answer,
  TrackInfo,
  TrackList,
  TitleLength,
  ChapterInfo,
  VtsCount,
  Vts,
  Screenshot,
  Exiting,
  Forbidden,
  NotFound,
  OpenFailed,
  UnsupportedFormat,
  NoMedium,
  CacheStuck,
  IcyTitle,
  FontCache,
  Metadata,
  Playing,
  Version,
  Info,
}

static LINES: LazyLock<Classifier<Line>> = LazyLock::new(|| {
  Classifier::new(&[
    (
      Line::Status,
      r"^STATUS: (-?[0-9.]+) / (-?[0-9.]+) P: (yes|no) B: (yes|no) I: (yes|no)",
    ),
    (Line::Answer, r"^ANS_([A-Za-z0-9_]+)=(.*)$"),
    (
      Line::TrackInfo,
      r"^INFO_TRACK_\d+: (audio|video|sub) (\d+) '([^']*)' '(.*)' (yes|no) (yes|no) '(.*)'$",
    ),
    (
      Line::TrackList,
      r"^\s*(\(\+\))?\s*(Video|Audio|Subs)\s+--[vas]id=(\d+)(?:\s+--[vas]lang=(\S+))?(?:.*?'([^']*)')?",
    ),
    (Line::TitleLength, r"^INFO_TITLE_(\d+)_LENGTH=(.*)$"),
    (Line::ChapterInfo, r"^INFO_CHAPTER_(\d+)_(NAME|START)=(.*)$"),
    (Line::VtsCount, r"^\[dvdnav\] VTS count: (\d+)"),
    (Line::Vts, r"^\[dvdnav\] VTS: (\d+)"),
    (Line::Screenshot, r"^Screenshot: '(.*)'"),
    (Line::Exiting, r"^Exiting\.\.\. \((.*)\)"),
    (Line::Forbidden, r"HTTP error 403"),
    (Line::NotFound, r"HTTP error 404|No such file or directory"),
    (Line::OpenFailed, r"^Failed to open "),
    (Line::UnsupportedFormat, r"^Failed to recognize file format"),
    (Line::NoMedium, r"No medium found|^\[dvdnav\] Couldn't open DVD device"),
    (Line::CacheStuck, r"^Cache is not responding"),
    (Line::IcyTitle, r"^\s*icy-title: (.*)$"),
    (Line::FontCache, r"(?i)updating font cache"),
    (Line::Metadata, r"^METADATA_([A-Za-z0-9_]+)=(.*)$"),
    (Line::Playing, r"^Playing: (.*)$"),
    (Line::Version, r"^MPV_VERSION=(.*)$"),
    (Line::Info, r"^INFO_([A-Z0-9_]+)=(.*)$"),
  ])
  .expect("mpv line patterns are valid")
});

/// Template printing one track as an `INFO_TRACK_<i>` line, or nothing.
fn track_template(index: u32) -> String {
  let p = format!("track-list/{}", index);
  format!(
    "${{?{p}/type:INFO_TRACK_{i}: ${{{p}/type}} ${{{p}/id}} '${{{p}/lang:}}' '${{{p}/title:}}' \
     ${{{p}/selected}} ${{{p}/external}} '${{{p}/external-filename:}}'}}",
    p = p,
    i = index
  )
}

fn playing_template(max_tracks: u32) -> String {
  let mut lines: Vec<String> = [
    "MPV_VERSION=${=mpv-version:}",
    "INFO_VIDEO_FORMAT=${=video-format:}",
    "INFO_VIDEO_CODEC=${=video-codec:}",
    "INFO_VIDEO_BITRATE=${=video-bitrate:0}",
    "INFO_VIDEO_WIDTH=${=width:0}",
    "INFO_VIDEO_HEIGHT=${=height:0}",
    "INFO_VIDEO_FPS=${=container-fps:0}",
    "INFO_VIDEO_ASPECT=${=video-params/aspect:0}",
    "INFO_AUDIO_FORMAT=${=audio-codec-name:}",
    "INFO_AUDIO_CODEC=${=audio-codec:}",
    "INFO_AUDIO_BITRATE=${=audio-bitrate:0}",
    "INFO_AUDIO_RATE=${=audio-params/samplerate:0}",
    "INFO_AUDIO_NCH=${=audio-params/channel-count:0}",
    "INFO_LENGTH=${=duration:0}",
    "INFO_DEMUXER=${=file-format:}",
    "INFO_START_TIME=${=demuxer-start-time:0}",
    "INFO_MEDIA_TITLE=${=media-title:}",
    "INFO_TITLES=${=disc-titles:0}",
    "INFO_VO=${=current-vo:}",
    "INFO_AO=${=current-ao:}",
  ]
  .iter()
  .map(|line| line.to_string())
  .collect();

  for index in 0..max_tracks {
    lines.push(track_template(index));
  }
  for index in 0..max_tracks {
    let p = format!("disc-title-list/{}", index);
    lines.push(format!(
      "${{?{p}/length:INFO_TITLE_{i}_LENGTH=${{={p}/length}}}}",
      p = p,
      i = index
    ));
    let p = format!("chapter-list/{}", index);
    lines.push(format!(
      "${{?{p}/time:INFO_CHAPTER_{i}_START=${{={p}/time}}\\nINFO_CHAPTER_{i}_NAME=${{{p}/title:}}}}",
      p = p,
      i = index
    ));
  }
  for key in METADATA_KEYS {
    lines.push(format!(
      "${{?metadata/by-key/{k}:METADATA_{u}=${{metadata/by-key/{k}}}}}",
      k = key,
      u = key.to_ascii_uppercase()
    ));
  }
  lines.join("\\n")
}

const STATUS_TEMPLATE: &str =
  "STATUS: ${=time-pos:0} / ${=duration:0} P: ${pause} B: ${paused-for-cache} I: ${core-idle}";

/// mpv adapter.
pub struct MpvBackend {
  max_tracks: u32,
  /// A VTS change could not be mapped to a title yet. Holds the duration
  /// seen at that point, which still belongs to the previous title.
  vts_pending: Option<f64>,
  /// The title changed while the previous title lasted this long. The next
  /// different duration replaces it, even when shorter.
  switched_from: Option<f64>,
  /// Latest reported duration.
  last_duration: f64,
}

impl MpvBackend {
  pub fn new(max_tracks: u32) -> Self {
    Self {
      max_tracks,
      vts_pending: None,
      switched_from: None,
      last_duration: 0.0,
    }
  }

  fn select_title(&mut self, title: u32, previous_duration: f64, core: &mut SessionCore) {
    self.vts_pending = None;
    if core.media.titles.select(title) {
      log::debug!("Playing title {}", title);
      self.switched_from = Some(previous_duration);
      core.notify(Notification::TitleChanged(title));
    }
  }

  /// Handle a reported duration. `fresh` is set for `INFO_LENGTH`, which is
  /// printed for the new title only.
  fn on_duration(&mut self, duration: f64, fresh: bool, core: &mut SessionCore) {
    if duration <= 0.0 {
      return;
    }
    self.last_duration = duration;
    let stale = |before: f64| !fresh && (duration - before).abs() < DURATION_EPSILON;

    if let Some(before) = self.vts_pending {
      if stale(before) {
        log::trace!("Duration {:.3}s still belongs to the previous title", duration);
        return;
      }
      match core.media.titles.title_by_duration(duration, TITLE_MATCH_TOLERANCE) {
        Some(title) => self.select_title(title, before, core),
        None => {
          log::debug!("No title is {:.3}s long", duration);
          self.vts_pending = Some(duration);
        }
      }
    }

    match self.switched_from {
      Some(before) if stale(before) => {}
      Some(_) => {
        self.switched_from = None;
        core.correct_duration(duration);
      }
      None => {
        core.update_duration(duration);
      }
    }
  }

  fn on_vts(&mut self, vts: u32, core: &mut SessionCore) {
    let titles = &mut core.media.titles;
    if !titles.select_vts(vts) {
      return;
    }
    let direct = titles.vts_count() == Some(titles.len() as u32) && titles.get(vts).is_some();
    if direct {
      self.select_title(vts, self.last_duration, core);
    } else {
      log::debug!("VTS {} does not map to a title, waiting for its duration", vts);
      self.vts_pending = Some(self.last_duration);
    }
  }

  fn on_track(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let id: i32 = field(caps, 2, "track id")?;
    let (lang, title) = (text(caps, 3), text(caps, 4));
    let selected = flag(caps, 5);
    let media = &mut core.media;

    let (kind, changed, outcome) = match text(caps, 1) {
      "video" => {
        let changed = media.video_tracks.update(id, lang, title);
        (TrackKind::Video, changed, track_selection(&mut media.video_tracks, id, selected))
      }
      "audio" => {
        let changed = media.audio_tracks.update(id, lang, title);
        (TrackKind::Audio, changed, track_selection(&mut media.audio_tracks, id, selected))
      }
      _ => {
        let external = flag(caps, 6);
        let origin = if external {
          SubtitleOrigin::File
        } else {
          SubtitleOrigin::Demuxer
        };
        let key = SubtitleId::new(origin, id);
        let subtitles = &mut media.subtitles;
        let mut changed = false;
        // mpv numbers subtitles across origins; a reused id replaces the old entry
        if let Some(stale) = subtitles.find(|other| other.id == id && other.origin != origin) {
          changed |= subtitles.remove(stale);
        }
        changed |= subtitles.update(key, lang, title);
        let filename = text(caps, 7);
        if external && !filename.is_empty() {
          changed |= subtitles.set_filename(key, filename.into());
        }
        (TrackKind::Subtitle, changed, track_selection(subtitles, key, selected))
      }
    };
    if changed {
      core.tracks_changed(kind);
    }
    if outcome {
      core.selection_changed(kind);
    }
    Ok(())
  }

  fn on_track_list(&mut self, caps: &Captures<'_>, line: &str, core: &mut SessionCore) -> Result<(), LineError> {
    let selected = !text(caps, 1).is_empty();
    let id: i32 = field(caps, 3, "track id")?;
    let (lang, title) = (text(caps, 4), text(caps, 5));
    let media = &mut core.media;
    let (kind, changed, outcome) = match text(caps, 2) {
      "Video" => {
        let changed = media.video_tracks.update(id, lang, title);
        (TrackKind::Video, changed, track_selection(&mut media.video_tracks, id, selected))
      }
      "Audio" => {
        let changed = media.audio_tracks.update(id, lang, title);
        (TrackKind::Audio, changed, track_selection(&mut media.audio_tracks, id, selected))
      }
      _ => {
        let origin = if line.contains("(external)") {
          SubtitleOrigin::File
        } else {
          SubtitleOrigin::Demuxer
        };
        let key = SubtitleId::new(origin, id);
        let changed = media.subtitles.update(key, lang, title);
        (TrackKind::Subtitle, changed, track_selection(&mut media.subtitles, key, selected))
      }
    };
    if changed {
      core.tracks_changed(kind);
    }
    if outcome {
      core.selection_changed(kind);
    }
    Ok(())
  }

  fn on_answer(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let name = text(caps, 1).to_ascii_uppercase();
    core.answer(&name);
    let value = text(caps, 2).trim();
    let id = match value {
      "" | "no" => None,
      _ => Some(field::<i32>(caps, 2, "track id")?),
    };

    let media = &mut core.media;
    match (name.as_str(), id) {
      ("VID", Some(id)) => {
        let outcome = media.video_tracks.select(id);
        report_selection(core, TrackKind::Video, outcome);
      }
      ("AID", Some(id)) => {
        let outcome = media.audio_tracks.select(id);
        report_selection(core, TrackKind::Audio, outcome);
      }
      ("SID", Some(id)) => {
        let key = media
          .subtitles
          .find_by_raw_id(id)
          .unwrap_or_else(|| SubtitleId::new(SubtitleOrigin::Demuxer, id));
        let outcome = media.subtitles.select(key);
        report_selection(core, TrackKind::Subtitle, outcome);
      }
      ("VID", None) => {
        if media.video_tracks.deselect() {
          core.selection_changed(TrackKind::Video);
        }
      }
      ("AID", None) => {
        if media.audio_tracks.deselect() {
          core.selection_changed(TrackKind::Audio);
        }
      }
      ("SID", None) => {
        if media.subtitles.deselect() {
          core.selection_changed(TrackKind::Subtitle);
        }
      }
      _ => log::debug!("Ignoring answer {}={}", name, value),
    }
    Ok(())
  }

  fn on_info(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let name = text(caps, 1);
    let value = text(caps, 2).trim();
    if value.is_empty() {
      return Ok(());
    }
    let count = |name: &'static str| {
      lenient_u32(value).ok_or_else(|| LineError::InvalidField {
        field: name,
        line: text(caps, 0).to_string(),
      })
    };

    let media = &mut core.media;
    match name {
      "LENGTH" => self.on_duration(seconds(caps, 2, "length")?, true, core),
      "START_TIME" => {
        media.set_start_offset(seconds(caps, 2, "start time")?);
      }
      "DEMUXER" => {
        core.set_demuxer(value);
      }
      "MEDIA_TITLE" => {
        media.set_metadata("media_title", value);
      }
      "VIDEO_FORMAT" => media.video.format = value.to_string(),
      "VIDEO_CODEC" => media.video.codec = value.to_string(),
      "VIDEO_BITRATE" => media.video.bitrate = count("video bitrate")?,
      "VIDEO_WIDTH" => media.video.width = count("video width")?,
      "VIDEO_HEIGHT" => media.video.height = count("video height")?,
      "VIDEO_FPS" => media.video.fps = field(caps, 2, "video fps")?,
      "VIDEO_ASPECT" => media.video.aspect = field(caps, 2, "video aspect")?,
      "AUDIO_FORMAT" => media.audio.format = value.to_string(),
      "AUDIO_CODEC" => media.audio.codec = value.to_string(),
      "AUDIO_BITRATE" => media.audio.bitrate = count("audio bitrate")?,
      "AUDIO_RATE" => media.audio.rate = count("audio rate")?,
      "AUDIO_NCH" => media.audio.channels = count("audio channels")?,
      "VO" => media.video.output = value.to_string(),
      "AO" => media.audio.output = value.to_string(),
      "TITLES" => {
        media.titles.ensure_count(count("title count")?);
      }
      _ => log::trace!("Ignoring INFO_{}={}", name, value),
    }
    Ok(())
  }
}

/// Apply a track's selected flag. Returns whether the selection changed.
fn track_selection<K: Ord + Copy>(table: &mut crate::media::TrackTable<K>, id: K, selected: bool) -> bool {
  if selected {
    table.select(id).changed
  } else if table.selected() == Some(id) {
    table.deselect()
  } else {
    false
  }
}

impl Backend for MpvBackend {
  fn kind(&self) -> BackendKind {
    BackendKind::Mpv
  }

  fn recognize_line(&mut self, line: &str, core: &mut SessionCore) -> Result<bool, LineError> {
    let Some((kind, caps)) = LINES.classify(line) else {
      return Ok(false);
    };

    match kind {
      Line::Status => {
        let time = seconds(&caps, 1, "status time")?;
        let duration = seconds(&caps, 2, "status duration")?;
        core.media.set_paused(flag(&caps, 3));
        core.on_status(time);
        core.set_buffering(flag(&caps, 4));
        self.on_duration(duration, false, core);
      }
      Line::Answer => self.on_answer(&caps, core)?,
      Line::TrackInfo => self.on_track(&caps, core)?,
      Line::TrackList => self.on_track_list(&caps, line, core)?,
      Line::TitleLength => {
        let index: u32 = field(&caps, 1, "title")?;
        let length = seconds(&caps, 2, "title length")?;
        core.media.titles.update_duration(index + 1, length);
      }
      Line::ChapterInfo => {
        let id: u32 = field(&caps, 1, "chapter")?;
        let chapters = &mut core.media.chapters;
        let changed = match text(&caps, 2) {
          "NAME" => chapters.update_name(id, text(&caps, 3)),
          _ => chapters.update_start(id, seconds(&caps, 3, "chapter start")?),
        };
        if changed {
          core.notify(Notification::ChaptersChanged);
        }
      }
      Line::VtsCount => {
        core.media.titles.set_vts_count(field(&caps, 1, "vts count")?);
      }
      Line::Vts => self.on_vts(field(&caps, 1, "vts")?, core),
      Line::Screenshot => screenshot_taken(text(&caps, 1), core),
      Line::Exiting => match text(&caps, 1) {
        "End of file" => core.end_of_file(),
        "Quit" => log::debug!("mpv quitting"),
        reason => core.report_error(match reason {
          "Errors when loading file" => ExitReason::OpenFailed,
          _ => ExitReason::PlayerError(1),
        }),
      },
      Line::Forbidden => core.report_error(ExitReason::Forbidden),
      Line::NotFound => core.report_error(ExitReason::NotFound),
      Line::OpenFailed => core.report_error(ExitReason::OpenFailed),
      Line::UnsupportedFormat => core.report_error(ExitReason::UnsupportedFormat),
      Line::NoMedium => core.report_error(ExitReason::NoMedium),
      Line::CacheStuck => core.message(line),
      Line::IcyTitle => {
        let title = text(&caps, 1).trim();
        if core.media.set_metadata("stream_title", title) && !title.is_empty() {
          core.message(title);
        }
      }
      Line::FontCache => core.message("Updating font cache"),
      Line::Metadata => {
        let key = text(&caps, 1).to_ascii_lowercase();
        core.media.set_metadata(&key, text(&caps, 2));
      }
      Line::Playing => core.media.filename = text(&caps, 1).to_string(),
      Line::Version => log::info!("mpv version {}", text(&caps, 1)),
      Line::Info => self.on_info(&caps, core)?,
    }
    Ok(true)
  }

  fn startup_arguments(&self, source: &MediaSource, options: &LaunchOptions) -> Vec<String> {
    let mut args: Vec<String> = [
      "--no-quiet",
      "--terminal",
      "--no-msg-color",
      "--input-file=/dev/stdin",
      "--no-input-default-bindings",
      "--input-vo-keyboard=no",
      "--idle=no",
      "--rebase-start-time=no",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();

    args.push(format!("--term-playing-msg={}", playing_template(self.max_tracks)));
    args.push(format!("--term-status-msg={}", STATUS_TEMPLATE));
    let ass = if options.use_ass { "no" } else { "strip" };
    args.push(format!("--sub-ass-override={}", ass));
    if let Some(start) = source.start_at {
      args.push(format!("--start={}", format_seconds(start)));
    }
    if let Some(device) = disc_device(source, options) {
      let flag = match source.kind {
        MediaKind::Bluray => "--bluray-device",
        MediaKind::Vcd | MediaKind::AudioCd => "--cdrom-device",
        _ => "--dvd-device",
      };
      args.push(format!("{}={}", flag, device));
    }
    args.extend(options.extra_args.iter().cloned());
    args.push(disc_target(source, "bd"));
    args
  }

  fn encode_command(&self, action: &Action, ctx: &EncodeContext<'_>) -> Encoded {
    match action {
      Action::Seek {
        target,
        mode,
        precise,
      } => {
        let (value, kind) = match mode {
          SeekMode::Relative => (*target, "relative"),
          SeekMode::Percent => (*target, "absolute-percent"),
          SeekMode::Absolute => (ctx.backend_time(*target), "absolute"),
        };
        let accuracy = if *precise { "exact" } else { "keyframes" };
        Encoded::one(format!("seek {} {} {}", format_seconds(value), kind, accuracy))
      }
      Action::TogglePause => Encoded::one("cycle pause"),
      Action::FrameStep => Encoded::one("frame-step"),
      Action::FrameBackStep => Encoded::one("frame-back-step"),
      Action::SetVolume { volume } => Encoded::one(format!("set volume {}", volume)),
      Action::Mute { muted } => Encoded::one(format!("set mute {}", if *muted { "yes" } else { "no" })),
      Action::SetVideoTrack { id } => Encoded::one(format!("set vid {}", id)),
      Action::SetAudioTrack { id } => Encoded::one(format!("set aid {}", id)),
      Action::SetSubtitle { id: None } => Encoded::one("set sid no"),
      Action::SetSubtitle { id: Some(key) } => Encoded::one(format!("set sid {}", key.id)),
      Action::SetSubtitleDelay { seconds } => {
        Encoded::one(format!("set sub-delay {}", format_seconds(*seconds)))
      }
      Action::SetAudioDelay { seconds } => {
        Encoded::one(format!("set audio-delay {}", format_seconds(*seconds)))
      }
      Action::SetSpeed { speed } => Encoded::one(format!("set speed {}", format_seconds(*speed))),
      Action::AddFilter {
        chain,
        name,
        options,
      } => {
        let command = match chain {
          FilterChain::Video => "vf",
          FilterChain::Audio => "af",
        };
        let filter = match options {
          Some(options) => format!("{}={}", name, options),
          None => name.clone(),
        };
        Encoded::one(format!("{} add {}", command, filter))
      }
      Action::RemoveFilter { chain, name } => {
        let command = match chain {
          FilterChain::Video => "vf",
          FilterChain::Audio => "af",
        };
        Encoded::one(format!("{} remove {}", command, name))
      }
      Action::Screenshot => Encoded::one("screenshot"),
      Action::SetTitle { id } => match id.checked_sub(1) {
        Some(index) => Encoded::one(format!("set disc-title {}", index)),
        None => Encoded::Unsupported,
      },
      Action::SetChapter { id } => Encoded::one(format!("set chapter {}", id)),
      Action::SetAngle { id } => Encoded::one(format!("set angle {}", id)),
      Action::ShowText { text, duration_ms } => Encoded::one(self.show_text(text, *duration_ms)),
      Action::LoadSubtitle { path } => {
        let mut commands = vec![format!("sub-add {}", quote(&path.to_string_lossy()))];
        commands.extend((0..self.max_tracks).map(|index| format!("print-text {}", quote(&track_template(index)))));
        Encoded::Commands(commands)
      }
      Action::Quit => Encoded::one("quit"),
    }
  }

  fn on_steady_state_entered(&mut self, core: &mut SessionCore) {
    if core.media.video_tracks.is_empty() {
      core.media.no_video = true;
    }
    core.query("VID", r#"print-text "ANS_VID=${=vid:no}""#);
    core.query("AID", r#"print-text "ANS_AID=${=aid:no}""#);
    core.query("SID", r#"print-text "ANS_SID=${=sid:no}""#);
  }

  fn duration_query(&self) -> Option<Query> {
    None
  }

  fn detect_end_of_file(&self, line: &str) -> bool {
    line.starts_with("Exiting... (End of file)")
  }

  fn show_text(&self, text: &str, duration_ms: u32) -> String {
    format!("show-text {} {}", quote(text), duration_ms)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::dispatcher::{Dispatch, DispatchOptions, Dispatcher};
  use crate::protocol::timing::MPEGTS_ROLLOVER;

  fn dispatcher(target: &str) -> Dispatcher {
    Dispatcher::new(
      Box::new(MpvBackend::new(4)),
      &MediaSource::parse(target),
      &DispatchOptions::default(),
    )
  }

  fn feed(d: &mut Dispatcher, lines: &[&str]) {
    for line in lines {
      d.process_line(line);
    }
  }

  fn line_kind(line: &str) -> Option<Line> {
    LINES.classify(line).map(|(kind, _)| kind)
  }

  #[test]
  fn test_info_catch_all_is_tried_last() {
    assert_eq!(LINES.patterns().last(), Some(Line::Info));
    assert_eq!(LINES.patterns().filter(|kind| *kind == Line::Info).count(), 1);

    assert_eq!(
      line_kind("INFO_TRACK_0: video 1 '' 'Main' yes no ''"),
      Some(Line::TrackInfo)
    );
    assert_eq!(line_kind("INFO_TITLE_0_LENGTH=95.000000"), Some(Line::TitleLength));
    assert_eq!(line_kind("INFO_CHAPTER_2_NAME=Intro"), Some(Line::ChapterInfo));
    assert_eq!(line_kind("INFO_LENGTH=95.000000"), Some(Line::Info));
    assert_eq!(line_kind("ANS_VID=1"), Some(Line::Answer));
  }

  #[test]
  fn test_status_starts_playback_and_queries_tracks() {
    let mut d = dispatcher("movie.mkv");
    feed(
      &mut d,
      &[
        "INFO_TRACK_0: video 1 '' 'Main' yes no ''",
        "INFO_TRACK_1: audio 1 'eng' 'Stereo' yes no ''",
      ],
    );
    assert!(d.take_notifications().is_empty());

    d.process_line("STATUS: 0.500000 / 60.000000 P: no B: no I: no");
    assert_eq!(
      d.take_notifications(),
      vec![
        Notification::PlaybackStarted,
        Notification::TracksChanged(TrackKind::Video),
        Notification::SelectionChanged(TrackKind::Video),
        Notification::TracksChanged(TrackKind::Audio),
        Notification::SelectionChanged(TrackKind::Audio),
        Notification::PositionChanged(0.5),
        Notification::DurationChanged(60.0),
      ]
    );
    assert_eq!(d.take_commands().len(), 3);
    assert_eq!(d.pending_answers(), 3);

    feed(&mut d, &["ANS_VID=1", "ANS_AID=1", "ANS_SID=no"]);
    assert_eq!(d.pending_answers(), 0);
    assert!(d.take_notifications().is_empty());
  }

  #[test]
  fn test_status_tracks_pause_and_buffering() {
    let mut d = dispatcher("http://example.com/live");
    feed(
      &mut d,
      &[
        "STATUS: 1.000000 / 0.000000 P: no B: no I: no",
        "ANS_VID=no",
        "ANS_AID=no",
        "ANS_SID=no",
      ],
    );
    d.take_notifications();

    d.process_line("STATUS: 1.000000 / 0.000000 P: yes B: yes I: yes");
    assert!(d.media().paused);
    assert!(d.take_notifications().contains(&Notification::BufferingStarted));
    d.process_line("STATUS: 1.500000 / 0.000000 P: no B: no I: no");
    assert!(d.take_notifications().contains(&Notification::BufferingEnded));
  }

  #[test]
  fn test_external_subtitle_track() {
    let mut d = dispatcher("movie.mkv");
    d.process_line("INFO_TRACK_2: sub 3 'de' '' no yes '/tmp/movie.de.srt'");
    let key = SubtitleId::new(SubtitleOrigin::File, 3);
    let info = d.media().subtitles.get(key).unwrap();
    assert_eq!(info.lang, "de");
    assert_eq!(
      info.filename.as_deref(),
      Some(std::path::Path::new("/tmp/movie.de.srt"))
    );
  }

  #[test]
  fn test_native_track_list_lines() {
    let mut d = dispatcher("movie.mkv");
    feed(
      &mut d,
      &[
        " (+) Audio --aid=1 --alang=eng (*) 'Stereo' (aac 2ch 48000Hz)",
        "     Subs  --sid=1 --slang=ger 'Deutsch' (subrip)",
      ],
    );
    let audio = d.media().audio_tracks.get(1).unwrap();
    assert_eq!(audio.lang, "eng");
    assert_eq!(audio.name, "Stereo");
    assert_eq!(d.media().audio_tracks.selected(), Some(1));
    let key = SubtitleId::new(SubtitleOrigin::Demuxer, 1);
    assert_eq!(d.media().subtitles.get(key).unwrap().name, "Deutsch");
    assert_eq!(d.media().subtitles.selected(), None);
  }

  #[test]
  fn test_vts_maps_directly_when_counts_match() {
    let mut d = dispatcher("dvdnav://");
    feed(
      &mut d,
      &[
        "INFO_TITLES=3",
        "[dvdnav] VTS count: 3",
        "STATUS: 1.000000 / 100.000000 P: no B: no I: no",
        "ANS_VID=no",
        "ANS_AID=no",
        "ANS_SID=no",
      ],
    );
    d.take_notifications();
    d.process_line("[dvdnav] VTS: 3");
    assert_eq!(d.media().titles.selected(), Some(3));
    assert!(d.take_notifications().contains(&Notification::TitleChanged(3)));

    feed(
      &mut d,
      &[
        "STATUS: 1.100000 / 100.000000 P: no B: no I: no",
        "STATUS: 0.100000 / 40.000000 P: no B: no I: no",
      ],
    );
    assert_eq!(d.media().duration, 40.0);
  }

  #[test]
  fn test_vts_resolved_by_duration() {
    let mut d = dispatcher("dvdnav://");
    feed(
      &mut d,
      &[
        "INFO_TITLES=3",
        "INFO_TITLE_0_LENGTH=100.000000",
        "INFO_TITLE_1_LENGTH=200.500000",
        "INFO_TITLE_2_LENGTH=300.000000",
        "[dvdnav] VTS count: 2",
        "STATUS: 1.000000 / 300.000000 P: no B: no I: no",
        "[dvdnav] VTS: 2",
      ],
    );
    assert_eq!(d.media().titles.selected(), None);

    d.process_line("STATUS: 0.200000 / 200.000000 P: no B: no I: no");
    assert_eq!(d.media().titles.selected(), Some(2));
    assert_eq!(d.media().duration, 200.0);
  }

  #[test]
  fn test_vts_waits_for_a_new_duration() {
    let mut d = dispatcher("dvdnav://");
    feed(
      &mut d,
      &[
        "INFO_TITLES=3",
        "INFO_TITLE_0_LENGTH=100.000000",
        "INFO_TITLE_1_LENGTH=200.500000",
        "INFO_TITLE_2_LENGTH=300.000000",
        "[dvdnav] VTS count: 2",
        "STATUS: 1.000000 / 300.000000 P: no B: no I: no",
        "[dvdnav] VTS: 2",
        "STATUS: 1.100000 / 300.000000 P: no B: no I: no",
      ],
    );
    assert_eq!(d.media().titles.selected(), None);

    d.process_line("STATUS: 0.200000 / 200.000000 P: no B: no I: no");
    assert_eq!(d.media().titles.selected(), Some(2));
    assert_eq!(d.media().duration, 200.0);
  }

  #[test]
  fn test_vts_resolved_by_info_length() {
    let mut d = dispatcher("dvdnav://");
    feed(
      &mut d,
      &[
        "INFO_TITLES=2",
        "INFO_TITLE_0_LENGTH=100.000000",
        "INFO_TITLE_1_LENGTH=300.000000",
        "[dvdnav] VTS count: 1",
        "STATUS: 1.000000 / 100.000000 P: no B: no I: no",
        "[dvdnav] VTS: 1",
        "INFO_LENGTH=100.000000",
      ],
    );
    assert_eq!(d.media().titles.selected(), Some(1));
  }

  #[test]
  fn test_mpegts_rollover_in_status_stream() {
    let mut d = dispatcher("capture.ts");
    feed(
      &mut d,
      &[
        "INFO_DEMUXER=mpegts",
        "INFO_START_TIME=95440.000000",
        "STATUS: 95443.000000 / 0.000000 P: no B: no I: no",
      ],
    );
    assert!((d.media().position - 3.0).abs() < 1e-6);
    d.process_line("STATUS: 0.500000 / 0.000000 P: no B: no I: no");
    assert!((d.media().position - (MPEGTS_ROLLOVER + 0.5 - 95440.0)).abs() < 1e-3);
  }

  #[test]
  fn test_demuxer_change_resets_rollover() {
    let mut d = dispatcher("capture.ts");
    feed(
      &mut d,
      &[
        "INFO_DEMUXER=mpegts",
        "STATUS: 95000.000000 / 0.000000 P: no B: no I: no",
        "STATUS: 0.500000 / 0.000000 P: no B: no I: no",
      ],
    );
    assert!((d.media().position - (MPEGTS_ROLLOVER + 0.5)).abs() < 1e-3);

    feed(&mut d, &["INFO_DEMUXER=mkv", "STATUS: 2.000000 / 0.000000 P: no B: no I: no"]);
    assert_eq!(d.media().position, 2.0);

    feed(&mut d, &["INFO_DEMUXER=mpegts", "STATUS: 3.000000 / 0.000000 P: no B: no I: no"]);
    assert_eq!(d.media().position, 3.0);
  }

  #[test]
  fn test_extra_args_precede_target() {
    let options = LaunchOptions {
      use_ass: false,
      extra_args: vec!["--vo=null".into()],
      ..Default::default()
    };
    let args = MpvBackend::new(2).startup_arguments(&MediaSource::parse("br://3"), &options);
    assert!(args.contains(&"--sub-ass-override=strip".to_string()));
    let tail: Vec<&str> = args[args.len() - 2..].iter().map(String::as_str).collect();
    assert_eq!(tail, ["--vo=null", "bd://3"]);
  }

  #[test]
  fn test_encoding_uses_backend_time() {
    let mut d = dispatcher("movie.mkv");
    feed(&mut d, &["INFO_START_TIME=10.000000", "STATUS: 12.000000 / 60.000000 P: no B: no I: no"]);
    d.take_commands();
    d.command(Action::Seek {
      target: 30.0,
      mode: SeekMode::Absolute,
      precise: true,
    });
    d.command(Action::FrameBackStep);
    d.command(Action::SetSubtitle { id: None });
    assert_eq!(
      d.take_commands(),
      vec!["seek 40 absolute exact", "frame-back-step", "set sid no"]
    );
  }

  #[test]
  fn test_unrecognized_line_leaves_state_alone() {
    let mut d = dispatcher("movie.mkv");
    d.process_line("INFO_VIDEO_WIDTH=1920");
    let before = d.media().clone();
    assert_eq!(d.process_line("[ffmpeg] something happened"), Dispatch::Unhandled);
    assert_eq!(d.media(), &before);
  }

  #[test]
  fn test_load_subtitle_refreshes_tracks() {
    let d = MpvBackend::new(2);
    let media = crate::media::MediaState::new(&MediaSource::parse("a.mkv"));
    let ctx = EncodeContext {
      media: &media,
      rollover: None,
    };
    let Encoded::Commands(commands) = d.encode_command(
      &Action::LoadSubtitle {
        path: "/tmp/a.srt".into(),
      },
      &ctx,
    ) else {
      panic!("expected commands");
    };
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0], r#"sub-add "/tmp/a.srt""#);
    assert!(commands[1].starts_with("print-text \"${?track-list/0/type:INFO_TRACK_0: "));
  }

  #[test]
  fn test_startup_arguments() {
    let backend = MpvBackend::new(1);
    let source = MediaSource::parse("br://1").starting_at(5.5);
    let args = backend.startup_arguments(&source, &LaunchOptions::default());
    assert!(args.contains(&"--input-file=/dev/stdin".to_string()));
    assert!(args.iter().any(|arg| arg.starts_with("--term-playing-msg=MPV_VERSION=")));
    assert!(args.contains(&format!("--term-status-msg={}", STATUS_TEMPLATE)));
    assert!(args.contains(&"--start=5.5".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("bd://1"));
  }

  #[test]
  fn test_track_template_shape() {
    assert_eq!(
      track_template(0),
      "${?track-list/0/type:INFO_TRACK_0: ${track-list/0/type} ${track-list/0/id} \
       '${track-list/0/lang:}' '${track-list/0/title:}' ${track-list/0/selected} \
       ${track-list/0/external} '${track-list/0/external-filename:}'}"
    );
  }
}
