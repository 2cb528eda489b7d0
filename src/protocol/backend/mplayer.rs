//! MPlayer adapter.
//!
//! MPlayer runs with `-slave -identify`. Identification arrives as
//! `ID_<NAME>=<value>` lines, query results as `ANS_<name>=<value>` and
//! progress as `A:`/`V:` status lines. Commands sent while paused carry the
//! `pausing_keep_force` prefix so they do not resume playback.

use regex::Captures;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Instant;

use super::{
  disc_device, disc_target, report_selection, screenshot_taken, Backend, BackStep, BackendKind,
  LaunchOptions, Query, TitleCountdown,
};
use crate::media::{MediaKind, MediaSource, SubtitleId, SubtitleOrigin, TrackKind};
use crate::protocol::action::{format_seconds, quote, Action, EncodeContext, Encoded, FilterChain, SeekMode};
use crate::protocol::classify::{field, seconds, text, Classifier, LineError};
use crate::protocol::dispatcher::{Phase, SessionCore};
use crate::protocol::notify::{ExitReason, Notification};
use crate::protocol::timing::{msf_to_seconds, parse_clock, parse_seconds};

const PAUSING: &str = "pausing_keep_force ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Line {
  Status,
  Paused,
  Answer,
  VideoTrack,
  AudioTrack,
  SubtitleTrack,
  SubtitleId,
  SubtitleFilename,
  DiscTitle,
  Chapter,
  CdTrack,
  ClipInfo,
  Exit,
  EndOfFile,
  VideoOutput,
  AudioOutput,
  NoVideo,
  CacheFill,
  CacheEmpty,
  Connecting,
  GeneratingIndex,
  Screenshot,
  MkvChapter,
  Aspect,
  FontCache,
  FontScan,
  StreamTitle,
  Forbidden,
  NotFound,
  OpenFailed,
  NoMedium,
  UnsupportedFormat,
  StartingPlayback,
  Identify,
}

static LINES: LazyLock<Classifier<Line>> = LazyLock::new(|| {
  Classifier::new(&[
    (Line::Status, r"^[AV]: *([0-9,:.-]+)"),
    (Line::Paused, r"^ID_PAUSED$"),
    (Line::Answer, r"^ANS_([A-Za-z0-9_]+)=(.*)$"),
    (Line::VideoTrack, r"^ID_VID_(\d+)_(LANG|NAME)=(.*)$"),
    (Line::AudioTrack, r"^ID_AID_(\d+)_(LANG|NAME)=(.*)$"),
    (Line::SubtitleTrack, r"^ID_(SID|VSID)_(\d+)_(LANG|NAME)=(.*)$"),
    (Line::SubtitleId, r"^ID_(SUBTITLE|FILE_SUB|VOBSUB)_ID=(\d+)$"),
    (Line::SubtitleFilename, r"^ID_FILE_SUB_FILENAME=(.*)$"),
    (Line::DiscTitle, r"^ID_(DVD|BLURAY)_TITLE_(\d+)_(LENGTH|CHAPTERS|ANGLES)=(.*)$"),
    (Line::Chapter, r"^ID_CHAPTER_(\d+)_(START|END|NAME)=(.*)$"),
    (Line::CdTrack, r"^ID_(VCD|CDDA)_TRACK_(\d+)_MSF=(.*)$"),
    (Line::ClipInfo, r"^ID_CLIP_INFO_(NAME|VALUE)(\d+)=(.*)$"),
    (Line::Exit, r"^ID_EXIT=(\w+)"),
    (Line::EndOfFile, r"^Exiting\.\.\. \(End of file\)"),
    (Line::VideoOutput, r"^VO: \[([^\]]*)\] (\d+)x(\d+) => (\d+)x(\d+)"),
    (Line::AudioOutput, r"^AO: \[([^\]]*)\]"),
    (Line::NoVideo, r"^Video: no video"),
    (Line::CacheFill, r"^Cache fill:\s*([0-9.,]+)%"),
    (Line::CacheEmpty, r"^Cache (?:empty|not filling)"),
    (Line::Connecting, r"^(?:Connecting to|Resolving) "),
    (Line::GeneratingIndex, r"^Generating Index:\s*(\d+)\s*%"),
    (Line::Screenshot, r"^\*\*\* screenshot '(.*)' \*\*\*"),
    (Line::MkvChapter, r"^\[mkv\] Chapter (\d+) from ([0-9:.]+) to ([0-9:.]+), (.*)$"),
    (Line::Aspect, r"^Movie-Aspect is ([0-9.,]+):1"),
    (Line::FontCache, r"^\[ass\] Updating font cache"),
    (Line::FontScan, r"^Scanning file "),
    (Line::StreamTitle, r"StreamTitle='(.*?)';"),
    (Line::Forbidden, r"Server returned 403"),
    (Line::NotFound, r"Server returned 404|^File not found: "),
    (Line::OpenFailed, r"^Failed to open |^Cannot open file |^No stream found to handle url"),
    (Line::NoMedium, r"No medium found"),
    (Line::UnsupportedFormat, r"^Failed to recognize file format"),
    (Line::StartingPlayback, r"^Starting playback\.\.\."),
    (Line::Identify, r"^ID_([A-Z0-9_]+)=(.*)$"),
  ])
  .expect("MPlayer line patterns are valid")
});

/// MPlayer slave-mode adapter.
pub struct MplayerBackend {
  title_countdown: bool,
  countdown: TitleCountdown,
  backstep: BackStep,
  /// Id from the last `ID_FILE_SUB_ID`, waiting for its filename.
  last_file_sub: Option<i32>,
  clip_names: HashMap<u32, String>,
}

impl MplayerBackend {
  pub fn new(title_countdown: bool) -> Self {
    Self {
      title_countdown,
      countdown: TitleCountdown::default(),
      backstep: BackStep::default(),
      last_file_sub: None,
      clip_names: HashMap::new(),
    }
  }

  fn seek_to(&self, target: f64, core: &mut SessionCore) {
    let action = Action::Seek {
      target,
      mode: SeekMode::Absolute,
      precise: true,
    };
    let encoded = self.encode_command(&action, &core.encode_context());
    if let Encoded::Commands(commands) = encoded {
      for command in commands {
        core.send(command);
      }
    }
  }

  fn on_status(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let time = seconds(caps, 1, "status time")?;
    let gui_time = core.on_status(time);
    core.set_buffering(false);
    if core.phase() != Phase::Steady {
      return Ok(());
    }

    if let Some(target) = self.backstep.on_status(gui_time, core.media.paused, 0.0) {
      self.seek_to(target, core);
    }

    if !self.title_countdown || !matches!(core.media.kind, MediaKind::Dvd | MediaKind::Bluray) {
      return Ok(());
    }
    let length = core
      .media
      .disc_title()
      .and_then(|title| core.media.titles.get(title))
      .and_then(|title| title.duration);
    if let Some(length) = length {
      if self.countdown.arm(length - gui_time, core.media.paused, core.now()) {
        core.synthesize_end_of_file();
      }
    }
    Ok(())
  }

  fn on_answer(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let name = text(caps, 1).to_ascii_uppercase();
    let value = text(caps, 2);
    if name == "ERROR" {
      log::debug!("Query failed: {}", value);
      core.failed_answer();
      return Ok(());
    }
    core.answer(&name);

    match name.as_str() {
      "LENGTH" => {
        core.correct_duration(seconds(caps, 2, "length")?);
      }
      "SWITCH_VIDEO" => {
        let id: i32 = field(caps, 2, "video id")?;
        if id >= 0 {
          let outcome = core.media.video_tracks.select(id);
          report_selection(core, TrackKind::Video, outcome);
        } else if core.media.video_tracks.deselect() {
          core.selection_changed(TrackKind::Video);
        }
      }
      "SWITCH_AUDIO" => {
        let id: i32 = field(caps, 2, "audio id")?;
        if id >= 0 {
          let outcome = core.media.audio_tracks.select(id);
          report_selection(core, TrackKind::Audio, outcome);
        } else if core.media.audio_tracks.deselect() {
          core.selection_changed(TrackKind::Audio);
        }
      }
      "SUB_DEMUX" => apply_subtitle_answer(core, SubtitleOrigin::Demuxer, field(caps, 2, "subtitle id")?),
      "SUB_FILE" => apply_subtitle_answer(core, SubtitleOrigin::File, field(caps, 2, "subtitle id")?),
      "SUB_VOB" => apply_subtitle_answer(core, SubtitleOrigin::Embedded, field(caps, 2, "subtitle id")?),
      _ => log::debug!("Ignoring answer {}={}", name, value),
    }
    Ok(())
  }

  fn on_identify(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let name = text(caps, 1);
    let value = text(caps, 2).trim();
    let media = &mut core.media;
    match name {
      "LENGTH" => {
        core.update_duration(seconds(caps, 2, "length")?);
      }
      "START_TIME" => {
        // "unknown" for streams without timestamps
        if let Some(offset) = parse_seconds(value) {
          media.set_start_offset(offset);
        }
      }
      "DEMUXER" => {
        core.set_demuxer(value);
      }
      "FILENAME" => media.filename = value.to_string(),
      "VIDEO_FORMAT" => media.video.format = value.to_string(),
      "VIDEO_CODEC" => media.video.codec = value.to_string(),
      "VIDEO_BITRATE" => media.video.bitrate = field(caps, 2, "video bitrate")?,
      "VIDEO_WIDTH" => media.video.width = field(caps, 2, "video width")?,
      "VIDEO_HEIGHT" => media.video.height = field(caps, 2, "video height")?,
      "VIDEO_FPS" => media.video.fps = field(caps, 2, "video fps")?,
      "VIDEO_ASPECT" => media.video.aspect = field(caps, 2, "video aspect")?,
      "AUDIO_FORMAT" => media.audio.format = value.to_string(),
      "AUDIO_CODEC" => media.audio.codec = value.to_string(),
      "AUDIO_BITRATE" => media.audio.bitrate = field(caps, 2, "audio bitrate")?,
      "AUDIO_RATE" => media.audio.rate = field(caps, 2, "audio rate")?,
      "AUDIO_NCH" => media.audio.channels = field(caps, 2, "audio channels")?,
      "VIDEO_ID" => {
        if media.video_tracks.ensure(field(caps, 2, "video id")?) {
          core.tracks_changed(TrackKind::Video);
        }
      }
      "AUDIO_ID" => {
        if media.audio_tracks.ensure(field(caps, 2, "audio id")?) {
          core.tracks_changed(TrackKind::Audio);
        }
      }
      "DVD_TITLES" | "BLURAY_TITLES" => {
        media.titles.ensure_count(field(caps, 2, "title count")?);
      }
      "DVD_CURRENT_TITLE" | "BLURAY_CURRENT_TITLE" => {
        let title: u32 = field(caps, 2, "current title")?;
        if media.titles.select(title) {
          core.notify(Notification::TitleChanged(title));
        }
      }
      _ => log::trace!("Ignoring ID_{}={}", name, value),
    }
    Ok(())
  }

  fn on_disc_title(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let title: u32 = field(caps, 2, "title")?;
    let titles = &mut core.media.titles;
    match text(caps, 3) {
      "LENGTH" => {
        titles.update_duration(title, seconds(caps, 4, "title length")?);
      }
      "CHAPTERS" => {
        titles.update_chapter_count(title, field(caps, 4, "chapter count")?);
      }
      _ => {
        titles.update_angle_count(title, field(caps, 4, "angle count")?);
      }
    }
    Ok(())
  }

  fn on_chapter(&mut self, caps: &Captures<'_>, core: &mut SessionCore) -> Result<(), LineError> {
    let id: u32 = field(caps, 1, "chapter")?;
    let value = text(caps, 3);
    let media = &mut core.media;
    let title = media.kind.is_disc().then(|| media.disc_title()).flatten();
    let changed = match text(caps, 2) {
      "NAME" => {
        if let Some(title) = title {
          media.titles.chapters_mut(title).update_name(id, value);
        }
        media.chapters.update_name(id, value)
      }
      field_name => {
        let ms: f64 = field(caps, 3, "chapter time")?;
        let time = ms / 1000.0;
        let is_start = field_name == "START";
        if let Some(title) = title {
          let chapters = media.titles.chapters_mut(title);
          if is_start {
            chapters.update_start(id, time);
          } else {
            chapters.update_end(id, time);
          }
        }
        if is_start {
          media.chapters.update_start(id, time)
        } else {
          media.chapters.update_end(id, time)
        }
      }
    };
    if changed {
      core.notify(Notification::ChaptersChanged);
    }
    Ok(())
  }
}

fn apply_subtitle_answer(core: &mut SessionCore, origin: SubtitleOrigin, id: i32) {
  let subtitles = &mut core.media.subtitles;
  if id >= 0 {
    let outcome = subtitles.select(SubtitleId::new(origin, id));
    report_selection(core, TrackKind::Subtitle, outcome);
  } else if subtitles.selected().is_some_and(|selected| selected.origin == origin) {
    subtitles.deselect();
    core.selection_changed(TrackKind::Subtitle);
  }
}

impl Backend for MplayerBackend {
  fn kind(&self) -> BackendKind {
    BackendKind::Mplayer
  }

  fn recognize_line(&mut self, line: &str, core: &mut SessionCore) -> Result<bool, LineError> {
    let Some((kind, caps)) = LINES.classify(line) else {
      return Ok(false);
    };

    match kind {
      Line::Status => self.on_status(&caps, core)?,
      Line::Paused => {
        core.media.set_paused(true);
        self.countdown.disarm();
      }
      Line::Answer => self.on_answer(&caps, core)?,
      Line::VideoTrack | Line::AudioTrack => {
        let id: i32 = field(&caps, 1, "track id")?;
        let (table, kind) = if kind == Line::VideoTrack {
          (&mut core.media.video_tracks, TrackKind::Video)
        } else {
          (&mut core.media.audio_tracks, TrackKind::Audio)
        };
        let changed = match text(&caps, 2) {
          "LANG" => table.update_lang(id, text(&caps, 3)),
          _ => table.update_name(id, text(&caps, 3)),
        };
        if changed {
          core.tracks_changed(kind);
        }
      }
      Line::SubtitleTrack => {
        let origin = match text(&caps, 1) {
          "SID" => SubtitleOrigin::Demuxer,
          _ => SubtitleOrigin::Embedded,
        };
        let key = SubtitleId::new(origin, field(&caps, 2, "subtitle id")?);
        let subtitles = &mut core.media.subtitles;
        let changed = match text(&caps, 3) {
          "LANG" => subtitles.update_lang(key, text(&caps, 4)),
          _ => subtitles.update_name(key, text(&caps, 4)),
        };
        if changed {
          core.tracks_changed(TrackKind::Subtitle);
        }
      }
      Line::SubtitleId => {
        let id: i32 = field(&caps, 2, "subtitle id")?;
        let origin = match text(&caps, 1) {
          "SUBTITLE" => SubtitleOrigin::Demuxer,
          "FILE_SUB" => {
            self.last_file_sub = Some(id);
            SubtitleOrigin::File
          }
          _ => SubtitleOrigin::Embedded,
        };
        if core.media.subtitles.ensure(SubtitleId::new(origin, id)) {
          core.tracks_changed(TrackKind::Subtitle);
        }
      }
      Line::SubtitleFilename => {
        let Some(id) = self.last_file_sub else {
          log::warn!("Subtitle filename without a subtitle id: {}", line);
          return Ok(true);
        };
        let path = PathBuf::from(text(&caps, 1));
        let key = SubtitleId::new(SubtitleOrigin::File, id);
        let name = path
          .file_name()
          .map(|name| name.to_string_lossy().into_owned())
          .unwrap_or_default();
        let subtitles = &mut core.media.subtitles;
        let mut changed = subtitles.set_filename(key, path);
        if subtitles.get(key).is_some_and(|info| info.name.is_empty()) {
          changed |= subtitles.update_name(key, &name);
        }
        if changed {
          core.tracks_changed(TrackKind::Subtitle);
        }
      }
      Line::DiscTitle => self.on_disc_title(&caps, core)?,
      Line::Chapter => self.on_chapter(&caps, core)?,
      Line::CdTrack => {
        let track: u32 = field(&caps, 2, "track")?;
        let length = msf_to_seconds(text(&caps, 3)).ok_or_else(|| LineError::InvalidField {
          field: "track length",
          line: line.to_string(),
        })?;
        core.media.titles.update_duration(track, length);
      }
      Line::ClipInfo => {
        let index: u32 = field(&caps, 2, "clip info index")?;
        let value = text(&caps, 3);
        if text(&caps, 1) == "NAME" {
          self.clip_names.insert(index, value.to_ascii_lowercase());
        } else if let Some(name) = self.clip_names.get(&index) {
          core.media.set_metadata(name, value);
        }
      }
      Line::Exit => match text(&caps, 1) {
        "EOF" => core.end_of_file(),
        "ERROR" => core.report_error(ExitReason::OpenFailed),
        reason => log::debug!("MPlayer exiting: {}", reason),
      },
      Line::EndOfFile => core.end_of_file(),
      Line::VideoOutput => {
        core.media.video.output = text(&caps, 1).to_string();
      }
      Line::AudioOutput => {
        core.media.audio.output = text(&caps, 1).to_string();
      }
      Line::NoVideo => {
        core.media.no_video = true;
      }
      Line::CacheFill => {
        log::debug!("Cache fill {}%", text(&caps, 1));
        core.set_buffering(true);
      }
      Line::CacheEmpty => {
        core.set_buffering(true);
        core.message(line);
      }
      Line::Connecting => core.message(line),
      Line::GeneratingIndex => core.message(format!("Generating index: {}%", text(&caps, 1))),
      Line::Screenshot => screenshot_taken(text(&caps, 1), core),
      Line::MkvChapter => {
        let invalid = || LineError::InvalidField {
          field: "chapter time",
          line: line.to_string(),
        };
        let id: u32 = field(&caps, 1, "chapter")?;
        let start = parse_clock(text(&caps, 2)).ok_or_else(invalid)?;
        let end = parse_clock(text(&caps, 3)).ok_or_else(invalid)?;
        let chapters = &mut core.media.chapters;
        let mut changed = chapters.update_start(id, start);
        changed |= chapters.update_end(id, end);
        changed |= chapters.update_name(id, text(&caps, 4));
        if changed {
          core.notify(Notification::ChaptersChanged);
        }
      }
      Line::Aspect => {
        core.media.video.aspect = seconds(&caps, 1, "aspect")?;
      }
      Line::FontCache => core.message("Updating font cache"),
      Line::FontScan => log::debug!("{}", line),
      Line::StreamTitle => {
        let title = text(&caps, 1);
        if core.media.set_metadata("stream_title", title) && !title.is_empty() {
          core.message(title);
        }
      }
      Line::Forbidden => core.report_error(ExitReason::Forbidden),
      Line::NotFound => core.report_error(ExitReason::NotFound),
      Line::OpenFailed => core.report_error(ExitReason::OpenFailed),
      Line::NoMedium => core.report_error(ExitReason::NoMedium),
      Line::UnsupportedFormat => core.report_error(ExitReason::UnsupportedFormat),
      Line::StartingPlayback => log::info!("MPlayer starting playback"),
      Line::Identify => self.on_identify(&caps, core)?,
    }
    Ok(true)
  }

  fn startup_arguments(&self, source: &MediaSource, options: &LaunchOptions) -> Vec<String> {
    let mut args: Vec<String> = [
      "-noquiet",
      "-slave",
      "-identify",
      "-nofs",
      "-nomouseinput",
      "-input",
      "nodefault-bindings:conf=/dev/null",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect();

    if options.use_ass {
      args.push("-ass".into());
    }
    if let Some(start) = source.start_at {
      args.push("-ss".into());
      args.push(format_seconds(start));
    }
    if let Some(device) = disc_device(source, options) {
      let flag = match source.kind {
        MediaKind::Bluray => "-bluray-device",
        MediaKind::Vcd | MediaKind::AudioCd => "-cdrom-device",
        _ => "-dvd-device",
      };
      args.push(flag.into());
      args.push(device.to_string());
    }
    args.extend(options.extra_args.iter().cloned());
    args.push(disc_target(source, "br"));
    args
  }

  fn encode_command(&self, action: &Action, ctx: &EncodeContext<'_>) -> Encoded {
    let p = if ctx.media.paused { PAUSING } else { "" };
    match action {
      Action::Seek {
        target,
        mode,
        precise,
      } => {
        let (value, kind) = match mode {
          SeekMode::Relative => (*target, 0),
          SeekMode::Percent => (*target, 1),
          SeekMode::Absolute => (ctx.backend_time(*target), 2),
        };
        Encoded::one(format!(
          "{}seek {} {} {}",
          p,
          format_seconds(value),
          kind,
          u8::from(*precise)
        ))
      }
      Action::TogglePause => Encoded::one("pause"),
      Action::FrameStep => Encoded::one("frame_step"),
      Action::FrameBackStep => Encoded::Emulated,
      Action::SetVolume { volume } => Encoded::one(format!("{}volume {} 1", p, volume)),
      Action::Mute { muted } => Encoded::one(format!("{}mute {}", p, u8::from(*muted))),
      Action::SetVideoTrack { id } => Encoded::one(format!("{}set_property switch_video {}", p, id)),
      Action::SetAudioTrack { id } => Encoded::one(format!("{}switch_audio {}", p, id)),
      Action::SetSubtitle { id: None } => Encoded::one(format!("{}sub_source -1", p)),
      Action::SetSubtitle { id: Some(key) } => {
        let command = match key.origin {
          SubtitleOrigin::Demuxer => "sub_demux",
          SubtitleOrigin::File => "sub_file",
          SubtitleOrigin::Embedded => "sub_vob",
        };
        Encoded::one(format!("{}{} {}", p, command, key.id))
      }
      Action::SetSubtitleDelay { seconds } => {
        Encoded::one(format!("{}sub_delay {} 1", p, format_seconds(*seconds)))
      }
      Action::SetAudioDelay { seconds } => {
        Encoded::one(format!("{}audio_delay {} 1", p, format_seconds(*seconds)))
      }
      Action::SetSpeed { speed } => Encoded::one(format!("{}speed_set {}", p, format_seconds(*speed))),
      Action::AddFilter {
        chain,
        name,
        options,
      } => {
        let command = match chain {
          FilterChain::Video => "vf_add",
          FilterChain::Audio => "af_add",
        };
        let filter = match options {
          Some(options) => format!("{}={}", name, options),
          None => name.clone(),
        };
        Encoded::one(format!("{}{} {}", p, command, filter))
      }
      Action::RemoveFilter { chain, name } => {
        let command = match chain {
          FilterChain::Video => "vf_del",
          FilterChain::Audio => "af_del",
        };
        Encoded::one(format!("{}{} {}", p, command, name))
      }
      Action::Screenshot => Encoded::one(format!("{}screenshot 0", p)),
      Action::SetTitle { id } => {
        if ctx.media.kind == MediaKind::DvdNav {
          Encoded::one(format!("{}switch_title {}", p, id))
        } else {
          Encoded::Unsupported
        }
      }
      Action::SetChapter { id } => Encoded::one(format!("{}seek_chapter {} 1", p, id)),
      Action::SetAngle { id } => Encoded::one(format!("{}switch_angle {}", p, id)),
      Action::ShowText { text, duration_ms } => Encoded::one(self.show_text(text, *duration_ms)),
      Action::LoadSubtitle { path } => {
        Encoded::one(format!("{}sub_load {}", p, quote(&path.to_string_lossy())))
      }
      Action::Quit => Encoded::one("quit"),
    }
  }

  fn begin_emulation(&mut self, action: &Action, core: &mut SessionCore) {
    if *action != Action::FrameBackStep {
      log::warn!("MPlayer cannot emulate {}", action.name());
      return;
    }
    if !core.media.paused {
      core.send("pause");
      core.media.set_paused(true);
    }
    let (origin, fps) = (core.media.position, core.media.video.fps);
    if let Some(target) = self.backstep.start(origin, fps, 0.0) {
      self.seek_to(target, core);
    }
  }

  fn on_steady_state_entered(&mut self, core: &mut SessionCore) {
    const QUERY: &str = "pausing_keep_force get_property";
    let media = &core.media;
    let ask_video = !media.no_video && !media.video_tracks.is_empty();
    let ask_audio = !media.audio_tracks.is_empty();
    let subtitles: Vec<SubtitleOrigin> = media.subtitles.iter().map(|(key, _)| key.origin).collect();

    if ask_video {
      core.query("switch_video", format!("{} switch_video", QUERY));
    }
    if ask_audio {
      core.query("switch_audio", format!("{} switch_audio", QUERY));
    }
    if subtitles.contains(&SubtitleOrigin::Demuxer) {
      core.query("sub_demux", format!("{} sub_demux", QUERY));
    }
    if subtitles.contains(&SubtitleOrigin::File) {
      core.query("sub_file", format!("{} sub_file", QUERY));
    }
  }

  fn duration_query(&self) -> Option<Query> {
    Some(Query {
      answer: "length",
      command: "pausing_keep_force get_property length",
    })
  }

  fn detect_end_of_file(&self, line: &str) -> bool {
    line.starts_with("Exiting... (End of file)") || line == "ID_EXIT=EOF"
  }

  fn show_text(&self, text: &str, duration_ms: u32) -> String {
    format!("osd_show_text {} {} 1", quote(text), duration_ms)
  }

  fn next_deadline(&self) -> Option<Instant> {
    self.countdown.deadline()
  }

  fn on_timer(&mut self, now: Instant, core: &mut SessionCore) {
    if self.countdown.on_timer(now) {
      core.synthesize_end_of_file();
    }
  }
}
