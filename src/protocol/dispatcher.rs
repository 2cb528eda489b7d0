//! Line dispatch and notification ordering.
//!
//! One `Dispatcher` exists per playback session. It owns the media state and
//! feeds every line, in order, to the active backend. Backends mutate the
//! state through [`SessionCore`], which decides when notifications become
//! visible to the shell.

use std::mem;
use std::path::PathBuf;
use std::time::Instant;

use super::action::{Action, EncodeContext, Encoded};
use super::answers::{AnswerCoordinator, AnswerStatus, DEFAULT_ANSWER_GUARD};
use super::backend::{Backend, BackendKind, Query};
use super::notify::{EndState, ExitReason, Notification, ProcessExit, SessionOutcome};
use super::timing::{to_gui_time, DurationProbe, RolloverTracker};
use crate::media::{update_str, MediaSource, MediaState, TrackKind};

/// Dispatcher sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Collecting identification lines, notifications held back.
  Startup,
  /// Playback confirmed, status lines drive notifications.
  Steady,
  /// Quit was sent; only end of file is still detected.
  Quitting,
}

/// What happened to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
  Handled,
  Unhandled,
  /// Matched a pattern but a field did not parse; dropped.
  Invalid,
  /// Arrived after quit and was not an end-of-file marker.
  Ignored,
}

/// Knobs that do not belong to a particular backend.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
  pub answer_guard: u32,
  pub notify_unsupported: bool,
  /// Directory screenshots are written to, for resolving relative names.
  pub screenshot_dir: Option<PathBuf>,
}

impl Default for DispatchOptions {
  fn default() -> Self {
    Self {
      answer_guard: DEFAULT_ANSWER_GUARD,
      notify_unsupported: true,
      screenshot_dir: None,
    }
  }
}

/// Everything a backend handler may touch.
pub struct SessionCore {
  pub media: MediaState,
  pub answers: AnswerCoordinator,
  phase: Phase,
  /// Held-back notifications, in order.
  outbox: Vec<Notification>,
  /// Notifications ready for the shell.
  ready: Vec<Notification>,
  commands: Vec<String>,
  end: EndState,
  probe: DurationProbe,
  duration_query: Option<Query>,
  rollover: Option<RolloverTracker>,
  screenshot_dir: Option<PathBuf>,
  buffering: bool,
  entered_steady: bool,
  answered: bool,
  now: Instant,
}

impl SessionCore {
  fn new(source: &MediaSource, duration_query: Option<Query>, options: &DispatchOptions) -> Self {
    let probe = if duration_query.is_some() {
      DurationProbe::new()
    } else {
      DurationProbe::disabled()
    };
    Self {
      media: MediaState::new(source),
      answers: AnswerCoordinator::new(options.answer_guard),
      phase: Phase::Startup,
      outbox: Vec::new(),
      ready: Vec::new(),
      commands: Vec::new(),
      end: EndState::default(),
      probe,
      duration_query,
      rollover: None,
      screenshot_dir: options.screenshot_dir.clone(),
      buffering: false,
      entered_steady: false,
      answered: false,
      now: Instant::now(),
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  /// Time the current line or timer is being processed at.
  pub fn now(&self) -> Instant {
    self.now
  }

  pub fn screenshot_dir(&self) -> Option<&PathBuf> {
    self.screenshot_dir.as_ref()
  }

  /// Queue a notification, holding it back while the session is not ready.
  pub fn notify(&mut self, notification: Notification) {
    let hold = self.phase == Phase::Startup
      || self.answers.is_waiting()
      || !self.outbox.is_empty()
      || matches!(notification, Notification::TracksChanged(_));
    if !hold {
      self.ready.push(notification);
      return;
    }
    if let Notification::DurationChanged(_) = notification {
      if let Some(slot) = self
        .outbox
        .iter_mut()
        .find(|queued| matches!(queued, Notification::DurationChanged(_)))
      {
        *slot = notification;
        return;
      }
    }
    if !self.outbox.contains(&notification) {
      self.outbox.push(notification);
    }
  }

  /// Move held-back notifications to the shell.
  fn flush(&mut self) {
    self.ready.append(&mut self.outbox);
  }

  pub fn tracks_changed(&mut self, kind: TrackKind) {
    self.notify(Notification::TracksChanged(kind));
  }

  pub fn selection_changed(&mut self, kind: TrackKind) {
    self.notify(Notification::SelectionChanged(kind));
  }

  pub fn message(&mut self, text: impl Into<String>) {
    self.notify(Notification::Message(text.into()));
  }

  /// Queue a command line for the process.
  pub fn send(&mut self, command: impl Into<String>) {
    self.commands.push(command.into());
  }

  /// Send a query and expect an answer named `answer`.
  pub fn query(&mut self, answer: &str, command: impl Into<String>) {
    self.answers.ask(answer);
    self.send(command);
  }

  /// Account for an answer line.
  pub fn answer(&mut self, name: &str) -> AnswerStatus {
    self.answered = true;
    self.answers.on_answer(name)
  }

  /// Account for an answer reporting a failed query.
  pub fn failed_answer(&mut self) -> AnswerStatus {
    self.answered = true;
    self.answers.on_failed_answer()
  }

  /// Raise the duration and notify if it grew.
  pub fn update_duration(&mut self, duration: f64) -> bool {
    if !self.media.set_duration(duration) {
      return false;
    }
    self.notify(Notification::DurationChanged(self.media.duration));
    true
  }

  /// Replace the duration even if it shrinks.
  pub fn correct_duration(&mut self, duration: f64) -> bool {
    if !self.media.correct_duration(duration) {
      return false;
    }
    log::debug!("Duration corrected to {}", duration);
    self.notify(Notification::DurationChanged(self.media.duration));
    true
  }

  /// Record the demuxer. MPEG-TS turns on rollover correction with a fresh
  /// wrap count, anything else turns it off.
  pub fn set_demuxer(&mut self, demuxer: &str) -> bool {
    if !update_str(&mut self.media.demuxer, demuxer) {
      return false;
    }
    if demuxer.contains("mpegts") {
      match &mut self.rollover {
        Some(tracker) => tracker.reset(),
        None => {
          log::debug!("Enabling MPEG-TS timestamp rollover correction");
          self.rollover = Some(RolloverTracker::mpegts());
        }
      }
    } else if self.rollover.take().is_some() {
      log::debug!("Disabling timestamp rollover correction for {}", demuxer);
    }
    true
  }

  pub fn set_buffering(&mut self, buffering: bool) {
    if self.buffering == buffering {
      return;
    }
    self.buffering = buffering;
    self.notify(if buffering {
      Notification::BufferingStarted
    } else {
      Notification::BufferingEnded
    });
  }

  /// Fold a status line timestamp into the state. Returns the gui time.
  pub fn on_status(&mut self, backend_time: f64) -> f64 {
    let unwrapped = match &mut self.rollover {
      Some(tracker) => tracker.correct(backend_time),
      None => backend_time,
    };
    let gui_time = to_gui_time(unwrapped, self.media.start_offset);
    let moved = self.media.set_position(gui_time);

    match self.phase {
      Phase::Startup => {
        if self.answers.is_waiting() {
          return gui_time;
        }
        log::info!("Playback started at {:.3}s", gui_time);
        self.phase = Phase::Steady;
        self.entered_steady = true;
        self.ready.push(Notification::PlaybackStarted);
        self.flush();
        self.ready.push(Notification::PositionChanged(gui_time));
      }
      Phase::Steady => {
        if !self.answers.is_waiting() {
          self.flush();
          if moved {
            self.ready.push(Notification::PositionChanged(gui_time));
          }
        }
        if let Some(query) = self.duration_query {
          if self.probe.due(gui_time) {
            self.query(query.answer, query.command);
          }
        }
      }
      Phase::Quitting => {}
    }
    gui_time
  }

  /// End of media reached.
  pub fn end_of_file(&mut self) {
    if self.end.end_of_file {
      return;
    }
    log::info!("End of file");
    self.end.end_of_file = true;
    self.flush();
    self.ready.push(Notification::EndOfFile);
  }

  /// Quit ahead of a title boundary and report end of file instead.
  pub fn synthesize_end_of_file(&mut self) {
    log::info!("Ending title early to avoid unreliable boundary state");
    self.send("quit");
    self.phase = Phase::Quitting;
    self.end_of_file();
  }

  /// Record a domain error reported by the backend. The first one wins.
  pub fn report_error(&mut self, reason: ExitReason) {
    if self.end.error.is_none() {
      log::warn!("Backend reported error: {:?}", reason);
      self.end.error = Some(reason);
    }
  }

  fn begin_quit(&mut self) {
    self.end.quit_requested = true;
    self.phase = Phase::Quitting;
  }

  pub(crate) fn encode_context(&self) -> EncodeContext<'_> {
    EncodeContext {
      media: &self.media,
      rollover: self.rollover.as_ref(),
    }
  }
}

/// Routes lines to the backend and commands to the process.
pub struct Dispatcher {
  backend: Box<dyn Backend>,
  core: SessionCore,
  notify_unsupported: bool,
}

impl Dispatcher {
  pub fn new(backend: Box<dyn Backend>, source: &MediaSource, options: &DispatchOptions) -> Self {
    let core = SessionCore::new(source, backend.duration_query(), options);
    Self {
      backend,
      core,
      notify_unsupported: options.notify_unsupported,
    }
  }

  pub fn backend_kind(&self) -> BackendKind {
    self.backend.kind()
  }

  pub fn media(&self) -> &MediaState {
    &self.core.media
  }

  pub fn phase(&self) -> Phase {
    self.core.phase
  }

  pub fn pending_answers(&self) -> u32 {
    self.core.answers.pending()
  }

  /// Process one line from the backend.
  pub fn process_line(&mut self, line: &str) -> Dispatch {
    self.process_line_at(line, Instant::now())
  }

  /// Process one line as if it arrived at `now`.
  pub fn process_line_at(&mut self, line: &str, now: Instant) -> Dispatch {
    let line = line.trim();
    if line.is_empty() {
      return Dispatch::Unhandled;
    }
    self.core.now = now;

    if self.core.phase == Phase::Quitting {
      if self.backend.detect_end_of_file(line) {
        self.core.end_of_file();
        return Dispatch::Handled;
      }
      return Dispatch::Ignored;
    }

    self.core.answered = false;
    let dispatch = match self.backend.recognize_line(line, &mut self.core) {
      Ok(true) => Dispatch::Handled,
      Ok(false) => {
        log::trace!("Unrecognized line: {}", line);
        Dispatch::Unhandled
      }
      Err(e) => {
        log::warn!("Dropping line: {}", e);
        Dispatch::Invalid
      }
    };

    if !self.core.answered && self.core.answers.on_other_line() {
      log::warn!("Resuming notifications without the missing answers");
    }

    if mem::take(&mut self.core.entered_steady) {
      self.backend.on_steady_state_entered(&mut self.core);
    }
    dispatch
  }

  /// Encode and queue an action.
  pub fn command(&mut self, action: Action) {
    if self.core.phase == Phase::Quitting {
      log::debug!("Ignoring {} while quitting", action.name());
      return;
    }

    let encoded = self
      .backend
      .encode_command(&action, &self.core.encode_context());
    match encoded {
      Encoded::Commands(commands) => {
        log::debug!("{} -> {:?}", action.name(), commands);
        for command in commands {
          self.core.send(command);
        }
        match action {
          Action::Quit => self.core.begin_quit(),
          Action::TogglePause if self.core.media.paused => {
            self.core.media.set_paused(false);
          }
          _ => {}
        }
      }
      Encoded::Emulated => {
        log::debug!("Emulating {}", action.name());
        self.backend.begin_emulation(&action, &mut self.core);
      }
      Encoded::Unsupported => {
        let text = format!("{} is not supported by {}", action.name(), self.backend.kind());
        log::info!("{}", text);
        if self.notify_unsupported {
          let notice = self.backend.show_text(&text, 3000);
          self.core.send(notice);
          self.core.message(text);
        }
      }
    }
  }

  /// Earliest time [`Dispatcher::on_timer`] wants to run.
  pub fn next_deadline(&self) -> Option<Instant> {
    if self.core.phase == Phase::Quitting {
      return None;
    }
    self.backend.next_deadline()
  }

  pub fn on_timer(&mut self, now: Instant) {
    if self.core.phase == Phase::Quitting {
      return;
    }
    self.core.now = now;
    self.backend.on_timer(now, &mut self.core);
  }

  /// Record a transport failure seen by the session owner.
  pub fn transport_failed(&mut self, detail: impl Into<String>) {
    self.core.report_error(ExitReason::Transport(detail.into()));
  }

  /// Close the session with the observed process exit.
  pub fn finish(&mut self, exit: ProcessExit) -> SessionOutcome {
    let outcome = self.core.end.resolve(exit);
    log::info!("Session ended: {:?} (exit {:?})", outcome, exit);
    self.core.flush();
    self.core.ready.push(Notification::SessionEnded(outcome.clone()));
    outcome
  }

  /// Drain queued command lines.
  pub fn take_commands(&mut self) -> Vec<String> {
    mem::take(&mut self.core.commands)
  }

  /// Drain notifications ready for the shell.
  pub fn take_notifications(&mut self) -> Vec<Notification> {
    mem::take(&mut self.core.ready)
  }

  /// Arguments the backend needs to start in protocol mode.
  pub fn startup_arguments(
    &self,
    source: &MediaSource,
    options: &super::backend::LaunchOptions,
  ) -> Vec<String> {
    self.backend.startup_arguments(source, options)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::backend::MplayerBackend;

  fn dispatcher(options: &DispatchOptions) -> Dispatcher {
    Dispatcher::new(
      Box::new(MplayerBackend::new(false)),
      &MediaSource::parse("movie.mkv"),
      options,
    )
  }

  #[test]
  fn test_startup_outbox_keeps_latest_duration_only() {
    let mut d = dispatcher(&DispatchOptions::default());
    d.process_line("ID_LENGTH=10.00");
    d.process_line("ID_LENGTH=20.00");
    assert_eq!(d.phase(), Phase::Startup);
    assert!(d.take_notifications().is_empty());

    d.process_line("A:   0.0 V:   0.0");
    assert_eq!(
      d.take_notifications(),
      vec![
        Notification::PlaybackStarted,
        Notification::DurationChanged(20.0),
        Notification::PositionChanged(0.0),
      ]
    );
  }

  #[test]
  fn test_unsupported_notice_can_be_muted() {
    let mut d = dispatcher(&DispatchOptions {
      notify_unsupported: false,
      ..Default::default()
    });
    d.command(Action::SetTitle { id: 3 });
    assert!(d.take_commands().is_empty());
    assert!(d.take_notifications().is_empty());
  }

  #[test]
  fn test_blank_lines_are_unhandled() {
    let mut d = dispatcher(&DispatchOptions::default());
    assert_eq!(d.process_line("   "), Dispatch::Unhandled);
    assert_eq!(d.media(), &MediaState::new(&MediaSource::parse("movie.mkv")));
  }

  #[test]
  fn test_commands_ignored_while_quitting() {
    let mut d = dispatcher(&DispatchOptions::default());
    d.command(Action::Quit);
    d.command(Action::TogglePause);
    assert_eq!(d.take_commands(), vec!["quit"]);
    assert_eq!(d.phase(), Phase::Quitting);
  }
}
