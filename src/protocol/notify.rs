//! Notifications produced for the shell and how a session ends.

use serde::Serialize;
use std::path::PathBuf;

use crate::media::TrackKind;

/// Change notification delivered to the shell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Notification {
  TracksChanged(TrackKind),
  SelectionChanged(TrackKind),
  TitleChanged(u32),
  ChaptersChanged,
  DurationChanged(f64),
  PositionChanged(f64),
  PlaybackStarted,
  BufferingStarted,
  BufferingEnded,
  ScreenshotTaken(PathBuf),
  Message(String),
  /// End of media reached, real or synthesized.
  EndOfFile,
  /// Terminal notification, always the last one of a session.
  SessionEnded(SessionOutcome),
}

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum ExitReason {
  OpenFailed,
  UnsupportedFormat,
  /// HTTP 403.
  Forbidden,
  /// HTTP 404 or missing file.
  NotFound,
  /// Disc drive without a disc.
  NoMedium,
  /// Process exited with a non-zero code and no better explanation.
  PlayerError(i32),
  /// Process died from a signal or an abnormal exit.
  Crashed(Option<i32>),
  /// Process had to be killed.
  Killed,
  /// No output, broken pipes and similar.
  Transport(String),
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "camelCase")]
pub enum SessionOutcome {
  /// End of media. The playlist should advance.
  Finished,
  /// Stopped on request.
  Stopped,
  Failed(ExitReason),
}

impl SessionOutcome {
  pub fn is_success(&self) -> bool {
    !matches!(self, SessionOutcome::Failed(_))
  }
}

/// How the process terminated, as observed by whoever waited on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
  Normal,
  Crashed,
  Killed,
}

/// Exit status fed back by the process owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
  pub code: Option<i32>,
  pub kind: ExitKind,
}

impl ProcessExit {
  pub fn normal(code: i32) -> Self {
    Self {
      code: Some(code),
      kind: ExitKind::Normal,
    }
  }

  pub fn crashed(code: Option<i32>) -> Self {
    Self {
      code,
      kind: ExitKind::Crashed,
    }
  }

  pub fn killed() -> Self {
    Self {
      code: None,
      kind: ExitKind::Killed,
    }
  }
}

/// What the dispatcher learned from the line stream about the ending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndState {
  /// End of file was reported or synthesized.
  pub end_of_file: bool,
  /// Quit was sent on request of the shell.
  pub quit_requested: bool,
  /// Domain error reported by the backend.
  pub error: Option<ExitReason>,
}

impl EndState {
  /// Combine the process exit with what the lines said.
  pub fn resolve(&self, exit: ProcessExit) -> SessionOutcome {
    if self.end_of_file {
      return SessionOutcome::Finished;
    }
    if self.quit_requested {
      return SessionOutcome::Stopped;
    }
    if let Some(error) = &self.error {
      return SessionOutcome::Failed(error.clone());
    }
    match exit.kind {
      ExitKind::Killed => SessionOutcome::Failed(ExitReason::Killed),
      ExitKind::Crashed => SessionOutcome::Failed(ExitReason::Crashed(exit.code)),
      ExitKind::Normal => match exit.code {
        Some(0) | None => SessionOutcome::Finished,
        Some(code) => SessionOutcome::Failed(ExitReason::PlayerError(code)),
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_resolve_prefers_end_of_file() {
    let end = EndState {
      end_of_file: true,
      quit_requested: true,
      error: None,
    };
    assert_eq!(end.resolve(ProcessExit::killed()), SessionOutcome::Finished);
  }

  #[test]
  fn test_resolve_user_stop_and_errors() {
    let stopped = EndState {
      quit_requested: true,
      ..Default::default()
    };
    assert_eq!(stopped.resolve(ProcessExit::normal(0)), SessionOutcome::Stopped);

    let forbidden = EndState {
      error: Some(ExitReason::Forbidden),
      ..Default::default()
    };
    assert_eq!(
      forbidden.resolve(ProcessExit::normal(1)),
      SessionOutcome::Failed(ExitReason::Forbidden)
    );
  }

  #[test]
  fn test_resolve_from_exit_status() {
    let end = EndState::default();
    assert_eq!(end.resolve(ProcessExit::normal(0)), SessionOutcome::Finished);
    assert_eq!(
      end.resolve(ProcessExit::normal(2)),
      SessionOutcome::Failed(ExitReason::PlayerError(2))
    );
    assert_eq!(
      end.resolve(ProcessExit::crashed(Some(139))),
      SessionOutcome::Failed(ExitReason::Crashed(Some(139)))
    );
    assert!(!end.resolve(ProcessExit::killed()).is_success());
  }

  #[test]
  fn test_notification_serialization() {
    let json = serde_json::to_string(&Notification::TracksChanged(TrackKind::Audio)).unwrap();
    assert_eq!(json, r#"{"event":"tracksChanged","data":"audio"}"#);
    let json = serde_json::to_string(&Notification::PlaybackStarted).unwrap();
    assert_eq!(json, r#"{"event":"playbackStarted"}"#);
  }
}
