//! Line protocol between the session and the player process.
//!
//! - `classify.rs` - ordered regex classification of output lines
//! - `dispatcher.rs` - per-session line routing and notification ordering
//! - `answers.rs` - outstanding query bookkeeping
//! - `timing.rs` - time parsing, gui time and rollover correction
//! - `action.rs` - player actions and encoding helpers
//! - `notify.rs` - notifications and session outcomes
//! - `backend/` - MPlayer and mpv adapters

mod action;
mod answers;
mod backend;
mod classify;
mod dispatcher;
mod notify;
mod timing;

pub use action::{format_seconds, quote, Action, EncodeContext, Encoded, FilterChain, SeekMode};
pub use answers::{AnswerCoordinator, AnswerStatus, DEFAULT_ANSWER_GUARD};
pub use backend::{
  frame_duration, BackStep, Backend, BackendKind, LaunchOptions, MplayerBackend, MpvBackend, Query,
  TitleCountdown,
};
pub use classify::{Classifier, LineError};
pub use dispatcher::{Dispatch, DispatchOptions, Dispatcher, Phase, SessionCore};
pub use notify::{EndState, ExitKind, ExitReason, Notification, ProcessExit, SessionOutcome};
pub use timing::{
  msf_to_seconds, parse_clock, parse_seconds, to_backend_time, to_gui_time, DurationProbe,
  RolloverTracker, MPEGTS_ROLLOVER,
};
