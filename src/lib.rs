//! Drives MPlayer and mpv over their line-oriented slave protocols and keeps
//! a typed model of what is playing.
//!
//! - `media` - media state model
//! - `protocol` - line classification, backends, command encoding
//! - `player` - process spawning, IO tasks and the session runner
//! - `config` - persisted player configuration

pub mod config;
pub mod media;
pub mod player;
pub mod protocol;

pub use config::{ConfigError, PlayerConfig};
pub use media::{MediaSource, MediaState};
pub use player::{PlayerSession, SessionError};
pub use protocol::{Action, BackendKind, Notification, SessionOutcome};
