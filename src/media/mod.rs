//! Media state model.
//!
//! - `state.rs` - per-session media record and what was asked to play
//! - `tracks.rs` - video, audio and subtitle track tables
//! - `titles.rs` - disc titles and chapters

mod state;
mod titles;
mod tracks;

pub use state::{
  update, update_str, AudioInfo, DiscIdentity, MediaKind, MediaSource, MediaState, VideoInfo,
};
pub use titles::{Chapter, ChapterTable, TitleInfo, TitleTable};
pub use tracks::{SelectOutcome, SubtitleId, SubtitleOrigin, TrackInfo, TrackKind, TrackTable};
