//! Player process management.
//!
//! - `process.rs` - executable detection and spawning
//! - `reader.rs` - byte stream to line stream
//! - `ipc.rs` - stdin writer and output reader tasks
//! - `session.rs` - one playback session driving a dispatcher

mod ipc;
mod process;
pub mod reader;
mod session;

pub use ipc::{IpcError, PlayerIpc};
pub use process::{find_player, resolve_binary, spawn_player, PlayerOutput, ProcessError};
pub use session::{PlayerSession, SessionError};
