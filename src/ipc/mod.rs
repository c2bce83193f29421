//! JSON IPC mode for driving the coordinator from a frontend or a script.
//!
//! This module provides a newline-delimited JSON protocol over stdin/stdout
//! (or a `--script` file) so that external frontends and end-to-end tests can
//! press mic buttons, play tracks, and move videos between feed and
//! mini-player.
//!
//! Protocol:
//! - Each line is a JSON object
//! - Events (Rust → client): {"event": "...", ...}
//! - Playback, feed and mini-player events nest the component event under
//!   `"payload"`, itself tagged by `"kind"`
//! - Commands (client → Rust): {"cmd": "...", ...}

mod protocol;
mod session;

#[cfg(test)]
mod tests;

pub use protocol::{IpcCommand, IpcEvent, SessionPhase, SimTarget};
pub use session::{run_ipc_mode, run_session, IpcSession};
