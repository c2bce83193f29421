//! Coordinates the voice and media surfaces of a social feed app: the
//! tap/hold mic control of every composer, exclusive audio playback, and the
//! handoff of feed videos to a floating mini-player.

pub mod app;
pub mod capabilities;
pub mod clock;
pub mod config;
pub mod error;
pub mod gesture;
pub mod handoff;
pub mod host;
pub mod ipc;
mod lock;
pub mod mic;
pub mod pending;
pub mod playback;
mod telemetry;

pub(crate) use lock::lock_or_recover;
pub use app::logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use app::{Coordinator, CoordinatorEvent};
pub use telemetry::init_tracing;
