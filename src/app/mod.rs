//! Process-level plumbing: debug logging and the coordinator that owns every
//! composer, channel, and feed of one app instance.

pub mod logging;
pub mod state;

pub use logging::{
    crash_log_path, init_logging, log_debug, log_debug_content, log_file_path, log_panic,
};
pub use state::{Coordinator, CoordinatorEvent};
