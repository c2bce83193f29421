//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    DEFAULT_HOLD_THRESHOLD_MS, DEFAULT_LANG, DEFAULT_PLAYBACK_RATE, MAX_HOLD_THRESHOLD_MS,
    MIN_HOLD_THRESHOLD_MS,
};

use crate::playback::PlaybackRate;

/// CLI options for the voxfeed coordinator. Validated values keep the runtime config sane.
#[derive(Debug, Parser, Clone)]
#[command(about = "VoxFeed voice/media coordinator", author, version)]
pub struct AppConfig {
    /// Press duration that turns a tap into a hold (milliseconds)
    #[arg(long = "hold-threshold-ms", default_value_t = DEFAULT_HOLD_THRESHOLD_MS)]
    pub hold_threshold_ms: u64,

    /// Whether exclusive playback is scoped per view or shared by the whole app
    #[arg(long = "exclusivity", value_enum, default_value_t = ExclusivityScope::PerView)]
    pub exclusivity: ExclusivityScope,

    /// Playback rate applied until the user picks another one
    #[arg(long = "default-rate", default_value_t = DEFAULT_PLAYBACK_RATE)]
    pub default_rate: f32,

    /// Language passed to the speech recognizer
    #[arg(long, default_value = DEFAULT_LANG)]
    pub lang: String,

    /// Read JSON commands from this file instead of stdin
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Preferred audio input device name (native microphone only)
    #[arg(long)]
    pub input_device: Option<String>,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VOXFEED_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VOXFEED_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Allow logging transcript snippets (debug log only)
    #[arg(
        long = "log-content",
        env = "VOXFEED_LOG_CONTENT",
        default_value_t = false
    )]
    pub log_content: bool,

    /// Enable verbose timing logs
    #[arg(long)]
    pub log_timings: bool,
}

/// Scope of the "one audible source" guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExclusivityScope {
    /// Each view owns its own exclusive channel.
    PerView,
    /// A single channel is shared by every view.
    Global,
}

impl ExclusivityScope {
    pub fn label(self) -> &'static str {
        match self {
            ExclusivityScope::PerView => "per-view",
            ExclusivityScope::Global => "global",
        }
    }
}

/// Runtime settings shared by the arbiter, channels, and handoff.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub hold_threshold: Duration,
    pub exclusivity: ExclusivityScope,
    pub default_rate: PlaybackRate,
    pub lang: String,
    pub log_timings: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            hold_threshold: Duration::from_millis(DEFAULT_HOLD_THRESHOLD_MS),
            exclusivity: ExclusivityScope::PerView,
            default_rate: PlaybackRate::Normal,
            lang: DEFAULT_LANG.to_string(),
            log_timings: false,
        }
    }
}
