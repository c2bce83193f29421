/// Tap/hold boundary used by every composer mic control.
pub const DEFAULT_HOLD_THRESHOLD_MS: u64 = 500;
pub const MIN_HOLD_THRESHOLD_MS: u64 = 100;
pub const MAX_HOLD_THRESHOLD_MS: u64 = 2_000;

pub const DEFAULT_PLAYBACK_RATE: f32 = 1.0;
pub const DEFAULT_LANG: &str = "en-US";

pub(super) const MAX_LANG_BYTES: usize = 35;
