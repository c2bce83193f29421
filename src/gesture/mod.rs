//! Tap-vs-hold arbitration for a composer's microphone control.

mod arbiter;
mod dictation;
mod session;

pub use arbiter::InputGestureArbiter;
pub use dictation::sanitize_transcript;
pub use session::{ArbiterEvent, ComposerId, InputSession, RecordedArtifact};
