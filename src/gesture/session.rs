use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Notice, StopReason};
use crate::playback::AudioTrack;

/// Identifies one composer surface (search bar, comment box, chat, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComposerId(String);

impl ComposerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComposerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ComposerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the composer's mic control is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSession {
    Idle,
    Dictating { partial_text: String },
    Recording { started_at: Instant, elapsed_ms: u64 },
}

impl InputSession {
    pub fn label(&self) -> &'static str {
        match self {
            InputSession::Idle => "idle",
            InputSession::Dictating { .. } => "dictating",
            InputSession::Recording { .. } => "recording",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, InputSession::Idle)
    }
}

/// A finished voice note, ready for the composer to keep or throw away.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedArtifact {
    pub track: AudioTrack,
    pub duration_ms: u64,
}

/// Transitions and results reported by the arbiter, drained by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterEvent {
    DictationStarted,
    DictationStopped { reason: StopReason },
    TranscriptPartial { text: String },
    /// A final segment was appended to the composer text.
    TranscriptCommitted { text: String },
    RecordingStarted,
    RecordingFinished(RecordedArtifact),
    RecordingDiscarded { reason: StopReason },
    Notice(Notice),
}
