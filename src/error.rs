//! Failure taxonomy shared by the arbiter, channels, and handoff.
//!
//! Nothing here is fatal: every failure degrades the affected component to
//! `Idle`/no active track so the user can retry straight away.

use crate::gesture::ComposerId;
use crate::handoff::{PostId, ViewId};
use crate::playback::TrackId;
use serde::Serialize;
use thiserror::Error;

/// Recognizer error kind that means "the user said nothing".
pub const NO_SPEECH_ERROR_KIND: &str = "no-speech";

/// Errors reported by host collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Microphone/speaker permission denied or hardware failure.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    /// Recognizer heard nothing; treated as an empty result.
    #[error("no speech detected")]
    NoSpeechDetected,
    /// Speech or TTS backend failed.
    #[error("provider failure: {0}")]
    ProviderFailure(String),
    /// Track failed to load or decode.
    #[error("playback failed: {0}")]
    PlaybackFailure(String),
}

impl MediaError {
    /// Classify a recognizer `errorKind` string.
    pub fn from_recognizer_kind(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case(NO_SPEECH_ERROR_KIND) {
            MediaError::NoSpeechDetected
        } else {
            MediaError::ProviderFailure(kind.to_string())
        }
    }

    /// Whether the user should hear about this failure.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, MediaError::NoSpeechDetected)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaError::DeviceUnavailable(_) => "device_unavailable",
            MediaError::NoSpeechDetected => "no_speech",
            MediaError::ProviderFailure(_) => "provider_failure",
            MediaError::PlaybackFailure(_) => "playback_failure",
        }
    }
}

/// Misuse of the playback channel API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("no active track")]
    NoActiveTrack,
    #[error("unknown track '{0}'")]
    UnknownTrack(TrackId),
}

/// Misuse of the mini-player handoff API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("mini-player session {0} is not floating")]
    NotFloating(u64),
    #[error("no mini-player is floating")]
    NothingFloating,
    #[error("post '{0}' is playing in the mini-player")]
    PostFloating(PostId),
    #[error("post '{0}' is not in this feed")]
    UnknownPost(PostId),
}

/// Misuse of the coordinator's routing API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("unknown composer '{0}'")]
    UnknownComposer(ComposerId),
    #[error("composer '{0}' is already open")]
    ComposerExists(ComposerId),
    #[error("unknown feed view '{0}'")]
    UnknownFeed(ViewId),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

/// Why a session or track stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Explicit user stop (second tap, pause, close).
    User,
    /// Another exclusive request took the resource over.
    Superseded,
    /// The owning view went away.
    Teardown,
    /// The media reached its natural end.
    Finished,
    /// A collaborator failed.
    Failed,
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::User => "user",
            StopReason::Superseded => "superseded",
            StopReason::Teardown => "teardown",
            StopReason::Finished => "finished",
            StopReason::Failed => "failed",
        }
    }
}

/// Recoverable, user-visible conditions the host should surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    DeviceUnavailable { reason: String },
    VoiceInputUnavailable { reason: String },
    PlaybackFailed { track_id: TrackId, reason: String },
    SpeechUnavailable { message_id: String, reason: String },
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::DeviceUnavailable { reason } => format!("Microphone unavailable: {reason}"),
            Notice::VoiceInputUnavailable { reason } => {
                format!("Voice input unavailable: {reason}")
            }
            Notice::PlaybackFailed { track_id, reason } => {
                format!("Playback failed for {track_id}: {reason}")
            }
            Notice::SpeechUnavailable { reason, .. } => {
                format!("Read-aloud unavailable: {reason}")
            }
        }
    }
}
