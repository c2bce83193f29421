//! JSON-lines protocol between the coordinator and a driving frontend.
//!
//! Every line is one JSON object. Commands carry a `"cmd"` tag, events carry
//! an `"event"` tag.

use serde::{Deserialize, Serialize};

use crate::error::{Notice, StopReason};
use crate::gesture::ComposerId;
use crate::handoff::{FeedEvent, HandoffEvent, PostId, ViewId};
use crate::playback::{ChannelEvent, PlaybackRate, PlaybackState, TrackId, TrackKind};

// ============================================================================
// IPC Events (Rust → client)
// ============================================================================

/// Phase of a dictation or recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Started,
    Stopped,
    Finished,
    Discarded,
}

/// Events emitted by the coordinator.
///
/// Serialized as JSON with an `"event"` tag field for type discrimination.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IpcEvent {
    /// Sent once on startup
    Ready {
        session_id: String,
        version: String,
        exclusivity: String,
        hold_threshold_ms: u64,
        microphone: String,
    },

    Dictation {
        composer_id: ComposerId,
        phase: SessionPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<StopReason>,
    },

    Transcript {
        composer_id: ComposerId,
        text: String,
        is_final: bool,
    },

    Recording {
        composer_id: ComposerId,
        phase: SessionPhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        track_id: Option<TrackId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        bytes: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<StopReason>,
    },

    /// `payload` carries the component's own `"kind"`-tagged event
    Playback {
        scope: String,
        payload: ChannelEvent,
    },

    Feed {
        view_id: ViewId,
        payload: FeedEvent,
    },

    MiniPlayer {
        payload: HandoffEvent,
    },

    /// A user-visible condition raised by a composer
    Notice {
        source: String,
        message: String,
        detail: Notice,
    },

    /// Reply to `session_state`
    Session {
        composer_id: ComposerId,
        state: String,
        is_pressed: bool,
        text: String,
    },

    /// Reply to `take_text` and `close_composer`
    Text {
        composer_id: ComposerId,
        text: String,
    },

    /// Reply to `playback_state`
    State {
        scope: String,
        state: PlaybackState,
    },

    /// Error (recoverable or fatal)
    Error { message: String, recoverable: bool },
}

// ============================================================================
// IPC Commands (client → Rust)
// ============================================================================

/// Simulated collaborator targeted by `fail`/`recover`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimTarget {
    Microphone,
    Recognizer,
    Synthesizer,
    Audio,
    Video,
}

impl SimTarget {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SimTarget::Microphone => "microphone",
            SimTarget::Recognizer => "recognizer",
            SimTarget::Synthesizer => "synthesizer",
            SimTarget::Audio => "audio",
            SimTarget::Video => "video",
        }
    }
}

/// Commands received from an IPC client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum IpcCommand {
    // --- composers --------------------------------------------------------
    OpenComposer {
        view: ViewId,
        composer: ComposerId,
    },
    CloseComposer {
        composer: ComposerId,
    },
    PressStart {
        composer: ComposerId,
    },
    PressEnd {
        composer: ComposerId,
    },
    PressCancel {
        composer: ComposerId,
    },
    SetDraft {
        composer: ComposerId,
        text: String,
    },
    SetAttachment {
        composer: ComposerId,
        pending: bool,
    },
    TakeText {
        composer: ComposerId,
    },
    SessionState {
        composer: ComposerId,
    },

    // --- simulated recognizer ---------------------------------------------
    /// Feed a recognition segment to the running recognizer
    Recognize {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    RecognizerError {
        error_kind: String,
    },
    RecognizerEnd,

    // --- audio channels ---------------------------------------------------
    RegisterTrack {
        view: ViewId,
        track_id: TrackId,
        kind: TrackKind,
        url: String,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        looping: bool,
    },
    Play {
        view: ViewId,
        track_id: TrackId,
        #[serde(default)]
        from_ms: u64,
    },
    Toggle {
        view: ViewId,
        track_id: TrackId,
    },
    Pause {
        view: ViewId,
    },
    Stop {
        view: ViewId,
    },
    Seek {
        view: ViewId,
        ms: i64,
    },
    SetRate {
        view: ViewId,
        rate: PlaybackRate,
    },
    SetLoop {
        view: ViewId,
        looping: bool,
    },
    Speak {
        view: ViewId,
        message_id: String,
        text: String,
    },
    PlaybackState {
        view: ViewId,
    },

    // --- feeds and the mini-player ----------------------------------------
    AddFeed {
        view: ViewId,
    },
    AddPost {
        view: ViewId,
        post: PostId,
        url: String,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    Activate {
        view: ViewId,
        post: PostId,
    },
    Focus {
        view: ViewId,
    },
    CloseView {
        view: ViewId,
    },
    Minimize {
        view: ViewId,
        post: PostId,
        #[serde(default)]
        position_ms: u64,
    },
    Restore,
    Discard,
    MiniToggle,

    // --- session control --------------------------------------------------
    /// Advance the session clock and poll
    Wait {
        ms: u64,
    },
    /// Make a simulated collaborator fail every request
    Fail {
        target: SimTarget,
        reason: String,
    },
    Recover {
        target: SimTarget,
    },
    Quit,
}
