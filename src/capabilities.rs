//! Host capability interface.
//!
//! Web, mobile-native, and desktop hosts plug their devices in here; the
//! arbiter, channels, and handoff are written only against these traits.
//! Every operation that may take time returns a [`Pending`] so the coordinator
//! can keep running its event loop and drop the request if it is superseded.

use std::sync::Arc;

use crate::error::MediaError;
use crate::pending::Pending;
use crate::playback::{AudioBlob, AudioTrack, PlaybackRate};

/// Live microphone capture for a voice note.
pub trait MicStream: Send {
    /// Finish the recording and hand back the captured payload.
    fn stop(self: Box<Self>) -> Result<AudioBlob, MediaError>;
    /// Drop the capture without producing anything and free the device.
    fn release(self: Box<Self>);
}

pub trait Microphone: Send + Sync {
    fn acquire(&self) -> Pending<Result<Box<dyn MicStream>, MediaError>>;
}

/// One message from a live speech recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Segment { text: String, is_final: bool },
    /// Terminal failure; `error_kind` is the provider's own classification.
    Failed { error_kind: String },
    /// The recognizer stopped on its own.
    Ended,
}

/// Running dictation. Holds the microphone until stopped.
pub trait RecognitionStream: Send {
    fn try_next(&mut self) -> Option<RecognitionEvent>;
    fn stop(self: Box<Self>);
}

pub trait SpeechRecognizer: Send + Sync {
    fn start(&self, lang: &str) -> Pending<Result<Box<dyn RecognitionStream>, MediaError>>;
}

pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Pending<Result<AudioBlob, MediaError>>;
}

/// A loaded media element. Exactly one per exclusive channel may be audible.
pub trait PlayerHandle: Send {
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn seek(&mut self, position_ms: u64);
    fn position_ms(&self) -> u64;
    fn duration_ms(&self) -> Option<u64>;
    fn set_rate(&mut self, rate: PlaybackRate);
    fn set_looping(&mut self, looping: bool);
    fn has_ended(&self) -> bool;
    /// Silence the element and free its resources.
    fn stop(self: Box<Self>);
}

/// Speaker or video surface that can load tracks.
pub trait MediaOutput: Send + Sync {
    fn load(&self, track: &AudioTrack) -> Pending<Result<Box<dyn PlayerHandle>, MediaError>>;
}

/// Capabilities injected per host platform.
#[derive(Clone)]
pub struct HostCapabilities {
    pub microphone: Arc<dyn Microphone>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub audio_output: Arc<dyn MediaOutput>,
    pub video_output: Arc<dyn MediaOutput>,
}
