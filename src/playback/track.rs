//! Track identity, sources, and playback parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::lock_or_recover;

/// Stable identity of a playable track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TrackId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of media a track carries; decides resume behaviour when superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    VoiceNote,
    Music,
    /// Synthesized speech (read-aloud).
    Speech,
    Video,
}

impl TrackKind {
    /// Only music keeps its position after another track takes over.
    pub fn retains_position(self) -> bool {
        matches!(self, TrackKind::Music)
    }

    pub fn label(self) -> &'static str {
        match self {
            TrackKind::VoiceNote => "voice_note",
            TrackKind::Music => "music",
            TrackKind::Speech => "speech",
            TrackKind::Video => "video",
        }
    }
}

/// Supported playback speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackRate {
    Half,
    #[default]
    Normal,
    OneAndQuarter,
    OneAndHalf,
    Double,
}

impl PlaybackRate {
    pub const ALL: [PlaybackRate; 5] = [
        PlaybackRate::Half,
        PlaybackRate::Normal,
        PlaybackRate::OneAndQuarter,
        PlaybackRate::OneAndHalf,
        PlaybackRate::Double,
    ];

    pub fn as_f32(self) -> f32 {
        match self {
            PlaybackRate::Half => 0.5,
            PlaybackRate::Normal => 1.0,
            PlaybackRate::OneAndQuarter => 1.25,
            PlaybackRate::OneAndHalf => 1.5,
            PlaybackRate::Double => 2.0,
        }
    }

    pub fn from_f32(value: f32) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| (rate.as_f32() - value).abs() < 1e-3)
    }

    /// Next speed in the speed-toggle cycle (wraps back to 0.5x).
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|r| *r == self).unwrap_or(1);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl Serialize for PlaybackRate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f32(self.as_f32())
    }
}

impl<'de> Deserialize<'de> for PlaybackRate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f32::deserialize(deserializer)?;
        PlaybackRate::from_f32(value).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "unsupported playback rate {value}; expected 0.5, 1, 1.25, 1.5 or 2"
            ))
        })
    }
}

/// Opaque audio payload produced by a recorder or synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub mime: String,
}

type ReleaseHook = Box<dyn FnOnce(u64) + Send>;

struct BlobInner {
    id: u64,
    blob: AudioBlob,
    on_release: Mutex<Option<ReleaseHook>>,
}

impl Drop for BlobInner {
    fn drop(&mut self) {
        let hook = lock_or_recover(&self.on_release, "BlobInner::drop").take();
        if let Some(hook) = hook {
            hook(self.id);
        }
    }
}

/// Reference-counted handle to a transient blob. The release hook runs when
/// the last message/track referencing the blob lets go of it.
#[derive(Clone)]
pub struct BlobHandle {
    inner: Arc<BlobInner>,
}

static NEXT_BLOB_ID: AtomicU64 = AtomicU64::new(1);

impl BlobHandle {
    pub fn new(blob: AudioBlob) -> Self {
        Self::build(blob, None)
    }

    pub fn with_release_hook(blob: AudioBlob, hook: impl FnOnce(u64) + Send + 'static) -> Self {
        Self::build(blob, Some(Box::new(hook)))
    }

    fn build(blob: AudioBlob, hook: Option<ReleaseHook>) -> Self {
        Self {
            inner: Arc::new(BlobInner {
                id: NEXT_BLOB_ID.fetch_add(1, Ordering::Relaxed),
                blob,
                on_release: Mutex::new(hook),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn blob(&self) -> &AudioBlob {
        &self.inner.blob
    }

    pub fn len(&self) -> usize {
        self.inner.blob.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.blob.bytes.is_empty()
    }

    /// Number of live references, including this one.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("id", &self.inner.id)
            .field("mime", &self.inner.blob.mime)
            .field("bytes", &self.inner.blob.bytes.len())
            .finish()
    }
}

impl PartialEq for BlobHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for BlobHandle {}

/// Where the player fetches the media from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    Url(String),
    Blob(BlobHandle),
}

impl TrackSource {
    pub fn describe(&self) -> String {
        match self {
            TrackSource::Url(url) => url.clone(),
            TrackSource::Blob(handle) => format!("blob:{}", handle.id()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_ref: Option<String>,
    /// Known length, if the host reported one up front.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// A playable voice note, music attachment, synthesized utterance, or video.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub id: TrackId,
    pub kind: TrackKind,
    pub source: TrackSource,
    pub metadata: TrackMetadata,
    pub rate: PlaybackRate,
    pub looping: bool,
}

impl AudioTrack {
    pub fn new(id: impl Into<TrackId>, kind: TrackKind, source: TrackSource) -> Self {
        Self {
            id: id.into(),
            kind,
            source,
            metadata: TrackMetadata::default(),
            rate: PlaybackRate::Normal,
            looping: false,
        }
    }

    pub fn from_url(id: impl Into<TrackId>, kind: TrackKind, url: impl Into<String>) -> Self {
        Self::new(id, kind, TrackSource::Url(url.into()))
    }

    pub fn with_metadata(mut self, metadata: TrackMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.metadata.duration_ms = Some(duration_ms);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}
