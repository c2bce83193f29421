//! Exclusive playback: tracks, the one-audible-source channel, and the
//! registry that scopes channels per view or globally.

mod channel;
mod registry;
mod track;

use std::sync::{Arc, Mutex};

pub use channel::{speech_track_id, ChannelEvent, ExclusivePlaybackChannel, PlaybackState};
pub use registry::ChannelRegistry;
pub use track::{
    AudioBlob, AudioTrack, BlobHandle, PlaybackRate, TrackId, TrackKind, TrackMetadata,
    TrackSource,
};

/// A channel shared between the view that owns it and the composers that
/// must silence it before recording.
pub type SharedChannel = Arc<Mutex<ExclusivePlaybackChannel>>;

pub fn shared(channel: ExclusivePlaybackChannel) -> SharedChannel {
    Arc::new(Mutex::new(channel))
}
