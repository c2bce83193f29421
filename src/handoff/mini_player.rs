use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::{PlayAuthority, PostId, RestoreBus, RestoreSignal, ViewId};
use crate::capabilities::MediaOutput;
use crate::error::{HandoffError, StopReason};
use crate::log_debug;
use crate::playback::{AudioTrack, ChannelEvent, ExclusivePlaybackChannel, PlaybackState, TrackKind};

/// Scope label of the mini-player's own video channel.
pub const MINI_PLAYER_SCOPE: &str = "mini-player";

/// A video handed from the inline feed to the floating mini-player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiniPlayerSession {
    pub session_id: u64,
    pub source_view_id: ViewId,
    pub post_id: PostId,
    pub url: String,
    pub position_ms: u64,
    pub is_floating: bool,
}

/// The inline feed surface currently showing a post.
pub trait InlineVideoHost {
    /// Stop the inline item from producing sound or picture before the
    /// mini-player takes over.
    fn pause_for_handoff(&mut self, post_id: &PostId);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandoffEvent {
    Minimized { session: MiniPlayerSession },
    Restored { session_id: u64, signal: RestoreSignal },
    Discarded { session_id: u64, post_id: PostId },
    Playback { event: ChannelEvent },
}

/// Owns the single floating mini-player.
///
/// The mini-player plays through its own video channel, independent of any
/// view's audio channel. Restoring publishes a [`RestoreSignal`] and leaves
/// navigation to whichever feed view owns the post.
pub struct MiniPlayerHandoff {
    channel: ExclusivePlaybackChannel,
    authority: Arc<PlayAuthority>,
    bus: Arc<RestoreBus>,
    floating: Option<MiniPlayerSession>,
    next_session: u64,
    events: Vec<HandoffEvent>,
}

impl MiniPlayerHandoff {
    pub fn new(
        video_output: Arc<dyn MediaOutput>,
        authority: Arc<PlayAuthority>,
        bus: Arc<RestoreBus>,
    ) -> Self {
        Self {
            channel: ExclusivePlaybackChannel::new(MINI_PLAYER_SCOPE, video_output),
            authority,
            bus,
            floating: None,
            next_session: 0,
            events: Vec::new(),
        }
    }

    /// Pause the inline item and continue its video in the mini-player.
    /// A mini-player already floating is discarded first.
    pub fn minimize(
        &mut self,
        inline: &mut dyn InlineVideoHost,
        post_id: PostId,
        url: impl Into<String>,
        position_ms: u64,
        source_view: ViewId,
    ) -> MiniPlayerSession {
        if let Some(previous) = self.floating.take() {
            log_debug(&format!(
                "mini-player: session {} replaced by a new minimize",
                previous.session_id
            ));
            self.tear_down(&previous);
            self.events.push(HandoffEvent::Discarded {
                session_id: previous.session_id,
                post_id: previous.post_id,
            });
        }

        inline.pause_for_handoff(&post_id);

        self.next_session += 1;
        let url = url.into();
        self.authority.claim_floating(&post_id, self.next_session);
        let track = AudioTrack::from_url(post_id.video_track_id(), TrackKind::Video, url.clone());
        self.channel.play(track, position_ms);

        let session = MiniPlayerSession {
            session_id: self.next_session,
            source_view_id: source_view,
            post_id,
            url,
            position_ms,
            is_floating: true,
        };
        info!(
            session = session.session_id,
            post = %session.post_id,
            position_ms,
            "video minimized"
        );
        self.floating = Some(session.clone());
        self.events.push(HandoffEvent::Minimized {
            session: session.clone(),
        });
        session
    }

    /// Close the mini-player and ask the owning feed to resume the post.
    pub fn restore(&mut self, session: &MiniPlayerSession) -> Result<RestoreSignal, HandoffError> {
        let floating = self.take_floating(session)?;
        let signal = RestoreSignal {
            post_id: floating.post_id.clone(),
            source_view_id: floating.source_view_id.clone(),
            position_ms: self.live_position(&floating),
        };
        self.tear_down(&floating);
        let delivered = self.bus.publish(signal.clone());
        info!(
            session = floating.session_id,
            post = %signal.post_id,
            position_ms = signal.position_ms,
            delivered,
            "mini-player restored"
        );
        self.events.push(HandoffEvent::Restored {
            session_id: floating.session_id,
            signal: signal.clone(),
        });
        Ok(signal)
    }

    /// Close the mini-player without resuming anything inline.
    pub fn discard(&mut self, session: &MiniPlayerSession) -> Result<(), HandoffError> {
        let floating = self.take_floating(session)?;
        self.tear_down(&floating);
        info!(session = floating.session_id, post = %floating.post_id, "mini-player discarded");
        self.events.push(HandoffEvent::Discarded {
            session_id: floating.session_id,
            post_id: floating.post_id,
        });
        Ok(())
    }

    /// The floating session with its live position.
    pub fn floating(&self) -> Option<MiniPlayerSession> {
        self.floating.as_ref().map(|session| MiniPlayerSession {
            position_ms: self.live_position(session),
            ..session.clone()
        })
    }

    /// Pause or resume the floating video.
    pub fn toggle_play(&mut self) -> Result<PlaybackState, HandoffError> {
        let Some(session) = self.floating.as_ref() else {
            return Err(HandoffError::NothingFloating);
        };
        let session_id = session.session_id;
        let track_id = session.post_id.video_track_id();
        self.channel
            .toggle_play(&track_id)
            .map_err(|_| HandoffError::NotFloating(session_id))
    }

    pub fn playback(&self) -> PlaybackState {
        self.channel.current()
    }

    pub fn poll(&mut self) {
        self.channel.poll();
        self.collect_channel_events();
    }

    /// View teardown: close the mini-player without a signal.
    pub fn teardown(&mut self) {
        if let Some(floating) = self.floating.take() {
            self.tear_down(&floating);
        }
        self.channel.teardown();
    }

    pub fn drain_events(&mut self) -> Vec<HandoffEvent> {
        self.collect_channel_events();
        std::mem::take(&mut self.events)
    }

    fn collect_channel_events(&mut self) {
        for event in self.channel.drain_events() {
            self.events.push(HandoffEvent::Playback { event });
        }
    }

    fn take_floating(&mut self, session: &MiniPlayerSession) -> Result<MiniPlayerSession, HandoffError> {
        match self.floating.take() {
            Some(floating) if floating.session_id == session.session_id => Ok(floating),
            other => {
                self.floating = other;
                Err(HandoffError::NotFloating(session.session_id))
            }
        }
    }

    fn live_position(&self, session: &MiniPlayerSession) -> u64 {
        let state = self.channel.current();
        if state.active_track_id == Some(session.post_id.video_track_id()) {
            state.position_ms
        } else {
            session.position_ms
        }
    }

    fn tear_down(&mut self, session: &MiniPlayerSession) {
        self.channel.stop(StopReason::User);
        self.authority
            .release_floating(&session.post_id, session.session_id);
    }
}
