use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::{InlineVideoHost, PlayAuthority, PostId, RestoreBus, RestoreSubscription, ViewFocus, ViewId};
use crate::capabilities::MediaOutput;
use crate::error::{HandoffError, StopReason};
use crate::playback::{
    shared, AudioTrack, ChannelEvent, ExclusivePlaybackChannel, PlaybackState, SharedChannel,
    TrackKind,
};
use crate::{lock_or_recover, log_debug};

#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedItem {
    url: String,
    duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedEvent {
    /// The feed pulled focus to itself to honour a restore.
    Focused { view_id: ViewId },
    Selected { post_id: PostId },
    Resumed { post_id: PostId, position_ms: u64 },
    Playback { event: ChannelEvent },
}

/// A scrolling feed of video posts with one inline player.
///
/// Consumes restore signals minimized from its own view: it takes focus if it
/// does not have it, selects the post, and resumes it at the signalled
/// position.
///
/// The inline player is either the feed's own video channel or a channel it
/// shares with the rest of the app. A shared channel is polled and reported by
/// its owner, so the feed only drives it.
pub struct FeedView {
    view_id: ViewId,
    focus: Arc<ViewFocus>,
    authority: Arc<PlayAuthority>,
    subscription: RestoreSubscription,
    channel: SharedChannel,
    owns_channel: bool,
    items: BTreeMap<PostId, FeedItem>,
    selected: Option<PostId>,
    events: Vec<FeedEvent>,
}

impl FeedView {
    pub fn new(
        view_id: ViewId,
        bus: &RestoreBus,
        focus: Arc<ViewFocus>,
        authority: Arc<PlayAuthority>,
        video_output: Arc<dyn MediaOutput>,
    ) -> Self {
        let channel = shared(ExclusivePlaybackChannel::new(
            format!("feed:{view_id}"),
            video_output,
        ));
        Self::build(view_id, bus, focus, authority, channel, true)
    }

    /// A feed whose inline player is `channel`, owned and polled elsewhere.
    pub fn on_shared_channel(
        view_id: ViewId,
        bus: &RestoreBus,
        focus: Arc<ViewFocus>,
        authority: Arc<PlayAuthority>,
        channel: SharedChannel,
    ) -> Self {
        Self::build(view_id, bus, focus, authority, channel, false)
    }

    fn build(
        view_id: ViewId,
        bus: &RestoreBus,
        focus: Arc<ViewFocus>,
        authority: Arc<PlayAuthority>,
        channel: SharedChannel,
        owns_channel: bool,
    ) -> Self {
        Self {
            view_id,
            focus,
            authority,
            subscription: bus.subscribe(),
            channel,
            owns_channel,
            items: BTreeMap::new(),
            selected: None,
            events: Vec::new(),
        }
    }

    pub fn view_id(&self) -> &ViewId {
        &self.view_id
    }

    pub fn add_item(&mut self, post_id: PostId, url: impl Into<String>, duration_ms: Option<u64>) {
        self.items.insert(
            post_id,
            FeedItem {
                url: url.into(),
                duration_ms,
            },
        );
    }

    pub fn owns(&self, post_id: &PostId) -> bool {
        self.items.contains_key(post_id)
    }

    pub fn item_url(&self, post_id: &PostId) -> Option<&str> {
        self.items.get(post_id).map(|item| item.url.as_str())
    }

    pub fn selected(&self) -> Option<&PostId> {
        self.selected.as_ref()
    }

    /// State of the channel the inline player runs on.
    pub fn playback(&self) -> PlaybackState {
        lock_or_recover(&self.channel, "FeedView::playback").current()
    }

    /// Whether one of this feed's posts is the channel's active track.
    pub fn is_playing_inline(&self) -> bool {
        let state = self.playback();
        state.is_playing && self.plays_own_post(&state)
    }

    fn plays_own_post(&self, state: &PlaybackState) -> bool {
        state.active_track_id.as_ref().is_some_and(|active| {
            self.items
                .keys()
                .any(|post_id| &post_id.video_track_id() == active)
        })
    }

    /// Scroll-driven activation of an inline item. Refused while the post
    /// is playing in the mini-player.
    pub fn activate(&mut self, post_id: &PostId) -> Result<(), HandoffError> {
        self.start_inline(post_id, 0)
    }

    /// Pick up restore signals and advance the inline player.
    pub fn poll(&mut self) {
        for signal in self.subscription.drain() {
            if signal.source_view_id != self.view_id {
                continue;
            }
            if !self.owns(&signal.post_id) {
                log_debug(&format!(
                    "{}: restore for unknown post {} ignored",
                    self.view_id, signal.post_id
                ));
                continue;
            }
            if self.focus.focus(&self.view_id) {
                self.events.push(FeedEvent::Focused {
                    view_id: self.view_id.clone(),
                });
            }
            match self.start_inline(&signal.post_id, signal.position_ms) {
                Ok(()) => {
                    info!(
                        view = %self.view_id,
                        post = %signal.post_id,
                        position_ms = signal.position_ms,
                        "inline playback restored"
                    );
                    self.events.push(FeedEvent::Resumed {
                        post_id: signal.post_id,
                        position_ms: signal.position_ms,
                    });
                }
                Err(err) => log_debug(&format!("{}: restore ignored: {err}", self.view_id)),
            }
        }
        if self.owns_channel {
            lock_or_recover(&self.channel, "FeedView::poll").poll();
            self.collect_channel_events();
        }
    }

    /// View closed: stop the inline player and give up authority. On a shared
    /// channel only this feed's own posts are stopped and forgotten.
    pub fn teardown(&mut self) {
        if let Some(post_id) = self.selected.take() {
            self.authority.release_inline(&post_id, &self.view_id);
        }
        let mut channel = lock_or_recover(&self.channel, "FeedView::teardown");
        if self.owns_channel {
            channel.teardown();
            return;
        }
        let state = channel.current();
        if self.plays_own_post(&state) {
            channel.stop(StopReason::Teardown);
        }
        for post_id in self.items.keys() {
            channel.remove_track(&post_id.video_track_id());
        }
    }

    pub fn drain_events(&mut self) -> Vec<FeedEvent> {
        self.collect_channel_events();
        std::mem::take(&mut self.events)
    }

    fn collect_channel_events(&mut self) {
        if !self.owns_channel {
            return;
        }
        let drained = lock_or_recover(&self.channel, "FeedView::drain_events").drain_events();
        self.events
            .extend(drained.into_iter().map(|event| FeedEvent::Playback { event }));
    }

    fn start_inline(&mut self, post_id: &PostId, position_ms: u64) -> Result<(), HandoffError> {
        let item = self
            .items
            .get(post_id)
            .cloned()
            .ok_or_else(|| HandoffError::UnknownPost(post_id.clone()))?;
        if !self.authority.claim_inline(post_id, &self.view_id) {
            return Err(HandoffError::PostFloating(post_id.clone()));
        }
        if let Some(previous) = self.selected.replace(post_id.clone()) {
            if &previous != post_id {
                self.authority.release_inline(&previous, &self.view_id);
            }
        }
        self.events.push(FeedEvent::Selected {
            post_id: post_id.clone(),
        });
        let mut track = AudioTrack::from_url(post_id.video_track_id(), TrackKind::Video, item.url);
        if let Some(duration_ms) = item.duration_ms {
            track = track.with_duration_ms(duration_ms);
        }
        lock_or_recover(&self.channel, "FeedView::start_inline").play(track, position_ms);
        Ok(())
    }
}

impl InlineVideoHost for FeedView {
    fn pause_for_handoff(&mut self, post_id: &PostId) {
        let mut channel = lock_or_recover(&self.channel, "FeedView::pause_for_handoff");
        if channel.current().active_track_id == Some(post_id.video_track_id()) {
            channel.pause();
        }
        drop(channel);
        self.authority.release_inline(post_id, &self.view_id);
    }
}
