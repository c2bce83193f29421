use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::capabilities::HostCapabilities;
use crate::clock::Clock;
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, HandoffError, StopReason};
use crate::gesture::{ArbiterEvent, ComposerId, InputGestureArbiter};
use crate::handoff::{
    FeedEvent, FeedView, HandoffEvent, MiniPlayerHandoff, MiniPlayerSession, PlayAuthority,
    PostId, RestoreBus, RestoreSignal, ViewFocus, ViewId,
};
use crate::mic::MicrophoneSlot;
use crate::playback::{ChannelEvent, ChannelRegistry, SharedChannel};
use crate::{lock_or_recover, log_debug};

/// Anything a component reported during a poll, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    Composer {
        composer_id: ComposerId,
        event: ArbiterEvent,
    },
    Channel {
        scope: String,
        event: ChannelEvent,
    },
    Feed {
        view_id: ViewId,
        event: FeedEvent,
    },
    MiniPlayer {
        event: HandoffEvent,
    },
}

struct ComposerEntry {
    view: ViewId,
    arbiter: InputGestureArbiter,
}

/// Owns every composer, channel, feed and the mini-player of one app
/// instance, and routes host input to them.
pub struct Coordinator {
    config: CoordinatorConfig,
    host: HostCapabilities,
    clock: Arc<dyn Clock>,
    mic: Arc<MicrophoneSlot>,
    registry: ChannelRegistry,
    composers: BTreeMap<ComposerId, ComposerEntry>,
    feeds: BTreeMap<ViewId, FeedView>,
    focus: Arc<ViewFocus>,
    authority: Arc<PlayAuthority>,
    bus: Arc<RestoreBus>,
    handoff: MiniPlayerHandoff,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        host: HostCapabilities,
        clock: Arc<dyn Clock>,
        bus: Arc<RestoreBus>,
    ) -> Self {
        let authority = Arc::new(PlayAuthority::new());
        let registry = ChannelRegistry::new(
            config.exclusivity,
            host.audio_output.clone(),
            host.video_output.clone(),
            host.synthesizer.clone(),
            config.default_rate,
        );
        let handoff =
            MiniPlayerHandoff::new(host.video_output.clone(), authority.clone(), bus.clone());
        info!(
            exclusivity = config.exclusivity.label(),
            hold_threshold_ms = config.hold_threshold.as_millis() as u64,
            "coordinator ready"
        );
        Self {
            config,
            host,
            clock,
            mic: Arc::new(MicrophoneSlot::new()),
            registry,
            composers: BTreeMap::new(),
            feeds: BTreeMap::new(),
            focus: Arc::new(ViewFocus::default()),
            authority,
            bus,
            handoff,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn mic_holder(&self) -> Option<ComposerId> {
        self.mic.holder()
    }

    pub fn focused_view(&self) -> Option<ViewId> {
        self.focus.focused()
    }

    pub fn focus_view(&mut self, view: &ViewId) {
        self.focus.focus(view);
    }

    // -----------------------------------------------------------------------
    // Composers
    // -----------------------------------------------------------------------

    pub fn open_composer(
        &mut self,
        view: ViewId,
        composer: ComposerId,
    ) -> Result<(), CoordinatorError> {
        if self.composers.contains_key(&composer) {
            return Err(CoordinatorError::ComposerExists(composer));
        }
        let arbiter = InputGestureArbiter::new(
            composer.clone(),
            &self.config,
            self.clock.clone(),
            self.mic.clone(),
            self.host.microphone.clone(),
            self.host.recognizer.clone(),
        )
        .with_playback(self.registry.channel_for(&view));
        log_debug(&format!("composer {composer} opened on {view}"));
        self.composers
            .insert(composer, ComposerEntry { view, arbiter });
        Ok(())
    }

    /// Close a composer. Committed text is returned to the caller; any
    /// recording in flight is discarded.
    pub fn close_composer(&mut self, composer: &ComposerId) -> Result<String, CoordinatorError> {
        let mut entry = self
            .composers
            .remove(composer)
            .ok_or_else(|| CoordinatorError::UnknownComposer(composer.clone()))?;
        entry.arbiter.teardown();
        Ok(entry.arbiter.take_committed_text())
    }

    pub fn composer(&self, composer: &ComposerId) -> Result<&InputGestureArbiter, CoordinatorError> {
        self.composers
            .get(composer)
            .map(|entry| &entry.arbiter)
            .ok_or_else(|| CoordinatorError::UnknownComposer(composer.clone()))
    }

    pub fn composer_mut(
        &mut self,
        composer: &ComposerId,
    ) -> Result<&mut InputGestureArbiter, CoordinatorError> {
        self.composers
            .get_mut(composer)
            .map(|entry| &mut entry.arbiter)
            .ok_or_else(|| CoordinatorError::UnknownComposer(composer.clone()))
    }

    // -----------------------------------------------------------------------
    // Playback
    // -----------------------------------------------------------------------

    /// Audio channel serving `view` under the configured exclusivity scope.
    pub fn channel(&mut self, view: &ViewId) -> SharedChannel {
        self.registry.channel_for(view)
    }

    // -----------------------------------------------------------------------
    // Feeds and the mini-player
    // -----------------------------------------------------------------------

    pub fn add_feed(&mut self, view: ViewId) {
        if self.feeds.contains_key(&view) {
            return;
        }
        let feed = match self.registry.feed_channel() {
            Some(channel) => FeedView::on_shared_channel(
                view.clone(),
                &self.bus,
                self.focus.clone(),
                self.authority.clone(),
                channel,
            ),
            None => FeedView::new(
                view.clone(),
                &self.bus,
                self.focus.clone(),
                self.authority.clone(),
                self.host.video_output.clone(),
            ),
        };
        if self.focus.focused().is_none() {
            self.focus.focus(&view);
        }
        self.feeds.insert(view, feed);
    }

    pub fn feed(&self, view: &ViewId) -> Result<&FeedView, CoordinatorError> {
        self.feeds
            .get(view)
            .ok_or_else(|| CoordinatorError::UnknownFeed(view.clone()))
    }

    pub fn feed_mut(&mut self, view: &ViewId) -> Result<&mut FeedView, CoordinatorError> {
        self.feeds
            .get_mut(view)
            .ok_or_else(|| CoordinatorError::UnknownFeed(view.clone()))
    }

    /// Hand `post` from `view`'s inline player to the mini-player.
    pub fn minimize(
        &mut self,
        view: &ViewId,
        post: &PostId,
        position_ms: u64,
    ) -> Result<MiniPlayerSession, CoordinatorError> {
        let feed = self
            .feeds
            .get_mut(view)
            .ok_or_else(|| CoordinatorError::UnknownFeed(view.clone()))?;
        let url = feed
            .item_url(post)
            .map(str::to_string)
            .ok_or_else(|| HandoffError::UnknownPost(post.clone()))?;
        Ok(self
            .handoff
            .minimize(feed, post.clone(), url, position_ms, view.clone()))
    }

    pub fn floating(&self) -> Option<MiniPlayerSession> {
        self.handoff.floating()
    }

    pub fn restore_floating(&mut self) -> Result<RestoreSignal, CoordinatorError> {
        let session = self.handoff.floating().ok_or(HandoffError::NothingFloating)?;
        Ok(self.handoff.restore(&session)?)
    }

    pub fn discard_floating(&mut self) -> Result<(), CoordinatorError> {
        let session = self.handoff.floating().ok_or(HandoffError::NothingFloating)?;
        Ok(self.handoff.discard(&session)?)
    }

    pub fn mini_player(&mut self) -> &mut MiniPlayerHandoff {
        &mut self.handoff
    }

    /// Tear down everything that belongs to `view`.
    pub fn close_view(&mut self, view: &ViewId) {
        let closing: Vec<ComposerId> = self
            .composers
            .iter()
            .filter(|(_, entry)| &entry.view == view)
            .map(|(id, _)| id.clone())
            .collect();
        for composer in closing {
            if let Some(mut entry) = self.composers.remove(&composer) {
                entry.arbiter.teardown();
            }
        }
        if let Some(mut feed) = self.feeds.remove(view) {
            feed.teardown();
        }
        self.registry.close_view(view);
        info!(view = %view, "view closed");
    }

    /// One turn of the host event loop.
    pub fn poll(&mut self) -> Vec<CoordinatorEvent> {
        let mut events = Vec::new();
        for (composer_id, entry) in self.composers.iter_mut() {
            entry.arbiter.poll();
            events.extend(
                entry
                    .arbiter
                    .drain_events()
                    .into_iter()
                    .map(|event| CoordinatorEvent::Composer {
                        composer_id: composer_id.clone(),
                        event,
                    }),
            );
        }
        for (scope, channel) in self.registry.channels() {
            let drained = {
                let mut channel = lock_or_recover(&channel, "Coordinator::poll");
                channel.poll();
                channel.drain_events()
            };
            events.extend(drained.into_iter().map(|event| CoordinatorEvent::Channel {
                scope: scope.clone(),
                event,
            }));
        }
        self.handoff.poll();
        events.extend(
            self.handoff
                .drain_events()
                .into_iter()
                .map(|event| CoordinatorEvent::MiniPlayer { event }),
        );
        for (view_id, feed) in self.feeds.iter_mut() {
            feed.poll();
            events.extend(
                feed.drain_events()
                    .into_iter()
                    .map(|event| CoordinatorEvent::Feed {
                        view_id: view_id.clone(),
                        event,
                    }),
            );
        }
        events
    }

    /// App shutdown: release every device synchronously.
    pub fn teardown(&mut self) {
        for entry in self.composers.values_mut() {
            entry.arbiter.teardown();
        }
        self.composers.clear();
        self.registry.stop_all(StopReason::Teardown);
        self.registry.teardown_all();
        for feed in self.feeds.values_mut() {
            feed.teardown();
        }
        self.feeds.clear();
        self.handoff.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExclusivityScope;
    use crate::host::sim::{SimHost, SimOp};
    use crate::playback::{AudioTrack, TrackId, TrackKind};

    fn coordinator(host: &SimHost, exclusivity: ExclusivityScope) -> Coordinator {
        let config = CoordinatorConfig {
            exclusivity,
            ..CoordinatorConfig::default()
        };
        Coordinator::new(
            config,
            host.capabilities(),
            host.clock_handle(),
            Arc::new(RestoreBus::new()),
        )
    }

    fn note(id: &str) -> AudioTrack {
        AudioTrack::from_url(id, TrackKind::VoiceNote, format!("https://cdn/{id}"))
            .with_duration_ms(20_000)
    }

    #[test]
    fn per_view_channels_are_independent() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::PerView);
        let chat = app.channel(&ViewId::from("chat"));
        let home = app.channel(&ViewId::from("home"));
        lock_or_recover(&chat, "test").play(note("a"), 0);
        lock_or_recover(&home, "test").play(note("b"), 0);

        assert!(lock_or_recover(&chat, "test").current().is_playing);
        assert!(lock_or_recover(&home, "test").current().is_playing);
    }

    #[test]
    fn global_channel_is_shared() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::Global);
        let chat = app.channel(&ViewId::from("chat"));
        let home = app.channel(&ViewId::from("home"));
        lock_or_recover(&chat, "test").play(note("a"), 0);
        lock_or_recover(&home, "test").play(note("b"), 0);

        assert_eq!(
            lock_or_recover(&chat, "test").current().active_track_id,
            Some(TrackId::from("b"))
        );
        assert_eq!(host.journal.count(&SimOp::Pause(TrackId::from("a"))), 1);
    }

    #[test]
    fn global_scope_covers_feed_video() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::Global);
        let home = ViewId::from("home");
        let p1 = PostId::from("p1");
        app.add_feed(home.clone());
        let feed = app.feed_mut(&home).expect("feed");
        feed.add_item(p1.clone(), "https://cdn/p1.mp4", Some(60_000));
        feed.activate(&p1).expect("activate");
        assert!(app.feed(&home).expect("feed").is_playing_inline());

        let chat = app.channel(&ViewId::from("chat"));
        lock_or_recover(&chat, "test").play(note("vn"), 0);
        app.poll();

        assert!(!app.feed(&home).expect("feed").is_playing_inline());
        assert!(lock_or_recover(&chat, "test").current().is_playing);
        assert_eq!(host.journal.count(&SimOp::Pause(p1.video_track_id())), 1);

        // Scrolling back to the video silences the voice note in turn.
        app.feed_mut(&home).expect("feed").activate(&p1).expect("reactivate");
        assert_eq!(
            lock_or_recover(&chat, "test").current().active_track_id,
            Some(p1.video_track_id())
        );
        assert_eq!(host.journal.count(&SimOp::Pause(TrackId::from("vn"))), 1);
    }

    #[test]
    fn per_view_feed_video_plays_beside_voice_notes() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::PerView);
        let home = ViewId::from("home");
        let p1 = PostId::from("p1");
        app.add_feed(home.clone());
        let feed = app.feed_mut(&home).expect("feed");
        feed.add_item(p1.clone(), "https://cdn/p1.mp4", None);
        feed.activate(&p1).expect("activate");

        let chat = app.channel(&ViewId::from("chat"));
        lock_or_recover(&chat, "test").play(note("vn"), 0);
        app.poll();

        assert!(app.feed(&home).expect("feed").is_playing_inline());
        assert!(lock_or_recover(&chat, "test").current().is_playing);
    }

    #[test]
    fn recording_silences_the_composers_view_channel() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::PerView);
        let chat_view = ViewId::from("chat");
        let composer = ComposerId::from("chat-box");
        app.open_composer(chat_view.clone(), composer.clone())
            .expect("open");
        let channel = app.channel(&chat_view);
        lock_or_recover(&channel, "test").play(note("previous"), 0);

        app.composer_mut(&composer).expect("composer").on_press_start();
        host.clock.advance_ms(600);
        let events = app.poll();

        assert_eq!(lock_or_recover(&channel, "test").current().active_track_id, None);
        assert!(events.iter().any(|event| matches!(
            event,
            CoordinatorEvent::Composer {
                event: ArbiterEvent::RecordingStarted,
                ..
            }
        )));
    }

    #[test]
    fn closing_a_view_releases_its_microphone() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::PerView);
        let view = ViewId::from("search");
        let composer = ComposerId::from("search-bar");
        app.open_composer(view.clone(), composer.clone()).expect("open");
        let arbiter = app.composer_mut(&composer).expect("composer");
        arbiter.on_press_start();
        arbiter.on_press_end();
        assert_eq!(app.mic_holder(), Some(composer.clone()));

        app.close_view(&view);
        assert_eq!(app.mic_holder(), None);
        assert_eq!(host.journal.count(&SimOp::RecognizerStopped), 1);
        assert!(matches!(
            app.composer(&composer),
            Err(CoordinatorError::UnknownComposer(_))
        ));
    }

    #[test]
    fn minimize_and_restore_round_trip_through_feed() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::PerView);
        let home = ViewId::from("home");
        let post = PostId::from("p7");
        app.add_feed(home.clone());
        app.feed_mut(&home)
            .expect("feed")
            .add_item(post.clone(), "https://cdn/p7.mp4", Some(60_000));
        app.feed_mut(&home).expect("feed").activate(&post).expect("activate");
        app.focus_view(&ViewId::from("profile"));

        app.minimize(&home, &post, 12_300).expect("minimize");
        let signal = app.restore_floating().expect("restore");
        assert_eq!(signal.position_ms, 12_300);
        app.poll();

        assert_eq!(app.focused_view(), Some(home.clone()));
        let state = app.feed(&home).expect("feed").playback();
        assert!(state.is_playing);
        assert_eq!(state.position_ms, 12_300);
        assert!(matches!(
            app.restore_floating(),
            Err(CoordinatorError::Handoff(HandoffError::NothingFloating))
        ));
    }

    #[test]
    fn duplicate_composer_is_rejected() {
        let host = SimHost::new();
        let mut app = coordinator(&host, ExclusivityScope::PerView);
        let view = ViewId::from("chat");
        app.open_composer(view.clone(), ComposerId::from("c")).expect("open");
        assert_eq!(
            app.open_composer(view, ComposerId::from("c")),
            Err(CoordinatorError::ComposerExists(ComposerId::from("c")))
        );
    }
}
