use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{shared, ExclusivePlaybackChannel, PlaybackRate, SharedChannel};
use crate::capabilities::{MediaOutput, SpeechSynthesizer};
use crate::config::ExclusivityScope;
use crate::error::StopReason;
use crate::handoff::ViewId;
use crate::lock_or_recover;

const GLOBAL_SCOPE: &str = "global";

/// Hands out audio channels according to the configured exclusivity scope.
///
/// With `per-view` every view gets its own channel, so a voice note in chat
/// and a feed item may be audible together. With `global` every view shares
/// one channel, feeds included, and starting anything anywhere silences
/// everything else. The mini-player is never part of it.
pub struct ChannelRegistry {
    scope: ExclusivityScope,
    output: Arc<dyn MediaOutput>,
    video_output: Arc<dyn MediaOutput>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    default_rate: PlaybackRate,
    global: Option<SharedChannel>,
    views: BTreeMap<ViewId, SharedChannel>,
}

impl ChannelRegistry {
    pub fn new(
        scope: ExclusivityScope,
        output: Arc<dyn MediaOutput>,
        video_output: Arc<dyn MediaOutput>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        default_rate: PlaybackRate,
    ) -> Self {
        Self {
            scope,
            output,
            video_output,
            synthesizer,
            default_rate,
            global: None,
            views: BTreeMap::new(),
        }
    }

    pub fn scope(&self) -> ExclusivityScope {
        self.scope
    }

    fn build(&self, label: String) -> SharedChannel {
        shared(
            ExclusivePlaybackChannel::new(label, self.output.clone())
                .with_synthesizer(self.synthesizer.clone())
                .with_default_rate(self.default_rate),
        )
    }

    fn global_channel(&mut self) -> SharedChannel {
        if let Some(channel) = &self.global {
            return channel.clone();
        }
        let channel = shared(
            ExclusivePlaybackChannel::new(GLOBAL_SCOPE, self.output.clone())
                .with_video_output(self.video_output.clone())
                .with_synthesizer(self.synthesizer.clone())
                .with_default_rate(self.default_rate),
        );
        self.global = Some(channel.clone());
        channel
    }

    /// Channel used by `view`, created on first use.
    pub fn channel_for(&mut self, view: &ViewId) -> SharedChannel {
        match self.scope {
            ExclusivityScope::Global => self.global_channel(),
            ExclusivityScope::PerView => {
                if let Some(channel) = self.views.get(view) {
                    return channel.clone();
                }
                debug!(view = %view, "creating per-view channel");
                let channel = self.build(format!("view:{view}"));
                self.views.insert(view.clone(), channel.clone());
                channel
            }
        }
    }

    /// The channel a feed's inline player must share, if any. Per-view feeds
    /// keep their own video channel.
    pub fn feed_channel(&mut self) -> Option<SharedChannel> {
        match self.scope {
            ExclusivityScope::Global => Some(self.global_channel()),
            ExclusivityScope::PerView => None,
        }
    }

    /// Every live channel with its scope label, for polling.
    pub fn channels(&self) -> Vec<(String, SharedChannel)> {
        let mut all: Vec<(String, SharedChannel)> = self
            .views
            .iter()
            .map(|(view, channel)| (format!("view:{view}"), channel.clone()))
            .collect();
        if let Some(channel) = &self.global {
            all.push((GLOBAL_SCOPE.to_string(), channel.clone()));
        }
        all
    }

    /// A closing view tears down its own channel. The shared global channel
    /// outlives any single view.
    pub fn close_view(&mut self, view: &ViewId) {
        if let Some(channel) = self.views.remove(view) {
            lock_or_recover(&channel, "ChannelRegistry::close_view").teardown();
        }
    }

    pub fn stop_all(&self, reason: StopReason) {
        for (_, channel) in self.channels() {
            lock_or_recover(&channel, "ChannelRegistry::stop_all").stop(reason.clone());
        }
    }

    pub fn teardown_all(&mut self) {
        for (_, channel) in self.channels() {
            lock_or_recover(&channel, "ChannelRegistry::teardown_all").teardown();
        }
        self.views.clear();
        self.global = None;
    }
}
