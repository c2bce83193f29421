use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::track::{AudioBlob, AudioTrack, BlobHandle, PlaybackRate, TrackId, TrackKind, TrackSource};
use crate::capabilities::{MediaOutput, PlayerHandle, SpeechSynthesizer};
use crate::error::{ChannelError, MediaError, Notice, StopReason};
use crate::log_debug;
use crate::pending::{Orphanage, Pending, PendingPoll};

type PlayerResult = Result<Box<dyn PlayerHandle>, MediaError>;
type SpeechResult = Result<AudioBlob, MediaError>;

/// Snapshot of what a channel is doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub active_track_id: Option<TrackId>,
    pub position_ms: u64,
    pub is_playing: bool,
    pub rate: PlaybackRate,
    pub looping: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    TrackLoading {
        track_id: TrackId,
    },
    TrackStarted {
        track_id: TrackId,
        position_ms: u64,
    },
    TrackPaused {
        track_id: TrackId,
        position_ms: u64,
    },
    TrackResumed {
        track_id: TrackId,
        position_ms: u64,
    },
    TrackStopped {
        track_id: TrackId,
        position_ms: u64,
        reason: StopReason,
    },
    TrackEnded {
        track_id: TrackId,
    },
    SpeechRequested {
        message_id: String,
    },
    SpeechCancelled {
        message_id: String,
    },
    Notice(Notice),
}

enum Slot {
    Empty,
    /// Player still buffering. `autoplay` is the play/pause intent to apply
    /// once it resolves.
    Loading {
        track: AudioTrack,
        pending: Pending<PlayerResult>,
        from_ms: u64,
        autoplay: bool,
    },
    Loaded {
        track: AudioTrack,
        player: Box<dyn PlayerHandle>,
        playing: bool,
    },
}

impl Slot {
    fn track(&self) -> Option<&AudioTrack> {
        match self {
            Slot::Empty => None,
            Slot::Loading { track, .. } | Slot::Loaded { track, .. } => Some(track),
        }
    }
}

struct SpeechRequest {
    message_id: String,
    pending: Pending<SpeechResult>,
}

/// Speech tracks are keyed by the message they read aloud.
pub fn speech_track_id(message_id: &str) -> TrackId {
    TrackId::new(format!("speech-{message_id}"))
}

/// At most one audible track at a time within one scope.
///
/// The channel owns the only live [`PlayerHandle`]; starting anything else
/// replaces it and releases the previous one first. Loads and speech
/// synthesis resolve through [`poll`](Self::poll), and anything superseded
/// while still in flight is stopped the moment it arrives.
pub struct ExclusivePlaybackChannel {
    scope: String,
    output: Arc<dyn MediaOutput>,
    /// Where `Video` tracks load when the channel also carries feed video.
    video_output: Option<Arc<dyn MediaOutput>>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    tracks: HashMap<TrackId, AudioTrack>,
    resume_points: HashMap<TrackId, u64>,
    slot: Slot,
    default_rate: PlaybackRate,
    default_loop: bool,
    speech: Option<SpeechRequest>,
    load_orphans: Orphanage<PlayerResult>,
    speech_orphans: Orphanage<SpeechResult>,
    events: Vec<ChannelEvent>,
}

impl ExclusivePlaybackChannel {
    pub fn new(scope: impl Into<String>, output: Arc<dyn MediaOutput>) -> Self {
        Self {
            scope: scope.into(),
            output,
            video_output: None,
            synthesizer: None,
            tracks: HashMap::new(),
            resume_points: HashMap::new(),
            slot: Slot::Empty,
            default_rate: PlaybackRate::Normal,
            default_loop: false,
            speech: None,
            load_orphans: Orphanage::new(),
            speech_orphans: Orphanage::new(),
            events: Vec::new(),
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_default_rate(mut self, rate: PlaybackRate) -> Self {
        self.default_rate = rate;
        self
    }

    pub fn with_video_output(mut self, video_output: Arc<dyn MediaOutput>) -> Self {
        self.video_output = Some(video_output);
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Make a track known to the channel so it can be toggled by id.
    pub fn register(&mut self, track: AudioTrack) {
        self.tracks.insert(track.id.clone(), track);
    }

    pub fn track(&self, id: &TrackId) -> Option<&AudioTrack> {
        self.tracks.get(id)
    }

    /// Forget a track whose message went away. Stops it if it is active and
    /// drops the channel's reference to its blob.
    pub fn remove_track(&mut self, id: &TrackId) -> bool {
        if self.active_id() == Some(id) {
            self.release_active(StopReason::User);
        }
        self.resume_points.remove(id);
        self.tracks.remove(id).is_some()
    }

    pub fn play(&mut self, track: AudioTrack, from_ms: u64) {
        self.cancel_speech();
        self.start_track(track, from_ms);
    }

    pub fn toggle_play(&mut self, id: &TrackId) -> Result<PlaybackState, ChannelError> {
        let mut resume_failed = None;
        match &mut self.slot {
            Slot::Loaded {
                track,
                player,
                playing,
            } if &track.id == id => {
                let position_ms = player.position_ms();
                if *playing {
                    player.pause();
                    *playing = false;
                    self.events.push(ChannelEvent::TrackPaused {
                        track_id: id.clone(),
                        position_ms,
                    });
                } else {
                    match player.play() {
                        Ok(()) => {
                            *playing = true;
                            self.events.push(ChannelEvent::TrackResumed {
                                track_id: id.clone(),
                                position_ms,
                            });
                        }
                        Err(err) => resume_failed = Some(err),
                    }
                }
            }
            Slot::Loading {
                track, autoplay, ..
            } if &track.id == id => {
                *autoplay = !*autoplay;
                debug!(scope = %self.scope, track = %id, autoplay = *autoplay, "toggled while loading");
            }
            _ => {
                let track = self
                    .tracks
                    .get(id)
                    .cloned()
                    .ok_or_else(|| ChannelError::UnknownTrack(id.clone()))?;
                let from_ms = if track.kind.retains_position() {
                    self.resume_points.get(id).copied().unwrap_or(0)
                } else {
                    0
                };
                self.play(track, from_ms);
            }
        }
        if let Some(err) = resume_failed {
            self.fail_active(err);
        }
        Ok(self.current())
    }

    /// Pause the active track in place. Does nothing when idle.
    pub fn pause(&mut self) {
        match &mut self.slot {
            Slot::Loaded {
                track,
                player,
                playing,
            } if *playing => {
                player.pause();
                *playing = false;
                self.events.push(ChannelEvent::TrackPaused {
                    track_id: track.id.clone(),
                    position_ms: player.position_ms(),
                });
            }
            Slot::Loading { autoplay, .. } => *autoplay = false,
            _ => {}
        }
    }

    /// Silence the channel. Also cancels a pending synthesis.
    pub fn stop(&mut self, reason: StopReason) {
        self.cancel_speech();
        self.release_active(reason);
    }

    /// Move the active track, clamped to `[0, duration]` when the duration is known.
    pub fn seek(&mut self, position_ms: i64) -> Result<u64, ChannelError> {
        let wanted = u64::try_from(position_ms).unwrap_or(0);
        match &mut self.slot {
            Slot::Empty => Err(ChannelError::NoActiveTrack),
            Slot::Loading { track, from_ms, .. } => {
                let clamped = clamp_to(wanted, track.metadata.duration_ms);
                *from_ms = clamped;
                Ok(clamped)
            }
            Slot::Loaded { track, player, .. } => {
                let duration = player.duration_ms().or(track.metadata.duration_ms);
                let clamped = clamp_to(wanted, duration);
                player.seek(clamped);
                Ok(clamped)
            }
        }
    }

    /// Applies to the active track and to every later `play`.
    pub fn set_rate(&mut self, rate: PlaybackRate) {
        self.default_rate = rate;
        match &mut self.slot {
            Slot::Empty => {}
            Slot::Loading { track, .. } => track.rate = rate,
            Slot::Loaded { track, player, .. } => {
                track.rate = rate;
                player.set_rate(rate);
            }
        }
    }

    /// Applies to the active track and to every later `play`.
    pub fn set_loop(&mut self, looping: bool) {
        self.default_loop = looping;
        match &mut self.slot {
            Slot::Empty => {}
            Slot::Loading { track, .. } => track.looping = looping,
            Slot::Loaded { track, player, .. } => {
                track.looping = looping;
                player.set_looping(looping);
            }
        }
    }

    /// Read a message aloud, or stop reading it if it already is.
    pub fn speak(&mut self, message_id: &str, text: &str) {
        if self
            .speech
            .as_ref()
            .is_some_and(|request| request.message_id == message_id)
        {
            self.cancel_speech();
            return;
        }
        let speech_id = speech_track_id(message_id);
        if self.active_id() == Some(&speech_id) && self.wants_sound() {
            self.release_active(StopReason::User);
            return;
        }
        self.cancel_speech();
        let Some(synthesizer) = self.synthesizer.clone() else {
            self.events.push(ChannelEvent::Notice(Notice::SpeechUnavailable {
                message_id: message_id.to_string(),
                reason: "no speech synthesizer".into(),
            }));
            return;
        };
        info!(scope = %self.scope, message_id, "speech requested");
        self.speech = Some(SpeechRequest {
            message_id: message_id.to_string(),
            pending: synthesizer.synthesize(text),
        });
        self.events.push(ChannelEvent::SpeechRequested {
            message_id: message_id.to_string(),
        });
        self.advance_speech();
    }

    pub fn speech_pending(&self) -> Option<&str> {
        self.speech.as_ref().map(|request| request.message_id.as_str())
    }

    pub fn current(&self) -> PlaybackState {
        match &self.slot {
            Slot::Empty => PlaybackState {
                active_track_id: None,
                position_ms: 0,
                is_playing: false,
                rate: self.default_rate,
                looping: self.default_loop,
            },
            Slot::Loading { track, from_ms, .. } => PlaybackState {
                active_track_id: Some(track.id.clone()),
                position_ms: *from_ms,
                is_playing: false,
                rate: track.rate,
                looping: track.looping,
            },
            Slot::Loaded {
                track,
                player,
                playing,
            } => PlaybackState {
                active_track_id: Some(track.id.clone()),
                position_ms: player.position_ms(),
                is_playing: *playing,
                rate: track.rate,
                looping: track.looping,
            },
        }
    }

    /// Resolve loads and synthesis, release late arrivals, and handle natural ends.
    pub fn poll(&mut self) {
        let released = self.load_orphans.reap(|result| {
            if let Ok(player) = result {
                player.stop();
            }
        });
        if released > 0 {
            log_debug(&format!(
                "{}: stopped {released} superseded player(s) on arrival",
                self.scope
            ));
        }
        self.speech_orphans.reap(drop);
        self.advance_loading();
        self.advance_speech();
        self.check_ended();
    }

    /// Release every device synchronously; in-flight requests are cancelled.
    pub fn teardown(&mut self) {
        self.stop(StopReason::Teardown);
        self.tracks.clear();
        self.resume_points.clear();
    }

    pub fn drain_events(&mut self) -> Vec<ChannelEvent> {
        std::mem::take(&mut self.events)
    }

    fn active_id(&self) -> Option<&TrackId> {
        self.slot.track().map(|track| &track.id)
    }

    /// Playing, or buffering with the intent to play once loaded.
    fn wants_sound(&self) -> bool {
        match &self.slot {
            Slot::Empty => false,
            Slot::Loading { autoplay, .. } => *autoplay,
            Slot::Loaded { playing, .. } => *playing,
        }
    }

    fn start_track(&mut self, mut track: AudioTrack, from_ms: u64) {
        self.release_active(StopReason::Superseded);
        track.rate = self.default_rate;
        track.looping = track.looping || self.default_loop;
        if track.kind != TrackKind::Speech {
            self.tracks.insert(track.id.clone(), track.clone());
        }
        info!(
            scope = %self.scope,
            track = %track.id,
            kind = track.kind.label(),
            from_ms,
            "track requested"
        );
        let output = match (&self.video_output, track.kind) {
            (Some(video), TrackKind::Video) => video,
            _ => &self.output,
        };
        let pending = output.load(&track);
        self.events.push(ChannelEvent::TrackLoading {
            track_id: track.id.clone(),
        });
        self.slot = Slot::Loading {
            track,
            pending,
            from_ms,
            autoplay: true,
        };
        self.advance_loading();
    }

    /// Replace the active slot with nothing, releasing whatever it held.
    fn release_active(&mut self, reason: StopReason) {
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Empty => {}
            Slot::Loading {
                track,
                pending,
                from_ms,
                ..
            } => {
                self.load_orphans.adopt(pending);
                self.remember_position(&track, from_ms);
                self.events.push(ChannelEvent::TrackStopped {
                    track_id: track.id,
                    position_ms: from_ms,
                    reason,
                });
            }
            Slot::Loaded {
                track, mut player, ..
            } => {
                player.pause();
                let position_ms = player.position_ms();
                player.stop();
                self.remember_position(&track, position_ms);
                debug!(scope = %self.scope, track = %track.id, position_ms, reason = reason.label(), "track released");
                self.events.push(ChannelEvent::TrackStopped {
                    track_id: track.id,
                    position_ms,
                    reason,
                });
            }
        }
    }

    fn remember_position(&mut self, track: &AudioTrack, position_ms: u64) {
        if track.kind.retains_position() {
            self.resume_points.insert(track.id.clone(), position_ms);
        } else {
            self.resume_points.remove(&track.id);
        }
    }

    fn advance_loading(&mut self) {
        let Slot::Loading { pending, .. } = &self.slot else {
            return;
        };
        let result = match pending.poll() {
            PendingPoll::Waiting => return,
            PendingPoll::Ready(result) => result,
            PendingPoll::Abandoned => Err(MediaError::PlaybackFailure(
                "output dropped the load request".into(),
            )),
        };
        let Slot::Loading {
            track,
            from_ms,
            autoplay,
            ..
        } = std::mem::replace(&mut self.slot, Slot::Empty)
        else {
            return;
        };
        let mut player = match result {
            Ok(player) => player,
            Err(err) => {
                self.fail_track(track, err);
                return;
            }
        };
        player.set_rate(track.rate);
        player.set_looping(track.looping);
        let from_ms = clamp_to(from_ms, player.duration_ms());
        if from_ms > 0 {
            player.seek(from_ms);
        }
        if !autoplay {
            self.events.push(ChannelEvent::TrackPaused {
                track_id: track.id.clone(),
                position_ms: from_ms,
            });
            self.slot = Slot::Loaded {
                track,
                player,
                playing: false,
            };
            return;
        }
        match player.play() {
            Ok(()) => {
                self.events.push(ChannelEvent::TrackStarted {
                    track_id: track.id.clone(),
                    position_ms: from_ms,
                });
                self.slot = Slot::Loaded {
                    track,
                    player,
                    playing: true,
                };
            }
            Err(err) => {
                player.stop();
                self.fail_track(track, err);
            }
        }
    }

    fn fail_active(&mut self, err: MediaError) {
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Loaded { track, player, .. } => {
                player.stop();
                self.fail_track(track, err);
            }
            Slot::Loading { track, pending, .. } => {
                self.load_orphans.adopt(pending);
                self.fail_track(track, err);
            }
            Slot::Empty => {}
        }
    }

    fn fail_track(&mut self, track: AudioTrack, err: MediaError) {
        log_debug(&format!("{}: track {} failed: {err}", self.scope, track.id));
        self.resume_points.remove(&track.id);
        self.events.push(ChannelEvent::TrackStopped {
            track_id: track.id.clone(),
            position_ms: 0,
            reason: StopReason::Failed,
        });
        self.events.push(ChannelEvent::Notice(Notice::PlaybackFailed {
            track_id: track.id,
            reason: err.to_string(),
        }));
    }

    fn cancel_speech(&mut self) {
        if let Some(request) = self.speech.take() {
            self.speech_orphans.adopt(request.pending);
            self.events.push(ChannelEvent::SpeechCancelled {
                message_id: request.message_id,
            });
        }
    }

    fn advance_speech(&mut self) {
        let Some(request) = self.speech.as_ref() else {
            return;
        };
        let result = match request.pending.poll() {
            PendingPoll::Waiting => return,
            PendingPoll::Ready(result) => result,
            PendingPoll::Abandoned => Err(MediaError::ProviderFailure(
                "synthesizer dropped the request".into(),
            )),
        };
        let Some(request) = self.speech.take() else {
            return;
        };
        match result {
            Ok(blob) => {
                let track = AudioTrack::new(
                    speech_track_id(&request.message_id),
                    TrackKind::Speech,
                    TrackSource::Blob(BlobHandle::new(blob)),
                );
                self.start_track(track, 0);
            }
            Err(err) => {
                log_debug(&format!(
                    "{}: speech for {} failed: {err}",
                    self.scope, request.message_id
                ));
                self.events.push(ChannelEvent::Notice(Notice::SpeechUnavailable {
                    message_id: request.message_id,
                    reason: err.to_string(),
                }));
            }
        }
    }

    fn check_ended(&mut self) {
        let Slot::Loaded {
            track,
            player,
            playing,
        } = &mut self.slot
        else {
            return;
        };
        if !*playing || !player.has_ended() {
            return;
        }
        if track.looping {
            player.seek(0);
            if let Err(err) = player.play() {
                self.fail_active(err);
            }
            return;
        }
        let Slot::Loaded { track, player, .. } = std::mem::replace(&mut self.slot, Slot::Empty)
        else {
            return;
        };
        player.stop();
        self.resume_points.remove(&track.id);
        info!(scope = %self.scope, track = %track.id, "track ended");
        self.events.push(ChannelEvent::TrackEnded { track_id: track.id });
    }
}

fn clamp_to(position_ms: u64, duration_ms: Option<u64>) -> u64 {
    match duration_ms {
        Some(duration) => position_ms.min(duration),
        None => position_ms,
    }
}

impl Drop for ExclusivePlaybackChannel {
    fn drop(&mut self) {
        if let Slot::Loaded { player, .. } = std::mem::replace(&mut self.slot, Slot::Empty) {
            player.stop();
        }
    }
}
