//! Deterministic in-process host.
//!
//! Implements every capability against a [`ManualClock`] and records each
//! device operation in a shared [`SimJournal`]. The `voxfeed` binary uses it
//! to replay scripted sessions; tests use it to assert on side effects such as
//! "exactly one pause reached the previous player".

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::capabilities::{
    HostCapabilities, MediaOutput, MicStream, Microphone, PlayerHandle, RecognitionEvent,
    RecognitionStream, SpeechRecognizer, SpeechSynthesizer,
};
use crate::clock::{millis_between, Clock, ManualClock};
use crate::error::MediaError;
use crate::lock_or_recover;
use crate::pending::{pending, Pending, Resolver};
use crate::playback::{AudioBlob, AudioTrack, PlaybackRate, TrackId};

/// Length assumed for tracks that carry no duration metadata.
pub const DEFAULT_SIM_DURATION_MS: u64 = 60_000;

/// Device operation observed by the simulated host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    MicAcquired,
    MicStopped,
    MicReleased,
    RecognizerStarted,
    RecognizerStopped,
    Synthesized(String),
    Loaded(TrackId),
    Play(TrackId),
    Pause(TrackId),
    Seek(TrackId, u64),
    Stop(TrackId),
    Rate(TrackId, PlaybackRate),
    Loop(TrackId, bool),
}

#[derive(Debug, Default)]
pub struct SimJournal {
    ops: Mutex<Vec<SimOp>>,
}

impl SimJournal {
    fn record(&self, op: SimOp) {
        lock_or_recover(&self.ops, "SimJournal::record").push(op);
    }

    pub fn ops(&self) -> Vec<SimOp> {
        lock_or_recover(&self.ops, "SimJournal::ops").clone()
    }

    pub fn count(&self, op: &SimOp) -> usize {
        lock_or_recover(&self.ops, "SimJournal::count")
            .iter()
            .filter(|seen| *seen == op)
            .count()
    }

    pub fn clear(&self) {
        lock_or_recover(&self.ops, "SimJournal::clear").clear();
    }
}

/// How a simulated collaborator answers requests.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SimMode {
    /// Resolve before the call returns.
    #[default]
    Immediate,
    /// Park the request until a `resolve_*` call.
    Deferred,
    /// Resolve with an error carrying this reason.
    Fail(String),
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

pub struct SimMicrophone {
    clock: ManualClock,
    journal: Arc<SimJournal>,
    mode: Mutex<SimMode>,
    parked: Mutex<VecDeque<Resolver<Result<Box<dyn MicStream>, MediaError>>>>,
}

struct SimMicStream {
    started_at: Instant,
    clock: ManualClock,
    journal: Arc<SimJournal>,
}

impl MicStream for SimMicStream {
    fn stop(self: Box<Self>) -> Result<AudioBlob, MediaError> {
        self.journal.record(SimOp::MicStopped);
        // One byte per 10ms keeps artifacts proportional to hold time.
        let len = (millis_between(self.started_at, self.clock.now()) / 10).max(1) as usize;
        Ok(AudioBlob {
            bytes: vec![0u8; len],
            mime: "audio/webm".to_string(),
        })
    }

    fn release(self: Box<Self>) {
        self.journal.record(SimOp::MicReleased);
    }
}

impl SimMicrophone {
    fn new(clock: ManualClock, journal: Arc<SimJournal>) -> Self {
        Self {
            clock,
            journal,
            mode: Mutex::new(SimMode::Immediate),
            parked: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_mode(&self, mode: SimMode) {
        *lock_or_recover(&self.mode, "SimMicrophone::set_mode") = mode;
    }

    fn open_stream(&self) -> Box<dyn MicStream> {
        self.journal.record(SimOp::MicAcquired);
        Box::new(SimMicStream {
            started_at: self.clock.now(),
            clock: self.clock.clone(),
            journal: self.journal.clone(),
        })
    }

    /// Grant the oldest parked acquisition. A request nobody waits for any
    /// more gets its stream released on the spot.
    pub fn resolve_next(&self) -> bool {
        let resolver = lock_or_recover(&self.parked, "SimMicrophone::resolve_next").pop_front();
        let Some(resolver) = resolver else {
            return false;
        };
        if let Err(Ok(stream)) = resolver.resolve(Ok(self.open_stream())) {
            stream.release();
        }
        true
    }
}

impl Microphone for SimMicrophone {
    fn acquire(&self) -> Pending<Result<Box<dyn MicStream>, MediaError>> {
        let mode = lock_or_recover(&self.mode, "SimMicrophone::acquire").clone();
        match mode {
            SimMode::Immediate => Pending::ready(Ok(self.open_stream())),
            SimMode::Fail(reason) => Pending::ready(Err(MediaError::DeviceUnavailable(reason))),
            SimMode::Deferred => {
                let (resolver, pending) = pending();
                lock_or_recover(&self.parked, "SimMicrophone::acquire").push_back(resolver);
                pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Speech recognizer
// ---------------------------------------------------------------------------

pub struct SimRecognizer {
    journal: Arc<SimJournal>,
    mode: Mutex<SimMode>,
    feed: Mutex<Option<Sender<RecognitionEvent>>>,
    parked: Mutex<VecDeque<Resolver<Result<Box<dyn RecognitionStream>, MediaError>>>>,
}

struct SimRecognitionStream {
    events: Receiver<RecognitionEvent>,
    journal: Arc<SimJournal>,
}

impl RecognitionStream for SimRecognitionStream {
    fn try_next(&mut self) -> Option<RecognitionEvent> {
        self.events.try_recv().ok()
    }

    fn stop(self: Box<Self>) {
        self.journal.record(SimOp::RecognizerStopped);
    }
}

impl SimRecognizer {
    fn new(journal: Arc<SimJournal>) -> Self {
        Self {
            journal,
            mode: Mutex::new(SimMode::Immediate),
            feed: Mutex::new(None),
            parked: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_mode(&self, mode: SimMode) {
        *lock_or_recover(&self.mode, "SimRecognizer::set_mode") = mode;
    }

    fn open_stream(&self) -> Box<dyn RecognitionStream> {
        let (tx, rx) = unbounded();
        *lock_or_recover(&self.feed, "SimRecognizer::open_stream") = Some(tx);
        self.journal.record(SimOp::RecognizerStarted);
        Box::new(SimRecognitionStream {
            events: rx,
            journal: self.journal.clone(),
        })
    }

    pub fn resolve_next(&self) -> bool {
        let resolver = lock_or_recover(&self.parked, "SimRecognizer::resolve_next").pop_front();
        let Some(resolver) = resolver else {
            return false;
        };
        if let Err(Ok(stream)) = resolver.resolve(Ok(self.open_stream())) {
            stream.stop();
        }
        true
    }

    /// Deliver an event to the most recently started recognition stream.
    /// Returns false when no stream is listening.
    pub fn push(&self, event: RecognitionEvent) -> bool {
        let feed = lock_or_recover(&self.feed, "SimRecognizer::push");
        feed.as_ref().is_some_and(|tx| tx.send(event).is_ok())
    }

    pub fn say(&self, text: &str, is_final: bool) -> bool {
        self.push(RecognitionEvent::Segment {
            text: text.to_string(),
            is_final,
        })
    }
}

impl SpeechRecognizer for SimRecognizer {
    fn start(&self, _lang: &str) -> Pending<Result<Box<dyn RecognitionStream>, MediaError>> {
        let mode = lock_or_recover(&self.mode, "SimRecognizer::start").clone();
        match mode {
            SimMode::Immediate => Pending::ready(Ok(self.open_stream())),
            SimMode::Fail(reason) => Pending::ready(Err(MediaError::DeviceUnavailable(reason))),
            SimMode::Deferred => {
                let (resolver, pending) = pending();
                lock_or_recover(&self.parked, "SimRecognizer::start").push_back(resolver);
                pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Speech synthesizer
// ---------------------------------------------------------------------------

pub struct SimSynthesizer {
    journal: Arc<SimJournal>,
    mode: Mutex<SimMode>,
    parked: Mutex<VecDeque<(String, Resolver<Result<AudioBlob, MediaError>>)>>,
}

impl SimSynthesizer {
    fn new(journal: Arc<SimJournal>) -> Self {
        Self {
            journal,
            mode: Mutex::new(SimMode::Immediate),
            parked: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_mode(&self, mode: SimMode) {
        *lock_or_recover(&self.mode, "SimSynthesizer::set_mode") = mode;
    }

    fn render(&self, text: &str) -> AudioBlob {
        self.journal.record(SimOp::Synthesized(text.to_string()));
        AudioBlob {
            bytes: text.as_bytes().to_vec(),
            mime: "audio/mpeg".to_string(),
        }
    }

    /// Finish the oldest parked synthesis. Late results are simply dropped.
    pub fn resolve_next(&self) -> bool {
        let parked = lock_or_recover(&self.parked, "SimSynthesizer::resolve_next").pop_front();
        let Some((text, resolver)) = parked else {
            return false;
        };
        let _ = resolver.resolve(Ok(self.render(&text)));
        true
    }
}

impl SpeechSynthesizer for SimSynthesizer {
    fn synthesize(&self, text: &str) -> Pending<Result<AudioBlob, MediaError>> {
        let mode = lock_or_recover(&self.mode, "SimSynthesizer::synthesize").clone();
        match mode {
            SimMode::Immediate => Pending::ready(Ok(self.render(text))),
            SimMode::Fail(reason) => Pending::ready(Err(MediaError::ProviderFailure(reason))),
            SimMode::Deferred => {
                let (resolver, pending) = pending();
                lock_or_recover(&self.parked, "SimSynthesizer::synthesize")
                    .push_back((text.to_string(), resolver));
                pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Media output
// ---------------------------------------------------------------------------

struct SimPlayer {
    track_id: TrackId,
    duration_ms: u64,
    clock: ManualClock,
    journal: Arc<SimJournal>,
    fail_on_play: bool,
    base_ms: u64,
    resumed_at: Option<Instant>,
    rate: PlaybackRate,
    looping: bool,
}

impl SimPlayer {
    fn raw_position(&self) -> u64 {
        let Some(resumed_at) = self.resumed_at else {
            return self.base_ms;
        };
        let played = millis_between(resumed_at, self.clock.now()) as f64;
        self.base_ms + (played * f64::from(self.rate.as_f32())) as u64
    }

    fn settle(&mut self) {
        self.base_ms = self.position_ms();
        if self.resumed_at.is_some() {
            self.resumed_at = Some(self.clock.now());
        }
    }
}

impl PlayerHandle for SimPlayer {
    fn play(&mut self) -> Result<(), MediaError> {
        if self.fail_on_play {
            return Err(MediaError::PlaybackFailure("decoder rejected stream".into()));
        }
        self.journal.record(SimOp::Play(self.track_id.clone()));
        if self.resumed_at.is_none() {
            self.resumed_at = Some(self.clock.now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.journal.record(SimOp::Pause(self.track_id.clone()));
        self.base_ms = self.position_ms();
        self.resumed_at = None;
    }

    fn seek(&mut self, position_ms: u64) {
        self.journal
            .record(SimOp::Seek(self.track_id.clone(), position_ms));
        self.base_ms = position_ms.min(self.duration_ms);
        if self.resumed_at.is_some() {
            self.resumed_at = Some(self.clock.now());
        }
    }

    fn position_ms(&self) -> u64 {
        let raw = self.raw_position();
        if self.looping && self.duration_ms > 0 {
            raw % self.duration_ms
        } else {
            raw.min(self.duration_ms)
        }
    }

    fn duration_ms(&self) -> Option<u64> {
        Some(self.duration_ms)
    }

    fn set_rate(&mut self, rate: PlaybackRate) {
        self.journal.record(SimOp::Rate(self.track_id.clone(), rate));
        self.settle();
        self.rate = rate;
    }

    fn set_looping(&mut self, looping: bool) {
        self.journal
            .record(SimOp::Loop(self.track_id.clone(), looping));
        self.settle();
        self.looping = looping;
    }

    fn has_ended(&self) -> bool {
        !self.looping && self.raw_position() >= self.duration_ms
    }

    fn stop(self: Box<Self>) {
        self.journal.record(SimOp::Stop(self.track_id.clone()));
    }
}

type PlayerResult = Result<Box<dyn PlayerHandle>, MediaError>;

pub struct SimOutput {
    clock: ManualClock,
    journal: Arc<SimJournal>,
    mode: Mutex<SimMode>,
    fail_on_play: Mutex<Vec<TrackId>>,
    parked: Mutex<VecDeque<(AudioTrack, Resolver<PlayerResult>)>>,
}

impl SimOutput {
    fn new(clock: ManualClock, journal: Arc<SimJournal>) -> Self {
        Self {
            clock,
            journal,
            mode: Mutex::new(SimMode::Immediate),
            fail_on_play: Mutex::new(Vec::new()),
            parked: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_mode(&self, mode: SimMode) {
        *lock_or_recover(&self.mode, "SimOutput::set_mode") = mode;
    }

    /// Make `play()` fail for this track once it has loaded.
    pub fn fail_on_play(&self, track_id: impl Into<TrackId>) {
        lock_or_recover(&self.fail_on_play, "SimOutput::fail_on_play").push(track_id.into());
    }

    fn open_player(&self, track: &AudioTrack) -> Box<dyn PlayerHandle> {
        self.journal.record(SimOp::Loaded(track.id.clone()));
        let fail_on_play =
            lock_or_recover(&self.fail_on_play, "SimOutput::open_player").contains(&track.id);
        Box::new(SimPlayer {
            track_id: track.id.clone(),
            duration_ms: track
                .metadata
                .duration_ms
                .unwrap_or(DEFAULT_SIM_DURATION_MS),
            clock: self.clock.clone(),
            journal: self.journal.clone(),
            fail_on_play,
            base_ms: 0,
            resumed_at: None,
            rate: PlaybackRate::Normal,
            looping: false,
        })
    }

    /// Finish buffering the oldest parked load. A load nobody waits for any
    /// more is stopped straight away.
    pub fn resolve_next(&self) -> bool {
        let parked = lock_or_recover(&self.parked, "SimOutput::resolve_next").pop_front();
        let Some((track, resolver)) = parked else {
            return false;
        };
        if let Err(Ok(player)) = resolver.resolve(Ok(self.open_player(&track))) {
            player.stop();
        }
        true
    }

    pub fn parked(&self) -> usize {
        lock_or_recover(&self.parked, "SimOutput::parked").len()
    }
}

impl MediaOutput for SimOutput {
    fn load(&self, track: &AudioTrack) -> Pending<PlayerResult> {
        let mode = lock_or_recover(&self.mode, "SimOutput::load").clone();
        match mode {
            SimMode::Immediate => Pending::ready(Ok(self.open_player(track))),
            SimMode::Fail(reason) => Pending::ready(Err(MediaError::PlaybackFailure(reason))),
            SimMode::Deferred => {
                let (resolver, pending) = pending();
                lock_or_recover(&self.parked, "SimOutput::load")
                    .push_back((track.clone(), resolver));
                pending
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host bundle
// ---------------------------------------------------------------------------

/// Every simulated collaborator wired to one clock and one journal.
#[derive(Clone)]
pub struct SimHost {
    pub clock: ManualClock,
    pub journal: Arc<SimJournal>,
    pub microphone: Arc<SimMicrophone>,
    pub recognizer: Arc<SimRecognizer>,
    pub synthesizer: Arc<SimSynthesizer>,
    pub audio: Arc<SimOutput>,
    pub video: Arc<SimOutput>,
}

impl SimHost {
    pub fn new() -> Self {
        let clock = ManualClock::new();
        let journal = Arc::new(SimJournal::default());
        Self {
            microphone: Arc::new(SimMicrophone::new(clock.clone(), journal.clone())),
            recognizer: Arc::new(SimRecognizer::new(journal.clone())),
            synthesizer: Arc::new(SimSynthesizer::new(journal.clone())),
            audio: Arc::new(SimOutput::new(clock.clone(), journal.clone())),
            video: Arc::new(SimOutput::new(clock.clone(), journal.clone())),
            clock,
            journal,
        }
    }

    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            microphone: self.microphone.clone(),
            recognizer: self.recognizer.clone(),
            synthesizer: self.synthesizer.clone(),
            audio_output: self.audio.clone(),
            video_output: self.video.clone(),
        }
    }

    pub fn clock_handle(&self) -> Arc<dyn Clock> {
        Arc::new(self.clock.clone())
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}
