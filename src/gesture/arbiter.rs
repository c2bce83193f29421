use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::dictation::commit_segment;
use super::session::{ArbiterEvent, ComposerId, InputSession, RecordedArtifact};
use crate::capabilities::{
    MicStream, Microphone, RecognitionEvent, RecognitionStream, SpeechRecognizer,
};
use crate::clock::{millis_between, Clock};
use crate::config::CoordinatorConfig;
use crate::error::{MediaError, Notice, StopReason};
use crate::mic::{LeaseTicket, MicHandle, MicrophoneSlot};
use crate::pending::{Orphanage, Pending, PendingPoll};
use crate::playback::{AudioTrack, BlobHandle, SharedChannel, TrackKind, TrackSource};
use crate::{lock_or_recover, log_debug, log_debug_content};

type StreamResult = Result<Box<dyn MicStream>, MediaError>;
type RecognizerResult = Result<Box<dyn RecognitionStream>, MediaError>;

/// One physical press on the mic control.
struct Press {
    started_at: Instant,
    /// Armed hold timer; `None` once it fired.
    hold_deadline: Option<Instant>,
    hold_fired: bool,
}

enum Phase {
    Idle,
    Dictating {
        ticket: LeaseTicket,
        starting: Option<Pending<RecognizerResult>>,
        partial: String,
    },
    Recording {
        ticket: LeaseTicket,
        acquiring: Option<Pending<StreamResult>>,
        started_at: Instant,
    },
}

impl Phase {
    fn ticket(&self) -> Option<LeaseTicket> {
        match self {
            Phase::Idle => None,
            Phase::Dictating { ticket, .. } | Phase::Recording { ticket, .. } => Some(*ticket),
        }
    }
}

/// Tap-vs-hold classifier for a composer's microphone control.
///
/// A press shorter than the hold threshold toggles dictation; a press that
/// outlives it records a voice note until release. The hold timer is
/// delivered by [`poll`](Self::poll), so hosts call it from their event loop.
pub struct InputGestureArbiter {
    id: ComposerId,
    clock: Arc<dyn Clock>,
    hold_threshold: Duration,
    lang: String,
    mic: Arc<MicrophoneSlot>,
    microphone: Arc<dyn Microphone>,
    recognizer: Arc<dyn SpeechRecognizer>,
    playback: Option<SharedChannel>,
    draft: String,
    attachment_pending: bool,
    press: Option<Press>,
    phase: Phase,
    stream_orphans: Orphanage<StreamResult>,
    recognizer_orphans: Orphanage<RecognizerResult>,
    events: Vec<ArbiterEvent>,
    recordings: u64,
}

impl InputGestureArbiter {
    pub fn new(
        id: ComposerId,
        config: &CoordinatorConfig,
        clock: Arc<dyn Clock>,
        mic: Arc<MicrophoneSlot>,
        microphone: Arc<dyn Microphone>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        Self {
            id,
            clock,
            hold_threshold: config.hold_threshold,
            lang: config.lang.clone(),
            mic,
            microphone,
            recognizer,
            playback: None,
            draft: String::new(),
            attachment_pending: false,
            press: None,
            phase: Phase::Idle,
            stream_orphans: Orphanage::new(),
            recognizer_orphans: Orphanage::new(),
            events: Vec::new(),
            recordings: 0,
        }
    }

    /// Stop this channel before a voice note starts recording.
    pub fn with_playback(mut self, channel: SharedChannel) -> Self {
        self.playback = Some(channel);
        self
    }

    pub fn composer_id(&self) -> &ComposerId {
        &self.id
    }

    pub fn session(&self) -> InputSession {
        match &self.phase {
            Phase::Idle => InputSession::Idle,
            Phase::Dictating { partial, .. } => InputSession::Dictating {
                partial_text: partial.clone(),
            },
            Phase::Recording { started_at, .. } => InputSession::Recording {
                started_at: *started_at,
                elapsed_ms: millis_between(*started_at, self.clock.now()),
            },
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.press.is_some()
    }

    /// Composer text, including every committed dictation segment.
    pub fn committed_text(&self) -> &str {
        &self.draft
    }

    /// Hand the composer text to the caller (e.g. on send) and clear it.
    pub fn take_committed_text(&mut self) -> String {
        std::mem::take(&mut self.draft)
    }

    /// Mirror text typed by the user.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn set_attachment_pending(&mut self, pending: bool) {
        self.attachment_pending = pending;
    }

    pub fn drain_events(&mut self) -> Vec<ArbiterEvent> {
        std::mem::take(&mut self.events)
    }

    /// Mic disabled: idle composer already holding text or an attachment.
    fn mic_disabled(&self) -> bool {
        matches!(self.phase, Phase::Idle)
            && (!self.draft.trim().is_empty() || self.attachment_pending)
    }

    pub fn on_press_start(&mut self) {
        if self.press.is_some() {
            log_debug(&format!("{}: press start while pressed; ignored", self.id));
            return;
        }
        if self.mic_disabled() {
            log_debug(&format!(
                "{}: press ignored (composer has text or attachment)",
                self.id
            ));
            return;
        }
        let now = self.clock.now();
        self.press = Some(Press {
            started_at: now,
            hold_deadline: Some(now + self.hold_threshold),
            hold_fired: false,
        });
        debug!(composer = %self.id, "mic press armed");
    }

    pub fn on_press_end(&mut self) {
        // Disarm the hold timer before anything else can observe it.
        let Some(press) = self.press.take() else {
            return;
        };
        if press.hold_fired {
            if matches!(self.phase, Phase::Recording { .. }) {
                self.finish_recording();
            }
            return;
        }
        let held_ms = millis_between(press.started_at, self.clock.now());
        log_debug(&format!("{}: tap after {held_ms}ms", self.id));
        match self.phase {
            Phase::Idle => self.start_dictation(),
            Phase::Dictating { .. } => self.stop_dictation(StopReason::User),
            Phase::Recording { .. } => {}
        }
    }

    pub fn on_press_cancel(&mut self) {
        let Some(press) = self.press.take() else {
            return;
        };
        if press.hold_fired {
            if matches!(self.phase, Phase::Recording { .. }) {
                self.discard_recording(StopReason::User);
            }
        } else {
            log_debug(&format!("{}: press cancelled before hold", self.id));
        }
    }

    /// Deliver the hold timer, pick up device results, and drain recognizer output.
    pub fn poll(&mut self) {
        self.reap_orphans();
        self.check_superseded();

        let now = self.clock.now();
        let fire = match self.press.as_mut() {
            Some(press) => match press.hold_deadline {
                Some(deadline) if now >= deadline => {
                    press.hold_deadline = None;
                    press.hold_fired = true;
                    true
                }
                _ => false,
            },
            None => false,
        };
        if fire {
            self.begin_recording(now);
        }

        self.advance_dictation();
        self.advance_recording();
    }

    /// Forced stop on view close: recording discarded, committed text kept.
    pub fn teardown(&mut self) {
        self.press = None;
        match self.phase {
            Phase::Recording { .. } => self.discard_recording(StopReason::Teardown),
            Phase::Dictating { .. } => self.stop_dictation(StopReason::Teardown),
            Phase::Idle => {}
        }
    }

    fn emit(&mut self, event: ArbiterEvent) {
        self.events.push(event);
    }

    fn reap_orphans(&mut self) {
        let released = self.stream_orphans.reap(|result| {
            if let Ok(stream) = result {
                stream.release();
            }
        }) + self.recognizer_orphans.reap(|result| {
            if let Ok(stream) = result {
                stream.stop();
            }
        });
        if released > 0 {
            log_debug(&format!(
                "{}: released {released} late device handle(s)",
                self.id
            ));
        }
    }

    /// Another composer claimed the microphone out from under us.
    fn check_superseded(&mut self) {
        let Some(ticket) = self.phase.ticket() else {
            return;
        };
        if self.mic.is_current(ticket) {
            return;
        }
        info!(composer = %self.id, "mic superseded by another composer");
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Dictating { starting, .. } => {
                if let Some(pending) = starting {
                    self.recognizer_orphans.adopt(pending);
                }
                self.emit(ArbiterEvent::DictationStopped {
                    reason: StopReason::Superseded,
                });
            }
            Phase::Recording { acquiring, .. } => {
                if let Some(pending) = acquiring {
                    self.stream_orphans.adopt(pending);
                }
                self.emit(ArbiterEvent::RecordingDiscarded {
                    reason: StopReason::Superseded,
                });
            }
            Phase::Idle => {}
        }
    }

    fn start_dictation(&mut self) {
        let ticket = self.mic.claim(&self.id);
        let pending = self.recognizer.start(&self.lang);
        self.phase = Phase::Dictating {
            ticket,
            starting: Some(pending),
            partial: String::new(),
        };
        info!(composer = %self.id, "dictation started");
        self.emit(ArbiterEvent::DictationStarted);
        self.advance_dictation();
    }

    fn stop_dictation(&mut self, reason: StopReason) {
        let Phase::Dictating {
            ticket, starting, ..
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };
        if let Some(pending) = starting {
            self.recognizer_orphans.adopt(pending);
        }
        self.mic.release(ticket);
        info!(composer = %self.id, reason = reason.label(), "dictation stopped");
        self.emit(ArbiterEvent::DictationStopped { reason });
    }

    fn fail_dictation(&mut self, err: MediaError) {
        let notice = match &err {
            MediaError::DeviceUnavailable(reason) => Notice::DeviceUnavailable {
                reason: reason.clone(),
            },
            other => Notice::VoiceInputUnavailable {
                reason: other.to_string(),
            },
        };
        log_debug(&format!("{}: dictation failed: {err}", self.id));
        self.stop_dictation(StopReason::Failed);
        self.emit(ArbiterEvent::Notice(notice));
    }

    fn advance_dictation(&mut self) {
        let Phase::Dictating {
            ticket, starting, ..
        } = &mut self.phase
        else {
            return;
        };
        let ticket = *ticket;

        if let Some(pending) = starting.as_ref() {
            match pending.poll() {
                PendingPoll::Waiting => return,
                PendingPoll::Ready(Ok(stream)) => {
                    *starting = None;
                    if let Err(handle) = self.mic.install(ticket, MicHandle::Dictation(stream)) {
                        handle.release();
                        return;
                    }
                }
                PendingPoll::Ready(Err(err)) => {
                    *starting = None;
                    self.fail_dictation(err);
                    return;
                }
                PendingPoll::Abandoned => {
                    *starting = None;
                    self.fail_dictation(MediaError::ProviderFailure(
                        "recognizer never started".into(),
                    ));
                    return;
                }
            }
        }

        loop {
            let next = self
                .mic
                .with_handle(ticket, |handle| match handle {
                    MicHandle::Dictation(stream) => stream.try_next(),
                    MicHandle::Recording(_) => None,
                })
                .flatten();
            let Some(event) = next else {
                break;
            };
            match event {
                RecognitionEvent::Segment { text, is_final } => {
                    if is_final {
                        if let Phase::Dictating { partial, .. } = &mut self.phase {
                            partial.clear();
                        }
                        if let Some(committed) = commit_segment(&mut self.draft, &text) {
                            log_debug_content(&format!("{}: committed '{committed}'", self.id));
                            self.emit(ArbiterEvent::TranscriptCommitted { text: committed });
                        }
                    } else {
                        if let Phase::Dictating { partial, .. } = &mut self.phase {
                            partial.clone_from(&text);
                        }
                        self.emit(ArbiterEvent::TranscriptPartial { text });
                    }
                }
                RecognitionEvent::Failed { error_kind } => {
                    match MediaError::from_recognizer_kind(&error_kind) {
                        MediaError::NoSpeechDetected => {
                            log_debug(&format!("{}: no speech detected; continuing", self.id));
                        }
                        err => {
                            self.fail_dictation(err);
                            return;
                        }
                    }
                }
                RecognitionEvent::Ended => {
                    self.stop_dictation(StopReason::Finished);
                    return;
                }
            }
        }
    }

    fn begin_recording(&mut self, now: Instant) {
        if matches!(self.phase, Phase::Dictating { .. }) {
            self.stop_dictation(StopReason::Superseded);
        }
        if let Some(channel) = &self.playback {
            lock_or_recover(channel, "InputGestureArbiter::begin_recording")
                .stop(StopReason::Superseded);
        }
        let ticket = self.mic.claim(&self.id);
        let pending = self.microphone.acquire();
        self.phase = Phase::Recording {
            ticket,
            acquiring: Some(pending),
            started_at: now,
        };
        info!(composer = %self.id, "voice note recording started");
        self.emit(ArbiterEvent::RecordingStarted);
        self.advance_recording();
    }

    fn advance_recording(&mut self) {
        let Phase::Recording {
            ticket, acquiring, ..
        } = &mut self.phase
        else {
            return;
        };
        let ticket = *ticket;
        let Some(pending) = acquiring.as_ref() else {
            return;
        };
        let result = match pending.poll() {
            PendingPoll::Waiting => return,
            PendingPoll::Ready(result) => result,
            PendingPoll::Abandoned => Err(MediaError::DeviceUnavailable(
                "microphone request abandoned".into(),
            )),
        };
        *acquiring = None;
        match result {
            Ok(stream) => {
                if let Err(handle) = self.mic.install(ticket, MicHandle::Recording(stream)) {
                    handle.release();
                }
            }
            Err(err) => {
                log_debug(&format!("{}: microphone acquisition failed: {err}", self.id));
                self.mic.release(ticket);
                self.phase = Phase::Idle;
                self.emit(ArbiterEvent::RecordingDiscarded {
                    reason: StopReason::Failed,
                });
                let reason = match err {
                    MediaError::DeviceUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                self.emit(ArbiterEvent::Notice(Notice::DeviceUnavailable { reason }));
            }
        }
    }

    fn finish_recording(&mut self) {
        let Phase::Recording {
            ticket,
            acquiring,
            started_at,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };
        if let Some(pending) = acquiring {
            // Released before the device arrived: nothing was captured.
            self.stream_orphans.adopt(pending);
            self.mic.release(ticket);
            self.emit(ArbiterEvent::RecordingDiscarded {
                reason: StopReason::User,
            });
            return;
        }
        let duration_ms = millis_between(started_at, self.clock.now());
        match self.mic.take(ticket) {
            Some(MicHandle::Recording(stream)) => match stream.stop() {
                Ok(blob) => {
                    self.recordings += 1;
                    let track = AudioTrack::new(
                        format!("{}-voice-{}", self.id, self.recordings),
                        TrackKind::VoiceNote,
                        TrackSource::Blob(BlobHandle::new(blob)),
                    )
                    .with_duration_ms(duration_ms);
                    info!(composer = %self.id, duration_ms, "voice note recorded");
                    self.emit(ArbiterEvent::RecordingFinished(RecordedArtifact {
                        track,
                        duration_ms,
                    }));
                }
                Err(err) => {
                    log_debug(&format!("{}: recorder failed on stop: {err}", self.id));
                    self.emit(ArbiterEvent::RecordingDiscarded {
                        reason: StopReason::Failed,
                    });
                    self.emit(ArbiterEvent::Notice(Notice::DeviceUnavailable {
                        reason: err.to_string(),
                    }));
                }
            },
            Some(other) => {
                other.release();
                self.emit(ArbiterEvent::RecordingDiscarded {
                    reason: StopReason::Failed,
                });
            }
            None => {
                log_debug(&format!("{}: recording lost its microphone", self.id));
                self.emit(ArbiterEvent::RecordingDiscarded {
                    reason: StopReason::Superseded,
                });
            }
        }
    }

    fn discard_recording(&mut self, reason: StopReason) {
        let Phase::Recording {
            ticket, acquiring, ..
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return;
        };
        if let Some(pending) = acquiring {
            self.stream_orphans.adopt(pending);
        }
        self.mic.release(ticket);
        info!(composer = %self.id, reason = reason.label(), "voice note discarded");
        self.emit(ArbiterEvent::RecordingDiscarded { reason });
    }
}

impl Drop for InputGestureArbiter {
    fn drop(&mut self) {
        if let Some(ticket) = self.phase.ticket() {
            self.mic.release(ticket);
        }
    }
}
