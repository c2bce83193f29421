use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::protocol::{IpcCommand, IpcEvent, SessionPhase, SimTarget};
use crate::app::{Coordinator, CoordinatorEvent};
use crate::capabilities::{HostCapabilities, Microphone, RecognitionEvent};
use crate::clock::{Clock, ManualClock, SystemClock};
use crate::config::AppConfig;
use crate::error::{ChannelError, StopReason};
use crate::gesture::{ArbiterEvent, ComposerId};
use crate::handoff::{RestoreBus, MINI_PLAYER_SCOPE};
use crate::host::sim::{SimHost, SimMode};
use crate::playback::{AudioTrack, TrackSource};
use crate::{lock_or_recover, log_debug, log_debug_content};

/// Granularity of simulated time during `wait`, so hold timers fire close to
/// their deadline rather than at the end of a long wait.
const WAIT_STEP_MS: u64 = 10;
/// How long the loop blocks for input before polling anyway.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

enum SessionClock {
    Manual(ManualClock),
    System,
}

/// One coordinator driven by JSON commands.
///
/// Collaborators come from the simulated host. With the `native-mic` feature
/// the microphone is the system input device and time is wall-clock time;
/// otherwise time only moves on `wait`.
pub struct IpcSession {
    host: SimHost,
    coordinator: Coordinator,
    clock: SessionClock,
    microphone: &'static str,
    session_id: String,
    finished: bool,
}

impl IpcSession {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let host = SimHost::new();
        let (microphone, label) = select_microphone(config, &host);
        let (clock, handle): (SessionClock, Arc<dyn Clock>) = if label == "sim" {
            (SessionClock::Manual(host.clock.clone()), host.clock_handle())
        } else {
            (SessionClock::System, Arc::new(SystemClock))
        };
        let capabilities = HostCapabilities {
            microphone,
            ..host.capabilities()
        };
        let coordinator = Coordinator::new(
            config.coordinator_config()?,
            capabilities,
            handle,
            Arc::new(RestoreBus::new()),
        );

        let session_id = format!(
            "{:x}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis()
        );

        Ok(Self {
            host,
            coordinator,
            clock,
            microphone: label,
            session_id,
            finished: false,
        })
    }

    pub fn ready_event(&self) -> IpcEvent {
        let config = self.coordinator.config();
        IpcEvent::Ready {
            session_id: self.session_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            exclusivity: config.exclusivity.label().to_string(),
            hold_threshold_ms: config.hold_threshold.as_millis() as u64,
            microphone: self.microphone.to_string(),
        }
    }

    /// Set once `quit` was received.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn host(&self) -> &SimHost {
        &self.host
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Parse and apply one command line. Blank lines produce nothing.
    pub fn handle_line(&mut self, line: &str) -> Vec<IpcEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<IpcCommand>(trimmed) {
            Ok(cmd) => self.handle_command(cmd),
            Err(err) => vec![IpcEvent::Error {
                message: format!("Invalid command: {err}"),
                recoverable: true,
            }],
        }
    }

    pub fn handle_command(&mut self, cmd: IpcCommand) -> Vec<IpcEvent> {
        log_debug_content(&format!("IPC command received: {cmd:?}"));
        let started = Instant::now();
        let mut events = match self.apply(cmd) {
            Ok(events) => events,
            Err(err) => vec![IpcEvent::Error {
                message: format!("{err:#}"),
                recoverable: true,
            }],
        };
        events.extend(self.tick());
        if self.coordinator.config().log_timings {
            log_debug(&format!(
                "timing|ipc_command|elapsed_us={}|events={}",
                started.elapsed().as_micros(),
                events.len()
            ));
        }
        events
    }

    /// Poll every component once and translate what they reported.
    pub fn tick(&mut self) -> Vec<IpcEvent> {
        self.coordinator
            .poll()
            .into_iter()
            .map(translate_event)
            .collect()
    }

    /// Release every device. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.coordinator.teardown();
    }

    fn apply(&mut self, cmd: IpcCommand) -> Result<Vec<IpcEvent>> {
        let mut replies = Vec::new();
        match cmd {
            IpcCommand::OpenComposer { view, composer } => {
                self.coordinator.open_composer(view, composer)?;
            }
            IpcCommand::CloseComposer { composer } => {
                let text = self.coordinator.close_composer(&composer)?;
                replies.push(IpcEvent::Text {
                    composer_id: composer,
                    text,
                });
            }
            IpcCommand::PressStart { composer } => {
                self.coordinator.composer_mut(&composer)?.on_press_start();
            }
            IpcCommand::PressEnd { composer } => {
                self.coordinator.composer_mut(&composer)?.on_press_end();
            }
            IpcCommand::PressCancel { composer } => {
                self.coordinator.composer_mut(&composer)?.on_press_cancel();
            }
            IpcCommand::SetDraft { composer, text } => {
                self.coordinator.composer_mut(&composer)?.set_draft(text);
            }
            IpcCommand::SetAttachment { composer, pending } => {
                self.coordinator
                    .composer_mut(&composer)?
                    .set_attachment_pending(pending);
            }
            IpcCommand::TakeText { composer } => {
                let text = self.coordinator.composer_mut(&composer)?.take_committed_text();
                replies.push(IpcEvent::Text {
                    composer_id: composer,
                    text,
                });
            }
            IpcCommand::SessionState { composer } => {
                let arbiter = self.coordinator.composer(&composer)?;
                replies.push(IpcEvent::Session {
                    state: arbiter.session().label().to_string(),
                    is_pressed: arbiter.is_pressed(),
                    text: arbiter.committed_text().to_string(),
                    composer_id: composer,
                });
            }

            IpcCommand::Recognize { text, is_final } => {
                self.push_recognition(RecognitionEvent::Segment { text, is_final })?;
            }
            IpcCommand::RecognizerError { error_kind } => {
                self.push_recognition(RecognitionEvent::Failed { error_kind })?;
            }
            IpcCommand::RecognizerEnd => {
                self.push_recognition(RecognitionEvent::Ended)?;
            }

            IpcCommand::RegisterTrack {
                view,
                track_id,
                kind,
                url,
                duration_ms,
                looping,
            } => {
                let mut track = AudioTrack::from_url(track_id, kind, url).looping(looping);
                if let Some(duration_ms) = duration_ms {
                    track = track.with_duration_ms(duration_ms);
                }
                let shared = self.coordinator.channel(&view);
                lock_or_recover(&shared, "ipc::register_track").register(track);
            }
            IpcCommand::Play {
                view,
                track_id,
                from_ms,
            } => {
                let shared = self.coordinator.channel(&view);
                let mut channel = lock_or_recover(&shared, "ipc::play");
                let track = channel
                    .track(&track_id)
                    .cloned()
                    .ok_or(ChannelError::UnknownTrack(track_id))?;
                channel.play(track, from_ms);
            }
            IpcCommand::Toggle { view, track_id } => {
                let shared = self.coordinator.channel(&view);
                let mut channel = lock_or_recover(&shared, "ipc::toggle");
                let state = channel.toggle_play(&track_id)?;
                replies.push(IpcEvent::State {
                    scope: channel.scope().to_string(),
                    state,
                });
            }
            IpcCommand::Pause { view } => {
                let shared = self.coordinator.channel(&view);
                lock_or_recover(&shared, "ipc::pause").pause();
            }
            IpcCommand::Stop { view } => {
                let shared = self.coordinator.channel(&view);
                lock_or_recover(&shared, "ipc::stop").stop(StopReason::User);
            }
            IpcCommand::Seek { view, ms } => {
                let shared = self.coordinator.channel(&view);
                lock_or_recover(&shared, "ipc::seek").seek(ms)?;
            }
            IpcCommand::SetRate { view, rate } => {
                let shared = self.coordinator.channel(&view);
                lock_or_recover(&shared, "ipc::set_rate").set_rate(rate);
            }
            IpcCommand::SetLoop { view, looping } => {
                let shared = self.coordinator.channel(&view);
                lock_or_recover(&shared, "ipc::set_loop").set_loop(looping);
            }
            IpcCommand::Speak {
                view,
                message_id,
                text,
            } => {
                let shared = self.coordinator.channel(&view);
                lock_or_recover(&shared, "ipc::speak").speak(&message_id, &text);
            }
            IpcCommand::PlaybackState { view } => {
                let shared = self.coordinator.channel(&view);
                let channel = lock_or_recover(&shared, "ipc::playback_state");
                replies.push(IpcEvent::State {
                    scope: channel.scope().to_string(),
                    state: channel.current(),
                });
            }

            IpcCommand::AddFeed { view } => self.coordinator.add_feed(view),
            IpcCommand::AddPost {
                view,
                post,
                url,
                duration_ms,
            } => {
                self.coordinator
                    .feed_mut(&view)?
                    .add_item(post, url, duration_ms);
            }
            IpcCommand::Activate { view, post } => {
                self.coordinator.feed_mut(&view)?.activate(&post)?;
            }
            IpcCommand::Focus { view } => self.coordinator.focus_view(&view),
            IpcCommand::CloseView { view } => self.coordinator.close_view(&view),
            IpcCommand::Minimize {
                view,
                post,
                position_ms,
            } => {
                self.coordinator.minimize(&view, &post, position_ms)?;
            }
            IpcCommand::Restore => {
                self.coordinator.restore_floating()?;
            }
            IpcCommand::Discard => self.coordinator.discard_floating()?,
            IpcCommand::MiniToggle => {
                let state = self.coordinator.mini_player().toggle_play()?;
                replies.push(IpcEvent::State {
                    scope: MINI_PLAYER_SCOPE.to_string(),
                    state,
                });
            }

            IpcCommand::Wait { ms } => replies.extend(self.wait(ms)),
            IpcCommand::Fail { target, reason } => {
                self.set_sim_mode(target, SimMode::Fail(reason))?;
            }
            IpcCommand::Recover { target } => self.set_sim_mode(target, SimMode::Immediate)?,
            IpcCommand::Quit => {
                log_debug("IPC quit requested");
                self.finished = true;
            }
        }
        Ok(replies)
    }

    fn wait(&mut self, ms: u64) -> Vec<IpcEvent> {
        let mut events = Vec::new();
        let manual = match &self.clock {
            SessionClock::Manual(clock) => Some(clock.clone()),
            SessionClock::System => None,
        };
        match manual {
            Some(clock) => {
                let mut remaining = ms;
                while remaining > 0 {
                    let step = remaining.min(WAIT_STEP_MS);
                    clock.advance_ms(step);
                    remaining -= step;
                    events.extend(self.tick());
                }
            }
            None => {
                let deadline = Instant::now() + Duration::from_millis(ms);
                while Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(WAIT_STEP_MS));
                    events.extend(self.tick());
                }
            }
        }
        events
    }

    fn push_recognition(&self, event: RecognitionEvent) -> Result<()> {
        if !self.host.recognizer.push(event) {
            bail!("no recognition stream is listening");
        }
        Ok(())
    }

    fn set_sim_mode(&self, target: SimTarget, mode: SimMode) -> Result<()> {
        log_debug(&format!("sim {} mode -> {mode:?}", target.as_str()));
        match target {
            SimTarget::Microphone => {
                if self.microphone != "sim" {
                    bail!("the microphone is a native device; faults cannot be injected");
                }
                self.host.microphone.set_mode(mode);
            }
            SimTarget::Recognizer => self.host.recognizer.set_mode(mode),
            SimTarget::Synthesizer => self.host.synthesizer.set_mode(mode),
            SimTarget::Audio => self.host.audio.set_mode(mode),
            SimTarget::Video => self.host.video.set_mode(mode),
        }
        Ok(())
    }
}

#[cfg(feature = "native-mic")]
fn select_microphone(config: &AppConfig, _host: &SimHost) -> (Arc<dyn Microphone>, &'static str) {
    let microphone: Arc<dyn Microphone> = Arc::new(crate::host::native::NativeMicrophone::new(
        config.input_device.clone(),
    ));
    (microphone, "native")
}

#[cfg(not(feature = "native-mic"))]
fn select_microphone(config: &AppConfig, host: &SimHost) -> (Arc<dyn Microphone>, &'static str) {
    if let Some(device) = &config.input_device {
        log_debug(&format!(
            "--input-device '{device}' ignored: built without native-mic"
        ));
    }
    let microphone: Arc<dyn Microphone> = host.microphone.clone();
    (microphone, "sim")
}

// ============================================================================
// Event Translation
// ============================================================================

fn translate_event(event: CoordinatorEvent) -> IpcEvent {
    match event {
        CoordinatorEvent::Composer { composer_id, event } => composer_event(composer_id, event),
        CoordinatorEvent::Channel { scope, event } => IpcEvent::Playback {
            scope,
            payload: event,
        },
        CoordinatorEvent::Feed { view_id, event } => IpcEvent::Feed {
            view_id,
            payload: event,
        },
        CoordinatorEvent::MiniPlayer { event } => IpcEvent::MiniPlayer { payload: event },
    }
}

fn composer_event(composer_id: ComposerId, event: ArbiterEvent) -> IpcEvent {
    let recording = |composer_id, phase, reason| IpcEvent::Recording {
        composer_id,
        phase,
        track_id: None,
        duration_ms: None,
        bytes: None,
        reason,
    };
    match event {
        ArbiterEvent::DictationStarted => IpcEvent::Dictation {
            composer_id,
            phase: SessionPhase::Started,
            reason: None,
        },
        ArbiterEvent::DictationStopped { reason } => IpcEvent::Dictation {
            composer_id,
            phase: SessionPhase::Stopped,
            reason: Some(reason),
        },
        ArbiterEvent::TranscriptPartial { text } => IpcEvent::Transcript {
            composer_id,
            text,
            is_final: false,
        },
        ArbiterEvent::TranscriptCommitted { text } => {
            log_debug_content(&format!("transcript committed to {composer_id}: {text}"));
            IpcEvent::Transcript {
                composer_id,
                text,
                is_final: true,
            }
        }
        ArbiterEvent::RecordingStarted => recording(composer_id, SessionPhase::Started, None),
        ArbiterEvent::RecordingFinished(artifact) => IpcEvent::Recording {
            composer_id,
            phase: SessionPhase::Finished,
            bytes: match &artifact.track.source {
                TrackSource::Blob(handle) => Some(handle.len()),
                TrackSource::Url(_) => None,
            },
            track_id: Some(artifact.track.id),
            duration_ms: Some(artifact.duration_ms),
            reason: None,
        },
        ArbiterEvent::RecordingDiscarded { reason } => {
            recording(composer_id, SessionPhase::Discarded, Some(reason))
        }
        ArbiterEvent::Notice(notice) => IpcEvent::Notice {
            source: composer_id.to_string(),
            message: notice.message(),
            detail: notice,
        },
    }
}

// ============================================================================
// Main Event Loop
// ============================================================================

fn write_event<W: Write>(writer: &mut W, event: &IpcEvent) -> Result<()> {
    let json = serde_json::to_string(event).context("failed to encode IPC event")?;
    writeln!(writer, "{json}")?;
    writer.flush()?;
    Ok(())
}

fn spawn_stdin_reader(tx: Sender<String>) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("voxfeed-stdin".into())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break; // Main loop has exited
                }
            }
            log_debug("Stdin reader thread exiting");
        })
        .context("failed to spawn stdin reader")
}

/// Feed `commands` to `session` until `quit` or the source closes, writing
/// every event as one JSON line. Components are polled while input is idle.
pub fn run_session<W: Write>(
    session: &mut IpcSession,
    commands: &Receiver<String>,
    writer: &mut W,
) -> Result<()> {
    write_event(writer, &session.ready_event())?;
    while !session.is_finished() {
        let events = match commands.recv_timeout(IDLE_POLL_INTERVAL) {
            Ok(line) => session.handle_line(&line),
            Err(RecvTimeoutError::Timeout) => session.tick(),
            Err(RecvTimeoutError::Disconnected) => {
                log_debug("Command source closed, exiting");
                break;
            }
        };
        for event in &events {
            write_event(writer, event)?;
        }
    }
    session.shutdown();
    log_debug("IPC session exiting");
    Ok(())
}

/// Run a JSON session over stdin/stdout, or over `--script` when given.
pub fn run_ipc_mode(config: AppConfig) -> Result<()> {
    log_debug("Starting JSON IPC session");
    let mut session = IpcSession::new(&config)?;
    let (tx, rx) = unbounded();
    match &config.script {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open script {}", path.display()))?;
            for line in BufReader::new(file).lines() {
                let line = line.with_context(|| format!("failed to read {}", path.display()))?;
                let _ = tx.send(line);
            }
            drop(tx);
        }
        None => {
            let _stdin_handle = spawn_stdin_reader(tx)?;
        }
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_session(&mut session, &rx, &mut out)
}
