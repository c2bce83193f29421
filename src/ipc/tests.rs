use super::protocol::*;
use super::session::*;
use crate::config::AppConfig;
use crate::error::{Notice, StopReason};
use crate::gesture::ComposerId;
use crate::handoff::{FeedEvent, HandoffEvent, PostId, ViewId};
use crate::playback::{ChannelEvent, PlaybackRate, TrackId, TrackKind};
use clap::Parser;
use crossbeam_channel::unbounded;

fn new_test_session() -> IpcSession {
    let config = AppConfig::parse_from(["voxfeed"]);
    IpcSession::new(&config).expect("session")
}

fn run(session: &mut IpcSession, lines: &[&str]) -> Vec<IpcEvent> {
    lines
        .iter()
        .flat_map(|line| session.handle_line(line))
        .collect()
}

fn errors(events: &[IpcEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| match event {
            IpcEvent::Error { message, .. } => Some(message.as_str()),
            _ => None,
        })
        .collect()
}

const OPEN_CHAT: &str = r#"{"cmd": "open_composer", "view": "chat", "composer": "chat-box"}"#;

// -------------------------------------------------------------------------
// IPC Command Deserialization Tests
// -------------------------------------------------------------------------

#[test]
fn test_deserialize_press_commands() {
    let json = r#"{"cmd": "press_start", "composer": "search"}"#;
    let cmd: IpcCommand = serde_json::from_str(json).unwrap();
    assert_eq!(
        cmd,
        IpcCommand::PressStart {
            composer: ComposerId::from("search")
        }
    );

    let json = r#"{"cmd": "press_cancel", "composer": "search"}"#;
    let cmd: IpcCommand = serde_json::from_str(json).unwrap();
    assert!(matches!(cmd, IpcCommand::PressCancel { .. }));
}

#[test]
fn test_deserialize_register_track_defaults() {
    let json = r#"{"cmd": "register_track", "view": "chat", "track_id": "n1",
        "kind": "voice_note", "url": "https://cdn/n1.webm"}"#;
    let cmd: IpcCommand = serde_json::from_str(json).unwrap();
    match cmd {
        IpcCommand::RegisterTrack {
            view,
            track_id,
            kind,
            duration_ms,
            looping,
            ..
        } => {
            assert_eq!(view, ViewId::from("chat"));
            assert_eq!(track_id, TrackId::from("n1"));
            assert_eq!(kind, TrackKind::VoiceNote);
            assert!(duration_ms.is_none());
            assert!(!looping);
        }
        _ => panic!("Expected RegisterTrack"),
    }
}

#[test]
fn test_deserialize_seek_accepts_negative_positions() {
    let json = r#"{"cmd": "seek", "view": "chat", "ms": -500}"#;
    let cmd: IpcCommand = serde_json::from_str(json).unwrap();
    match cmd {
        IpcCommand::Seek { ms, .. } => assert_eq!(ms, -500),
        _ => panic!("Expected Seek"),
    }
}

#[test]
fn test_deserialize_set_rate_rejects_unsupported_speed() {
    let ok = r#"{"cmd": "set_rate", "view": "chat", "rate": 1.5}"#;
    match serde_json::from_str::<IpcCommand>(ok).unwrap() {
        IpcCommand::SetRate { rate, .. } => assert_eq!(rate, PlaybackRate::OneAndHalf),
        _ => panic!("Expected SetRate"),
    }

    let bad = r#"{"cmd": "set_rate", "view": "chat", "rate": 3.0}"#;
    assert!(serde_json::from_str::<IpcCommand>(bad).is_err());
}

#[test]
fn test_deserialize_fault_injection() {
    let json = r#"{"cmd": "fail", "target": "synthesizer", "reason": "tts offline"}"#;
    let cmd: IpcCommand = serde_json::from_str(json).unwrap();
    assert_eq!(
        cmd,
        IpcCommand::Fail {
            target: SimTarget::Synthesizer,
            reason: "tts offline".to_string()
        }
    );

    let json = r#"{"cmd": "recover", "target": "video"}"#;
    let cmd: IpcCommand = serde_json::from_str(json).unwrap();
    assert_eq!(
        cmd,
        IpcCommand::Recover {
            target: SimTarget::Video
        }
    );
}

#[test]
fn test_deserialize_unit_commands() {
    for (json, expected) in [
        (r#"{"cmd": "restore"}"#, IpcCommand::Restore),
        (r#"{"cmd": "discard"}"#, IpcCommand::Discard),
        (r#"{"cmd": "mini_toggle"}"#, IpcCommand::MiniToggle),
        (r#"{"cmd": "recognizer_end"}"#, IpcCommand::RecognizerEnd),
        (r#"{"cmd": "quit"}"#, IpcCommand::Quit),
    ] {
        let cmd: IpcCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd, expected);
    }
}

// -------------------------------------------------------------------------
// IPC Event Serialization Tests
// -------------------------------------------------------------------------

#[test]
fn test_serialize_ready_event() {
    let event = IpcEvent::Ready {
        session_id: "test123".to_string(),
        version: "0.3.2".to_string(),
        exclusivity: "per-view".to_string(),
        hold_threshold_ms: 500,
        microphone: "sim".to_string(),
    };

    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains(r#""event":"ready""#));
    assert!(json.contains(r#""exclusivity":"per-view""#));
    assert!(json.contains(r#""hold_threshold_ms":500"#));
}

#[test]
fn test_serialize_recording_skips_empty_fields() {
    let started = IpcEvent::Recording {
        composer_id: ComposerId::from("chat"),
        phase: SessionPhase::Started,
        track_id: None,
        duration_ms: None,
        bytes: None,
        reason: None,
    };
    let json = serde_json::to_string(&started).unwrap();
    assert_eq!(
        json,
        r#"{"event":"recording","composer_id":"chat","phase":"started"}"#
    );

    let discarded = IpcEvent::Recording {
        composer_id: ComposerId::from("chat"),
        phase: SessionPhase::Discarded,
        track_id: None,
        duration_ms: None,
        bytes: None,
        reason: Some(StopReason::Teardown),
    };
    let json = serde_json::to_string(&discarded).unwrap();
    assert!(json.contains(r#""reason":"teardown""#));
}

#[test]
fn test_serialize_playback_event_nests_channel_event() {
    let event = IpcEvent::Playback {
        scope: "view:chat".to_string(),
        payload: ChannelEvent::TrackStopped {
            track_id: TrackId::from("n1"),
            position_ms: 1_200,
            reason: StopReason::Superseded,
        },
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains(r#""event":"playback""#));
    assert!(json.contains(r#""payload":{"kind":"track_stopped""#));
    assert!(json.contains(r#""reason":"superseded""#));
}

#[test]
fn test_serialize_notice_event() {
    let notice = Notice::DeviceUnavailable {
        reason: "permission denied".to_string(),
    };
    let event = IpcEvent::Notice {
        source: "chat".to_string(),
        message: notice.message(),
        detail: notice,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains(r#""event":"notice""#));
    assert!(json.contains(r#""notice":"device_unavailable""#));
    assert!(json.contains("Microphone unavailable: permission denied"));
}

// -------------------------------------------------------------------------
// Session Tests
// -------------------------------------------------------------------------

#[test]
fn test_invalid_json_is_recoverable_error() {
    let mut session = new_test_session();
    let events = session.handle_line("{not json");
    assert_eq!(events.len(), 1);
    match &events[0] {
        IpcEvent::Error {
            message,
            recoverable,
        } => {
            assert!(message.starts_with("Invalid command"));
            assert!(*recoverable);
        }
        other => panic!("Expected Error, got {other:?}"),
    }
    assert!(session.handle_line("   ").is_empty());
}

#[test]
fn test_unknown_composer_reports_error() {
    let mut session = new_test_session();
    let events = session.handle_line(r#"{"cmd": "press_start", "composer": "nope"}"#);
    assert_eq!(errors(&events), vec!["unknown composer 'nope'"]);
}

#[test]
fn test_tap_dictation_commits_transcript() {
    let mut session = new_test_session();
    let events = run(
        &mut session,
        &[
            OPEN_CHAT,
            r#"{"cmd": "press_start", "composer": "chat-box"}"#,
            r#"{"cmd": "wait", "ms": 120}"#,
            r#"{"cmd": "press_end", "composer": "chat-box"}"#,
            r#"{"cmd": "recognize", "text": "hello", "is_final": false}"#,
            r#"{"cmd": "recognize", "text": "hello there", "is_final": true}"#,
            r#"{"cmd": "press_start", "composer": "chat-box"}"#,
            r#"{"cmd": "press_end", "composer": "chat-box"}"#,
        ],
    );
    assert!(errors(&events).is_empty(), "{events:?}");
    assert!(events.contains(&IpcEvent::Dictation {
        composer_id: ComposerId::from("chat-box"),
        phase: SessionPhase::Started,
        reason: None,
    }));
    assert!(events.contains(&IpcEvent::Transcript {
        composer_id: ComposerId::from("chat-box"),
        text: "hello".to_string(),
        is_final: false,
    }));
    assert!(events.contains(&IpcEvent::Dictation {
        composer_id: ComposerId::from("chat-box"),
        phase: SessionPhase::Stopped,
        reason: Some(StopReason::User),
    }));

    let reply = session.handle_line(r#"{"cmd": "take_text", "composer": "chat-box"}"#);
    assert_eq!(
        reply.first(),
        Some(&IpcEvent::Text {
            composer_id: ComposerId::from("chat-box"),
            text: "hello there ".to_string(),
        })
    );
}

#[test]
fn test_hold_records_voice_note_measured_from_hold() {
    let mut session = new_test_session();
    let events = run(
        &mut session,
        &[
            OPEN_CHAT,
            r#"{"cmd": "press_start", "composer": "chat-box"}"#,
            r#"{"cmd": "wait", "ms": 1500}"#,
            r#"{"cmd": "press_end", "composer": "chat-box"}"#,
        ],
    );
    assert!(errors(&events).is_empty(), "{events:?}");
    assert!(events.contains(&IpcEvent::Recording {
        composer_id: ComposerId::from("chat-box"),
        phase: SessionPhase::Started,
        track_id: None,
        duration_ms: None,
        bytes: None,
        reason: None,
    }));
    assert!(events.contains(&IpcEvent::Recording {
        composer_id: ComposerId::from("chat-box"),
        phase: SessionPhase::Finished,
        track_id: Some(TrackId::from("chat-box-voice-1")),
        duration_ms: Some(1_000),
        bytes: Some(100),
        reason: None,
    }));
    assert_eq!(session.coordinator().mic_holder(), None);
}

#[test]
fn test_session_state_reports_live_phase() {
    let mut session = new_test_session();
    run(
        &mut session,
        &[
            OPEN_CHAT,
            r#"{"cmd": "press_start", "composer": "chat-box"}"#,
            r#"{"cmd": "wait", "ms": 600}"#,
        ],
    );
    let reply = session.handle_line(r#"{"cmd": "session_state", "composer": "chat-box"}"#);
    match reply.first() {
        Some(IpcEvent::Session {
            state, is_pressed, ..
        }) => {
            assert_eq!(state, "recording");
            assert!(*is_pressed);
        }
        other => panic!("Expected Session, got {other:?}"),
    }
}

#[test]
fn test_failed_microphone_surfaces_notice() {
    let mut session = new_test_session();
    let events = run(
        &mut session,
        &[
            OPEN_CHAT,
            r#"{"cmd": "fail", "target": "microphone", "reason": "permission denied"}"#,
            r#"{"cmd": "press_start", "composer": "chat-box"}"#,
            r#"{"cmd": "wait", "ms": 600}"#,
        ],
    );
    assert!(events.contains(&IpcEvent::Recording {
        composer_id: ComposerId::from("chat-box"),
        phase: SessionPhase::Discarded,
        track_id: None,
        duration_ms: None,
        bytes: None,
        reason: Some(StopReason::Failed),
    }));
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::Notice {
            detail: Notice::DeviceUnavailable { .. },
            ..
        }
    )));
}

#[test]
fn test_recognize_without_stream_is_error() {
    let mut session = new_test_session();
    let events = session.handle_line(r#"{"cmd": "recognize", "text": "hi", "is_final": true}"#);
    assert_eq!(errors(&events), vec!["no recognition stream is listening"]);
}

#[test]
fn test_playing_second_track_supersedes_first() {
    let mut session = new_test_session();
    let events = run(
        &mut session,
        &[
            r#"{"cmd": "register_track", "view": "chat", "track_id": "a", "kind": "voice_note", "url": "https://cdn/a", "duration_ms": 20000}"#,
            r#"{"cmd": "register_track", "view": "chat", "track_id": "b", "kind": "voice_note", "url": "https://cdn/b", "duration_ms": 20000}"#,
            r#"{"cmd": "play", "view": "chat", "track_id": "a"}"#,
            r#"{"cmd": "wait", "ms": 1000}"#,
            r#"{"cmd": "play", "view": "chat", "track_id": "b"}"#,
        ],
    );
    assert!(errors(&events).is_empty(), "{events:?}");
    assert!(events.contains(&IpcEvent::Playback {
        scope: "view:chat".to_string(),
        payload: ChannelEvent::TrackStopped {
            track_id: TrackId::from("a"),
            position_ms: 1_000,
            reason: StopReason::Superseded,
        },
    }));

    let reply = session.handle_line(r#"{"cmd": "playback_state", "view": "chat"}"#);
    match reply.first() {
        Some(IpcEvent::State { scope, state }) => {
            assert_eq!(scope, "view:chat");
            assert_eq!(state.active_track_id, Some(TrackId::from("b")));
            assert!(state.is_playing);
        }
        other => panic!("Expected State, got {other:?}"),
    }
}

#[test]
fn test_unknown_track_is_error() {
    let mut session = new_test_session();
    let events = run(
        &mut session,
        &[
            r#"{"cmd": "play", "view": "chat", "track_id": "ghost"}"#,
            r#"{"cmd": "toggle", "view": "chat", "track_id": "ghost"}"#,
        ],
    );
    assert_eq!(
        errors(&events),
        vec!["unknown track 'ghost'", "unknown track 'ghost'"]
    );
}

#[test]
fn test_minimize_and_restore_through_feed() {
    let mut session = new_test_session();
    let events = run(
        &mut session,
        &[
            r#"{"cmd": "add_feed", "view": "home"}"#,
            r#"{"cmd": "add_post", "view": "home", "post": "p7", "url": "https://cdn/p7.mp4", "duration_ms": 60000}"#,
            r#"{"cmd": "activate", "view": "home", "post": "p7"}"#,
            r#"{"cmd": "focus", "view": "profile"}"#,
            r#"{"cmd": "minimize", "view": "home", "post": "p7", "position_ms": 12300}"#,
            r#"{"cmd": "activate", "view": "home", "post": "p7"}"#,
            r#"{"cmd": "restore"}"#,
        ],
    );
    assert_eq!(
        errors(&events),
        vec!["post 'p7' is playing in the mini-player"]
    );
    assert!(events.iter().any(|event| matches!(
        event,
        IpcEvent::MiniPlayer {
            payload: HandoffEvent::Restored { .. }
        }
    )));
    assert!(events.contains(&IpcEvent::Feed {
        view_id: ViewId::from("home"),
        payload: FeedEvent::Focused {
            view_id: ViewId::from("home")
        },
    }));
    assert!(events.contains(&IpcEvent::Feed {
        view_id: ViewId::from("home"),
        payload: FeedEvent::Resumed {
            post_id: PostId::from("p7"),
            position_ms: 12_300,
        },
    }));
    assert_eq!(
        session.coordinator().focused_view(),
        Some(ViewId::from("home"))
    );

    let events = session.handle_line(r#"{"cmd": "restore"}"#);
    assert_eq!(errors(&events), vec!["no mini-player is floating"]);
}

#[test]
fn test_run_session_writes_ready_and_stops_on_quit() {
    let mut session = new_test_session();
    let (tx, rx) = unbounded();
    for line in [
        OPEN_CHAT,
        r#"{"cmd": "close_composer", "composer": "chat-box"}"#,
        r#"{"cmd": "quit"}"#,
        r#"{"cmd": "open_composer", "view": "x", "composer": "never"}"#,
    ] {
        tx.send(line.to_string()).unwrap();
    }
    drop(tx);

    let mut out = Vec::new();
    run_session(&mut session, &rx, &mut out).expect("session");

    let lines: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(lines[0]["event"], "ready");
    assert_eq!(lines[0]["microphone"], "sim");
    assert!(lines
        .iter()
        .any(|line| line["event"] == "text" && line["composer_id"] == "chat-box"));
    assert!(session.is_finished());
    assert!(session
        .coordinator()
        .composer(&ComposerId::from("never"))
        .is_err());
}
