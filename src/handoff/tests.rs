use std::sync::Arc;

use super::*;
use crate::error::HandoffError;
use crate::host::sim::SimHost;

struct Rig {
    host: SimHost,
    bus: Arc<RestoreBus>,
    focus: Arc<ViewFocus>,
    authority: Arc<PlayAuthority>,
    handoff: MiniPlayerHandoff,
}

fn rig() -> Rig {
    let host = SimHost::new();
    let bus = Arc::new(RestoreBus::new());
    let authority = Arc::new(PlayAuthority::new());
    let handoff = MiniPlayerHandoff::new(host.video.clone(), authority.clone(), bus.clone());
    Rig {
        focus: Arc::new(ViewFocus::new(Some(ViewId::from("explore")))),
        host,
        bus,
        authority,
        handoff,
    }
}

fn home_feed(rig: &Rig, posts: &[&str]) -> FeedView {
    let mut feed = FeedView::new(
        ViewId::from("home"),
        &rig.bus,
        rig.focus.clone(),
        rig.authority.clone(),
        rig.host.video.clone(),
    );
    for post in posts {
        feed.add_item(
            PostId::from(*post),
            format!("https://cdn/{post}.mp4"),
            Some(90_000),
        );
    }
    feed
}

#[test]
fn restore_emits_exactly_one_signal_at_minimized_position() {
    let mut rig = rig();
    let mut feed = home_feed(&rig, &["p7"]);
    let watcher = rig.bus.subscribe();
    feed.activate(&PostId::from("p7")).expect("activate");
    rig.host.clock.advance_ms(12_300);

    let session = rig.handoff.minimize(
        &mut feed,
        PostId::from("p7"),
        "https://cdn/p7.mp4",
        12_300,
        ViewId::from("home"),
    );
    assert!(session.is_floating);

    let signal = rig.handoff.restore(&session).expect("restore");
    let expected = RestoreSignal {
        post_id: PostId::from("p7"),
        source_view_id: ViewId::from("home"),
        position_ms: 12_300,
    };
    assert_eq!(signal, expected);
    assert_eq!(watcher.drain(), vec![expected]);
    assert!(rig.handoff.floating().is_none());
    assert_eq!(
        rig.handoff.restore(&session),
        Err(HandoffError::NotFloating(session.session_id))
    );
    assert!(watcher.drain().is_empty());
}

#[test]
fn minimize_pauses_inline_item_and_blocks_reactivation() {
    let mut rig = rig();
    let mut feed = home_feed(&rig, &["p7"]);
    let p7 = PostId::from("p7");
    feed.activate(&p7).expect("activate");
    assert!(feed.playback().is_playing);

    rig.handoff
        .minimize(&mut feed, p7.clone(), "https://cdn/p7.mp4", 0, ViewId::from("home"));

    assert!(!feed.playback().is_playing);
    assert!(rig.handoff.playback().is_playing);
    assert!(rig.authority.is_floating(&p7));
    assert_eq!(
        feed.activate(&p7),
        Err(HandoffError::PostFloating(p7.clone()))
    );
}

#[test]
fn feed_consumer_focuses_seeks_and_resumes() {
    let mut rig = rig();
    let mut feed = home_feed(&rig, &["p7"]);
    let p7 = PostId::from("p7");
    feed.activate(&p7).expect("activate");
    let session = rig
        .handoff
        .minimize(&mut feed, p7.clone(), "https://cdn/p7.mp4", 5_000, ViewId::from("home"));
    rig.host.clock.advance_ms(2_000);
    rig.handoff.restore(&session).expect("restore");
    feed.drain_events();

    feed.poll();

    assert_eq!(rig.focus.focused(), Some(ViewId::from("home")));
    assert_eq!(feed.selected(), Some(&p7));
    let state = feed.playback();
    assert!(state.is_playing);
    assert_eq!(state.position_ms, 7_000);
    assert_eq!(
        rig.authority.owner(&p7),
        Some(PlayOwner::Inline(ViewId::from("home")))
    );
    let events = feed.drain_events();
    assert!(events.contains(&FeedEvent::Focused {
        view_id: ViewId::from("home")
    }));
    assert!(events.contains(&FeedEvent::Resumed {
        post_id: p7,
        position_ms: 7_000
    }));
}

#[test]
fn signals_for_other_posts_are_ignored() {
    let mut rig = rig();
    let mut home = home_feed(&rig, &["p1"]);
    let mut explore = FeedView::new(
        ViewId::from("explore"),
        &rig.bus,
        rig.focus.clone(),
        rig.authority.clone(),
        rig.host.video.clone(),
    );
    explore.add_item(PostId::from("p9"), "https://cdn/p9.mp4", None);

    let session = rig.handoff.minimize(
        &mut explore,
        PostId::from("p9"),
        "https://cdn/p9.mp4",
        1_000,
        ViewId::from("explore"),
    );
    rig.handoff.restore(&session).expect("restore");
    home.poll();
    explore.poll();

    assert_eq!(home.selected(), None);
    assert_eq!(explore.selected(), Some(&PostId::from("p9")));
    assert_eq!(rig.focus.focused(), Some(ViewId::from("explore")));
}

#[test]
fn only_the_source_feed_resumes_a_shared_post() {
    let mut rig = rig();
    let mut home = home_feed(&rig, &["p7"]);
    let mut explore = FeedView::new(
        ViewId::from("explore"),
        &rig.bus,
        rig.focus.clone(),
        rig.authority.clone(),
        rig.host.video.clone(),
    );
    explore.add_item(PostId::from("p7"), "https://cdn/p7.mp4", Some(90_000));
    let p7 = PostId::from("p7");
    home.activate(&p7).expect("activate");

    let session = rig
        .handoff
        .minimize(&mut home, p7.clone(), "https://cdn/p7.mp4", 4_000, ViewId::from("home"));
    rig.handoff.restore(&session).expect("restore");
    // Explore polls last, so it would win focus if it acted on the signal.
    home.poll();
    explore.poll();

    assert!(home.is_playing_inline());
    assert!(!explore.is_playing_inline());
    assert_eq!(explore.selected(), None);
    assert_eq!(rig.focus.focused(), Some(ViewId::from("home")));
    assert_eq!(
        rig.authority.owner(&p7),
        Some(PlayOwner::Inline(ViewId::from("home")))
    );
}

#[test]
fn second_minimize_discards_first_without_signal() {
    let mut rig = rig();
    let mut feed = home_feed(&rig, &["p1", "p2"]);
    let watcher = rig.bus.subscribe();

    let first = rig.handoff.minimize(
        &mut feed,
        PostId::from("p1"),
        "https://cdn/p1.mp4",
        3_000,
        ViewId::from("home"),
    );
    let second = rig.handoff.minimize(
        &mut feed,
        PostId::from("p2"),
        "https://cdn/p2.mp4",
        0,
        ViewId::from("home"),
    );

    let floating = rig.handoff.floating().expect("one floating session");
    assert_eq!(floating.session_id, second.session_id);
    assert_eq!(floating.post_id, PostId::from("p2"));
    assert!(watcher.drain().is_empty());
    assert!(!rig.authority.is_floating(&PostId::from("p1")));
    assert_eq!(
        rig.handoff.playback().active_track_id,
        Some(PostId::from("p2").video_track_id())
    );
    assert!(rig
        .handoff
        .drain_events()
        .contains(&HandoffEvent::Discarded {
            session_id: first.session_id,
            post_id: PostId::from("p1"),
        }));
    assert_eq!(
        rig.handoff.discard(&first),
        Err(HandoffError::NotFloating(first.session_id))
    );
}

#[test]
fn discard_leaves_inline_item_paused() {
    let mut rig = rig();
    let mut feed = home_feed(&rig, &["p3"]);
    let watcher = rig.bus.subscribe();
    let p3 = PostId::from("p3");
    feed.activate(&p3).expect("activate");
    let session = rig
        .handoff
        .minimize(&mut feed, p3.clone(), "https://cdn/p3.mp4", 0, ViewId::from("home"));

    rig.handoff.discard(&session).expect("discard");
    feed.poll();

    assert!(watcher.drain().is_empty());
    assert!(!feed.playback().is_playing);
    assert_eq!(rig.handoff.playback().active_track_id, None);
    assert_eq!(rig.authority.owner(&p3), None);
    // Scroll-driven activation works again.
    feed.activate(&p3).expect("reactivate");
    assert!(feed.playback().is_playing);
}

#[test]
fn mini_player_toggle_pauses_and_resumes() {
    let mut rig = rig();
    let mut feed = home_feed(&rig, &["p4"]);
    assert_eq!(
        rig.handoff.toggle_play(),
        Err(HandoffError::NothingFloating)
    );
    rig.handoff.minimize(
        &mut feed,
        PostId::from("p4"),
        "https://cdn/p4.mp4",
        0,
        ViewId::from("home"),
    );
    let paused = rig.handoff.toggle_play().expect("toggle");
    assert!(!paused.is_playing);
    let resumed = rig.handoff.toggle_play().expect("toggle");
    assert!(resumed.is_playing);
}
