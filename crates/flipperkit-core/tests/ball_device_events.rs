//! Event flows as a ball device and its neighbours use them.

use flipperkit_core::events::{DispatcherConfig, EventDispatcher, EventKind, Handler, Payload};
use flipperkit_core::types::{shared, shared_none, Shared};
use flipperkit_core::{payload, DispatchError};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

#[test]
fn test_captured_balls_claimed_by_relay() {
    init_test_logging();
    let events = EventDispatcher::new();

    // a ball lock claims one ball, leaving the rest to the playfield
    events.register_with_priority(
        "balldevice_captured_from_playfield",
        Handler::new(|ctx| {
            let balls = ctx.payload().get_i64("balls").unwrap_or_default();
            if balls > 0 {
                payload! { "balls" => balls - 1 }
            } else {
                payload! { "balls" => 0 }
            }
        })
        .consumes(["balls"])
        .relays(["balls"])
        .named("ball_lock_capture"),
        100,
    );

    let unclaimed: Shared<Option<i64>> = shared(None);
    let sink = unclaimed.clone();
    events
        .post_relay_with_callback(
            "balldevice_captured_from_playfield",
            payload! { "balls" => 2, "new_balls" => 2 },
            move |p| *sink.borrow_mut() = p.get_i64("balls"),
        )
        .unwrap();

    assert_eq!(*unclaimed.borrow(), Some(1));
}

#[test]
fn test_ball_missing_reaches_every_listener() {
    let events = EventDispatcher::new();
    let seen = shared(Vec::new());

    for name in ["ball_save", "ball_search", "tilt"] {
        let seen = seen.clone();
        events.register(
            "balldevice_1_ball_missing",
            Handler::new(move |ctx| {
                seen.borrow_mut()
                    .push((name, ctx.payload().get_i64("balls").unwrap_or_default()));
                false
            }),
        );
    }

    events
        .post("balldevice_1_ball_missing", payload! { "balls" => 1 })
        .unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![("ball_save", 1), ("ball_search", 1), ("tilt", 1)]
    );
}

#[test]
fn test_eject_held_until_confirmed() {
    init_test_logging();
    let events = EventDispatcher::new();
    let pending = shared_none();

    let hold = pending.clone();
    events.register(
        "balldevice_1_ejecting_ball",
        Handler::with_queue(move |_ctx, queue| {
            queue.wait();
            *hold.borrow_mut() = Some(queue.clone());
        })
        .named("playfield_expect_ball"),
    );

    let release = pending.clone();
    events.register(
        "playfield_active",
        Handler::new(move |_| {
            if let Some(queue) = release.borrow_mut().take() {
                queue.clear();
            }
        }),
    );

    let done = shared(false);
    let flag = done.clone();
    let status = events
        .post_queue_with_callback(
            "balldevice_1_ejecting_ball",
            payload! { "target" => "playfield" },
            move |p| *flag.borrow_mut() = p.ev_result(),
        )
        .unwrap();

    assert!(status.is_parked());
    assert!(!*done.borrow());

    events.post("playfield_active", Payload::new()).unwrap();
    assert!(*done.borrow());
    assert_eq!(events.parked_count(), 0);
}

#[test]
fn test_eject_vetoed_by_boolean_event() {
    let events = EventDispatcher::new();
    events.register(
        "balldevice_1_ball_eject_attempt",
        Handler::new(|ctx| ctx.payload().get_bool("tilted") != Some(true)),
    );

    let status = events
        .post_boolean("balldevice_1_ball_eject_attempt", payload! { "tilted" => true })
        .unwrap();
    assert!(status.is_short_circuited());

    let status = events
        .post_boolean("balldevice_1_ball_eject_attempt", payload! { "tilted" => false })
        .unwrap();
    assert!(status.is_completed());
}

#[test]
fn test_registration_defaults_fill_payload() {
    let events = EventDispatcher::new();
    let seen = shared(Payload::new());
    let sink = seen.clone();

    events.register_with(
        "balldevice_1_ball_enter",
        Handler::new(move |ctx| *sink.borrow_mut() = ctx.payload().clone()),
        5,
        payload! { "device" => "trough", "new_balls" => 0 },
    );

    events
        .post("balldevice_1_ball_enter", payload! { "new_balls" => 1 })
        .unwrap();

    assert_eq!(
        *seen.borrow(),
        payload! { "device" => "trough", "new_balls" => 1 }
    );
}

#[test]
fn test_runaway_recursion_is_refused() {
    init_test_logging();
    let events = EventDispatcher::with_config(DispatcherConfig {
        max_depth: 8,
        ..DispatcherConfig::default()
    });

    let failure = shared_none();
    let sink = failure.clone();
    events.register(
        "balldevice_1_ball_enter",
        Handler::new(move |ctx| {
            if let Err(err) = ctx.post("balldevice_1_ball_enter", Payload::new()) {
                sink.borrow_mut().get_or_insert(err);
            }
        }),
    );

    events.post("balldevice_1_ball_enter", Payload::new()).unwrap();

    assert_eq!(
        failure.borrow_mut().take(),
        Some(DispatchError::DepthExceeded {
            event: "balldevice_1_ball_enter".to_string(),
            depth: 9,
            limit: 8,
        })
    );
    assert_eq!(events.depth(), 0);
}

#[test]
fn test_history_records_nested_posts() {
    let events = EventDispatcher::with_config(DispatcherConfig {
        enable_history: true,
        ..DispatcherConfig::default()
    });
    events.register(
        "balldevice_1_ball_enter",
        Handler::new(|ctx| {
            ctx.post("balldevice_1_ball_count_changed", Payload::new())
                .unwrap();
        }),
    );

    events
        .post_relay("balldevice_1_ball_enter", payload! { "new_balls" => 1 })
        .unwrap();

    let history: Vec<(String, EventKind)> = events
        .history(None)
        .into_iter()
        .map(|r| (r.event, r.kind))
        .collect();
    assert_eq!(
        history,
        vec![
            ("balldevice_1_ball_enter".to_string(), EventKind::Relay),
            ("balldevice_1_ball_count_changed".to_string(), EventKind::Regular),
        ]
    );
}
