//! Trough eject demo.
//!
//! Runs a short scripted sequence against a live dispatcher: the trough asks
//! permission to eject, then holds the eject open on a queue token until the
//! playfield reports the ball. A timer plays the playfield switch; one ball
//! never arrives and its eject is killed on timeout.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Context;
use flipperkit::{init_logging, payload, EventDispatcher, Handler, Payload, QueueToken, BUILD_DATE, VERSION};
use flipperkit_core::{shared_none, SharedOption};
use flipperkit_settings::{config_file_path, Config};
use tokio::sync::oneshot;
use tokio::task::LocalSet;

/// How long an eject may wait for the playfield
const EJECT_TIMEOUT: Duration = Duration::from_millis(500);

struct EjectPlan {
    ball: i64,
    tilted: bool,
    /// When the playfield switch fires, if ever
    confirm_after: Option<Duration>,
}

fn load_config() -> anyhow::Result<Config> {
    let path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => match config_file_path() {
            Ok(path) => path,
            Err(_) => return Ok(Config::default()),
        },
    };

    Config::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Wire up the trough and playfield; returns the slot for the eject in flight
fn install_handlers(events: &EventDispatcher) -> SharedOption<QueueToken> {
    let pending = shared_none();

    events.register_with_priority(
        "balldevice_trough_ball_eject_attempt",
        Handler::new(|ctx| ctx.payload().get_bool("tilted") != Some(true))
            .consumes(["tilted"])
            .named("tilt_veto"),
        100,
    );

    let hold = pending.clone();
    events.register(
        "balldevice_trough_ejecting_ball",
        Handler::with_queue(move |ctx, queue| {
            tracing::info!(
                "Waiting for ball {} to reach the playfield",
                ctx.payload().get_i64("ball").unwrap_or_default()
            );
            queue.wait();
            *hold.borrow_mut() = Some(queue.clone());
        })
        .named("playfield_expect_ball"),
    );

    let release = pending.clone();
    events.register(
        "playfield_active",
        Handler::new(move |_| {
            let queue = release.borrow_mut().take();
            if let Some(queue) = queue {
                queue.clear();
            }
        })
        .named("playfield_confirm"),
    );

    events.register(
        "balldevice_trough_ball_eject_success",
        Handler::new(|ctx| tracing::info!("Eject confirmed: {}", ctx.payload())).named("eject_logger"),
    );

    pending
}

async fn eject(
    events: &Rc<EventDispatcher>,
    pending: &SharedOption<QueueToken>,
    plan: EjectPlan,
) -> anyhow::Result<()> {
    let ball = plan.ball;
    let attempt = events.post_boolean(
        "balldevice_trough_ball_eject_attempt",
        payload! { "ball" => ball, "tilted" => plan.tilted },
    )?;
    if attempt.is_short_circuited() {
        tracing::warn!("Eject of ball {} vetoed", ball);
        return Ok(());
    }

    let (tx, rx) = oneshot::channel();
    let weak = Rc::downgrade(events);
    let status = events.post_queue_with_callback(
        "balldevice_trough_ejecting_ball",
        payload! { "ball" => ball },
        move |result| {
            if let Some(events) = weak.upgrade() {
                if let Err(e) = events.post("balldevice_trough_ball_eject_success", result.clone()) {
                    tracing::warn!("Could not announce eject: {}", e);
                }
            }
            let _ = tx.send(result.ev_result());
        },
    )?;
    tracing::info!("Eject of ball {} posted: {}", ball, status);

    if let Some(delay) = plan.confirm_after {
        let events = Rc::clone(events);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = events.post("playfield_active", Payload::new()) {
                tracing::warn!("Playfield switch dropped: {}", e);
            }
        });
    }

    match tokio::time::timeout(EJECT_TIMEOUT, rx).await {
        Ok(Ok(ev_result)) => tracing::info!("Ball {} ejected (ev_result={})", ball, ev_result),
        Ok(Err(_)) => tracing::warn!("Eject of ball {} was abandoned", ball),
        Err(_) => {
            let queue = pending.borrow_mut().take();
            if let Some(queue) = queue {
                queue.kill();
            }
            tracing::warn!("Ball {} never reached the playfield, eject killed", ball);
        }
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_logging(&config.logging)?;
    tracing::info!("FlipperKit {} (built {})", VERSION, BUILD_DATE);

    let events = Rc::new(flipperkit::build_dispatcher(&config));
    let pending = install_handlers(&events);

    let plans = [
        EjectPlan {
            ball: 1,
            tilted: false,
            confirm_after: Some(Duration::from_millis(150)),
        },
        EjectPlan {
            ball: 2,
            tilted: false,
            confirm_after: None,
        },
        EjectPlan {
            ball: 3,
            tilted: true,
            confirm_after: None,
        },
    ];

    LocalSet::new()
        .run_until(async {
            for plan in plans {
                eject(&events, &pending, plan).await?;
            }
            anyhow::Ok(())
        })
        .await?;

    tracing::info!(
        "Demo finished with {} frame(s) still parked",
        events.parked_count()
    );
    Ok(())
}
