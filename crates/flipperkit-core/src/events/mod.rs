//! # Event Dispatch Module
//!
//! A publish/subscribe bus that lets independent subsystems (ball devices,
//! switch handlers, game logic) react to named events without knowing about
//! each other.
//!
//! ## Overview
//!
//! - Handlers register for an event name with an integer priority; higher
//!   priorities run first, equal priorities run in registration order
//! - Four event kinds decide what a handler's return value does:
//!   - `Regular`: nothing, every handler runs
//!   - `Boolean`: `false` stops the remaining handlers
//!   - `Relay`: `false` stops; returned payloads rewrite values
//!   - `Queue`: `false` stops; handlers may hold the event with a [`QueueToken`]
//! - A post from inside a handler completes (callback included) before that
//!   handler continues
//! - Callbacks of halted events see `ev_result = false` in their payload
//!
//! ## Usage
//!
//! ```rust,ignore
//! use flipperkit_core::events::{EventDispatcher, Handler};
//! use flipperkit_core::payload;
//!
//! let events = EventDispatcher::new();
//!
//! // Hold the eject until the playfield switch confirms it
//! events.register("balldevice_trough_eject", Handler::with_queue(|_ctx, queue| {
//!     queue.wait();
//! }));
//!
//! let status = events.post_queue_with_callback(
//!     "balldevice_trough_eject",
//!     payload! { "balls" => 1 },
//!     |payload| println!("eject confirmed: {}", payload),
//! )?;
//!
//! // ...later, from the confirming switch handler
//! if let Some(queue) = status.queue() {
//!     queue.clear();
//! }
//! ```

mod dispatcher;
mod frame;
mod handler;
mod payload;
mod queue;
mod registry;

pub use dispatcher::{DispatcherConfig, EventDispatcher};
pub use frame::{DispatchStatus, EventCallback, EventKind, EventRecord, FrameId, FrameInfo};
pub use handler::{Handler, HandlerContext, HandlerResult, HandlerSignature};
pub use payload::{Payload, EV_RESULT_KEY};
pub use queue::QueueToken;
pub use registry::{HandlerKey, HandlerRegistry, Registration, DEFAULT_PRIORITY};
