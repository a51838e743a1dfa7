//! # FlipperKit Core
//!
//! Core types for FlipperKit machine controllers.
//! Provides the event dispatcher that ball devices, switch handlers and game
//! logic use to coordinate, along with shared error and type definitions.

pub mod error;
pub mod events;
pub mod types;

pub use error::DispatchError;

pub use events::{
    DispatchStatus, DispatcherConfig, EventCallback, EventDispatcher, EventKind, EventRecord,
    FrameId, FrameInfo, Handler, HandlerContext, HandlerKey, HandlerRegistry, HandlerResult,
    HandlerSignature, Payload, QueueToken, Registration, DEFAULT_PRIORITY, EV_RESULT_KEY,
};

pub use types::{shared, shared_none, Shared, SharedOption, SharedVec, WeakShared};
