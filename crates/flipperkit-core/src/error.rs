//! Error handling for FlipperKit
//!
//! The dispatch core treats almost everything as a silent no-op: posting to an
//! event nobody listens for, removing a handler twice, clearing a killed queue.
//! What remains are the conditions that signal a structural problem with the
//! way collaborators drive the dispatcher.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Dispatch error type
///
/// Represents failures to start dispatching an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// A nested post would grow the frame stack past the configured limit
    #[error("Dispatch depth {depth} exceeds limit {limit} while posting '{event}'")]
    DepthExceeded {
        /// The event whose post was refused.
        event: String,
        /// The depth the new frame would have had.
        depth: usize,
        /// The configured maximum depth.
        limit: usize,
    },
}
