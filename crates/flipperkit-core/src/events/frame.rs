//! Dispatch frames: the bookkeeping for one in-flight event post.
//!
//! A frame is created when a post is accepted and lives until the event
//! terminates. Frames for nested posts sit on top of the frame whose handler
//! posted them; the dispatcher keeps that stack explicitly so its depth can be
//! bounded and inspected. A Queue frame that is still held when its handler
//! loop ends leaves the stack and is parked on its [`QueueToken`] instead.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::payload::Payload;
use super::queue::{ParkedFrames, QueueToken};
use crate::types::Shared;

/// Callback fired once an event terminates normally
pub type EventCallback = Box<dyn FnOnce(&Payload)>;

/// Per-handler loop policy applied while dispatching an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Every handler runs; return values are ignored
    Regular,
    /// Stops at the first handler returning `false`
    Boolean,
    /// Like `Boolean`, and handlers may rewrite payload values
    Relay,
    /// Like `Boolean`, and handlers may hold the event open with a queue token
    Queue,
}

impl EventKind {
    /// Whether a handler returning `false` ends the handler loop
    pub fn short_circuits(self) -> bool {
        !matches!(self, EventKind::Regular)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => write!(f, "regular"),
            Self::Boolean => write!(f, "boolean"),
            Self::Relay => write!(f, "relay"),
            Self::Queue => write!(f, "queue"),
        }
    }
}

/// Identifier of a dispatch frame, unique per dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(pub(crate) u64);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}

/// Snapshot of a frame on the dispatch stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub id: FrameId,
    pub event: String,
    pub kind: EventKind,
}

/// How a post ended, as seen by the caller of `post`
#[derive(Debug, Clone)]
pub enum DispatchStatus {
    /// All handlers ran and the callback (if any) fired
    Completed,
    /// A handler returned `false`; the callback fired with `ev_result = false`
    ShortCircuited,
    /// A handler still holds the queue token; the callback fires on clearance
    Parked(QueueToken),
    /// The queue token was killed; the callback will never fire
    Killed,
}

impl DispatchStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_short_circuited(&self) -> bool {
        matches!(self, Self::ShortCircuited)
    }

    pub fn is_parked(&self) -> bool {
        matches!(self, Self::Parked(_))
    }

    pub fn is_killed(&self) -> bool {
        matches!(self, Self::Killed)
    }

    /// The token holding a parked event open
    pub fn queue(&self) -> Option<&QueueToken> {
        match self {
            Self::Parked(token) => Some(token),
            _ => None,
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::ShortCircuited => write!(f, "ShortCircuited"),
            Self::Parked(token) => write!(f, "Parked({} held)", token.acquisitions()),
            Self::Killed => write!(f, "Killed"),
        }
    }
}

/// Posted event kept in the dispatcher's history
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub event: String,
    pub kind: EventKind,
    pub payload: Payload,
    pub timestamp: Instant,
}

/// One in-flight event
pub(crate) struct DispatchFrame {
    pub(crate) id: FrameId,
    pub(crate) event: String,
    pub(crate) kind: EventKind,
    pub(crate) payload: Payload,
    pub(crate) callback: Option<EventCallback>,
    pub(crate) queue: Option<QueueToken>,
    pub(crate) halted: bool,
}

impl DispatchFrame {
    pub(crate) fn new(
        id: FrameId,
        event: &str,
        kind: EventKind,
        payload: Payload,
        callback: Option<EventCallback>,
    ) -> Self {
        let queue = (kind == EventKind::Queue).then(|| QueueToken::new(event));
        Self {
            id,
            event: event.to_string(),
            kind,
            payload,
            callback,
            queue,
            halted: false,
        }
    }

    pub(crate) fn info(&self) -> FrameInfo {
        FrameInfo {
            id: self.id,
            event: self.event.clone(),
            kind: self.kind,
        }
    }

    /// Terminate the frame once its handler loop has finished.
    ///
    /// Fires the callback unless the queue token was killed or is still held.
    /// A held token takes ownership of the callback and the frame is recorded
    /// in `parked` until the token clears or is killed.
    pub(crate) fn finish(self, parked: &Shared<ParkedFrames>) -> DispatchStatus {
        let DispatchFrame {
            id,
            event,
            kind,
            mut payload,
            callback,
            queue,
            halted,
        } = self;

        if let Some(token) = &queue {
            if token.is_killed() {
                token.close_loop();
                tracing::debug!("Queue event '{}' was killed, dropping callback", event);
                return DispatchStatus::Killed;
            }

            if !halted && !token.is_empty() {
                tracing::debug!(
                    "Parking queue event '{}' ({} held) as {}",
                    event,
                    token.acquisitions(),
                    id
                );
                let completion_event = event.clone();
                token.park(
                    id,
                    parked,
                    Box::new(move || {
                        tracing::debug!("Queue event '{}' cleared, completing", completion_event);
                        if let Some(callback) = callback {
                            callback(&payload);
                        }
                    }),
                );
                return DispatchStatus::Parked(token.clone());
            }

            token.close_loop();
        }

        if halted {
            payload.mark_halted();
        }

        if let Some(callback) = callback {
            tracing::trace!("Running callback for {} event '{}'", kind, event);
            callback(&payload);
        }

        if halted {
            DispatchStatus::ShortCircuited
        } else {
            DispatchStatus::Completed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{shared, shared_none};

    #[test]
    fn test_kind_short_circuits() {
        assert!(!EventKind::Regular.short_circuits());
        assert!(EventKind::Boolean.short_circuits());
        assert!(EventKind::Relay.short_circuits());
        assert!(EventKind::Queue.short_circuits());
        assert_eq!(EventKind::Queue.to_string(), "queue");
    }

    #[test]
    fn test_only_queue_frames_get_a_token() {
        let regular = DispatchFrame::new(FrameId(1), "e", EventKind::Regular, Payload::new(), None);
        assert!(regular.queue.is_none());

        let queue = DispatchFrame::new(FrameId(2), "e", EventKind::Queue, Payload::new(), None);
        assert!(queue.queue.is_some());
        assert_eq!(queue.info().kind, EventKind::Queue);
    }

    #[test]
    fn test_finish_halted_marks_result() {
        let parked = shared(ParkedFrames::default());
        let seen = shared_none::<Payload>();
        let seen_clone = seen.clone();

        let mut frame = DispatchFrame::new(
            FrameId(1),
            "e",
            EventKind::Boolean,
            Payload::new(),
            Some(Box::new(move |p: &Payload| {
                *seen_clone.borrow_mut() = Some(p.clone());
            })),
        );
        frame.halted = true;

        assert!(frame.finish(&parked).is_short_circuited());
        let seen = seen.borrow();
        assert_eq!(seen.as_ref().map(Payload::ev_result), Some(false));
    }

    #[test]
    fn test_finish_parks_held_queue() {
        let parked = shared(ParkedFrames::default());
        let frame = DispatchFrame::new(FrameId(4), "e", EventKind::Queue, Payload::new(), None);
        if let Some(token) = &frame.queue {
            token.wait();
        }

        let status = frame.finish(&parked);
        assert!(status.is_parked());
        assert_eq!(parked.borrow().len(), 1);

        if let Some(token) = status.queue() {
            token.clear();
        }
        assert_eq!(parked.borrow().len(), 0);
    }
}
