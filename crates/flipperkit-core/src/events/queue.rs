//! Queue tokens: holding a Queue event open until handlers are done with it.
//!
//! Every dispatch of a Queue-kind event gets its own [`QueueToken`]. Handlers
//! that declare interest receive a reference and may `wait()` on it to keep the
//! event from completing, then `clear()` later from wherever the deferred work
//! finishes (a timer, a switch handler, another event). The callback fires
//! only once the handler loop has finished *and* every `wait()` is matched by
//! a `clear()`. `kill()` abandons the event for good.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::frame::FrameId;
use crate::types::{shared, Shared, WeakShared};

/// Deferred completion owned by a parked frame
pub(crate) type Completion = Box<dyn FnOnce()>;

/// Queue frames that finished their handler loop but are still held
#[derive(Default)]
pub(crate) struct ParkedFrames {
    frames: BTreeMap<FrameId, ParkedFrame>,
}

pub(crate) struct ParkedFrame {
    pub(crate) event: String,
    pub(crate) token: QueueToken,
}

impl ParkedFrames {
    pub(crate) fn insert(&mut self, id: FrameId, frame: ParkedFrame) {
        self.frames.insert(id, frame);
    }

    pub(crate) fn remove(&mut self, id: FrameId) -> Option<ParkedFrame> {
        self.frames.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.frames.values().map(|f| f.event.clone()).collect()
    }

    pub(crate) fn tokens(&self) -> Vec<QueueToken> {
        self.frames.values().map(|f| f.token.clone()).collect()
    }
}

struct ParkedLink {
    table: WeakShared<ParkedFrames>,
    frame: FrameId,
}

impl ParkedLink {
    fn unpark(self) {
        if let Some(table) = self.table.upgrade() {
            table.borrow_mut().remove(self.frame);
        }
    }
}

struct QueueState {
    event: String,
    count: u32,
    killed: bool,
    loop_done: bool,
    completion: Option<Completion>,
    link: Option<ParkedLink>,
}

/// Suspension handle for one dispatch of a Queue-kind event
///
/// Cloning the token shares it; all clones see the same counter.
#[derive(Clone)]
pub struct QueueToken {
    state: Shared<QueueState>,
}

impl QueueToken {
    pub(crate) fn new(event: &str) -> Self {
        Self {
            state: shared(QueueState {
                event: event.to_string(),
                count: 0,
                killed: false,
                loop_done: false,
                completion: None,
                link: None,
            }),
        }
    }

    /// A token not attached to any dispatch.
    ///
    /// Queue-aware handlers receive one when they run for a non-Queue event;
    /// waiting on or clearing it has no effect on that event.
    pub fn detached() -> Self {
        let token = Self::new("");
        token.state.borrow_mut().loop_done = true;
        token
    }

    /// Hold the event open. No-op once killed.
    pub fn wait(&self) {
        let mut state = self.state.borrow_mut();
        if state.killed {
            return;
        }
        state.count += 1;
        tracing::trace!("Queue '{}' wait ({} held)", state.event, state.count);
    }

    /// Release one hold. Completes a parked event when the last hold goes.
    pub fn clear(&self) {
        let completion = {
            let mut state = self.state.borrow_mut();
            if state.killed || state.count == 0 {
                return;
            }
            state.count -= 1;
            tracing::trace!("Queue '{}' clear ({} held)", state.event, state.count);
            if state.count > 0 || !state.loop_done {
                return;
            }
            if let Some(link) = state.link.take() {
                link.unpark();
            }
            state.completion.take()
        };

        if let Some(completion) = completion {
            completion();
        }
    }

    /// Abandon the event; its callback will never fire.
    pub fn kill(&self) {
        let (link, completion) = {
            let mut state = self.state.borrow_mut();
            if state.killed {
                return;
            }
            state.killed = true;
            tracing::debug!("Queue '{}' killed with {} held", state.event, state.count);
            (state.link.take(), state.completion.take())
        };

        if let Some(link) = link {
            link.unpark();
        }
        drop(completion);
    }

    /// True when no handler holds the event, regardless of `killed`
    pub fn is_empty(&self) -> bool {
        self.state.borrow().count == 0
    }

    /// Number of outstanding `wait()` calls
    pub fn acquisitions(&self) -> u32 {
        self.state.borrow().count
    }

    pub fn is_killed(&self) -> bool {
        self.state.borrow().killed
    }

    /// Name of the event this token belongs to (empty when detached)
    pub fn event(&self) -> String {
        self.state.borrow().event.clone()
    }

    /// Whether two handles refer to the same token
    pub fn same_token(&self, other: &QueueToken) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Mark the handler loop as finished with nothing left to complete.
    pub(crate) fn close_loop(&self) {
        self.state.borrow_mut().loop_done = true;
    }

    /// Hand the deferred completion to the token and list the frame as parked.
    pub(crate) fn park(&self, frame: FrameId, parked: &Shared<ParkedFrames>, completion: Completion) {
        let event = {
            let mut state = self.state.borrow_mut();
            state.loop_done = true;
            state.completion = Some(completion);
            state.link = Some(ParkedLink {
                table: Rc::downgrade(parked),
                frame,
            });
            state.event.clone()
        };

        parked.borrow_mut().insert(
            frame,
            ParkedFrame {
                event,
                token: self.clone(),
            },
        );
    }
}

impl std::fmt::Debug for QueueToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("QueueToken")
            .field("event", &state.event)
            .field("count", &state.count)
            .field("killed", &state.killed)
            .field("loop_done", &state.loop_done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<u32>>, Completion) {
        let fired = Rc::new(Cell::new(0));
        let fired_clone = fired.clone();
        (fired, Box::new(move || fired_clone.set(fired_clone.get() + 1)))
    }

    #[test]
    fn test_wait_and_clear_counts() {
        let token = QueueToken::new("eject");
        assert!(token.is_empty());

        token.wait();
        token.wait();
        assert_eq!(token.acquisitions(), 2);
        assert!(!token.is_empty());

        token.clear();
        token.clear();
        token.clear();
        assert_eq!(token.acquisitions(), 0);
    }

    #[test]
    fn test_clear_before_loop_done_does_not_complete() {
        let parked = shared(ParkedFrames::default());
        let token = QueueToken::new("eject");
        let (fired, completion) = counter();

        token.wait();
        token.wait();
        token.clear();
        token.park(FrameId(1), &parked, completion);
        assert_eq!(fired.get(), 0);
        assert_eq!(parked.borrow().len(), 1);

        token.clear();
        assert_eq!(fired.get(), 1);
        assert_eq!(parked.borrow().len(), 0);

        // completion is one-shot
        token.wait();
        token.clear();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_kill_is_terminal() {
        let parked = shared(ParkedFrames::default());
        let token = QueueToken::new("eject");
        let (fired, completion) = counter();

        token.wait();
        token.park(FrameId(7), &parked, completion);
        token.kill();
        assert!(token.is_killed());
        assert_eq!(parked.borrow().len(), 0);

        token.wait();
        assert_eq!(token.acquisitions(), 1);
        token.clear();
        assert_eq!(token.acquisitions(), 1);
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let token = QueueToken::new("eject");
        let other = token.clone();
        other.wait();
        assert!(!token.is_empty());
        assert!(token.same_token(&other));
        assert!(!token.same_token(&QueueToken::detached()));
    }

    #[test]
    fn test_unpark_after_table_dropped() {
        let parked = shared(ParkedFrames::default());
        let token = QueueToken::new("eject");
        let (fired, completion) = counter();

        token.wait();
        token.park(FrameId(2), &parked, completion);
        drop(parked);

        token.clear();
        assert_eq!(fired.get(), 1);
    }
}
