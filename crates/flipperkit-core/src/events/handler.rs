//! Event handlers and the contract they are invoked under.
//!
//! A [`Handler`] wraps a closure together with a [`HandlerSignature`] that
//! states what the handler touches:
//!
//! - `consumes`: payload keys it reads (it sees only those, if declared)
//! - `relays`: payload keys it may rewrite on Relay events
//! - `wants_queue`: whether it takes the queue token on Queue events
//!
//! The closure's return value converts into a [`HandlerResult`]:
//!
//! | returns | result |
//! |---------|--------|
//! | `()` / `true` | `Continue` |
//! | `false` | `Halt` |
//! | `Payload` | `Relay(payload)` |
//!
//! # Example
//!
//! ```rust,ignore
//! use flipperkit_core::events::{Handler, Payload};
//! use flipperkit_core::payload;
//!
//! let eject_ok = Handler::new(|ctx| ctx.payload().get_i64("balls") != Some(0))
//!     .consumes(["balls"])
//!     .named("trough_eject_ok");
//!
//! let confirm = Handler::with_queue(|_ctx, queue| queue.wait());
//! ```

use std::rc::Rc;

use super::dispatcher::EventDispatcher;
use super::frame::{DispatchStatus, EventKind};
use super::payload::Payload;
use super::queue::QueueToken;
use crate::error::DispatchError;

type HandlerFn = dyn Fn(&HandlerContext<'_>) -> HandlerResult;

/// What a handler reads, rewrites, and whether it can hold a Queue event open
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerSignature {
    /// Payload keys the handler reads; `None` means the whole payload
    pub consumes: Option<Vec<String>>,
    /// Payload keys the handler may rewrite; `None` means any existing key
    pub relays: Option<Vec<String>>,
    /// Whether the handler receives the event's queue token
    pub wants_queue: bool,
}

impl HandlerSignature {
    /// Whether a relayed value for `key` is accepted from this handler
    pub fn may_relay(&self, key: &str) -> bool {
        self.relays
            .as_ref()
            .is_none_or(|keys| keys.iter().any(|k| k == key))
    }
}

/// Outcome of a single handler invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HandlerResult {
    /// Carry on with the next handler
    #[default]
    Continue,
    /// Explicit `false`: stops Boolean, Relay and Queue events
    Halt,
    /// New values for payload keys (Relay events only)
    Relay(Payload),
}

impl HandlerResult {
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt)
    }
}

impl From<()> for HandlerResult {
    fn from(_: ()) -> Self {
        Self::Continue
    }
}

impl From<bool> for HandlerResult {
    fn from(value: bool) -> Self {
        if value {
            Self::Continue
        } else {
            Self::Halt
        }
    }
}

impl From<Payload> for HandlerResult {
    fn from(payload: Payload) -> Self {
        Self::Relay(payload)
    }
}

impl From<Option<Payload>> for HandlerResult {
    fn from(payload: Option<Payload>) -> Self {
        payload.map_or(Self::Continue, Self::Relay)
    }
}

/// Everything a handler can see and do during one invocation
pub struct HandlerContext<'a> {
    pub(crate) dispatcher: &'a EventDispatcher,
    pub(crate) event: &'a str,
    pub(crate) kind: EventKind,
    pub(crate) payload: &'a Payload,
    pub(crate) queue: Option<&'a QueueToken>,
    pub(crate) depth: usize,
}

impl<'a> HandlerContext<'a> {
    pub fn event(&self) -> &str {
        self.event
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Payload as seen by this handler (restricted to `consumes` if declared)
    pub fn payload(&self) -> &Payload {
        self.payload
    }

    /// The event's queue token, for queue-aware handlers on Queue events
    pub fn queue(&self) -> Option<&QueueToken> {
        self.queue
    }

    /// Dispatcher running this handler, for posting nested events
    pub fn dispatcher(&self) -> &EventDispatcher {
        self.dispatcher
    }

    /// Number of frames on the dispatch stack, this event's included
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Post a Regular event; it completes before this call returns
    pub fn post(&self, event: &str, payload: Payload) -> Result<DispatchStatus, DispatchError> {
        self.dispatcher.post(event, payload)
    }
}

/// A registered reaction to an event
///
/// Clones share identity: removing a handler by value removes every
/// registration made with any clone of it.
#[derive(Clone)]
pub struct Handler {
    func: Rc<HandlerFn>,
    signature: HandlerSignature,
    name: &'static str,
}

impl Handler {
    /// Wrap a closure as a handler
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&HandlerContext<'_>) -> R + 'static,
        R: Into<HandlerResult>,
    {
        let func: Rc<HandlerFn> = Rc::new(move |ctx: &HandlerContext<'_>| f(ctx).into());
        Self {
            func,
            signature: HandlerSignature::default(),
            name: std::any::type_name::<F>(),
        }
    }

    /// Wrap a closure that takes the queue token of Queue events
    ///
    /// On other event kinds the closure gets a detached token.
    pub fn with_queue<F, R>(f: F) -> Self
    where
        F: Fn(&HandlerContext<'_>, &QueueToken) -> R + 'static,
        R: Into<HandlerResult>,
    {
        let func: Rc<HandlerFn> = Rc::new(move |ctx: &HandlerContext<'_>| match ctx.queue() {
            Some(queue) => f(ctx, queue).into(),
            None => f(ctx, &QueueToken::detached()).into(),
        });
        Self {
            func,
            signature: HandlerSignature {
                wants_queue: true,
                ..HandlerSignature::default()
            },
            name: std::any::type_name::<F>(),
        }
    }

    /// Restrict the payload this handler sees to the given keys
    pub fn consumes<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature.consumes = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Limit which payload keys this handler may rewrite on Relay events
    pub fn relays<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature.relays = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Name used in log output
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn signature(&self) -> &HandlerSignature {
        &self.signature
    }

    /// Whether both handles wrap the same closure
    pub fn same_handler(&self, other: &Handler) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.func), Rc::as_ptr(&other.func))
    }

    pub(crate) fn call(&self, ctx: &HandlerContext<'_>) -> HandlerResult {
        (self.func)(ctx)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        self.same_handler(other)
    }
}

impl Eq for Handler {}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}
