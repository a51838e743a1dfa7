//! The event dispatcher.
//!
//! Owns the handler registry, the explicit stack of in-flight frames, and the
//! table of parked Queue frames. Everything runs synchronously on the caller's
//! thread: a post returns once its handler loop is done and its callback has
//! fired, unless a queue token parks it.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use super::frame::{
    DispatchFrame, DispatchStatus, EventCallback, EventKind, EventRecord, FrameId, FrameInfo,
};
use super::handler::{Handler, HandlerContext, HandlerResult, HandlerSignature};
use super::payload::Payload;
use super::queue::{ParkedFrames, QueueToken};
use super::registry::{HandlerKey, HandlerRegistry, Registration, DEFAULT_PRIORITY};
use crate::error::DispatchError;
use crate::types::{shared, Shared};

/// Configuration for the event dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Priority for handlers registered without one.
    pub default_priority: i32,
    /// Maximum number of nested frames on the dispatch stack.
    pub max_depth: usize,
    /// Whether to keep a history of posted events.
    pub enable_history: bool,
    /// Maximum number of events to retain in history.
    pub max_history_size: usize,
    /// How long to retain events in history.
    pub history_retention: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_priority: DEFAULT_PRIORITY,
            max_depth: 64,
            enable_history: false,
            max_history_size: 1000,
            history_retention: Duration::from_secs(300),
        }
    }
}

/// Priority-ordered, reentrant event dispatcher
pub struct EventDispatcher {
    registry: RefCell<HandlerRegistry>,
    frames: RefCell<Vec<FrameInfo>>,
    parked: Shared<ParkedFrames>,
    history: RefCell<VecDeque<EventRecord>>,
    next_frame: Cell<u64>,
    config: DispatcherConfig,
}

impl EventDispatcher {
    /// Create a new dispatcher with default configuration
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create a new dispatcher with custom configuration
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            registry: RefCell::new(HandlerRegistry::new()),
            frames: RefCell::new(Vec::new()),
            parked: shared(ParkedFrames::default()),
            history: RefCell::new(VecDeque::new()),
            next_frame: Cell::new(1),
            config,
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a handler at the default priority
    pub fn register(&self, event: &str, handler: Handler) -> HandlerKey {
        self.register_with(event, handler, self.config.default_priority, Payload::new())
    }

    /// Register a handler; higher priorities run earlier
    pub fn register_with_priority(&self, event: &str, handler: Handler, priority: i32) -> HandlerKey {
        self.register_with(event, handler, priority, Payload::new())
    }

    /// Register a handler with payload defaults
    ///
    /// `defaults` are merged under the posted payload each time this handler
    /// runs; keys present in the post take precedence.
    pub fn register_with(
        &self,
        event: &str,
        handler: Handler,
        priority: i32,
        defaults: Payload,
    ) -> HandlerKey {
        let name = handler.name();
        let key = self
            .registry
            .borrow_mut()
            .register(event, handler, priority, defaults);
        tracing::debug!(
            "Registered handler '{}' for '{}' at priority {} as {}",
            name,
            event,
            priority,
            key
        );
        key
    }

    /// Drop any registrations of `handler` for `event`, then register it again
    pub fn replace(&self, event: &str, handler: Handler, priority: i32) -> HandlerKey {
        self.unregister_by_event_and_handler(event, &handler);
        self.register_with_priority(event, handler, priority)
    }

    /// Remove `handler` from every event it is registered for
    pub fn unregister_by_handler(&self, handler: &Handler) -> usize {
        let removed = self.registry.borrow_mut().unregister_by_handler(handler);
        if removed > 0 {
            tracing::debug!("Removed {} registration(s) of '{}'", removed, handler.name());
        }
        removed
    }

    /// Remove `handler` from `event` only
    pub fn unregister_by_event_and_handler(&self, event: &str, handler: &Handler) -> usize {
        let removed = self
            .registry
            .borrow_mut()
            .unregister_by_event_and_handler(event, handler);
        if removed > 0 {
            tracing::debug!(
                "Removed {} registration(s) of '{}' from '{}'",
                removed,
                handler.name(),
                event
            );
        }
        removed
    }

    /// Remove the registration behind `key`
    pub fn unregister_by_key(&self, key: HandlerKey) -> bool {
        let removed = self.registry.borrow_mut().unregister_by_key(key);
        if removed {
            tracing::debug!("Removed registration {}", key);
        }
        removed
    }

    /// Remove every registration behind `keys`
    pub fn unregister_by_keys<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a HandlerKey>,
    {
        let removed = self.registry.borrow_mut().unregister_by_keys(keys);
        tracing::debug!("Removed {} registration(s) by key", removed);
        removed
    }

    /// Whether any handler is registered for `event`
    pub fn exists(&self, event: &str) -> bool {
        self.registry.borrow().exists(event)
    }

    /// Number of registrations for `event`
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry.borrow().handlers_for(event).len()
    }

    /// Registrations for `event` in the order a post would run them
    pub fn registrations(&self, event: &str) -> Vec<Registration> {
        self.registry.borrow().handlers_for(event)
    }

    /// Number of registrations across all events
    pub fn registration_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Event names with at least one registration
    pub fn event_names(&self) -> Vec<String> {
        self.registry.borrow().event_names()
    }

    // =========================================================================
    // Posting
    // =========================================================================

    /// Post a Regular event: every handler runs
    pub fn post(&self, event: &str, payload: Payload) -> Result<DispatchStatus, DispatchError> {
        self.dispatch(event, EventKind::Regular, payload, None)
    }

    pub fn post_with_callback<F>(
        &self,
        event: &str,
        payload: Payload,
        callback: F,
    ) -> Result<DispatchStatus, DispatchError>
    where
        F: FnOnce(&Payload) + 'static,
    {
        self.dispatch(event, EventKind::Regular, payload, Some(Box::new(callback)))
    }

    /// Post a Boolean event: stops at the first handler returning `false`
    pub fn post_boolean(&self, event: &str, payload: Payload) -> Result<DispatchStatus, DispatchError> {
        self.dispatch(event, EventKind::Boolean, payload, None)
    }

    pub fn post_boolean_with_callback<F>(
        &self,
        event: &str,
        payload: Payload,
        callback: F,
    ) -> Result<DispatchStatus, DispatchError>
    where
        F: FnOnce(&Payload) + 'static,
    {
        self.dispatch(event, EventKind::Boolean, payload, Some(Box::new(callback)))
    }

    /// Post a Relay event: handlers may rewrite the payload's keys
    pub fn post_relay(&self, event: &str, payload: Payload) -> Result<DispatchStatus, DispatchError> {
        self.dispatch(event, EventKind::Relay, payload, None)
    }

    pub fn post_relay_with_callback<F>(
        &self,
        event: &str,
        payload: Payload,
        callback: F,
    ) -> Result<DispatchStatus, DispatchError>
    where
        F: FnOnce(&Payload) + 'static,
    {
        self.dispatch(event, EventKind::Relay, payload, Some(Box::new(callback)))
    }

    /// Post a Queue event: queue-aware handlers may hold it open
    pub fn post_queue(&self, event: &str, payload: Payload) -> Result<DispatchStatus, DispatchError> {
        self.dispatch(event, EventKind::Queue, payload, None)
    }

    pub fn post_queue_with_callback<F>(
        &self,
        event: &str,
        payload: Payload,
        callback: F,
    ) -> Result<DispatchStatus, DispatchError>
    where
        F: FnOnce(&Payload) + 'static,
    {
        self.dispatch(event, EventKind::Queue, payload, Some(Box::new(callback)))
    }

    /// Dispatch an event of any kind
    ///
    /// Runs the handlers registered for `event` in priority order and
    /// terminates the frame. A post made by one of those handlers runs to
    /// completion, callback included, before that handler regains control.
    pub fn dispatch(
        &self,
        event: &str,
        kind: EventKind,
        payload: Payload,
        callback: Option<EventCallback>,
    ) -> Result<DispatchStatus, DispatchError> {
        let depth = self.frames.borrow().len() + 1;
        if depth > self.config.max_depth {
            tracing::warn!(
                "Refusing to post '{}': depth {} exceeds limit {}",
                event,
                depth,
                self.config.max_depth
            );
            return Err(DispatchError::DepthExceeded {
                event: event.to_string(),
                depth,
                limit: self.config.max_depth,
            });
        }

        tracing::debug!(
            "Event: ======'{}'====== Type: {}, Callback: {}, Args: {}",
            event,
            kind,
            callback.is_some(),
            payload
        );

        if self.config.enable_history {
            self.add_to_history(event, kind, &payload);
        }

        let id = FrameId(self.next_frame.get());
        self.next_frame.set(id.0 + 1);

        let mut frame = DispatchFrame::new(id, event, kind, payload, callback);
        self.frames.borrow_mut().push(frame.info());

        let handlers = self.registry.borrow().handlers_for(event);
        for registration in &handlers {
            let halted = self.run_handler(
                &mut frame,
                &registration.handler,
                registration.priority,
                &registration.defaults,
                depth,
            );
            if halted {
                frame.halted = true;
                break;
            }
        }

        let status = frame.finish(&self.parked);
        self.frames.borrow_mut().pop();
        tracing::trace!("Event '{}' finished: {}", event, status);
        Ok(status)
    }

    /// Invoke one handler; returns true when it halts the event
    fn run_handler(
        &self,
        frame: &mut DispatchFrame,
        handler: &Handler,
        priority: i32,
        defaults: &Payload,
        depth: usize,
    ) -> bool {
        let signature = handler.signature();

        let mut view = frame.payload.clone();
        view.merge_defaults(defaults);
        if let Some(keys) = &signature.consumes {
            view = view.project(keys);
        }

        let queue = if signature.wants_queue {
            frame.queue.as_ref()
        } else {
            None
        };

        tracing::trace!(
            "Calling handler '{}' (priority {}) for '{}'",
            handler.name(),
            priority,
            frame.event
        );

        let result = handler.call(&HandlerContext {
            dispatcher: self,
            event: &frame.event,
            kind: frame.kind,
            payload: &view,
            queue,
            depth,
        });

        match result {
            HandlerResult::Continue => false,
            HandlerResult::Halt if frame.kind.short_circuits() => {
                tracing::debug!(
                    "Handler '{}' halted {} event '{}'",
                    handler.name(),
                    frame.kind,
                    frame.event
                );
                true
            }
            HandlerResult::Halt => false,
            HandlerResult::Relay(update) if frame.kind == EventKind::Relay => {
                apply_relay(
                    &mut frame.payload,
                    signature,
                    update,
                    handler.name(),
                    &frame.event,
                );
                false
            }
            HandlerResult::Relay(_) => {
                tracing::trace!(
                    "Ignoring relay values from '{}' on {} event '{}'",
                    handler.name(),
                    frame.kind,
                    frame.event
                );
                false
            }
        }
    }

    // =========================================================================
    // Frames
    // =========================================================================

    /// Number of frames currently executing
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Snapshot of the dispatch stack, outermost first
    pub fn current_frames(&self) -> Vec<FrameInfo> {
        self.frames.borrow().clone()
    }

    /// Number of Queue events waiting on their tokens
    pub fn parked_count(&self) -> usize {
        self.parked.borrow().len()
    }

    /// Names of parked Queue events, oldest first
    pub fn parked_events(&self) -> Vec<String> {
        self.parked.borrow().events()
    }

    /// Tokens of parked Queue events, oldest first
    pub fn parked_tokens(&self) -> Vec<QueueToken> {
        self.parked.borrow().tokens()
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Get recent event history (if enabled)
    ///
    /// Returns events since the given instant, or all history if None.
    pub fn history(&self, since: Option<Instant>) -> Vec<EventRecord> {
        if !self.config.enable_history {
            return Vec::new();
        }

        let history = self.history.borrow();
        match since {
            Some(since) => history
                .iter()
                .filter(|r| r.timestamp >= since)
                .cloned()
                .collect(),
            None => history.iter().cloned().collect(),
        }
    }

    /// Clear event history
    pub fn clear_history(&self) {
        self.history.borrow_mut().clear();
    }

    /// Get the current configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Add an event to history, maintaining size and age limits
    fn add_to_history(&self, event: &str, kind: EventKind, payload: &Payload) {
        let mut history = self.history.borrow_mut();
        let now = Instant::now();

        history.push_back(EventRecord {
            event: event.to_string(),
            kind,
            payload: payload.clone(),
            timestamp: now,
        });

        let retention = self.config.history_retention;
        while history
            .front()
            .is_some_and(|r| now.duration_since(r.timestamp) > retention)
        {
            history.pop_front();
        }

        while history.len() > self.config.max_history_size {
            history.pop_front();
        }
    }
}

/// Merge a relay handler's values into the frame payload.
///
/// Only keys the post already carries, and that the handler declared, change.
fn apply_relay(
    payload: &mut Payload,
    signature: &HandlerSignature,
    update: Payload,
    handler: &str,
    event: &str,
) {
    for (key, value) in update {
        if !payload.contains_key(&key) {
            tracing::warn!(
                "Handler '{}' relayed unknown key '{}' on '{}', ignoring",
                handler,
                key,
                event
            );
            continue;
        }
        if !signature.may_relay(&key) {
            tracing::warn!(
                "Handler '{}' relayed undeclared key '{}' on '{}', ignoring",
                handler,
                key,
                event
            );
            continue;
        }
        payload.insert(key, value);
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registrations", &self.registration_count())
            .field("depth", &self.depth())
            .field("parked", &self.parked_count())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use crate::types::SharedVec;

    #[test]
    fn test_dispatcher_creation() {
        let events = EventDispatcher::new();
        assert_eq!(events.registration_count(), 0);
        assert_eq!(events.depth(), 0);
        assert_eq!(events.config().default_priority, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_depth_limit() {
        let events = EventDispatcher::with_config(DispatcherConfig {
            max_depth: 3,
            ..Default::default()
        });
        let errors: SharedVec<DispatchError> = shared(Vec::new());
        let errors_clone = errors.clone();

        events.register(
            "ball_search",
            Handler::new(move |ctx| {
                if let Err(e) = ctx.post("ball_search", Payload::new()) {
                    errors_clone.borrow_mut().push(e);
                }
            }),
        );

        assert!(events.post("ball_search", Payload::new()).is_ok());
        assert_eq!(
            *errors.borrow(),
            vec![DispatchError::DepthExceeded {
                event: "ball_search".to_string(),
                depth: 4,
                limit: 3,
            }]
        );
        assert_eq!(events.depth(), 0);
    }

    #[test]
    fn test_frames_visible_during_dispatch() {
        let events = EventDispatcher::new();
        let seen: SharedVec<Vec<String>> = shared(Vec::new());

        let seen_clone = seen.clone();
        events.register(
            "inner",
            Handler::new(move |ctx| {
                let names = ctx
                    .dispatcher()
                    .current_frames()
                    .into_iter()
                    .map(|f| f.event)
                    .collect();
                seen_clone.borrow_mut().push(names);
                assert_eq!(ctx.depth(), 2);
            }),
        );
        events.register(
            "outer",
            Handler::new(|ctx| {
                ctx.post("inner", Payload::new()).ok();
            }),
        );

        events.post("outer", Payload::new()).ok();
        assert_eq!(
            *seen.borrow(),
            vec![vec!["outer".to_string(), "inner".to_string()]]
        );
    }

    #[test]
    fn test_relay_rejects_unknown_and_undeclared_keys() {
        let events = EventDispatcher::new();
        events.register(
            "score",
            Handler::new(|_| payload! { "points" => 20, "bonus" => 5 }),
        );
        events.register_with_priority(
            "score",
            Handler::new(|_| payload! { "points" => 99, "multiplier" => 3 }).relays(["multiplier"]),
            -1,
        );

        let result = shared(Payload::new());
        let result_clone = result.clone();
        events
            .post_relay_with_callback(
                "score",
                payload! { "points" => 10, "multiplier" => 1 },
                move |p| *result_clone.borrow_mut() = p.clone(),
            )
            .ok();

        assert_eq!(
            *result.borrow(),
            payload! { "points" => 20, "multiplier" => 3 }
        );
    }

    #[test]
    fn test_relay_values_ignored_for_other_kinds() {
        let events = EventDispatcher::new();
        events.register("e", Handler::new(|_| payload! { "k" => 2 }));

        let result = shared(Payload::new());
        let result_clone = result.clone();
        events
            .post_boolean_with_callback("e", payload! { "k" => 1 }, move |p| {
                *result_clone.borrow_mut() = p.clone()
            })
            .ok();

        assert_eq!(result.borrow().get_i64("k"), Some(1));
    }

    #[test]
    fn test_registration_defaults_and_consumes() {
        let events = EventDispatcher::new();
        let seen: SharedVec<Payload> = shared(Vec::new());

        let seen_clone = seen.clone();
        events.register_with(
            "balldevice_balls_available",
            Handler::new(move |ctx| seen_clone.borrow_mut().push(ctx.payload().clone()))
                .consumes(["balls", "device"]),
            DEFAULT_PRIORITY,
            payload! { "device" => "trough", "balls" => 0 },
        );

        events
            .post("balldevice_balls_available", payload! { "balls" => 2, "noise" => 1 })
            .ok();
        assert_eq!(
            *seen.borrow(),
            vec![payload! { "balls" => 2, "device" => "trough" }]
        );
    }

    #[test]
    fn test_replace_keeps_single_registration() {
        let events = EventDispatcher::new();
        let h = Handler::new(|_| ());
        events.register("e", h.clone());
        events.register("e", h.clone());
        events.register("other", h.clone());

        events.replace("e", h.clone(), 10);
        assert_eq!(events.handler_count("e"), 1);
        assert_eq!(events.handler_count("other"), 1);
        assert_eq!(events.event_names(), vec!["e".to_string(), "other".to_string()]);

        let registrations = events.registrations("e");
        assert_eq!(registrations[0].priority, 10);
        assert!(registrations[0].handler.same_handler(&h));
    }

    #[test]
    fn test_event_history() {
        let events = EventDispatcher::with_config(DispatcherConfig {
            enable_history: true,
            max_history_size: 3,
            ..Default::default()
        });

        for i in 0..5 {
            events.post("switch_active", payload! { "n" => i }).ok();
        }
        events.post_queue("eject", Payload::new()).ok();

        let history = events.history(None);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].payload.get_i64("n"), Some(3));
        assert_eq!(history[2].kind, EventKind::Queue);

        events.clear_history();
        assert!(events.history(None).is_empty());
    }

    #[test]
    fn test_history_disabled_by_default() {
        let events = EventDispatcher::new();
        events.post("e", Payload::new()).ok();
        assert!(events.history(None).is_empty());
    }

    #[test]
    fn test_parked_tracking() {
        let events = EventDispatcher::new();
        events.register("eject", Handler::with_queue(|_, queue| queue.wait()));

        let status = events.post_queue("eject", Payload::new()).unwrap();
        assert_eq!(events.parked_count(), 1);
        assert_eq!(events.parked_events(), vec!["eject".to_string()]);
        let token = status.queue().cloned().unwrap();
        assert!(events.parked_tokens()[0].same_token(&token));

        token.clear();
        assert_eq!(events.parked_count(), 0);
    }
}
