//! Per-event handler registrations, kept in dispatch order.
//!
//! Each event name maps to its registrations sorted by descending priority,
//! ties broken by registration order. Lookups hand out snapshots, so a
//! dispatch already under way is unaffected by later removals.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::handler::Handler;
use super::payload::Payload;

/// Priority given to handlers registered without one
pub const DEFAULT_PRIORITY: i32 = 1;

/// Opaque handle for removing exactly one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerKey(Uuid);

impl HandlerKey {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key({})", &self.0.to_string()[..8])
    }
}

/// A handler bound to one event name
#[derive(Debug, Clone)]
pub struct Registration {
    pub event: String,
    pub handler: Handler,
    pub priority: i32,
    pub key: HandlerKey,
    /// Monotonic counter used to order equal priorities
    pub order: u64,
    /// Values merged under the posted payload when this handler runs
    pub defaults: Payload,
}

/// Handler registrations for every event name
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    events: HashMap<String, Vec<Registration>>,
    keys: HashMap<HandlerKey, String>,
    next_order: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event` and return its key
    ///
    /// Registering the same handler twice yields two independent registrations.
    pub fn register(
        &mut self,
        event: &str,
        handler: Handler,
        priority: i32,
        defaults: Payload,
    ) -> HandlerKey {
        let key = HandlerKey::new();
        let order = self.next_order;
        self.next_order += 1;

        let registrations = self.events.entry(event.to_string()).or_default();
        let index = registrations.partition_point(|r| {
            r.priority > priority || (r.priority == priority && r.order < order)
        });
        registrations.insert(
            index,
            Registration {
                event: event.to_string(),
                handler,
                priority,
                key,
                order,
                defaults,
            },
        );
        self.keys.insert(key, event.to_string());
        key
    }

    /// Remove every registration of `handler`, across all events
    pub fn unregister_by_handler(&mut self, handler: &Handler) -> usize {
        let events: Vec<String> = self.events.keys().cloned().collect();
        events
            .iter()
            .map(|event| self.unregister_by_event_and_handler(event, handler))
            .sum()
    }

    /// Remove registrations of `handler` for `event` only
    pub fn unregister_by_event_and_handler(&mut self, event: &str, handler: &Handler) -> usize {
        let Some(registrations) = self.events.get_mut(event) else {
            return 0;
        };

        let mut removed = Vec::new();
        registrations.retain(|r| {
            if r.handler.same_handler(handler) {
                removed.push(r.key);
                false
            } else {
                true
            }
        });

        for key in &removed {
            self.keys.remove(key);
        }
        self.prune(event);
        removed.len()
    }

    /// Remove the registration behind `key`; false if it is already gone
    pub fn unregister_by_key(&mut self, key: HandlerKey) -> bool {
        let Some(event) = self.keys.remove(&key) else {
            return false;
        };

        if let Some(registrations) = self.events.get_mut(&event) {
            registrations.retain(|r| r.key != key);
        }
        self.prune(&event);
        true
    }

    /// Remove several registrations; returns how many were still present
    pub fn unregister_by_keys<'a, I>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a HandlerKey>,
    {
        keys.into_iter()
            .filter(|key| self.unregister_by_key(**key))
            .count()
    }

    /// Snapshot of `event`'s registrations in dispatch order
    pub fn handlers_for(&self, event: &str) -> Vec<Registration> {
        self.events.get(event).cloned().unwrap_or_default()
    }

    pub fn exists(&self, event: &str) -> bool {
        self.events.get(event).is_some_and(|r| !r.is_empty())
    }

    /// Total number of registrations
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Names of events with at least one registration, sorted
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.keys().cloned().collect();
        names.sort();
        names
    }

    fn prune(&mut self, event: &str) {
        if self.events.get(event).is_some_and(Vec::is_empty) {
            self.events.remove(event);
        }
    }
}
