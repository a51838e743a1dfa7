//! Keyword payloads carried by posted events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Payload key added to a callback's payload when a handler halted the event.
pub const EV_RESULT_KEY: &str = "ev_result";

/// Keyword arguments attached to an event post.
///
/// Keys are unique; insertion order carries no meaning. Values are plain JSON
/// values so payloads can be logged and stored in event history as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    /// Create an empty payload
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Insert a value, returning the previous one for that key
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Overwrite this payload's entries with every entry of `other`
    pub fn merge(&mut self, other: &Payload) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Fill in entries from `defaults` that this payload does not set itself
    pub fn merge_defaults(&mut self, defaults: &Payload) {
        for (key, value) in defaults.iter() {
            self.0
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Copy of this payload restricted to the given keys
    pub fn project<'a, I>(&self, keys: I) -> Payload
    where
        I: IntoIterator<Item = &'a String>,
    {
        keys.into_iter()
            .filter_map(|key| self.0.get(key).map(|v| (key.clone(), v.clone())))
            .collect()
    }

    /// Result flag seen by callbacks.
    ///
    /// Only a literal `false` under [`EV_RESULT_KEY`] means the event was halted.
    pub fn ev_result(&self) -> bool {
        !matches!(self.0.get(EV_RESULT_KEY), Some(Value::Bool(false)))
    }

    pub(crate) fn mark_halted(&mut self) {
        self.0.insert(EV_RESULT_KEY.to_string(), Value::Bool(false));
    }
}

impl FromIterator<(String, Value)> for Payload {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Payload {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<BTreeMap<String, Value>> for Payload {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// Build a [`Payload`] from `key => value` pairs
///
/// ```rust,ignore
/// let payload = payload! { "balls" => 1, "source" => "trough" };
/// ```
#[macro_export]
macro_rules! payload {
    () => {
        $crate::events::Payload::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut payload = $crate::events::Payload::new();
        $( payload.insert($key, $value); )+
        payload
    }};
}
