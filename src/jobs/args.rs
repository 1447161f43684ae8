//! # Typed key-value argument bag attached to every command.
//!
//! Controllers submit arguments as free-form JSON; [`Args`] wraps that map
//! and exposes typed accessors for the keys the runtime recognizes:
//!
//! | key               | meaning                                              |
//! |-------------------|------------------------------------------------------|
//! | `queue`           | serialization queue name (empty = no queue)          |
//! | `stats_interval`  | metering period in seconds (0 = runtime default)     |
//! | `max_time`        | wall-clock limit in seconds (-1 = indefinite, kept in the replay log) |
//! | `loglevels`       | message levels forwarded to handlers (empty = all)   |
//! | `recurring_period`| reserved for recurring submission                    |
//!
//! Unrecognized keys are preserved verbatim; results carry the whole bag
//! back to the controller for routing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Routing tag key, set by the poller that received the command.
const KEY_TAG: &str = "tag";

/// Free-form argument bag with typed accessors for well-known keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args {
    map: Map<String, Value>,
}

impl Args {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing JSON object.
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self { map }
    }

    /// Sets a key to any JSON-convertible value, returning the bag for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Sets a key to any JSON-convertible value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.map.insert(key.into(), value.into());
    }

    /// Returns an integer value, tolerating JSON floats.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.map.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        }
    }

    /// Returns a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(Value::as_str)
    }

    /// Returns an integer array; non-integer elements are skipped.
    pub fn get_int_array(&self, key: &str) -> Vec<i64> {
        match self.map.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
            _ => Vec::new(),
        }
    }

    /// Serialization queue name; empty means the command bypasses the queue manager.
    pub fn queue(&self) -> &str {
        self.get_str("queue").unwrap_or("")
    }

    /// Metering period in seconds. `None` or 0 means "use the runtime default".
    pub fn stats_interval(&self) -> u64 {
        self.get_int("stats_interval").map(|v| v.max(0) as u64).unwrap_or(0)
    }

    /// Wall-clock limit in seconds: 0 = no limit, -1 = indefinite + replay log.
    pub fn max_time(&self) -> i64 {
        self.get_int("max_time").unwrap_or(0)
    }

    /// Message levels delivered to handlers; empty means all levels pass.
    pub fn loglevels(&self) -> Vec<u8> {
        self.get_int_array("loglevels")
            .into_iter()
            .filter_map(|v| u8::try_from(v).ok())
            .collect()
    }

    /// Reserved recurring submission period in seconds (0 = not recurring).
    pub fn recurring_period(&self) -> i64 {
        self.get_int("recurring_period").unwrap_or(0)
    }

    /// Routing tag identifying the controller a command arrived from.
    pub fn tag(&self) -> &str {
        self.get_str(KEY_TAG).unwrap_or("")
    }

    /// Stamps the routing tag.
    pub fn set_tag(&mut self, tag: impl Into<String>) {
        self.set(KEY_TAG, Value::String(tag.into()));
    }
}
