//! # Dependency state machine for slice startup.
//!
//! A startup slice is a set of entries, each naming the keys it must wait
//! for. The [`StateMachine`] tracks which keys have been released and with
//! what outcome; waiters block until *all* their keys are released and then
//! learn whether every one of them succeeded.
//!
//! Keys needed by a slice but not provided by it are released up front with
//! `success = true`: external dependencies are assumed satisfied.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::jobs::Args;

/// One entry of a startup slice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartupEntry {
    /// Dependency key this entry provides; defaults to `name` when empty.
    #[serde(default)]
    pub key: String,
    /// Handler name to run.
    pub name: String,
    /// Opaque payload for the handler.
    #[serde(default)]
    pub data: String,
    /// Argument bag for the command.
    #[serde(default)]
    pub args: Args,
    /// Keys that must be released before this entry may start.
    #[serde(default)]
    pub after: Vec<String>,
    /// When set, this entry's key is released only once the job exits
    /// (one-shot init tasks); otherwise release happens when the job is
    /// observed up.
    #[serde(default)]
    pub must_exit: bool,
}

impl StartupEntry {
    /// Creates an entry running `name`, keyed by `key`.
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds prerequisite keys.
    pub fn with_after(mut self, after: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.after = after.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the entry as a one-shot init task.
    pub fn with_must_exit(mut self, must_exit: bool) -> Self {
        self.must_exit = must_exit;
        self
    }

    /// Replaces the argument bag.
    pub fn with_args(mut self, args: Args) -> Self {
        self.args = args;
        self
    }

    /// The dependency key this entry provides.
    pub fn key(&self) -> &str {
        if self.key.is_empty() {
            &self.name
        } else {
            &self.key
        }
    }
}

/// Tracks `key → (released, success)` and wakes waiters on every release.
pub struct StateMachine {
    state: Mutex<HashMap<String, bool>>,
    version: watch::Sender<u64>,
}

impl StateMachine {
    /// Creates an empty state machine.
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Mutex::new(HashMap::new()),
            version,
        }
    }

    /// Releases a key with the given outcome, waking all waiters.
    ///
    /// A second release of the same key overwrites the outcome; waiters that
    /// already proceeded are unaffected.
    pub fn release(&self, key: impl Into<String>, success: bool) {
        self.state
            .lock()
            .expect("dependency state poisoned")
            .insert(key.into(), success);
        self.version.send_modify(|v| *v += 1);
    }

    /// Waits until every key in `keys` is released; returns `true` iff all
    /// of them were released with success. Empty `keys` returns immediately.
    pub async fn wait(&self, keys: &[String]) -> bool {
        let mut rx = self.version.subscribe();
        loop {
            {
                let state = self.state.lock().expect("dependency state poisoned");
                if keys.iter().all(|k| state.contains_key(k)) {
                    return keys.iter().all(|k| state.get(k).copied().unwrap_or(false));
                }
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Keys from `keys` that were released with failure (for diagnostics).
    pub fn failed(&self, keys: &[String]) -> Vec<String> {
        let state = self.state.lock().expect("dependency state poisoned");
        keys.iter()
            .filter(|k| state.get(*k) == Some(&false))
            .cloned()
            .collect()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn empty_dependency_list_runs_immediately() {
        let state = StateMachine::new();
        assert!(state.wait(&[]).await);
    }

    #[tokio::test]
    async fn waiters_block_until_all_keys_release() {
        let state = Arc::new(StateMachine::new());
        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.wait(&keys(&["a", "b"])).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        state.release("a", true);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        state.release("b", true);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn one_failed_dependency_fails_the_wait() {
        let state = StateMachine::new();
        state.release("a", true);
        state.release("b", false);
        assert!(!state.wait(&keys(&["a", "b"])).await);
        assert_eq!(state.failed(&keys(&["a", "b"])), vec!["b"]);
    }

    #[tokio::test]
    async fn release_before_wait_is_observed() {
        let state = StateMachine::new();
        state.release("a", true);
        assert!(state.wait(&keys(&["a"])).await);
    }

    #[test]
    fn entry_key_falls_back_to_name() {
        assert_eq!(StartupEntry::new("", "redis").key(), "redis");
        assert_eq!(StartupEntry::new("cache", "redis").key(), "cache");
    }
}
