//! # Fan-out of the three event streams.
//!
//! [`FanOut`] owns the handler lists for messages, results and stats
//! flushes. Lists are append-only while the manager is being wired up and
//! effectively immutable once it runs.
//!
//! ```text
//!  runner ──messages──► [loglevels filter] ─► stamp epoch+id ─► h1 ─► h2 ─► …
//!  runner ──result────► [copy tags/args from cmd] ───────────► h1 ─► h2 ─► …
//!  meter  ──stats─────► ────────────────────────────────────► h1 ─► h2 ─► …
//! ```
//!
//! ## Rules
//! - Handlers run in registration order, awaited on the emitting path.
//! - A handler panic is caught and logged; remaining handlers still run.
//! - No internal lock is held across handler dispatch.

use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use tracing::warn;

use crate::{
    core::mid::MessageIdAllocator,
    events::handler::{MessageHandler, ResultHandler, StatsFlushHandler},
    jobs::{Command, JobResult, Message},
    stats::Stats,
};

/// Synchronous dispatcher for the three event streams.
pub struct FanOut {
    mid: Arc<MessageIdAllocator>,
    messages: RwLock<Vec<Arc<dyn MessageHandler>>>,
    results: RwLock<Vec<Arc<dyn ResultHandler>>>,
    stats: RwLock<Vec<Arc<dyn StatsFlushHandler>>>,
}

impl FanOut {
    /// Creates an empty fan-out stamping message ids from `mid`.
    pub(crate) fn new(mid: Arc<MessageIdAllocator>) -> Self {
        Self {
            mid,
            messages: RwLock::new(Vec::new()),
            results: RwLock::new(Vec::new()),
            stats: RwLock::new(Vec::new()),
        }
    }

    /// Appends a message handler.
    pub fn add_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.messages.write().expect("handler list poisoned").push(handler);
    }

    /// Appends a result handler.
    pub fn add_result_handler(&self, handler: Arc<dyn ResultHandler>) {
        self.results.write().expect("handler list poisoned").push(handler);
    }

    /// Appends a stats flush handler.
    pub fn add_stats_flush_handler(&self, handler: Arc<dyn StatsFlushHandler>) {
        self.stats.write().expect("handler list poisoned").push(handler);
    }

    /// Filters, stamps and dispatches one message.
    pub(crate) async fn message(&self, cmd: &Command, mut msg: Message) {
        let levels = cmd.args.loglevels();
        if !levels.is_empty() && !levels.contains(&msg.level) {
            return;
        }

        msg.epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        msg.id = self.mid.next();

        let handlers = self.messages.read().expect("handler list poisoned").clone();
        for handler in handlers {
            let fut = handler.on_message(cmd, &msg);
            if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                warn!(handler = handler.name(), "message handler panicked");
            }
        }
    }

    /// Copies routing fields from the command and dispatches one result.
    pub(crate) async fn result(&self, cmd: &Command, mut result: JobResult) {
        result.tags = cmd.tags.clone();
        result.args = cmd.args.clone();

        let handlers = self.results.read().expect("handler list poisoned").clone();
        for handler in handlers {
            let fut = handler.on_result(cmd, &result);
            if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                warn!(handler = handler.name(), "result handler panicked");
            }
        }
    }

    /// Dispatches one aggregated stats snapshot.
    pub(crate) async fn stats(&self, stats: &Stats) {
        let handlers = self.stats.read().expect("handler list poisoned").clone();
        for handler in handlers {
            let fut = handler.on_flush(stats);
            if std::panic::AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                warn!(handler = handler.name(), "stats handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::handler::{MessageFn, ResultFn};
    use crate::jobs::{Args, JobState};
    use std::sync::Mutex;

    fn fanout() -> FanOut {
        let dir = tempfile::tempdir().unwrap();
        // The tempdir is dropped right away; the allocator keeps
        // counting in memory when the file is unwritable.
        FanOut::new(Arc::new(MessageIdAllocator::load(dir.path().join("mid"))))
    }

    #[tokio::test]
    async fn loglevels_filter_messages_before_dispatch() {
        let fan = fanout();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fan.add_message_handler(MessageFn::arc(move |_cmd, msg| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(msg.level);
            }
        }));

        let cmd = Command::new("j", "x")
            .with_args(Args::new().with("loglevels", serde_json::json!([2, 20])));

        for level in [1u8, 2, 3, 20] {
            fan.message(&cmd, Message::new("j", level, "m")).await;
        }
        assert_eq!(*seen.lock().unwrap(), vec![2, 20]);
    }

    #[tokio::test]
    async fn message_ids_increase_in_dispatch_order() {
        let fan = fanout();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        fan.add_message_handler(MessageFn::arc(move |_cmd, msg| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(msg.id);
            }
        }));

        let cmd = Command::new("j", "x");
        for _ in 0..5 {
            fan.message(&cmd, Message::new("j", 1, "m")).await;
        }

        let ids = seen.lock().unwrap().clone();
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids not increasing: {ids:?}");
    }

    #[tokio::test]
    async fn results_carry_the_command_routing_fields() {
        let fan = fanout();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        fan.add_result_handler(ResultFn::arc(move |_cmd, result| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(result);
            }
        }));

        let cmd = Command::new("j", "x")
            .with_tags("route-7")
            .with_args(Args::new().with("queue", "q"));
        // Deliberately blank routing fields; the fan-out must restore them.
        let bare = JobResult::new(&Command::new("j", "x"), JobState::Success);
        fan.result(&cmd, bare).await;

        let result = seen.lock().unwrap().take().unwrap();
        assert_eq!(result.tags, "route-7");
        assert_eq!(result.args.queue(), "q");
    }

    #[tokio::test]
    async fn a_panicking_handler_does_not_starve_later_ones() {
        let fan = fanout();
        fan.add_message_handler(MessageFn::arc(|_cmd, _msg| async move {
            panic!("boom");
        }));
        let seen = Arc::new(Mutex::new(0u32));
        let sink = seen.clone();
        fan.add_message_handler(MessageFn::arc(move |_cmd, _msg| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() += 1;
            }
        }));

        fan.message(&Command::new("j", "x"), Message::new("j", 1, "m")).await;
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
