//! # Event handler traits.
//!
//! Three independent extension points, one per event stream. Handlers are
//! invoked synchronously on the emitting runner's path, in registration
//! order, so they must not block: slow sinks (network posting, disk
//! batching) are expected to buffer internally and return immediately.
//!
//! Panics inside a handler are caught and logged; they neither reach the
//! runner nor prevent later handlers from seeing the event.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    jobs::{Command, JobResult, Message},
    stats::Stats,
};

/// Receives every message that passes the command's `loglevels` filter.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Processes one message. `msg.epoch` and `msg.id` are already stamped.
    async fn on_message(&self, cmd: &Command, msg: &Message);

    /// Handler name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Receives every job result.
#[async_trait]
pub trait ResultHandler: Send + Sync + 'static {
    /// Processes one result. `result.tags`/`result.args` mirror the command.
    async fn on_result(&self, cmd: &Command, result: &JobResult);

    /// Handler name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Receives aggregated statistics snapshots.
#[async_trait]
pub trait StatsFlushHandler: Send + Sync + 'static {
    /// Processes one flushed snapshot.
    async fn on_flush(&self, stats: &Stats);

    /// Handler name for diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Closure adapter for [`MessageHandler`].
pub struct MessageFn<F>(F);

impl<F, Fut> MessageFn<F>
where
    F: Fn(Command, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Wraps a closure and returns it ready for registration.
    pub fn arc(func: F) -> Arc<dyn MessageHandler> {
        Arc::new(Self(func))
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for MessageFn<F>
where
    F: Fn(Command, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_message(&self, cmd: &Command, msg: &Message) {
        (self.0)(cmd.clone(), msg.clone()).await;
    }
}

/// Closure adapter for [`ResultHandler`].
pub struct ResultFn<F>(F);

impl<F, Fut> ResultFn<F>
where
    F: Fn(Command, JobResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Wraps a closure and returns it ready for registration.
    pub fn arc(func: F) -> Arc<dyn ResultHandler> {
        Arc::new(Self(func))
    }
}

#[async_trait]
impl<F, Fut> ResultHandler for ResultFn<F>
where
    F: Fn(Command, JobResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_result(&self, cmd: &Command, result: &JobResult) {
        (self.0)(cmd.clone(), result.clone()).await;
    }
}

/// Closure adapter for [`StatsFlushHandler`].
pub struct StatsFn<F>(F);

impl<F, Fut> StatsFn<F>
where
    F: Fn(Stats) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Wraps a closure and returns it ready for registration.
    pub fn arc(func: F) -> Arc<dyn StatsFlushHandler> {
        Arc::new(Self(func))
    }
}

#[async_trait]
impl<F, Fut> StatsFlushHandler for StatsFn<F>
where
    F: Fn(Stats) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn on_flush(&self, stats: &Stats) {
        (self.0)(stats.clone()).await;
    }
}
