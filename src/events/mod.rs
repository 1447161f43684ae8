//! Event fan-out: handler traits and the synchronous dispatcher.

mod fanout;
mod handler;

pub use fanout::FanOut;
pub use handler::{
    MessageFn, MessageHandler, ResultFn, ResultHandler, StatsFlushHandler, StatsFn,
};
