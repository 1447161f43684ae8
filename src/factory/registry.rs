//! # Name → factory registry.
//!
//! Registration is additive and happens during initialization; after the
//! manager starts, the registry is only read. Re-registering a name
//! replaces the previous factory (last write wins), which keeps test
//! isolation trivial.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use super::Factory;

/// Process-wide mapping from command name to handler factory.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: DashMap<String, Arc<dyn Factory>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`.
    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn Factory>) {
        let name = name.into();
        trace!(command = %name, "factory registered");
        self.factories.insert(name, factory);
    }

    /// Resolves a factory by command name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Factory>> {
        self.factories.get(name).map(|entry| entry.value().clone())
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
