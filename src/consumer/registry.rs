//! Message Handler Registry
//!
//! Maps handler names (e.g. "ioc_record") to executable closures so consumer groups
//! can be bound to their domain logic purely through configuration.

use super::types::*;

use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a thread-safe, asynchronous message handler.
/// It takes the message body and resolves to a `HandlerResult`.
pub type HandlerFn =
    Arc<dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = HandlerResult> + Send>> + Send + Sync>;

/// Registry holding the mapping between handler names and their implementation.
pub struct HandlerRegistry {
    handlers: DashMap<String, HandlerFn>,
}

impl HandlerRegistry {
    /// Creates a new, empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a handler under `handler_name`, replacing any previous one.
    pub fn insert(&self, handler_name: &str, handler: HandlerFn) {
        self.handlers.insert(handler_name.to_string(), handler);

        tracing::info!("Registered message handler: {}", handler_name);
    }

    pub fn get(&self, handler_name: &str) -> Option<HandlerFn> {
        self.handlers
            .get(handler_name)
            .map(|entry| entry.value().clone())
    }

    /// Returns a sorted list of all registered handler names.
    pub fn list_handlers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

/// Type-erases a closure into a `HandlerFn`.
pub fn into_handler_fn<F, Fut>(handler: F) -> HandlerFn
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |body: serde_json::Value| {
        Box::pin(handler(body)) as Pin<Box<dyn Future<Output = HandlerResult> + Send>>
    })
}
