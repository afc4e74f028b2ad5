use super::queue::DurableQueue;
use super::types::QueueConfig;

use std::collections::HashMap;
use std::sync::Arc;

/// Static lookup from queue name to queue handle, built once at startup.
#[derive(Default)]
pub struct QueueRegistry {
    queues: HashMap<String, Arc<DurableQueue>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a queue. Declaring the same name twice returns the existing handle.
    pub fn declare(&mut self, name: &str, config: QueueConfig) -> Arc<DurableQueue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!("Declared queue: {}", name);
                Arc::new(DurableQueue::new(name, config))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<DurableQueue>> {
        self.queues.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}
