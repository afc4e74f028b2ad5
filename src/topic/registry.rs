use super::error::PublishError;
use super::topic::{PublishReport, Topic};

use std::collections::HashMap;
use std::sync::Arc;

/// Static mapping from topic name to topic, iterated on every publish.
#[derive(Default)]
pub struct TopicRegistry {
    topics: HashMap<String, Arc<Topic>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, topic: Topic) -> Arc<Topic> {
        let topic = Arc::new(topic);
        self.topics.insert(topic.name().to_string(), topic.clone());
        topic
    }

    pub fn get(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.get(name).cloned()
    }

    pub async fn publish(
        &self,
        topic: &str,
        body: serde_json::Value,
    ) -> Result<PublishReport, PublishError> {
        let topic = self
            .get(topic)
            .ok_or_else(|| PublishError::UnknownTopic(topic.to_string()))?;
        topic.publish(body).await
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.keys().cloned().collect();
        names.sort();
        names
    }
}
