use thiserror::Error;

/// Errors surfaced by `Topic::publish`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// No subscriber accepted the message within its retry budget.
    #[error("publish to topic {topic} failed for every subscriber: {failed:?}")]
    AllSubscribersFailed { topic: String, failed: Vec<String> },

    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}
