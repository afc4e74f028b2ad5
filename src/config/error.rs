use thiserror::Error;

/// Problems found while validating a `PipelineConfig`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{owner} references unknown queue {queue}")]
    UnknownQueue { owner: String, queue: String },

    #[error("{owner} references unknown topic {topic}")]
    UnknownTopic { owner: String, topic: String },

    #[error("group {group} uses unregistered handler {handler}")]
    UnknownHandler { group: String, handler: String },

    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("invalid value for environment variable {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}
