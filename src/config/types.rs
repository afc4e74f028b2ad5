//! Configuration structures.
//!
//! The TOML file declares the whole static topology: queues, topics and their
//! subscriptions, consumer groups, crawlers, the record store and the alert
//! destination. Durations are plain integers (seconds unless the field name says
//! otherwise) and are converted into runtime types by the `to_*` helpers.
//!
//! `PipelineConfig::default()` reproduces the reference deployment: an IOC and an
//! entity pipeline, each with a record and a detect queue.

use crate::consumer::types::{GroupConfig, RetryStrategy};
use crate::queue::types::{DEFAULT_MAX_RECEIVE_COUNT, DEFAULT_VISIBILITY_TIMEOUT, QueueConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub alert: AlertConfig,
    /// Opaque reference handed to crawlers that need credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    pub queues: Vec<QueueSettings>,
    pub topics: Vec<TopicSettings>,
    pub groups: Vec<GroupSettings>,
    pub crawlers: Vec<CrawlerSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub name: String,
    pub retention_days: u64,
    pub reclaim_interval_secs: u64,
    pub shards: u32,
}

impl StoreConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(DAY_SECS))
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "records".to_string(),
            retention_days: 90,
            reclaim_interval_secs: 3600,
            shards: crate::storage::partitioner::DEFAULT_SHARDS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    pub name: String,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

impl QueueSettings {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_receive_count: default_max_receive_count(),
            capacity: None,
        }
    }

    pub fn to_queue_config(&self) -> QueueConfig {
        QueueConfig {
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
            max_receive_count: self.max_receive_count,
            capacity: self.capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSettings {
    pub name: String,
    /// Queue names; each published message is copied into every one.
    #[serde(default)]
    pub subscribers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSettings {
    pub name: String,
    pub queue: String,
    /// Name registered in the handler registry, e.g. "ioc_record".
    pub handler: String,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    #[serde(default)]
    pub retry_strategy: RetryStrategy,
    #[serde(default)]
    pub terminal_to_dead_letter: bool,
}

impl GroupSettings {
    pub fn new(name: &str, queue: &str, max_concurrency: usize) -> Self {
        Self {
            name: name.to_string(),
            queue: queue.to_string(),
            handler: name.to_string(),
            max_concurrency,
            batch_size: default_batch_size(),
            poll_wait_ms: default_poll_wait_ms(),
            handler_timeout_secs: default_handler_timeout_secs(),
            retry_strategy: RetryStrategy::default(),
            terminal_to_dead_letter: false,
        }
    }

    pub fn to_group_config(&self) -> GroupConfig {
        GroupConfig {
            poll_wait: Duration::from_millis(self.poll_wait_ms),
            handler_timeout: Duration::from_secs(self.handler_timeout_secs),
            retry_strategy: self.retry_strategy,
            terminal_to_dead_letter: self.terminal_to_dead_letter,
            ..GroupConfig::new(&self.name)
        }
        .max_concurrency(self.max_concurrency)
        .batch_size(self.batch_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlerKind {
    Urlhaus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlerSettings {
    pub name: String,
    pub kind: CrawlerKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub topic: String,
    #[serde(default = "default_crawl_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_crawl_timeout_secs")]
    pub timeout_secs: u64,
    /// Crawl once at start-up instead of waiting a full interval.
    #[serde(default)]
    pub run_on_start: bool,
    /// Overrides the feed URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CrawlerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let pipeline = |kind: &str| {
            (
                TopicSettings {
                    name: kind.to_string(),
                    subscribers: vec![format!("{kind}-record"), format!("{kind}-detect")],
                },
                [
                    QueueSettings::new(&format!("{kind}-record")),
                    QueueSettings::new(&format!("{kind}-detect")),
                ],
            )
        };
        let (ioc_topic, ioc_queues) = pipeline("ioc");
        let (entity_topic, entity_queues) = pipeline("entity");

        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            alert: AlertConfig::default(),
            secret_ref: None,
            queues: ioc_queues.into_iter().chain(entity_queues).collect(),
            topics: vec![ioc_topic, entity_topic],
            groups: vec![
                GroupSettings::new("ioc_record", "ioc-record", 1),
                GroupSettings::new("ioc_detect", "ioc-detect", 1),
                GroupSettings::new("entity_record", "entity-record", 10),
                GroupSettings::new("entity_detect", "entity-detect", 10),
            ],
            crawlers: vec![CrawlerSettings {
                name: "urlhaus".to_string(),
                kind: CrawlerKind::Urlhaus,
                enabled: true,
                topic: "ioc".to_string(),
                interval_secs: default_crawl_interval_secs(),
                timeout_secs: default_crawl_timeout_secs(),
                run_on_start: false,
                url: None,
            }],
        }
    }
}

fn default_visibility_timeout_secs() -> u64 {
    DEFAULT_VISIBILITY_TIMEOUT.as_secs()
}

fn default_max_receive_count() -> u32 {
    DEFAULT_MAX_RECEIVE_COUNT
}

fn default_max_concurrency() -> usize {
    1
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_wait_ms() -> u64 {
    1000
}

fn default_handler_timeout_secs() -> u64 {
    300
}

fn default_crawl_interval_secs() -> u64 {
    DAY_SECS
}

fn default_crawl_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}
