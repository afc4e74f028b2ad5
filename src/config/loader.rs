//! # Configuration Loader
//!
//! Reads the TOML file (or starts from the built-in defaults), applies environment
//! overrides and validates cross references before anything is started.

use super::error::ConfigError;
use super::types::PipelineConfig;

use anyhow::Context;
use std::collections::HashSet;
use std::path::Path;

pub const ENV_ALERT_WEBHOOK_URL: &str = "ALERT_WEBHOOK_URL";
pub const ENV_RECORD_TABLE_NAME: &str = "RECORD_TABLE_NAME";
pub const ENV_URLHAUS_ENABLED: &str = "URLHAUS_ENABLED";
pub const ENV_SECRET_REF: &str = "SECRET_REF";

/// Loads `path` if given, otherwise the defaults, then applies the process
/// environment and validates.
pub fn load(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => {
            tracing::debug!("Reading config from {:?}", path);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config = PipelineConfig::from_toml(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            tracing::info!("Loaded config from {:?}", path);
            config
        }
        None => {
            tracing::info!("No config file given, using built-in defaults");
            PipelineConfig::default()
        }
    };

    config.apply_overrides(|var| std::env::var(var).ok())?;
    config.validate()?;
    Ok(config)
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Applies environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_ALERT_WEBHOOK_URL).filter(|v| !v.is_empty()) {
            tracing::debug!("{} overrides alert.webhook_url", ENV_ALERT_WEBHOOK_URL);
            self.alert.webhook_url = Some(url);
        }

        if let Some(name) = lookup(ENV_RECORD_TABLE_NAME).filter(|v| !v.is_empty()) {
            tracing::debug!("{} overrides store.name", ENV_RECORD_TABLE_NAME);
            self.store.name = name;
        }

        if let Some(reference) = lookup(ENV_SECRET_REF).filter(|v| !v.is_empty()) {
            self.secret_ref = Some(reference);
        }

        if let Some(raw) = lookup(ENV_URLHAUS_ENABLED) {
            let enabled = parse_flag(&raw).ok_or(ConfigError::InvalidEnv {
                var: ENV_URLHAUS_ENABLED,
                value: raw.clone(),
            })?;
            for crawler in self
                .crawlers
                .iter_mut()
                .filter(|c| c.kind == super::types::CrawlerKind::Urlhaus)
            {
                crawler.enabled = enabled;
            }
        }

        Ok(())
    }

    /// Checks names, numeric ranges and references between sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let queues = unique_names("queue", self.queues.iter().map(|q| q.name.as_str()))?;
        let topics = unique_names("topic", self.topics.iter().map(|t| t.name.as_str()))?;
        unique_names("group", self.groups.iter().map(|g| g.name.as_str()))?;
        unique_names("crawler", self.crawlers.iter().map(|c| c.name.as_str()))?;

        if self.store.reclaim_interval_secs == 0 {
            return Err(invalid("store.reclaim_interval_secs", "must be at least 1"));
        }
        if self.store.shards == 0 {
            return Err(invalid("store.shards", "must be at least 1"));
        }

        for queue in &self.queues {
            if queue.visibility_timeout_secs == 0 {
                return Err(invalid(
                    &format!("queues.{}.visibility_timeout_secs", queue.name),
                    "must be at least 1",
                ));
            }
            if queue.max_receive_count == 0 {
                return Err(invalid(
                    &format!("queues.{}.max_receive_count", queue.name),
                    "must be at least 1",
                ));
            }
        }

        for topic in &self.topics {
            for subscriber in &topic.subscribers {
                if !queues.contains(subscriber.as_str()) {
                    return Err(ConfigError::UnknownQueue {
                        owner: format!("topic {}", topic.name),
                        queue: subscriber.clone(),
                    });
                }
            }
        }

        for group in &self.groups {
            if !queues.contains(group.queue.as_str()) {
                return Err(ConfigError::UnknownQueue {
                    owner: format!("group {}", group.name),
                    queue: group.queue.clone(),
                });
            }
            if group.max_concurrency == 0 {
                return Err(invalid(
                    &format!("groups.{}.max_concurrency", group.name),
                    "must be at least 1",
                ));
            }
            if group.batch_size == 0 {
                return Err(invalid(
                    &format!("groups.{}.batch_size", group.name),
                    "must be at least 1",
                ));
            }
        }

        for crawler in &self.crawlers {
            if !topics.contains(crawler.topic.as_str()) {
                return Err(ConfigError::UnknownTopic {
                    owner: format!("crawler {}", crawler.name),
                    topic: crawler.topic.clone(),
                });
            }
            if crawler.interval_secs == 0 {
                return Err(invalid(
                    &format!("crawlers.{}.interval_secs", crawler.name),
                    "must be at least 1",
                ));
            }
        }

        Ok(())
    }
}

fn unique_names<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, ConfigError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
    }
    Ok(seen)
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
