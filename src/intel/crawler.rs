//! Feed Crawlers
//!
//! A crawler fetches one external feed and returns normalized events. The scheduler
//! runs `crawl_and_publish` for each enabled crawler on its interval.

use super::types::IndicatorEvent;
use crate::topic::topic::Topic;

use anyhow::Context;
use async_trait::async_trait;

#[async_trait]
pub trait Crawler: Send + Sync {
    fn name(&self) -> &str;

    /// Opaque reference to the credentials this crawler authenticates with.
    fn secret_ref(&self) -> Option<&str> {
        None
    }

    async fn crawl(&self) -> anyhow::Result<Vec<IndicatorEvent>>;
}

/// Crawls once and publishes one message per event.
///
/// Stops at the first failed publish. Messages published before it stand.
pub async fn crawl_and_publish(crawler: &dyn Crawler, topic: &Topic) -> anyhow::Result<usize> {
    let events = crawler
        .crawl()
        .await
        .with_context(|| format!("crawler {} failed", crawler.name()))?;

    tracing::info!(
        crawler = crawler.name(),
        topic = topic.name(),
        count = events.len(),
        "crawled events"
    );

    let mut published = 0;
    for event in events {
        let body = serde_json::to_value(&event).context("encoding event")?;
        let report = topic
            .publish(body)
            .await
            .with_context(|| format!("publishing {} to {}", event.value, topic.name()))?;

        if !report.is_complete() {
            tracing::warn!(
                crawler = crawler.name(),
                value = %event.value,
                failed = ?report.failed,
                "event reached only some subscribers"
            );
        }
        published += 1;
    }

    tracing::info!(crawler = crawler.name(), published, "crawl finished");
    Ok(published)
}
