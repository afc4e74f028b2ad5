//! Alert Delivery
//!
//! A detection is handed to a `Notifier`. The production notifier posts a
//! Slack-style block message to an incoming webhook; without a webhook URL the
//! pipeline falls back to logging alerts.

use super::types::{IndicatorEvent, ValueType};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

/// Up to this many IOC / entity items are rendered per message.
pub const MAX_ITEMS_DISPLAYED: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCause {
    /// A new IOC matched an entity already on record.
    Ioc,
    /// A new entity matched an IOC already on record.
    Entity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub cause: AlertCause,
    pub target: String,
    pub target_type: ValueType,
    pub iocs: Vec<IndicatorEvent>,
    pub entities: Vec<IndicatorEvent>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Posts alerts to an incoming-webhook URL.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building webhook HTTP client")?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let message = build_message(alert);

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .context("posting alert to webhook")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook rejected alert: {} {}", status, body);
        }

        tracing::info!(indicator = %alert.target, cause = ?alert.cause, "alert delivered");
        Ok(())
    }
}

/// Fallback notifier that only logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        tracing::warn!(
            indicator = %alert.target,
            target_type = alert.target_type.as_str(),
            cause = ?alert.cause,
            iocs = alert.iocs.len(),
            entities = alert.entities.len(),
            "ALERT"
        );
        Ok(())
    }
}

/// Makes an indicator unclickable in chat clients.
pub fn defang(value: &str) -> String {
    value.replace('.', "[.]")
}

fn format_epoch(secs: Option<i64>) -> String {
    secs.and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn field(title: &str, value: &str) -> Value {
    json!({"type": "mrkdwn", "text": format!("*{}*\n{}", title, value)})
}

fn section(text: &str) -> Value {
    json!({"type": "section", "text": {"type": "mrkdwn", "text": text}})
}

fn divider() -> Value {
    json!({"type": "divider"})
}

/// Renders the webhook payload for `alert`.
pub fn build_message(alert: &Alert) -> Value {
    let title = format!(
        ":alert: New Alert: {} ({})",
        defang(&alert.target),
        alert.target_type.as_str()
    );

    let mut blocks = vec![
        json!({"type": "header", "text": {"type": "plain_text", "text": title, "emoji": true}}),
        divider(),
        section("*Detected IOC*"),
    ];

    for ioc in alert.iocs.iter().take(MAX_ITEMS_DISPLAYED) {
        blocks.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("*{}*", ioc.source.as_deref().unwrap_or("unknown"))},
            "fields": [
                field("Reason", ioc.reason.as_deref().unwrap_or("-")),
                field("UpdatedAt", &format_epoch(ioc.observed_at)),
                field("Description", &defang(ioc.description.as_deref().unwrap_or("-"))),
            ],
        }));
    }

    blocks.push(divider());
    blocks.push(section("*Affected Entity*"));

    for entity in alert.entities.iter().take(MAX_ITEMS_DISPLAYED) {
        let source = entity
            .source
            .as_deref()
            .or(entity.label.as_deref())
            .unwrap_or("unknown");
        blocks.push(json!({
            "type": "section",
            "text": {"type": "mrkdwn", "text": format!("*{}*", source)},
            "fields": [
                field("Description", entity.description.as_deref().unwrap_or("-")),
                field("RecordedAt", &format_epoch(entity.observed_at)),
            ],
        }));
    }

    json!({ "blocks": blocks })
}
