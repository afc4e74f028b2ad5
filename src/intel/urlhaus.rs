//! URLhaus Crawler
//!
//! Downloads the "recent URLs" CSV dump and turns every malicious URL into an IOC
//! on its host (IP address or domain). Rows for the same host are merged.

use super::crawler::Crawler;
use super::types::{IndicatorEvent, ValueType};

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

pub const URLHAUS_RECENT_URL: &str = "https://urlhaus.abuse.ch/downloads/csv_recent/";
pub const URLHAUS_SOURCE: &str = "URLhaus";

/// `id,dateadded,url,url_status,threat,tags,urlhaus_link,reporter`
const COLUMN_COUNT: usize = 8;
/// Descriptions stop growing once they reach this many bytes.
const DESCRIPTION_LIMIT: usize = 1024;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct UrlHausCrawler {
    url: String,
    client: reqwest::Client,
    secret_ref: Option<String>,
}

impl UrlHausCrawler {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_url(URLHAUS_RECENT_URL)
    }

    pub fn with_url(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("building URLhaus HTTP client")?;

        Ok(Self {
            url: url.into(),
            client,
            secret_ref: None,
        })
    }

    /// The public feed needs no credentials; the reference is only carried.
    pub fn with_secret_ref(mut self, secret_ref: Option<String>) -> Self {
        self.secret_ref = secret_ref;
        self
    }
}

#[async_trait]
impl Crawler for UrlHausCrawler {
    fn name(&self) -> &str {
        "urlhaus"
    }

    fn secret_ref(&self) -> Option<&str> {
        self.secret_ref.as_deref()
    }

    async fn crawl(&self) -> anyhow::Result<Vec<IndicatorEvent>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("fetching {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("unexpected status {} from {}", status, self.url);
        }

        let text = response.text().await.context("reading URLhaus feed")?;
        parse_feed(&text)
    }
}

/// Parses the CSV dump. Comment lines and rows without exactly eight columns are
/// skipped, as are rows whose URL or timestamp cannot be parsed.
pub fn parse_feed(text: &str) -> anyhow::Result<Vec<IndicatorEvent>> {
    let field = Regex::new(r#""((?:[^"]|"")*)""#)?;

    let mut events: Vec<IndicatorEvent> = Vec::new();
    let mut index: HashMap<(ValueType, String), usize> = HashMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let row: Vec<String> = field
            .captures_iter(line)
            .map(|caps| caps[1].replace("\"\"", "\""))
            .collect();
        if row.len() != COLUMN_COUNT {
            continue;
        }

        let Some(host) = host_of(&row[2]) else {
            tracing::debug!("Skipping URLhaus row with unparsable URL: {}", row[2]);
            continue;
        };
        let observed_at = match chrono::NaiveDateTime::parse_from_str(&row[1], TIMESTAMP_FORMAT) {
            Ok(ts) => ts.and_utc().timestamp(),
            Err(e) => {
                tracing::debug!("Skipping URLhaus row with bad timestamp {}: {}", row[1], e);
                continue;
            }
        };

        let value_type = if host.parse::<IpAddr>().is_ok() {
            ValueType::IpAddr
        } else {
            ValueType::Domain
        };
        let entry = format!("{}: {}", row[0], row[2]);

        match index.get(&(value_type, host.clone())) {
            Some(&i) => {
                let description = events[i].description.get_or_insert_with(String::new);
                if description.len() < DESCRIPTION_LIMIT {
                    description.push_str(", ");
                    description.push_str(&entry);
                }
            }
            None => {
                let mut event = IndicatorEvent::ioc(host.clone(), value_type);
                event.source = Some(URLHAUS_SOURCE.to_string());
                event.observed_at = Some(observed_at);
                event.reason = Some(row[4].clone());
                event.description = Some(entry);

                index.insert((value_type, host), events.len());
                events.push(event);
            }
        }
    }

    Ok(events)
}

fn host_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    (!host.is_empty()).then(|| host.to_string())
}
