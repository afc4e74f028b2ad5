//! Intel Module Tests
//!
//! ## Test Scopes
//! - **Model**: event decoding (single or batch), value types, record mapping.
//! - **Recorder**: de-duplication and terminal classification of bad input.
//! - **Detector**: cross-pipeline matching, skip rules, delivery failures.
//! - **Alert formatting** and **URLhaus parsing**: pure functions, no network.

#[cfg(test)]
mod tests {
    use crate::consumer::registry::HandlerRegistry;
    use crate::consumer::types::{HandlerError, HandlerOutcome};
    use crate::intel::alert::{Alert, AlertCause, Notifier, build_message, defang};
    use crate::intel::crawler::{Crawler, crawl_and_publish};
    use crate::intel::detector::Detector;
    use crate::intel::recorder::build_records;
    use crate::intel::types::*;
    use crate::intel::urlhaus::parse_feed;
    use crate::intel::*;
    use crate::queue::queue::DurableQueue;
    use crate::queue::types::QueueConfig;
    use crate::storage::memory::RecordStore;
    use crate::storage::types::{Record, now_ms};
    use crate::topic::topic::{RetryPolicy, Topic};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Mutex;

    const RETENTION: Duration = Duration::from_secs(90 * 24 * 3600);

    #[derive(Default)]
    struct RecordingNotifier {
        alerts: Mutex<Vec<Alert>>,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("webhook down");
            }
            self.alerts.lock().await.push(alert.clone());
            Ok(())
        }
    }

    fn stored(event: &IndicatorEvent) -> Record {
        event.to_record(RETENTION, now_ms()).unwrap()
    }

    // ============================================================
    // MODEL
    // ============================================================

    #[test]
    fn test_parse_single_event_and_batch() {
        let single = parse_events(json!({"type": "ioc", "value": "1.2.3.0/24"})).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].kind, RecordKind::Ioc);
        assert_eq!(single[0].value, "1.2.3.0/24");
        assert!(!single[0].detected);

        let batch = parse_events(json!([
            {"type": "entity", "value": "a.example", "label": "proxy-log"},
            {"type": "entity", "value": "b.example"}
        ]))
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].label.as_deref(), Some("proxy-log"));
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(parse_events(json!({"type": "bogus", "value": "x"})).is_err());
        assert!(parse_events(json!("not an object")).is_err());
    }

    #[test]
    fn test_value_type_names() {
        let event: IndicatorEvent = serde_json::from_value(json!({
            "type": "ioc", "value": "abc", "value_type": "filehash.sha256"
        }))
        .unwrap();
        assert_eq!(event.value_type, Some(ValueType::FileHashSha256));

        let unknown: IndicatorEvent = serde_json::from_value(json!({
            "type": "ioc", "value": "abc", "value_type": "email"
        }))
        .unwrap();
        assert_eq!(unknown.value_type, Some(ValueType::Other));
    }

    #[test]
    fn test_record_expiry_starts_at_observation() {
        let mut event = IndicatorEvent::ioc("evil.example", ValueType::Domain);
        event.observed_at = Some(1_000);

        let record = event.to_record(Duration::from_secs(60), 999_999_999).unwrap();

        assert_eq!(record.partition_key, "ioc");
        assert_eq!(record.sort_key, "evil.example");
        assert_eq!(record.expires_at, Some(1_060_000));
        assert_eq!(record.payload["value_type"], "domain");
    }

    #[test]
    fn test_record_expiry_defaults_to_now() {
        let event = IndicatorEvent::entity("host-42");
        let record = event.to_record(Duration::from_secs(10), 5_000).unwrap();
        assert_eq!(record.expires_at, Some(15_000));
    }

    // ============================================================
    // RECORDER
    // ============================================================

    #[test]
    fn test_recorder_collapses_duplicate_values_last_wins() {
        let body = json!([
            {"type": "entity", "value": "a.example", "label": "first"},
            {"type": "entity", "value": "b.example"},
            {"type": "entity", "value": "a.example", "label": "second"}
        ]);

        let outcome = build_records(RecordKind::Entity, body, RETENTION, 0).unwrap();

        let HandlerOutcome::Record(records) = outcome else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sort_key, "a.example");
        assert_eq!(records[0].payload["label"], "second");
        assert_eq!(records[1].sort_key, "b.example");
    }

    #[test]
    fn test_recorder_bad_input_is_terminal() {
        let malformed = build_records(RecordKind::Ioc, json!({"nope": 1}), RETENTION, 0);
        assert!(matches!(malformed, Err(HandlerError::Terminal(_))));

        let wrong_kind = build_records(
            RecordKind::Ioc,
            json!({"type": "entity", "value": "x"}),
            RETENTION,
            0,
        );
        assert!(matches!(wrong_kind, Err(HandlerError::Terminal(_))));

        let empty = build_records(RecordKind::Ioc, json!({"type": "ioc", "value": "  "}), RETENTION, 0);
        assert!(matches!(empty, Err(HandlerError::Terminal(_))));
    }

    #[test]
    fn test_recorder_is_deterministic() {
        let body = json!({"type": "ioc", "value": "1.2.3.4", "reason": "c2"});
        let first = build_records(RecordKind::Ioc, body.clone(), RETENTION, 42).unwrap();
        let second = build_records(RecordKind::Ioc, body, RETENTION, 42).unwrap();
        assert_eq!(first, second);
    }

    // ============================================================
    // DETECTOR
    // ============================================================

    #[tokio::test]
    async fn test_ioc_without_matching_entity_emits_nothing() {
        let store = Arc::new(RecordStore::new("records"));
        let notifier = Arc::new(RecordingNotifier::default());
        let detector = Detector::new(store, notifier.clone());

        let outcome = detector
            .detect(RecordKind::Ioc, json!({"type": "ioc", "value": "1.2.3.0/24"}))
            .await
            .unwrap();

        assert_eq!(outcome, HandlerOutcome::Detected(vec![]));
        assert!(notifier.alerts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_ioc_matching_entity_raises_alert() {
        let store = Arc::new(RecordStore::new("records"));
        let mut entity = IndicatorEvent::entity("evil.example");
        entity.label = Some("dns-log".to_string());
        store.put(stored(&entity));

        let notifier = Arc::new(RecordingNotifier::default());
        let detector = Detector::new(store.clone(), notifier.clone());
        let ioc = IndicatorEvent::ioc("evil.example", ValueType::Domain);

        let outcome = detector
            .detect(RecordKind::Ioc, serde_json::to_value(&ioc).unwrap())
            .await
            .unwrap();

        let HandlerOutcome::Detected(emitted) = outcome else {
            panic!("expected detection outcome");
        };
        assert_eq!(emitted.len(), 1);

        let alerts = notifier.alerts.lock().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].cause, AlertCause::Ioc);
        assert_eq!(alerts[0].target, "evil.example");
        assert_eq!(alerts[0].target_type, ValueType::Domain);
        assert_eq!(alerts[0].iocs, vec![ioc]);
        assert_eq!(alerts[0].entities, vec![entity]);

        // Detectors never write.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_entity_matching_ioc_raises_entity_alert() {
        let store = Arc::new(RecordStore::new("records"));
        store.put(stored(&IndicatorEvent::ioc("10.0.0.1", ValueType::IpAddr)));
        let notifier = Arc::new(RecordingNotifier::default());
        let detector = Detector::new(store, notifier.clone());

        detector
            .detect(
                RecordKind::Entity,
                json!([
                    {"type": "entity", "value": "10.0.0.1", "label": "fw"},
                    {"type": "entity", "value": "10.0.0.1", "label": "proxy"},
                    {"type": "entity", "value": "10.0.0.2"}
                ]),
            )
            .await
            .unwrap();

        let alerts = notifier.alerts.lock().await;
        assert_eq!(alerts.len(), 1, "one alert per distinct matching value");
        assert_eq!(alerts[0].cause, AlertCause::Entity);
        assert_eq!(alerts[0].entities.len(), 2);
        assert_eq!(alerts[0].iocs[0].value, "10.0.0.1");
    }

    #[tokio::test]
    async fn test_repeated_ioc_alerts_again_and_leaves_entity_untouched() {
        let store = Arc::new(RecordStore::new("records"));
        let entity = IndicatorEvent::entity("evil.example");
        store.put(stored(&entity));

        let notifier = Arc::new(RecordingNotifier::default());
        let detector = Detector::new(store.clone(), notifier.clone());
        let ioc = json!({"type": "ioc", "value": "evil.example"});

        detector.detect(RecordKind::Ioc, ioc.clone()).await.unwrap();
        detector.detect(RecordKind::Ioc, ioc).await.unwrap();

        assert_eq!(notifier.alerts.lock().await.len(), 2);
        let record = store.get("entity", "evil.example").unwrap();
        assert_eq!(record.payload["detected"], json!(false));
    }

    #[tokio::test]
    async fn test_already_detected_and_expired_records_are_skipped() {
        let store = Arc::new(RecordStore::new("records"));
        let mut detected = IndicatorEvent::entity("seen.example");
        detected.detected = true;
        store.put(stored(&detected));
        store.put(
            IndicatorEvent::entity("old.example")
                .to_record(Duration::from_secs(1), 0)
                .unwrap(),
        );

        let notifier = Arc::new(RecordingNotifier::default());
        let detector = Detector::new(store, notifier.clone());

        for value in ["seen.example", "old.example"] {
            detector
                .detect(RecordKind::Ioc, json!({"type": "ioc", "value": value}))
                .await
                .unwrap();
        }

        assert!(notifier.alerts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_alert_delivery_failure_is_retryable() {
        let store = Arc::new(RecordStore::new("records"));
        store.put(stored(&IndicatorEvent::entity("evil.example")));
        let notifier = Arc::new(RecordingNotifier::default());
        notifier.fail.store(true, Ordering::SeqCst);
        let detector = Detector::new(store, notifier);

        let result = detector
            .detect(RecordKind::Ioc, json!({"type": "ioc", "value": "evil.example"}))
            .await;

        assert!(matches!(result, Err(ref e) if e.is_retryable()), "{result:?}");
    }

    #[tokio::test]
    async fn test_register_intel_handlers() {
        let registry = HandlerRegistry::new();
        let store = Arc::new(RecordStore::new("records"));

        register_intel_handlers(
            &registry,
            store,
            Arc::new(RecordingNotifier::default()),
            RETENTION,
        );

        assert_eq!(
            registry.list_handlers(),
            vec![ENTITY_DETECT, ENTITY_RECORD, IOC_DETECT, IOC_RECORD]
        );
        let handler = registry.get(IOC_RECORD).unwrap();
        let outcome = handler(json!({"type": "ioc", "value": "1.2.3.0/24"}))
            .await
            .unwrap();
        assert!(matches!(outcome, HandlerOutcome::Record(ref r) if r.len() == 1));
    }

    // ============================================================
    // ALERT FORMATTING
    // ============================================================

    #[test]
    fn test_defang() {
        assert_eq!(defang("evil.example.com"), "evil[.]example[.]com");
        assert_eq!(defang("no-dots"), "no-dots");
    }

    #[test]
    fn test_build_message_limits_items_and_defangs() {
        let iocs: Vec<IndicatorEvent> = (0..5)
            .map(|i| {
                let mut ioc = IndicatorEvent::ioc("evil.example", ValueType::Domain);
                ioc.source = Some(format!("feed-{i}"));
                ioc.description = Some("seen at bad.example".to_string());
                ioc.observed_at = Some(1_606_975_569);
                ioc
            })
            .collect();
        let alert = Alert {
            cause: AlertCause::Ioc,
            target: "evil.example".to_string(),
            target_type: ValueType::Domain,
            iocs,
            entities: vec![IndicatorEvent::entity("evil.example")],
        };

        let message = build_message(&alert);
        let blocks = message["blocks"].as_array().unwrap();

        assert_eq!(
            blocks[0]["text"]["text"],
            ":alert: New Alert: evil[.]example (domain)"
        );
        // header, divider, IOC title, 3 IOCs, divider, entity title, 1 entity
        assert_eq!(blocks.len(), 9);

        let first_ioc = blocks[3].to_string();
        assert!(first_ioc.contains("feed-0"));
        assert!(first_ioc.contains("bad[.]example"));
        assert!(first_ioc.contains("2020-12-03 06:06:09"));
    }

    // ============================================================
    // URLHAUS FEED
    // ============================================================

    const SAMPLE_FEED: &str = r#"
################################################################
# abuse.ch URLhaus Database Dump (CSV - recent URLs only)      #
################################################################
#
# id,dateadded,url,url_status,threat,tags,urlhaus_link,reporter
"884896","2020-12-03 06:06:09","http://94.122.77.235:32794/Mozi.m","online","malware_download","elf,Mozi","https://urlhaus.abuse.ch/url/884896/","lrz_urlhaus"
"884895","2020-12-03 06:06:08","http://61.52.236.225:34611/Mozi.m","online","malware_download","elf,Mozi","https://urlhaus.abuse.ch/url/884895/","lrz_urlhaus"
"884894","2020-12-03 06:06:06","http://bad.example/bin.sh","online","malware_download","32-bit,elf,mips","https://urlhaus.abuse.ch/url/884894/","geenensp"
"884893","2020-12-03 06:06:06","http://bad.example/Mozi.a","online","malware_download","elf,Mozi","https://urlhaus.abuse.ch/url/884893/","lrz_urlhaus"
"884892","2020-12-03 06:06:05","http://short.example/row"
"#;

    #[test]
    fn test_parse_feed() {
        let events = parse_feed(SAMPLE_FEED).unwrap();

        assert_eq!(events.len(), 3);

        let first = &events[0];
        assert_eq!(first.kind, RecordKind::Ioc);
        assert_eq!(first.value, "94.122.77.235");
        assert_eq!(first.value_type, Some(ValueType::IpAddr));
        assert_eq!(first.source.as_deref(), Some("URLhaus"));
        assert_eq!(first.reason.as_deref(), Some("malware_download"));
        assert_eq!(first.observed_at, Some(1_606_975_569));

        let merged = &events[2];
        assert_eq!(merged.value, "bad.example");
        assert_eq!(merged.value_type, Some(ValueType::Domain));
        assert_eq!(
            merged.description.as_deref(),
            Some("884894: http://bad.example/bin.sh, 884893: http://bad.example/Mozi.a")
        );
    }

    #[test]
    fn test_parse_feed_caps_merged_description() {
        let mut feed = String::new();
        for i in 0..200 {
            feed.push_str(&format!(
                "\"{i}\",\"2020-12-03 06:06:09\",\"http://spam.example/{i}\",\"online\",\"malware_download\",\"\",\"\",\"r\"\n"
            ));
        }

        let events = parse_feed(&feed).unwrap();

        assert_eq!(events.len(), 1);
        let description = events[0].description.as_deref().unwrap();
        assert!(description.len() >= 1024);
        assert!(description.len() < 1024 + 64);
    }

    // ============================================================
    // CRAWL AND PUBLISH
    // ============================================================

    struct StaticCrawler(Result<Vec<IndicatorEvent>, String>);

    #[async_trait]
    impl Crawler for StaticCrawler {
        fn name(&self) -> &str {
            "static"
        }

        async fn crawl(&self) -> anyhow::Result<Vec<IndicatorEvent>> {
            self.0.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_and_publish_fans_out_each_event() {
        let record = Arc::new(DurableQueue::new("ioc-record", QueueConfig::default()));
        let detect = Arc::new(DurableQueue::new("ioc-detect", QueueConfig::default()));
        let mut topic = Topic::new("ioc", RetryPolicy::default());
        topic.subscribe(record.clone());
        topic.subscribe(detect.clone());

        let crawler = StaticCrawler(Ok(vec![
            IndicatorEvent::ioc("1.2.3.4", ValueType::IpAddr),
            IndicatorEvent::ioc("evil.example", ValueType::Domain),
        ]));

        let published = crawl_and_publish(&crawler, &topic).await.unwrap();

        assert_eq!(published, 2);
        assert_eq!(record.len().await, 2);
        assert_eq!(detect.len().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_failures_fail_the_invocation() {
        let topic = Topic::new("ioc", RetryPolicy::default());
        let broken = StaticCrawler(Err("feed down".to_string()));
        assert!(crawl_and_publish(&broken, &topic).await.is_err());

        let full = Arc::new(DurableQueue::new(
            "full",
            QueueConfig {
                capacity: Some(0),
                ..QueueConfig::default()
            },
        ));
        let mut topic = Topic::new(
            "ioc",
            RetryPolicy {
                attempts: 2,
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(10),
            },
        );
        topic.subscribe(full);
        let crawler = StaticCrawler(Ok(vec![IndicatorEvent::ioc("1.2.3.4", ValueType::IpAddr)]));

        assert!(crawl_and_publish(&crawler, &topic).await.is_err());
    }
}
