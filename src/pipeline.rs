//! Pipeline Wiring
//!
//! Builds every component from a validated `PipelineConfig` and owns their
//! lifecycle.
//!
//! ## Lifecycle
//! 1. **Build**: store, queues, topics (with subscriptions), handlers, consumer
//!    groups and crawlers are constructed; nothing runs yet.
//! 2. **Start**: consumer groups, the crawl scheduler and the store reclaimer are
//!    spawned on the runtime.
//! 3. **Shutdown**: one watch signal stops dispatch everywhere; the call returns
//!    once in-flight messages have settled. Unacknowledged messages stay queued.

use crate::config::error::ConfigError;
use crate::config::types::{CrawlerKind, CrawlerSettings, PipelineConfig};
use crate::consumer::group::ConsumerGroup;
use crate::consumer::registry::HandlerRegistry;
use crate::intel::alert::Notifier;
use crate::intel::crawler::{Crawler, crawl_and_publish};
use crate::intel::register_intel_handlers;
use crate::intel::urlhaus::UrlHausCrawler;
use crate::queue::registry::QueueRegistry;
use crate::scheduler::scheduler::{JobConfig, Scheduler};
use crate::storage::memory::RecordStore;
use crate::storage::partitioner::Partitioner;
use crate::topic::registry::TopicRegistry;
use crate::topic::topic::{RetryPolicy, Topic};

use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct ScheduledCrawler {
    settings: CrawlerSettings,
    crawler: Arc<dyn Crawler>,
    topic: Arc<Topic>,
}

pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<RecordStore>,
    queues: Arc<QueueRegistry>,
    topics: Arc<TopicRegistry>,
    groups: Vec<Arc<ConsumerGroup>>,
    crawlers: Vec<ScheduledCrawler>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    scheduler: Option<Scheduler>,
}

impl Pipeline {
    /// Wires the intel handlers and the crawlers named in `config`.
    pub fn build(config: PipelineConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        Self::build_with_crawlers(config, notifier, Vec::new())
    }

    /// Like `build`, plus extra crawlers published to the given topics. Each entry
    /// pairs a crawler with its schedule.
    pub fn build_with_crawlers(
        config: PipelineConfig,
        notifier: Arc<dyn Notifier>,
        extra_crawlers: Vec<(CrawlerSettings, Arc<dyn Crawler>)>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Arc::new(RecordStore::with_partitioner(
            config.store.name.clone(),
            Partitioner::new(config.store.shards),
        ));

        let mut queues = QueueRegistry::new();
        for settings in &config.queues {
            queues.declare(&settings.name, settings.to_queue_config());
        }

        let mut topics = TopicRegistry::new();
        for settings in &config.topics {
            let mut topic = Topic::new(settings.name.clone(), RetryPolicy::default());
            for subscriber in &settings.subscribers {
                let queue = queues.get(subscriber).ok_or_else(|| ConfigError::UnknownQueue {
                    owner: format!("topic {}", settings.name),
                    queue: subscriber.clone(),
                })?;
                topic.subscribe(queue);
            }
            topics.insert(topic);
        }

        let handlers = HandlerRegistry::new();
        register_intel_handlers(
            &handlers,
            store.clone(),
            notifier,
            config.store.retention(),
        );

        let mut groups = Vec::with_capacity(config.groups.len());
        for settings in &config.groups {
            let handler = handlers
                .get(&settings.handler)
                .ok_or_else(|| ConfigError::UnknownHandler {
                    group: settings.name.clone(),
                    handler: settings.handler.clone(),
                })?;
            let queue = queues.get(&settings.queue).ok_or_else(|| ConfigError::UnknownQueue {
                owner: format!("group {}", settings.name),
                queue: settings.queue.clone(),
            })?;
            groups.push(ConsumerGroup::new(
                settings.to_group_config(),
                queue,
                handler,
                store.clone(),
            ));
        }

        let mut configured: Vec<(CrawlerSettings, Arc<dyn Crawler>)> = Vec::new();
        for settings in config.crawlers.iter().filter(|settings| settings.enabled) {
            configured.push((
                settings.clone(),
                build_crawler(settings, config.secret_ref.as_deref())?,
            ));
        }

        let mut crawlers = Vec::new();
        for (settings, crawler) in configured.into_iter().chain(extra_crawlers) {
            let topic = topics.get(&settings.topic).ok_or_else(|| ConfigError::UnknownTopic {
                owner: format!("crawler {}", settings.name),
                topic: settings.topic.clone(),
            })?;
            crawlers.push(ScheduledCrawler {
                settings,
                crawler,
                topic,
            });
        }

        tracing::info!(
            queues = queues.len(),
            topics = topics.names().len(),
            groups = groups.len(),
            crawlers = crawlers.len(),
            handlers = ?handlers.list_handlers(),
            "pipeline built"
        );

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            store,
            queues: Arc::new(queues),
            topics: Arc::new(topics),
            groups,
            crawlers,
            shutdown_tx,
            tasks: Vec::new(),
            scheduler: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<RecordStore> {
        self.store.clone()
    }

    pub fn queues(&self) -> Arc<QueueRegistry> {
        self.queues.clone()
    }

    pub fn topics(&self) -> Arc<TopicRegistry> {
        self.topics.clone()
    }

    pub fn groups(&self) -> &[Arc<ConsumerGroup>] {
        &self.groups
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    pub fn router(&self) -> Router {
        crate::server::router(self.store(), self.queues(), self.topics())
    }

    /// Spawns consumer groups, crawler jobs and the reclaimer. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            tracing::warn!("pipeline already started");
            return;
        }

        for group in &self.groups {
            self.tasks
                .push(group.clone().start(self.shutdown_tx.subscribe()));
        }

        self.tasks.push(self.store.clone().spawn_reclaimer(
            self.config.store.reclaim_interval(),
            self.shutdown_tx.subscribe(),
        ));

        let mut scheduler = Scheduler::new(self.shutdown_tx.subscribe());
        for scheduled in &self.crawlers {
            let job = JobConfig::new(
                scheduled.settings.name.clone(),
                scheduled.settings.interval(),
                scheduled.settings.timeout(),
            )
            .run_immediately(scheduled.settings.run_on_start);

            let crawler = scheduled.crawler.clone();
            let topic = scheduled.topic.clone();
            scheduler.schedule(job, move || {
                let crawler = crawler.clone();
                let topic = topic.clone();
                async move {
                    crawl_and_publish(crawler.as_ref(), topic.as_ref()).await?;
                    Ok(())
                }
            });
        }
        self.scheduler = Some(scheduler);

        tracing::info!(groups = self.groups.len(), "pipeline started");
    }

    /// Stops dispatch everywhere and waits for in-flight work to settle.
    pub async fn shutdown(mut self) {
        tracing::info!("pipeline shutting down");
        self.shutdown_tx.send_replace(true);

        if let Some(scheduler) = self.scheduler.take() {
            scheduler.join().await;
        }
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!("pipeline task ended abnormally: {}", e);
            }
        }

        tracing::info!("pipeline stopped");
    }
}

fn build_crawler(
    settings: &CrawlerSettings,
    secret_ref: Option<&str>,
) -> anyhow::Result<Arc<dyn Crawler>> {
    match settings.kind {
        CrawlerKind::Urlhaus => {
            let crawler = match &settings.url {
                Some(url) => UrlHausCrawler::with_url(url.clone())?,
                None => UrlHausCrawler::new()?,
            };
            Ok(Arc::new(
                crawler.with_secret_ref(secret_ref.map(str::to_string)),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intel::alert::LogNotifier;

    #[tokio::test]
    async fn test_secret_ref_reaches_built_crawlers() {
        let mut config = PipelineConfig::default();
        config.secret_ref = Some("vault:intel/feeds".to_string());

        let pipeline = Pipeline::build(config, Arc::new(LogNotifier)).unwrap();

        assert_eq!(pipeline.crawlers.len(), 1);
        assert_eq!(pipeline.crawlers[0].crawler.name(), "urlhaus");
        assert_eq!(
            pipeline.crawlers[0].crawler.secret_ref(),
            Some("vault:intel/feeds")
        );
    }

    #[test]
    fn test_crawler_without_secret_ref() {
        let config = PipelineConfig::default();
        let crawler = build_crawler(&config.crawlers[0], None).unwrap();

        assert_eq!(crawler.secret_ref(), None);
    }

    #[tokio::test]
    async fn test_group_bound_to_unregistered_handler_is_rejected() {
        let mut config = PipelineConfig::default();
        config.crawlers.clear();
        config.groups[0].handler = "no_such_handler".to_string();

        let error = match Pipeline::build(config, Arc::new(LogNotifier)) {
            Ok(_) => panic!("build should reject an unknown handler"),
            Err(e) => e,
        };

        assert!(matches!(
            error.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownHandler { handler, .. }) if handler == "no_such_handler"
        ));
    }
}
