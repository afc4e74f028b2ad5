//! HTTP Admin Surface
//!
//! Operator endpoints on top of the pipeline: manual publish, record lookup, queue
//! inspection and dead-letter redrive. Every handler gets its state via
//! `Extension` layers.

use crate::queue::handlers::{handle_dead_letters, handle_queue_stats, handle_redrive};
use crate::queue::protocol::{ENDPOINT_DEAD_LETTERS, ENDPOINT_QUEUE_STATS, ENDPOINT_REDRIVE};
use crate::queue::registry::QueueRegistry;
use crate::queue::types::QueueStats;
use crate::storage::handlers::handle_get_record;
use crate::storage::memory::RecordStore;
use crate::storage::protocol::ENDPOINT_GET_RECORD;
use crate::topic::handlers::handle_publish;
use crate::topic::protocol::ENDPOINT_PUBLISH;
use crate::topic::registry::TopicRegistry;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const ENDPOINT_HEALTH: &str = "/health";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
    pub queues: Vec<QueueHealth>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueHealth {
    pub name: String,
    pub stats: QueueStats,
}

pub fn router(
    store: Arc<RecordStore>,
    queues: Arc<QueueRegistry>,
    topics: Arc<TopicRegistry>,
) -> Router {
    Router::new()
        .route(ENDPOINT_HEALTH, get(handle_health))
        .route(ENDPOINT_PUBLISH, post(handle_publish))
        .route(ENDPOINT_GET_RECORD, get(handle_get_record))
        .route(ENDPOINT_QUEUE_STATS, get(handle_queue_stats))
        .route(ENDPOINT_DEAD_LETTERS, get(handle_dead_letters))
        .route(ENDPOINT_REDRIVE, post(handle_redrive))
        .layer(Extension(store))
        .layer(Extension(queues))
        .layer(Extension(topics))
}

pub async fn handle_health(
    Extension(store): Extension<Arc<RecordStore>>,
    Extension(queues): Extension<Arc<QueueRegistry>>,
) -> (StatusCode, Json<HealthResponse>) {
    let mut report = Vec::with_capacity(queues.len());
    for name in queues.names() {
        if let Some(queue) = queues.get(&name) {
            report.push(QueueHealth {
                stats: queue.stats().await,
                name,
            });
        }
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            records: store.len(),
            queues: report,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::types::QueueConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_health_reports_queue_depths() {
        let store = Arc::new(RecordStore::new("records"));
        let mut queues = QueueRegistry::new();
        let queue = queues.declare("ioc-record", QueueConfig::default());
        queue.enqueue(json!({"type": "ioc", "value": "x"})).await.unwrap();

        let (status, Json(health)) =
            handle_health(Extension(store), Extension(Arc::new(queues))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "ok");
        assert_eq!(health.queues.len(), 1);
        assert_eq!(health.queues[0].name, "ioc-record");
        assert_eq!(health.queues[0].stats.visible, 1);
    }

    #[test]
    fn test_router_builds() {
        let _router = router(
            Arc::new(RecordStore::new("records")),
            Arc::new(QueueRegistry::new()),
            Arc::new(TopicRegistry::new()),
        );
    }
}
