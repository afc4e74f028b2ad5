use super::error::PublishError;
use super::protocol::*;
use super::registry::TopicRegistry;

use axum::{Extension, Json, extract::Path, http::StatusCode};
use std::sync::Arc;

pub async fn handle_publish(
    Extension(topics): Extension<Arc<TopicRegistry>>,
    Path(name): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<PublishResponse>) {
    match topics.publish(&name, body).await {
        Ok(report) => {
            tracing::info!(
                "Published to {} via API ({} copies)",
                name,
                report.delivered.len()
            );
            let status = if report.is_complete() {
                StatusCode::OK
            } else {
                StatusCode::MULTI_STATUS
            };
            (
                status,
                Json(PublishResponse {
                    topic: name,
                    delivered: report
                        .delivered
                        .into_iter()
                        .map(|(queue, message_id)| DeliveredCopy { queue, message_id })
                        .collect(),
                    failed: report.failed,
                    error: None,
                }),
            )
        }
        Err(e) => {
            tracing::error!("Failed to publish to {}: {}", name, e);
            let (status, failed) = match &e {
                PublishError::UnknownTopic(_) => (StatusCode::NOT_FOUND, Vec::new()),
                PublishError::AllSubscribersFailed { failed, .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, failed.clone())
                }
            };
            (
                status,
                Json(PublishResponse {
                    topic: name,
                    delivered: Vec::new(),
                    failed,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
