use super::protocol::*;
use super::registry::QueueRegistry;

use axum::{Extension, Json, extract::Path, http::StatusCode};
use std::sync::Arc;

pub async fn handle_queue_stats(
    Extension(queues): Extension<Arc<QueueRegistry>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<QueueStatsResponse>) {
    match queues.get(&name) {
        Some(queue) => {
            let stats = queue.stats().await;
            (
                StatusCode::OK,
                Json(QueueStatsResponse {
                    queue: name,
                    stats: Some(stats),
                }),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(QueueStatsResponse {
                queue: name,
                stats: None,
            }),
        ),
    }
}

pub async fn handle_dead_letters(
    Extension(queues): Extension<Arc<QueueRegistry>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<DeadLettersResponse>) {
    match queues.get(&name) {
        Some(queue) => {
            let messages = queue.dead_letters().await;
            (
                StatusCode::OK,
                Json(DeadLettersResponse {
                    queue: name,
                    messages,
                }),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(DeadLettersResponse {
                queue: name,
                messages: Vec::new(),
            }),
        ),
    }
}

pub async fn handle_redrive(
    Extension(queues): Extension<Arc<QueueRegistry>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<RedriveResponse>) {
    match queues.get(&name) {
        Some(queue) => {
            let redriven = queue.redrive_dead_letters().await;
            tracing::info!("Redrive requested for {}: {} message(s)", name, redriven);
            (
                StatusCode::OK,
                Json(RedriveResponse {
                    queue: name,
                    redriven,
                }),
            )
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(RedriveResponse {
                queue: name,
                redriven: 0,
            }),
        ),
    }
}
