use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::memory::RecordStore;
use super::protocol::GetRecordResponse;

pub async fn handle_get_record(
    Extension(store): Extension<Arc<RecordStore>>,
    Path((partition_key, sort_key)): Path<(String, String)>,
) -> (StatusCode, Json<GetRecordResponse>) {
    match store.get(&partition_key, &sort_key) {
        Some(record) => (StatusCode::OK, Json(GetRecordResponse { record: Some(record) })),
        None => {
            tracing::debug!("Record not found: {}/{}", partition_key, sort_key);
            (StatusCode::NOT_FOUND, Json(GetRecordResponse { record: None }))
        }
    }
}
