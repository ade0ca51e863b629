//! Stored receipt images

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use receiptbox_common::errors::Result;
use receiptbox_common::storage::mime_type_for;

/// GET /uploads/{key}
pub async fn get_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse> {
    let data = state.storage.get_file(&key).await?;

    Ok((
        [
            (header::CONTENT_TYPE, mime_type_for(&key)),
            (header::CACHE_CONTROL, "private, max-age=86400"),
        ],
        data,
    ))
}
