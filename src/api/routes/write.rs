//! Write Route
//!
//! - POST /api/v1/write - Apply one envelope

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::WriteResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::storage::Envelope;

/// POST /api/v1/write
///
/// The envelope is applied atomically; subscribers of its path are
/// notified once it is durable.
pub async fn write_envelope(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<Envelope>,
) -> ApiResult<(StatusCode, Json<WriteResponse>)> {
    if envelope.len() > state.config.max_envelope_entries {
        return Err(ApiError::Validation(format!(
            "Envelope exceeds maximum of {} entries",
            state.config.max_envelope_entries
        )));
    }

    let receipt = state.store.write(envelope).await?;

    let status = if receipt.dropped == 0 { "ok" } else { "partial" };
    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            status: status.to_string(),
            path: receipt.path,
            written: receipt.written,
            dropped: receipt.dropped,
        }),
    ))
}
