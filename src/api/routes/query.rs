//! Query Routes
//!
//! - GET /api/v1/keys?path= - Direct children of a namespace node
//! - GET /api/v1/series?path=&start=&end= - Time range, half-open
//! - GET /api/v1/series/index?path=&start=&end= - Index range, inclusive

use axum::{
    extract::{Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::{IndexRangeQuery, KeyDto, KeysQuery, KeysResponse, SeriesResponse, TimeRangeQuery};
use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::storage::KeyPath;

/// GET /api/v1/keys
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KeysQuery>,
) -> ApiResult<Json<KeysResponse>> {
    let path = KeyPath::parse(query.path.as_deref().unwrap_or_default())?;
    let keys = state.store.get_keys(&path)?;

    Ok(Json(KeysResponse {
        path,
        keys: keys.into_iter().map(KeyDto::from).collect(),
    }))
}

/// GET /api/v1/series
pub async fn series_by_time(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimeRangeQuery>,
) -> ApiResult<Json<SeriesResponse>> {
    let path = KeyPath::parse(&query.path)?;
    let entries = state.store.get_time(&path, query.start, query.end).await?;

    Ok(Json(SeriesResponse {
        path,
        count: entries.len(),
        entries,
    }))
}

/// GET /api/v1/series/index
pub async fn series_by_index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IndexRangeQuery>,
) -> ApiResult<Json<SeriesResponse>> {
    let path = KeyPath::parse(&query.path)?;
    let entries = state.store.get_index(&path, query.start, query.end).await?;

    Ok(Json(SeriesResponse {
        path,
        count: entries.len(),
        entries,
    }))
}
