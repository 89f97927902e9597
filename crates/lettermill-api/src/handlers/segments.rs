//! Segment handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use lettermill_storage::models::{CreateSegment, Segment, UpdateSegment};
use lettermill_storage::repository::SegmentRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::handlers::{internal_error, not_found, ApiError};
use crate::state::AppState;

/// Query parameters for listing segments
#[derive(Debug, Deserialize)]
pub struct ListSegmentsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// List segments
///
/// GET /api/v1/segments
pub async fn list_segments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSegmentsQuery>,
) -> Result<Json<Vec<Segment>>, ApiError> {
    let repo = SegmentRepository::new(state.db_pool.pool().clone());

    let segments = repo.list(query.limit, query.offset).await.map_err(|e| {
        error!("Failed to list segments: {}", e);
        internal_error("Failed to list segments")
    })?;

    Ok(Json(segments))
}

/// Create a segment
///
/// POST /api/v1/segments
pub async fn create_segment(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateSegment>,
) -> Result<(StatusCode, Json<Segment>), ApiError> {
    let repo = SegmentRepository::new(state.db_pool.pool().clone());

    let segment = repo.create(input).await.map_err(|e| {
        error!("Failed to create segment: {}", e);
        internal_error("Failed to create segment")
    })?;

    info!("Created segment {}", segment.id);

    Ok((StatusCode::CREATED, Json(segment)))
}

/// Get a segment
///
/// GET /api/v1/segments/:id
pub async fn get_segment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Segment>, ApiError> {
    let repo = SegmentRepository::new(state.db_pool.pool().clone());

    let segment = repo
        .get(id)
        .await
        .map_err(|e| {
            error!("Failed to get segment: {}", e);
            internal_error("Failed to get segment")
        })?
        .ok_or_else(|| not_found("Segment not found"))?;

    Ok(Json(segment))
}

/// Update a segment
///
/// PUT /api/v1/segments/:id
pub async fn update_segment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSegment>,
) -> Result<Json<Segment>, ApiError> {
    let repo = SegmentRepository::new(state.db_pool.pool().clone());

    let segment = repo
        .update(id, input)
        .await
        .map_err(|e| {
            error!("Failed to update segment: {}", e);
            internal_error("Failed to update segment")
        })?
        .ok_or_else(|| not_found("Segment not found"))?;

    info!("Updated segment {}", id);

    Ok(Json(segment))
}

/// Delete a segment
///
/// DELETE /api/v1/segments/:id
pub async fn delete_segment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = SegmentRepository::new(state.db_pool.pool().clone());

    let deleted = repo.delete(id).await.map_err(|e| {
        error!("Failed to delete segment: {}", e);
        internal_error("Failed to delete segment")
    })?;

    if deleted {
        info!("Deleted segment {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Segment not found"))
    }
}

/// Segment preview response
#[derive(Debug, Serialize)]
pub struct SegmentPreviewResponse {
    pub segment_id: Uuid,
    pub member_count: usize,
}

/// Evaluate a segment against current subscriber data without touching
/// any campaign
///
/// GET /api/v1/segments/:id/preview
pub async fn preview_segment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SegmentPreviewResponse>, ApiError> {
    let repo = SegmentRepository::new(state.db_pool.pool().clone());

    let segment = repo
        .get(id)
        .await
        .map_err(|e| {
            error!("Failed to get segment: {}", e);
            internal_error("Failed to get segment")
        })?
        .ok_or_else(|| not_found("Segment not found"))?;

    let members = repo
        .evaluate(&segment.filter_predicate())
        .await
        .map_err(|e| {
            error!("Failed to evaluate segment: {}", e);
            internal_error("Failed to evaluate segment")
        })?;

    Ok(Json(SegmentPreviewResponse {
        segment_id: id,
        member_count: members.len(),
    }))
}
