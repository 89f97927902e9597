//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use lettermill_core::CampaignError;
use lettermill_storage::models::{
    Campaign, CampaignStatistics, CampaignStatus, CreateCampaign, UpdateCampaign,
};
use lettermill_storage::repository::CampaignRepository;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::handlers::{api_error, internal_error, not_found, ApiError};
use crate::state::AppState;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Request body for scheduling a campaign
#[derive(Debug, Deserialize)]
pub struct ScheduleCampaignRequest {
    pub scheduled_at: DateTime<Utc>,
}

fn lifecycle_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotFound => not_found("Campaign not found"),
        CampaignError::InvalidTransition(_)
        | CampaignError::ScheduleInPast
        | CampaignError::EmptyTargeting
        | CampaignError::NoRecipients => {
            api_error(StatusCode::CONFLICT, "invalid_transition", e.to_string())
        }
        CampaignError::Database(err) => {
            error!("Campaign lifecycle database error: {}", err);
            internal_error("Campaign operation failed")
        }
        CampaignError::Internal(err) => {
            error!("Campaign lifecycle error: {}", err);
            internal_error("Campaign operation failed")
        }
    }
}

/// List campaigns
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<Vec<Campaign>>, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let status = query.status.and_then(|s| s.parse::<CampaignStatus>().ok());

    let campaigns = repo
        .list(status, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list campaigns: {}", e);
            internal_error("Failed to list campaigns")
        })?;

    Ok(Json(campaigns))
}

/// Create a campaign (always starts as a draft)
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaign>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    if input.name.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Campaign name is required",
        ));
    }

    if input.subject.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Subject is required",
        ));
    }

    if input.html_body.is_none() && input.text_body.is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Either html_body or text_body is required",
        ));
    }

    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let campaign = repo.create(input).await.map_err(|e| {
        error!("Failed to create campaign: {}", e);
        internal_error("Failed to create campaign")
    })?;

    info!("Created campaign {}", campaign.id);

    Ok((StatusCode::CREATED, Json(campaign)))
}

/// Get a campaign
///
/// GET /api/v1/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let campaign = repo
        .get(id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal_error("Failed to get campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    Ok(Json(campaign))
}

/// Update a draft campaign
///
/// PUT /api/v1/campaigns/:id
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCampaign>,
) -> Result<Json<Campaign>, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let campaign = repo
        .update(id, input)
        .await
        .map_err(|e| {
            error!("Failed to update campaign: {}", e);
            internal_error("Failed to update campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found or not in draft status"))?;

    info!("Updated campaign {}", id);

    Ok(Json(campaign))
}

/// Delete a draft campaign
///
/// DELETE /api/v1/campaigns/:id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = CampaignRepository::new(state.db_pool.pool().clone());

    let deleted = repo.delete(id).await.map_err(|e| {
        error!("Failed to delete campaign: {}", e);
        internal_error("Failed to delete campaign")
    })?;

    if deleted {
        info!("Deleted campaign {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Campaign not found or not in draft status"))
    }
}

/// Schedule a campaign for sending
///
/// POST /api/v1/campaigns/:id/schedule
pub async fn schedule_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<ScheduleCampaignRequest>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state
        .manager
        .schedule(id, input.scheduled_at)
        .await
        .map_err(lifecycle_error)?;

    info!("Scheduled campaign {}", id);

    Ok(Json(campaign))
}

/// Pause a sending campaign
///
/// POST /api/v1/campaigns/:id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state.manager.pause(id).await.map_err(lifecycle_error)?;

    info!("Paused campaign {}", id);

    Ok(Json(campaign))
}

/// Resume a paused campaign
///
/// POST /api/v1/campaigns/:id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state.manager.resume(id).await.map_err(lifecycle_error)?;

    info!("Resumed campaign {}", id);

    Ok(Json(campaign))
}

/// Cancel a campaign that has not started dispatching
///
/// POST /api/v1/campaigns/:id/cancel
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = state.manager.cancel(id).await.map_err(lifecycle_error)?;

    info!("Cancelled campaign {}", id);

    Ok(Json(campaign))
}

/// Get campaign statistics, computing the rollup on first access
///
/// GET /api/v1/campaigns/:id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignStatistics>, ApiError> {
    // 404 for unknown campaigns rather than an all-zero rollup
    let repo = CampaignRepository::new(state.db_pool.pool().clone());
    repo.get(id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal_error("Failed to get campaign statistics")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    let stats = state.aggregator.get_or_compute(id).await.map_err(|e| {
        error!("Failed to compute campaign statistics: {}", e);
        internal_error("Failed to get campaign statistics")
    })?;

    Ok(Json(stats))
}
