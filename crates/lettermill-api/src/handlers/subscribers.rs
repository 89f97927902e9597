//! Subscriber handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use lettermill_common::types::EmailAddress;
use lettermill_storage::models::{
    CreateSubscriber, Subscriber, SubscriberStatus, UpdateSubscriber,
};
use lettermill_storage::repository::SubscriberRepository;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::handlers::{api_error, internal_error, not_found, ApiError};
use crate::state::AppState;

/// Query parameters for listing subscribers
#[derive(Debug, Deserialize)]
pub struct ListSubscribersQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Subscriber list response
#[derive(Debug, serde::Serialize)]
pub struct SubscriberListResponse {
    pub data: Vec<Subscriber>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List subscribers
///
/// GET /api/v1/subscribers
pub async fn list_subscribers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSubscribersQuery>,
) -> Result<Json<SubscriberListResponse>, ApiError> {
    let repo = SubscriberRepository::new(state.db_pool.pool().clone());

    let status = query.status.and_then(|s| s.parse::<SubscriberStatus>().ok());

    let data = repo
        .list(status, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list subscribers: {}", e);
            internal_error("Failed to list subscribers")
        })?;

    let total = repo.count(status).await.unwrap_or(0);

    Ok(Json(SubscriberListResponse {
        data,
        total,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Create a subscriber
///
/// POST /api/v1/subscribers
pub async fn create_subscriber(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateSubscriber>,
) -> Result<(StatusCode, Json<Subscriber>), ApiError> {
    if EmailAddress::parse(&input.email).is_none() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Invalid email address",
        ));
    }

    let repo = SubscriberRepository::new(state.db_pool.pool().clone());

    if repo
        .get_by_email(&input.email)
        .await
        .map_err(|e| {
            error!("Failed to check existing subscriber: {}", e);
            internal_error("Failed to create subscriber")
        })?
        .is_some()
    {
        return Err(api_error(
            StatusCode::CONFLICT,
            "already_exists",
            "A subscriber with this email already exists",
        ));
    }

    let subscriber = repo.create(input).await.map_err(|e| {
        error!("Failed to create subscriber: {}", e);
        internal_error("Failed to create subscriber")
    })?;

    info!("Created subscriber {}", subscriber.id);

    Ok((StatusCode::CREATED, Json(subscriber)))
}

/// Get a subscriber
///
/// GET /api/v1/subscribers/:id
pub async fn get_subscriber(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscriber>, ApiError> {
    let repo = SubscriberRepository::new(state.db_pool.pool().clone());

    let subscriber = repo
        .get(id)
        .await
        .map_err(|e| {
            error!("Failed to get subscriber: {}", e);
            internal_error("Failed to get subscriber")
        })?
        .ok_or_else(|| not_found("Subscriber not found"))?;

    Ok(Json(subscriber))
}

/// Update a subscriber
///
/// PUT /api/v1/subscribers/:id
pub async fn update_subscriber(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSubscriber>,
) -> Result<Json<Subscriber>, ApiError> {
    let repo = SubscriberRepository::new(state.db_pool.pool().clone());

    let subscriber = repo
        .update(id, input)
        .await
        .map_err(|e| {
            error!("Failed to update subscriber: {}", e);
            internal_error("Failed to update subscriber")
        })?
        .ok_or_else(|| not_found("Subscriber not found"))?;

    info!("Updated subscriber {}", id);

    Ok(Json(subscriber))
}

/// Soft-delete a subscriber
///
/// DELETE /api/v1/subscribers/:id
pub async fn delete_subscriber(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let repo = SubscriberRepository::new(state.db_pool.pool().clone());

    let deleted = repo.soft_delete(id).await.map_err(|e| {
        error!("Failed to delete subscriber: {}", e);
        internal_error("Failed to delete subscriber")
    })?;

    if deleted {
        info!("Deleted subscriber {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Subscriber not found"))
    }
}

/// Query parameters for the one-click unsubscribe link
#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub sid: Uuid,
    pub cid: Uuid,
    pub token: String,
}

/// Public one-click unsubscribe, reached from the link rendered into
/// every campaign email. The token binds subscriber and campaign, so a
/// valid link only ever unsubscribes its own recipient.
///
/// GET /unsubscribe
pub async fn one_click_unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<&'static str, ApiError> {
    if !state
        .renderer
        .verify_unsubscribe_token(query.sid, query.cid, &query.token)
    {
        warn!(subscriber_id = %query.sid, "Rejected unsubscribe with bad token");
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "invalid_token",
            "This unsubscribe link is not valid",
        ));
    }

    let repo = SubscriberRepository::new(state.db_pool.pool().clone());

    repo.unsubscribe(query.sid).await.map_err(|e| {
        error!("Failed to unsubscribe: {}", e);
        internal_error("Failed to process unsubscribe")
    })?;

    info!(subscriber_id = %query.sid, campaign_id = %query.cid, "Unsubscribed via link");

    Ok("You have been unsubscribed.")
}
