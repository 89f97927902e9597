//! API routes

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, segments, subscribers, webhooks};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness));

    let subscriber_routes = Router::new()
        .route("/", get(subscribers::list_subscribers))
        .route("/", post(subscribers::create_subscriber))
        .route("/:id", get(subscribers::get_subscriber))
        .route("/:id", put(subscribers::update_subscriber))
        .route("/:id", delete(subscribers::delete_subscriber));

    let segment_routes = Router::new()
        .route("/", get(segments::list_segments))
        .route("/", post(segments::create_segment))
        .route("/:id", get(segments::get_segment))
        .route("/:id", put(segments::update_segment))
        .route("/:id", delete(segments::delete_segment))
        .route("/:id/preview", get(segments::preview_segment));

    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:id", get(campaigns::get_campaign))
        .route("/:id", put(campaigns::update_campaign))
        .route("/:id", delete(campaigns::delete_campaign))
        .route("/:id/schedule", post(campaigns::schedule_campaign))
        .route("/:id/pause", post(campaigns::pause_campaign))
        .route("/:id/resume", post(campaigns::resume_campaign))
        .route("/:id/cancel", post(campaigns::cancel_campaign))
        .route("/:id/stats", get(campaigns::get_campaign_stats));

    let api_v1 = Router::new()
        .nest("/subscribers", subscriber_routes)
        .nest("/segments", segment_routes)
        .nest("/campaigns", campaign_routes);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .route("/webhooks/provider", post(webhooks::ingest_events))
        .route("/unsubscribe", get(subscribers::one_click_unsubscribe))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
