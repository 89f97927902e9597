//! Provider webhook handlers
//!
//! The delivery provider posts event notifications here, signed with a
//! shared-secret HMAC over the raw body. Well-formed requests always get
//! a 2xx, even when every event inside is a duplicate or unmatched;
//! returning errors for those would only make the provider retry
//! forever.

use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, Json};
use lettermill_common::signature;
use lettermill_core::{RecordOutcome, WebhookEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::handlers::{api_error, internal_error, ApiError};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-lettermill-signature";

/// Webhook payload: a single event or a batch
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Batch(Vec<WebhookEvent>),
    Single(WebhookEvent),
}

/// Ingestion summary returned to the provider
#[derive(Debug, Default, Serialize)]
pub struct WebhookResponse {
    pub recorded: usize,
    pub duplicates: usize,
    pub unmatched: usize,
}

/// Ingest provider delivery events
///
/// POST /webhooks/provider
pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    // An empty secret means anyone could forge a valid MAC; reject
    // outright until one is configured.
    if state.webhook_secret.is_empty() {
        warn!("Rejected webhook: no signing secret configured");
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "unconfigured_secret",
            "Webhook signing secret is not configured",
        ));
    }

    let provided = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            api_error(
                StatusCode::UNAUTHORIZED,
                "missing_signature",
                "Signature header is required",
            )
        })?;

    if !signature::verify(&state.webhook_secret, &body, provided) {
        warn!("Rejected webhook with invalid signature");
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "Signature verification failed",
        ));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            "malformed_payload",
            format!("Could not parse event payload: {}", e),
        )
    })?;

    let events = match payload {
        WebhookPayload::Batch(events) => events,
        WebhookPayload::Single(event) => vec![event],
    };

    let mut response = WebhookResponse::default();

    for event in events {
        match state.recorder.record(event).await {
            Ok(RecordOutcome::Recorded) => response.recorded += 1,
            Ok(RecordOutcome::Duplicate) => response.duplicates += 1,
            Ok(RecordOutcome::Unmatched) => response.unmatched += 1,
            Err(e) => {
                error!("Failed to record webhook event: {}", e);
                return Err(internal_error("Failed to record events"));
            }
        }
    }

    Ok(Json(response))
}
