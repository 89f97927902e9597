//! Campaign Manager - the campaign state machine
//!
//! Lifecycle: draft -> scheduled -> sending -> sent, with
//! draft/scheduled -> cancelled and sending <-> paused side paths, and
//! sending -> failed when resolution cannot proceed. `sent` is monotonic:
//! a campaign never leaves it.
//!
//! Cancellation is only permitted before dispatch begins. Once a campaign
//! is sending, an already-submitted send cannot be recalled from the
//! transport, so the operator must pause instead and let in-flight items
//! drain.

use chrono::Utc;
use lettermill_common::types::CampaignId;
use lettermill_storage::db::DatabasePool;
use lettermill_storage::models::{Campaign, CampaignStatus};
use lettermill_storage::repository::{CampaignRepository, QueueItemRepository};
use thiserror::Error;
use tracing::{info, warn};

use crate::resolver::{RecipientResolver, ResolveError};

/// Campaign lifecycle errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Scheduled time must be in the future")]
    ScheduleInPast,

    #[error("Targeting rule is empty")]
    EmptyTargeting,

    #[error("Campaign resolved to zero recipients")]
    NoRecipients,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ResolveError> for CampaignError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::EmptyTargeting => CampaignError::EmptyTargeting,
            ResolveError::NoRecipients => CampaignError::NoRecipients,
            ResolveError::UnknownSegment(id) => {
                CampaignError::InvalidTransition(format!("targeting references unknown segment {}", id))
            }
            ResolveError::Database(e) => CampaignError::Database(e),
        }
    }
}

/// Campaign Manager
pub struct CampaignManager {
    campaign_repo: CampaignRepository,
    queue_repo: QueueItemRepository,
    resolver: RecipientResolver,
}

impl CampaignManager {
    /// Create a new campaign manager
    pub fn new(db_pool: &DatabasePool, resolver: RecipientResolver) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            queue_repo: QueueItemRepository::new(pool),
            resolver,
        }
    }

    /// Schedule a draft campaign for sending at the given time.
    ///
    /// Validates the targeting rule is non-empty but does not materialize
    /// recipients; that happens when the send time arrives.
    pub async fn schedule(
        &self,
        campaign_id: CampaignId,
        scheduled_at: chrono::DateTime<Utc>,
    ) -> Result<Campaign, CampaignError> {
        let campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        if campaign.status_enum() != Some(CampaignStatus::Draft) {
            return Err(CampaignError::InvalidTransition(format!(
                "only draft campaigns can be scheduled (status: {})",
                campaign.status
            )));
        }

        if scheduled_at < Utc::now() {
            return Err(CampaignError::ScheduleInPast);
        }

        if campaign.targeting_rule().is_empty() {
            return Err(CampaignError::EmptyTargeting);
        }

        // Persist the send time, then flip the status
        self.campaign_repo
            .set_scheduled_at(campaign_id, scheduled_at)
            .await?;

        let updated = self
            .campaign_repo
            .transition(campaign_id, &[CampaignStatus::Draft], CampaignStatus::Scheduled)
            .await?
            .ok_or_else(|| {
                CampaignError::InvalidTransition("campaign left draft status concurrently".into())
            })?;

        info!(campaign_id = %campaign_id, scheduled_at = %scheduled_at, "Campaign scheduled");

        Ok(updated)
    }

    /// Start a scheduled campaign whose send time has arrived.
    ///
    /// Runs the recipient resolver before the status flip so an
    /// interrupted start can be retried safely: queue rows for campaigns
    /// still in `scheduled` are inert (workers only claim for `sending`),
    /// and resolution itself is idempotent.
    pub async fn start(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        if campaign.status_enum() != Some(CampaignStatus::Scheduled) {
            return Err(CampaignError::InvalidTransition(format!(
                "only scheduled campaigns can start sending (status: {})",
                campaign.status
            )));
        }

        let total = match self.resolver.resolve(&campaign).await {
            Ok(total) => total,
            Err(e @ (ResolveError::NoRecipients | ResolveError::EmptyTargeting)) => {
                warn!(campaign_id = %campaign_id, "Campaign failed resolution: {}", e);
                self.campaign_repo
                    .mark_failed(campaign_id, &e.to_string())
                    .await?;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };

        self.campaign_repo
            .set_total_recipients(campaign_id, total as i32)
            .await?;

        let updated = self
            .campaign_repo
            .transition(
                campaign_id,
                &[CampaignStatus::Scheduled],
                CampaignStatus::Sending,
            )
            .await?
            .ok_or_else(|| {
                CampaignError::InvalidTransition("campaign left scheduled status concurrently".into())
            })?;

        info!(campaign_id = %campaign_id, recipients = total, "Campaign started sending");

        Ok(updated)
    }

    /// Pause a sending campaign. Cooperative: dispatch workers stop
    /// claiming new items for this campaign while in-flight claims finish
    /// normally.
    pub async fn pause(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let updated = self
            .campaign_repo
            .transition(campaign_id, &[CampaignStatus::Sending], CampaignStatus::Paused)
            .await?
            .ok_or_else(|| {
                CampaignError::InvalidTransition("only sending campaigns can be paused".into())
            })?;

        info!(campaign_id = %campaign_id, "Campaign paused");

        Ok(updated)
    }

    /// Resume a paused campaign
    pub async fn resume(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let updated = self
            .campaign_repo
            .transition(campaign_id, &[CampaignStatus::Paused], CampaignStatus::Sending)
            .await?
            .ok_or_else(|| {
                CampaignError::InvalidTransition("only paused campaigns can be resumed".into())
            })?;

        info!(campaign_id = %campaign_id, "Campaign resumed");

        Ok(updated)
    }

    /// Cancel a campaign. Only permitted before dispatch begins; once
    /// sending has started the operator must pause instead, since
    /// submitted sends cannot be recalled.
    pub async fn cancel(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        let campaign = self
            .campaign_repo
            .get(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        validate_cancel(campaign.status_enum(), &campaign.status)?;

        let updated = self
            .campaign_repo
            .transition(
                campaign_id,
                &[CampaignStatus::Draft, CampaignStatus::Scheduled],
                CampaignStatus::Cancelled,
            )
            .await?
            .ok_or_else(|| {
                CampaignError::InvalidTransition("campaign status changed concurrently".into())
            })?;

        info!(campaign_id = %campaign_id, "Campaign cancelled");

        Ok(updated)
    }

    /// Transition a fully drained sending campaign to `sent`. Returns
    /// whether the transition happened. Partial failure is expected: a
    /// campaign finishes `sent` even when some items ended `failed`.
    pub async fn check_completion(&self, campaign_id: CampaignId) -> Result<bool, CampaignError> {
        let counts = self.queue_repo.status_counts(campaign_id).await?;

        if !counts.is_drained() {
            return Ok(false);
        }

        let updated = self
            .campaign_repo
            .transition(campaign_id, &[CampaignStatus::Sending], CampaignStatus::Sent)
            .await?;

        if updated.is_some() {
            info!(
                campaign_id = %campaign_id,
                sent = counts.sent + counts.delivered,
                failed = counts.failed,
                bounced = counts.bounced,
                "Campaign completed"
            );
        }

        Ok(updated.is_some())
    }

    /// Campaigns whose scheduled send time has arrived
    pub async fn get_scheduled_ready(&self) -> Result<Vec<Campaign>, CampaignError> {
        Ok(self.campaign_repo.get_scheduled_ready().await?)
    }

    /// Ids of campaigns currently sending
    pub async fn sending_campaign_ids(&self) -> Result<Vec<CampaignId>, CampaignError> {
        Ok(self
            .campaign_repo
            .list_ids_by_status(CampaignStatus::Sending)
            .await?)
    }
}

/// Cancellation is only permitted before dispatch begins. Sending and
/// paused campaigns are redirected to pause; terminal statuses stay put.
fn validate_cancel(
    status: Option<CampaignStatus>,
    raw_status: &str,
) -> Result<(), CampaignError> {
    match status {
        Some(CampaignStatus::Draft | CampaignStatus::Scheduled) => Ok(()),
        Some(CampaignStatus::Sending | CampaignStatus::Paused) => {
            Err(CampaignError::InvalidTransition(
                "dispatch has started; pause the campaign and let in-flight items drain".into(),
            ))
        }
        _ => Err(CampaignError::InvalidTransition(format!(
            "campaign is already terminal (status: {})",
            raw_status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_allowed_before_dispatch() {
        assert!(validate_cancel(Some(CampaignStatus::Draft), "draft").is_ok());
        assert!(validate_cancel(Some(CampaignStatus::Scheduled), "scheduled").is_ok());
    }

    #[test]
    fn test_cancel_from_sending_redirects_to_pause() {
        for (status, raw) in [
            (CampaignStatus::Sending, "sending"),
            (CampaignStatus::Paused, "paused"),
        ] {
            match validate_cancel(Some(status), raw) {
                Err(CampaignError::InvalidTransition(msg)) => {
                    assert!(msg.contains("pause"), "unexpected message: {}", msg);
                }
                other => panic!("expected InvalidTransition, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_cancel_from_terminal_rejected() {
        for (status, raw) in [
            (CampaignStatus::Sent, "sent"),
            (CampaignStatus::Cancelled, "cancelled"),
            (CampaignStatus::Failed, "failed"),
        ] {
            match validate_cancel(Some(status), raw) {
                Err(CampaignError::InvalidTransition(msg)) => {
                    assert!(msg.contains("terminal"), "unexpected message: {}", msg);
                }
                other => panic!("expected InvalidTransition, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_resolve_errors_map_to_campaign_errors() {
        assert!(matches!(
            CampaignError::from(ResolveError::NoRecipients),
            CampaignError::NoRecipients
        ));
        assert!(matches!(
            CampaignError::from(ResolveError::EmptyTargeting),
            CampaignError::EmptyTargeting
        ));
        assert!(matches!(
            CampaignError::from(ResolveError::UnknownSegment(uuid::Uuid::new_v4())),
            CampaignError::InvalidTransition(_)
        ));
    }
}
