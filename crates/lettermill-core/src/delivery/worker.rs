//! Dispatch worker
//!
//! Each worker runs an independent poll loop: claim a batch of due
//! queue items, render each against current subscriber data, submit over
//! the transport, and record the outcome. Workers coordinate only
//! through the database claim; any number of them can run concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lettermill_common::types::CampaignId;
use lettermill_storage::db::DatabasePool;
use lettermill_storage::models::{Campaign, QueueItem, Subscriber};
use lettermill_storage::repository::{
    CampaignRepository, QueueItemRepository, SubscriberRepository,
};
use tracing::{debug, error, info, warn};

use crate::delivery::backoff::BackoffPolicy;
use crate::delivery::template::{TemplateError, TemplateRenderer};
use crate::delivery::transport::{Transport, TransportError};

/// Dispatch worker draining the send queue
pub struct DispatchWorker {
    worker_id: String,
    queue_repo: QueueItemRepository,
    subscriber_repo: SubscriberRepository,
    campaign_repo: CampaignRepository,
    transport: Arc<dyn Transport>,
    renderer: Arc<TemplateRenderer>,
    backoff: BackoffPolicy,
    batch_size: i64,
    poll_interval: Duration,
}

impl DispatchWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: String,
        db_pool: &DatabasePool,
        transport: Arc<dyn Transport>,
        renderer: Arc<TemplateRenderer>,
        backoff: BackoffPolicy,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            worker_id,
            queue_repo: QueueItemRepository::new(pool.clone()),
            subscriber_repo: SubscriberRepository::new(pool.clone()),
            campaign_repo: CampaignRepository::new(pool),
            transport,
            renderer,
            backoff,
            batch_size,
            poll_interval,
        }
    }

    /// Run the worker loop until the task is aborted
    pub async fn run(self) {
        info!(worker_id = %self.worker_id, "Dispatch worker started");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.process_batch().await {
                Ok(0) => {}
                Ok(n) => debug!(worker_id = %self.worker_id, processed = n, "Batch complete"),
                Err(e) => error!(worker_id = %self.worker_id, "Batch failed: {}", e),
            }
        }
    }

    /// Claim and process one batch. Returns the number of items handled.
    pub async fn process_batch(&self) -> Result<usize, sqlx::Error> {
        let items = self
            .queue_repo
            .claim_batch(&self.worker_id, self.batch_size)
            .await?;

        if items.is_empty() {
            return Ok(0);
        }

        // One campaign fetch per distinct campaign in the batch
        let mut campaigns: HashMap<CampaignId, Campaign> = HashMap::new();
        for item in &items {
            if !campaigns.contains_key(&item.campaign_id) {
                if let Some(c) = self.campaign_repo.get(item.campaign_id).await? {
                    campaigns.insert(item.campaign_id, c);
                }
            }
        }

        let count = items.len();
        for item in items {
            let Some(campaign) = campaigns.get(&item.campaign_id) else {
                // Campaign row vanished under us; fail the item rather
                // than retrying forever
                self.queue_repo
                    .mark_failed(item.id, "campaign no longer exists")
                    .await?;
                continue;
            };

            self.process_item(campaign, item).await?;
        }

        Ok(count)
    }

    async fn process_item(&self, campaign: &Campaign, item: QueueItem) -> Result<(), sqlx::Error> {
        let subscriber = self.subscriber_repo.get(item.subscriber_id).await?;

        let subscriber = match presend_action(&item, subscriber) {
            PresendAction::RestoreSent(provider_message_id) => {
                debug!(
                    queue_item_id = %item.id,
                    "Item already submitted in a prior attempt, restoring sent status"
                );
                self.queue_repo
                    .mark_sent(item.id, &provider_message_id)
                    .await?;
                return Ok(());
            }
            PresendAction::Fail(reason) => {
                self.queue_repo.mark_failed(item.id, &reason).await?;
                return Ok(());
            }
            PresendAction::Send(subscriber) => subscriber,
        };

        let email = match self.renderer.render(campaign, &subscriber, &item.address) {
            Ok(email) => email,
            Err(e @ (TemplateError::UnknownPlaceholder(_) | TemplateError::EmptyBody)) => {
                warn!(queue_item_id = %item.id, "Rendering failed: {}", e);
                self.queue_repo
                    .mark_failed(item.id, &format!("render: {}", e))
                    .await?;
                return Ok(());
            }
        };

        match self.transport.send(&email).await {
            Ok(receipt) => {
                debug!(
                    queue_item_id = %item.id,
                    provider_message_id = %receipt.provider_message_id,
                    "Submitted"
                );
                self.queue_repo
                    .mark_sent(item.id, &receipt.provider_message_id)
                    .await?;
            }
            Err(TransportError::Transient(reason)) => {
                let next_attempt_at = self.backoff.next_attempt_at(item.attempts);
                warn!(
                    queue_item_id = %item.id,
                    attempt = item.attempts,
                    next_attempt_at = %next_attempt_at,
                    "Transient failure: {}",
                    reason
                );
                self.queue_repo
                    .retry_later(item.id, next_attempt_at, &reason)
                    .await?;
            }
            Err(TransportError::Permanent(reason)) => {
                warn!(queue_item_id = %item.id, "Permanent failure: {}", reason);
                self.queue_repo.mark_failed(item.id, &reason).await?;
            }
            Err(TransportError::Bounce(reason)) => {
                warn!(
                    queue_item_id = %item.id,
                    subscriber_id = %item.subscriber_id,
                    "Relay rejected recipient: {}",
                    reason
                );
                self.queue_repo.mark_bounced(item.id, &reason).await?;
                // Synchronous rejection is a hard bounce; suppress the
                // address globally
                self.subscriber_repo.mark_bounced(item.subscriber_id).await?;
            }
        }

        Ok(())
    }
}

/// Disposition of a claimed item before any transport work
#[derive(Debug)]
enum PresendAction {
    /// A prior attempt already submitted this item; restore `sent`
    RestoreSent(String),
    /// Terminal per-item failure with a recorded reason
    Fail(String),
    Send(Subscriber),
}

fn presend_action(item: &QueueItem, subscriber: Option<Subscriber>) -> PresendAction {
    // Resend check first: a provider message id means a previous attempt
    // already submitted this item and the lease expired before the
    // status update landed. Restore `sent` instead of sending twice.
    if let Some(provider_message_id) = &item.provider_message_id {
        return PresendAction::RestoreSent(provider_message_id.clone());
    }

    match subscriber {
        None => PresendAction::Fail("subscriber no longer exists".to_string()),
        // Suppression may have arrived between resolve and dispatch
        // (unsubscribe, bounce on an earlier campaign). Honor it.
        Some(s) if !s.is_deliverable(false) => PresendAction::Fail(format!(
            "subscriber no longer deliverable ({})",
            s.status
        )),
        Some(s) => PresendAction::Send(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn queue_item(provider_message_id: Option<&str>) -> QueueItem {
        QueueItem {
            id: uuid::Uuid::new_v4(),
            campaign_id: uuid::Uuid::new_v4(),
            subscriber_id: uuid::Uuid::new_v4(),
            address: "a@example.com".to_string(),
            status: "processing".to_string(),
            attempts: 2,
            max_attempts: 5,
            next_attempt_at: Utc::now(),
            claimed_by: Some("host-worker-0".to_string()),
            claimed_at: Some(Utc::now()),
            provider_message_id: provider_message_id.map(str::to_string),
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn subscriber(status: &str) -> Subscriber {
        Subscriber {
            id: uuid::Uuid::new_v4(),
            email: "a@example.com".to_string(),
            name: None,
            status: status.to_string(),
            verified: true,
            consent_given_at: None,
            consent_source_ip: None,
            engagement_score: 50,
            tags: serde_json::json!([]),
            attributes: serde_json::json!({}),
            last_engaged_at: None,
            unsubscribed_at: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_reclaimed_item_with_receipt_is_not_resent() {
        // Crash between transport submit and status update: the reclaim
        // sweep hands the item back with the receipt still on it. The
        // receipt wins over everything, even a now-suppressed recipient.
        let item = queue_item(Some("msg-123"));

        match presend_action(&item, Some(subscriber("unsubscribed"))) {
            PresendAction::RestoreSent(id) => assert_eq!(id, "msg-123"),
            other => panic!("expected RestoreSent, got {:?}", other),
        }

        match presend_action(&item, None) {
            PresendAction::RestoreSent(id) => assert_eq!(id, "msg-123"),
            other => panic!("expected RestoreSent, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_subscriber_fails_item() {
        match presend_action(&queue_item(None), None) {
            PresendAction::Fail(reason) => assert!(reason.contains("no longer exists")),
            other => panic!("expected Fail, got {:?}", other),
        }
    }

    #[test]
    fn test_suppressed_subscriber_fails_item() {
        for status in ["unsubscribed", "bounced", "complained"] {
            match presend_action(&queue_item(None), Some(subscriber(status))) {
                PresendAction::Fail(reason) => {
                    assert!(reason.contains(status), "unexpected reason: {}", reason)
                }
                other => panic!("expected Fail for {}, got {:?}", status, other),
            }
        }
    }

    #[test]
    fn test_deliverable_subscriber_proceeds_to_send() {
        match presend_action(&queue_item(None), Some(subscriber("active"))) {
            PresendAction::Send(s) => assert_eq!(s.status, "active"),
            other => panic!("expected Send, got {:?}", other),
        }
    }
}
