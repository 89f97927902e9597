//! Event Recorder
//!
//! Ingests provider webhook events, correlates them to queue items by
//! provider message id, and records them idempotently. Providers retry
//! webhooks aggressively and replay on reconnect, so every path here
//! must tolerate seeing the same event many times.

use chrono::{DateTime, Utc};
use lettermill_common::types::{BounceClass, EventType};
use lettermill_storage::db::DatabasePool;
use lettermill_storage::models::{QueueItem, RecordDeliveryEvent};
use lettermill_storage::repository::{
    DeliveryEventRepository, QueueItemRepository, SubscriberRepository,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Engagement points granted per interaction kind
const OPEN_POINTS: i32 = 1;
const CLICK_POINTS: i32 = 3;

/// A provider webhook event, as posted to the events endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Provider-side message id set at submission time
    pub provider_message_id: String,
    pub event_type: EventType,
    #[serde(default)]
    pub provider_event_id: Option<String>,
    #[serde(default)]
    pub bounce_class: Option<BounceClass>,
    /// Clicked URL, for click events
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// What the recorder did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// New fact recorded
    Recorded,
    /// Replay of an already-recorded fact, dropped
    Duplicate,
    /// Provider message id matched no queue item, dropped
    Unmatched,
}

/// Dedup fingerprint for an event. Provider event ids are authoritative
/// when present. Without one, opens and clicks are keyed by interaction
/// context (client ip and user agent) so repeated opens from the same
/// client collapse while distinct clients count. Terminal facts (bounce,
/// complaint, unsubscribe) happen at most once per item, so a constant
/// suffices.
pub fn dedup_fingerprint(event: &WebhookEvent) -> String {
    if let Some(id) = &event.provider_event_id {
        return format!("pid:{}", id);
    }

    match event.event_type {
        EventType::Open | EventType::Click => {
            let mut hasher = Sha256::new();
            hasher.update(event.ip.as_deref().unwrap_or("").as_bytes());
            hasher.update(b"|");
            hasher.update(event.user_agent.as_deref().unwrap_or("").as_bytes());
            if let Some(url) = &event.url {
                hasher.update(b"|");
                hasher.update(url.as_bytes());
            }
            format!("ctx:{}", hex::encode(hasher.finalize()))
        }
        _ => "terminal".to_string(),
    }
}

/// Event recorder
#[derive(Clone)]
pub struct EventRecorder {
    queue_repo: QueueItemRepository,
    event_repo: DeliveryEventRepository,
    subscriber_repo: SubscriberRepository,
}

impl EventRecorder {
    pub fn new(db_pool: &DatabasePool) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            queue_repo: QueueItemRepository::new(pool.clone()),
            event_repo: DeliveryEventRepository::new(pool.clone()),
            subscriber_repo: SubscriberRepository::new(pool),
        }
    }

    /// Record one webhook event. Always succeeds for well-formed events;
    /// unmatched and duplicate events are dropped, not errors, so the
    /// provider never sees a failure it would retry forever.
    pub async fn record(&self, event: WebhookEvent) -> Result<RecordOutcome, sqlx::Error> {
        let item = match self
            .queue_repo
            .get_by_provider_message_id(&event.provider_message_id)
            .await?
        {
            Some(item) => item,
            None => {
                warn!(
                    provider_message_id = %event.provider_message_id,
                    event_type = %event.event_type,
                    "Event matched no queue item, dropping"
                );
                return Ok(RecordOutcome::Unmatched);
            }
        };

        match event.event_type {
            EventType::Delivered => self.record_delivered(&item).await,
            EventType::Open | EventType::Click => self.record_engagement(&item, event).await,
            EventType::Bounce => self.record_bounce(&item, event).await,
            EventType::Complaint => self.record_complaint(&item, event).await,
            EventType::Unsubscribe => self.record_unsubscribe(&item, event).await,
        }
    }

    /// Delivery confirmation is a status promotion, not an event row
    async fn record_delivered(&self, item: &QueueItem) -> Result<RecordOutcome, sqlx::Error> {
        let promoted = self.queue_repo.mark_delivered(item.id).await?;
        if promoted {
            debug!(queue_item_id = %item.id, "Delivery confirmed");
            Ok(RecordOutcome::Recorded)
        } else {
            Ok(RecordOutcome::Duplicate)
        }
    }

    async fn record_engagement(
        &self,
        item: &QueueItem,
        event: WebhookEvent,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let points = match event.event_type {
            EventType::Click => CLICK_POINTS,
            _ => OPEN_POINTS,
        };
        let occurred_at = event.occurred_at;
        let inserted = self.event_repo.insert_deduped(&self.to_record(item, event)).await?;

        if !inserted {
            return Ok(RecordOutcome::Duplicate);
        }

        // Score moves only on genuinely new interactions
        self.subscriber_repo
            .record_engagement(item.subscriber_id, points, occurred_at)
            .await?;

        Ok(RecordOutcome::Recorded)
    }

    async fn record_bounce(
        &self,
        item: &QueueItem,
        event: WebhookEvent,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let bounce_class = event.bounce_class.unwrap_or(BounceClass::Hard);
        let inserted = self.event_repo.insert_deduped(&self.to_record(item, event)).await?;

        if !inserted {
            return Ok(RecordOutcome::Duplicate);
        }

        self.queue_repo
            .mark_bounced(item.id, &format!("{} bounce reported by provider", bounce_class))
            .await?;

        // A hard bounce means the address is gone; suppress it for every
        // future campaign. Soft bounces stay local to this item.
        if bounce_class == BounceClass::Hard {
            let suppressed = self.subscriber_repo.mark_bounced(item.subscriber_id).await?;
            if suppressed {
                info!(
                    subscriber_id = %item.subscriber_id,
                    "Subscriber suppressed after hard bounce"
                );
            }
        }

        Ok(RecordOutcome::Recorded)
    }

    async fn record_complaint(
        &self,
        item: &QueueItem,
        event: WebhookEvent,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let inserted = self.event_repo.insert_deduped(&self.to_record(item, event)).await?;

        if !inserted {
            return Ok(RecordOutcome::Duplicate);
        }

        let suppressed = self.subscriber_repo.mark_complained(item.subscriber_id).await?;
        if suppressed {
            info!(
                subscriber_id = %item.subscriber_id,
                "Subscriber suppressed after spam complaint"
            );
        }

        Ok(RecordOutcome::Recorded)
    }

    /// Unsubscribe updates the event log and the subscriber row in one
    /// transaction: a half-applied unsubscribe must never leave someone
    /// still receiving mail.
    async fn record_unsubscribe(
        &self,
        item: &QueueItem,
        event: WebhookEvent,
    ) -> Result<RecordOutcome, sqlx::Error> {
        let record = self.to_record(item, event);
        let mut tx = self.queue_repo.pool().begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO delivery_events (
                id, queue_item_id, campaign_id, subscriber_id, event_type,
                dedup_fingerprint, bounce_class, url, metadata, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (queue_item_id, event_type, dedup_fingerprint) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(record.queue_item_id)
        .bind(record.campaign_id)
        .bind(record.subscriber_id)
        .bind(&record.event_type)
        .bind(&record.dedup_fingerprint)
        .bind(&record.bounce_class)
        .bind(&record.url)
        .bind(&record.metadata)
        .bind(record.occurred_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(RecordOutcome::Duplicate);
        }

        sqlx::query(
            r#"
            UPDATE subscribers SET
                status = 'unsubscribed',
                unsubscribed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status != 'unsubscribed'
            "#,
        )
        .bind(record.subscriber_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(subscriber_id = %record.subscriber_id, "Subscriber unsubscribed");

        Ok(RecordOutcome::Recorded)
    }

    fn to_record(&self, item: &QueueItem, event: WebhookEvent) -> RecordDeliveryEvent {
        let fingerprint = dedup_fingerprint(&event);
        RecordDeliveryEvent {
            queue_item_id: item.id,
            campaign_id: item.campaign_id,
            subscriber_id: item.subscriber_id,
            event_type: event.event_type.to_string(),
            dedup_fingerprint: fingerprint,
            bounce_class: event.bounce_class.map(|b| b.to_string()),
            url: event.url,
            metadata: event.metadata.unwrap_or_else(|| serde_json::json!({})),
            occurred_at: event.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event(event_type: EventType) -> WebhookEvent {
        WebhookEvent {
            provider_message_id: "<abc@mail>".to_string(),
            event_type,
            provider_event_id: None,
            bounce_class: None,
            url: None,
            ip: None,
            user_agent: None,
            occurred_at: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn test_fingerprint_prefers_provider_event_id() {
        let mut e = event(EventType::Open);
        e.provider_event_id = Some("evt_123".to_string());
        e.ip = Some("1.2.3.4".to_string());
        assert_eq!(dedup_fingerprint(&e), "pid:evt_123");
    }

    #[test]
    fn test_fingerprint_open_varies_by_context() {
        let mut a = event(EventType::Open);
        a.ip = Some("1.2.3.4".to_string());
        a.user_agent = Some("Thunderbird".to_string());

        let mut b = event(EventType::Open);
        b.ip = Some("5.6.7.8".to_string());
        b.user_agent = Some("Thunderbird".to_string());

        assert_ne!(dedup_fingerprint(&a), dedup_fingerprint(&b));
        // same context replays collapse
        assert_eq!(dedup_fingerprint(&a), dedup_fingerprint(&a));
    }

    #[test]
    fn test_fingerprint_click_varies_by_url() {
        let mut a = event(EventType::Click);
        a.url = Some("https://example.com/one".to_string());
        let mut b = event(EventType::Click);
        b.url = Some("https://example.com/two".to_string());
        assert_ne!(dedup_fingerprint(&a), dedup_fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_terminal_events_are_constant() {
        let mut a = event(EventType::Bounce);
        a.ip = Some("1.2.3.4".to_string());
        let b = event(EventType::Bounce);
        assert_eq!(dedup_fingerprint(&a), dedup_fingerprint(&b));
        assert_eq!(dedup_fingerprint(&b), "terminal");
    }

    #[test]
    fn test_webhook_event_deserializes_with_defaults() {
        let e: WebhookEvent = serde_json::from_str(
            r#"{
                "provider_message_id": "<abc@mail>",
                "event_type": "open",
                "occurred_at": "2026-08-01T12:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(e.event_type, EventType::Open);
        assert!(e.provider_event_id.is_none());
        assert!(e.url.is_none());
    }
}
