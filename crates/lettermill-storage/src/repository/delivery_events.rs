//! Delivery event repository
//!
//! Events are immutable facts. The unique index on (queue_item_id,
//! event_type, dedup_fingerprint) collapses provider webhook replays:
//! inserting the same logical event twice is a no-op, while distinct
//! interactions (different fingerprint) always insert a new row. Totals
//! count rows; uniques count distinct queue items.

use lettermill_common::types::{CampaignId, QueueItemId};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{DeliveryEvent, RecordDeliveryEvent};

/// Delivery event repository
#[derive(Clone)]
pub struct DeliveryEventRepository {
    pool: PgPool,
}

impl DeliveryEventRepository {
    /// Create a new delivery event repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert an event, deduplicating on the fingerprint. Returns whether
    /// a row was actually inserted (false = replay, dropped).
    pub async fn insert_deduped(&self, input: &RecordDeliveryEvent) -> Result<bool, sqlx::Error> {
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
        .bind(Uuid::new_v4())
        .bind(input.queue_item_id)
        .bind(input.campaign_id)
        .bind(input.subscriber_id)
        .bind(&input.event_type)
        .bind(&input.dedup_fingerprint)
        .bind(&input.bounce_class)
        .bind(&input.url)
        .bind(&input.metadata)
        .bind(input.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List events for a queue item in occurrence order
    pub async fn list_by_queue_item(
        &self,
        queue_item_id: QueueItemId,
    ) -> Result<Vec<DeliveryEvent>, sqlx::Error> {
        sqlx::query_as::<_, DeliveryEvent>(
            r#"
            SELECT * FROM delivery_events
            WHERE queue_item_id = $1
            ORDER BY occurred_at ASC
            "#,
        )
        .bind(queue_item_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Aggregate event counts for a campaign, feeding the statistics
    /// rollup
    pub async fn campaign_event_counts(
        &self,
        campaign_id: CampaignId,
    ) -> Result<CampaignEventCounts, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE event_type = 'open') as total_opens,
                COUNT(DISTINCT queue_item_id) FILTER (WHERE event_type = 'open') as unique_opens,
                COUNT(*) FILTER (WHERE event_type = 'click') as total_clicks,
                COUNT(DISTINCT queue_item_id) FILTER (WHERE event_type = 'click') as unique_clicks,
                COUNT(DISTINCT queue_item_id) FILTER (WHERE event_type = 'unsubscribe') as unsubscribes
            FROM delivery_events
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(CampaignEventCounts {
            total_opens: row.get::<Option<i64>, _>("total_opens").unwrap_or(0),
            unique_opens: row.get::<Option<i64>, _>("unique_opens").unwrap_or(0),
            total_clicks: row.get::<Option<i64>, _>("total_clicks").unwrap_or(0),
            unique_clicks: row.get::<Option<i64>, _>("unique_clicks").unwrap_or(0),
            unsubscribes: row.get::<Option<i64>, _>("unsubscribes").unwrap_or(0),
        })
    }
}

/// Event counts for one campaign
#[derive(Debug, Clone, Default)]
pub struct CampaignEventCounts {
    pub total_opens: i64,
    pub unique_opens: i64,
    pub total_clicks: i64,
    pub unique_clicks: i64,
    pub unsubscribes: i64,
}
