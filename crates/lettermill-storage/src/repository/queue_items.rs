//! Send queue repository
//!
//! The queue_items table is the sole coordination point between dispatch
//! workers. All worker coordination happens through the atomic claim; no
//! in-process locks span workers.

use chrono::{DateTime, Utc};
use lettermill_common::types::{CampaignId, QueueItemId, SubscriberId};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{QueueItem, QueueItemStatus};

/// Input for enqueueing a (campaign, subscriber) pair
#[derive(Debug, Clone)]
pub struct NewQueueItem {
    pub campaign_id: CampaignId,
    pub subscriber_id: SubscriberId,
    /// Address snapshot captured at resolve time
    pub address: String,
    pub max_attempts: i32,
}

/// Send queue repository
#[derive(Clone)]
pub struct QueueItemRepository {
    pool: PgPool,
}

impl QueueItemRepository {
    /// Create a new queue item repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert queue items for a campaign, skipping pairs that already
    /// exist. Re-running resolution is therefore safe: the unique index on
    /// (campaign_id, subscriber_id) absorbs duplicates.
    pub async fn upsert_batch(&self, items: Vec<NewQueueItem>) -> Result<u64, sqlx::Error> {
        let mut inserted = 0u64;
        let mut tx = self.pool.begin().await?;

        for item in items {
            let result = sqlx::query(
                r#"
                INSERT INTO queue_items (id, campaign_id, subscriber_id, address, max_attempts)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (campaign_id, subscriber_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(item.campaign_id)
            .bind(item.subscriber_id)
            .bind(&item.address)
            .bind(item.max_attempts)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Get a queue item by ID
    pub async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>("SELECT * FROM queue_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find a queue item by its provider message id
    pub async fn get_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            "SELECT * FROM queue_items WHERE provider_message_id = $1",
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Atomically claim a batch of due pending items for a worker.
    ///
    /// The conditional update over a FOR UPDATE SKIP LOCKED subselect is
    /// the single most important correctness property of the pipeline:
    /// exactly one worker wins each row, and losers simply see an empty
    /// batch. Claims are restricted to campaigns in `sending`, which is
    /// how pausing a campaign blocks new claims while in-flight ones
    /// drain.
    pub async fn claim_batch(
        &self,
        worker_id: &str,
        limit: i64,
    ) -> Result<Vec<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE queue_items qi SET
                status = 'processing',
                claimed_by = $1,
                claimed_at = NOW(),
                attempts = qi.attempts + 1,
                updated_at = NOW()
            FROM (
                SELECT q.id FROM queue_items q
                JOIN campaigns c ON c.id = q.campaign_id
                WHERE q.status = 'pending'
                  AND q.next_attempt_at <= NOW()
                  AND c.status = 'sending'
                ORDER BY q.next_attempt_at ASC
                LIMIT $2
                FOR UPDATE OF q SKIP LOCKED
            ) due
            WHERE qi.id = due.id
            RETURNING qi.*
            "#,
        )
        .bind(worker_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Release claims whose lease has expired (crash recovery). Reclaimed
    /// items go back to `pending`; the dispatch worker's resend-check
    /// guards against double-transmission of items that were actually
    /// sent before the crash.
    pub async fn release_expired_leases(&self, lease_secs: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE queue_items SET
                status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE status = 'processing'
              AND claimed_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(lease_secs as f64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Mark an item sent and record the provider message id used to
    /// correlate webhook events
    pub async fn mark_sent(
        &self,
        id: QueueItemId,
        provider_message_id: &str,
    ) -> Result<Option<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE queue_items SET
                status = 'sent',
                provider_message_id = COALESCE(provider_message_id, $2),
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Promote a sent item to delivered (confirmed by provider webhook)
    pub async fn mark_delivered(&self, id: QueueItemId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE queue_items SET
                status = 'delivered',
                updated_at = NOW()
            WHERE id = $1 AND status = 'sent'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Requeue an item after a transient failure with the computed
    /// next-attempt time, or fail it terminally once attempts are
    /// exhausted
    pub async fn retry_later(
        &self,
        id: QueueItemId,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<Option<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE queue_items SET
                status = CASE
                    WHEN attempts < max_attempts THEN 'pending'
                    ELSE 'failed'
                END,
                next_attempt_at = $2,
                last_error = $3,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark an item terminally failed (permanent error, never retried)
    pub async fn mark_failed(
        &self,
        id: QueueItemId,
        error: &str,
    ) -> Result<Option<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE queue_items SET
                status = 'failed',
                last_error = $2,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark an item bounced
    pub async fn mark_bounced(
        &self,
        id: QueueItemId,
        reason: &str,
    ) -> Result<Option<QueueItem>, sqlx::Error> {
        sqlx::query_as::<_, QueueItem>(
            r#"
            UPDATE queue_items SET
                status = 'bounced',
                last_error = $2,
                claimed_by = NULL,
                claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(reason)
        .fetch_optional(&self.pool)
        .await
    }

    /// List queue items for a campaign
    pub async fn list_by_campaign(
        &self,
        campaign_id: CampaignId,
        status: Option<QueueItemStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QueueItem>, sqlx::Error> {
        if let Some(status) = status {
            sqlx::query_as::<_, QueueItem>(
                r#"
                SELECT * FROM queue_items
                WHERE campaign_id = $1 AND status = $2
                ORDER BY created_at ASC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(campaign_id)
            .bind(status.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, QueueItem>(
                r#"
                SELECT * FROM queue_items
                WHERE campaign_id = $1
                ORDER BY created_at ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(campaign_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Get per-status counts for a campaign
    pub async fn status_counts(
        &self,
        campaign_id: CampaignId,
    ) -> Result<QueueStatusCounts, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') as pending,
                COUNT(*) FILTER (WHERE status = 'processing') as processing,
                COUNT(*) FILTER (WHERE status = 'sent') as sent,
                COUNT(*) FILTER (WHERE status = 'delivered') as delivered,
                COUNT(*) FILTER (WHERE status = 'bounced') as bounced,
                COUNT(*) FILTER (WHERE status = 'failed') as failed
            FROM queue_items
            WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueStatusCounts {
            pending: row.get::<Option<i64>, _>("pending").unwrap_or(0),
            processing: row.get::<Option<i64>, _>("processing").unwrap_or(0),
            sent: row.get::<Option<i64>, _>("sent").unwrap_or(0),
            delivered: row.get::<Option<i64>, _>("delivered").unwrap_or(0),
            bounced: row.get::<Option<i64>, _>("bounced").unwrap_or(0),
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0),
        })
    }
}

/// Queue item counts by status for one campaign
#[derive(Debug, Clone, Default)]
pub struct QueueStatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub sent: i64,
    pub delivered: i64,
    pub bounced: i64,
    pub failed: i64,
}

impl QueueStatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.sent + self.delivered + self.bounced + self.failed
    }

    /// Items that reached a terminal status
    pub fn terminal(&self) -> i64 {
        self.sent + self.delivered + self.bounced + self.failed
    }

    /// A campaign is fully drained when every item is terminal
    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.processing == 0 && self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drained_counts() {
        let counts = QueueStatusCounts {
            sent: 3,
            delivered: 2,
            failed: 1,
            ..Default::default()
        };
        assert!(counts.is_drained());
        assert_eq!(counts.terminal(), 6);

        let counts = QueueStatusCounts {
            pending: 1,
            sent: 5,
            ..Default::default()
        };
        assert!(!counts.is_drained());

        // an empty queue is not "drained" - nothing was ever resolved
        assert!(!QueueStatusCounts::default().is_drained());
    }
}
