//! Statistics Aggregator
//!
//! Recomputes the per-campaign rollup from the queue and event tables
//! and overwrites it in place. The rollup is a cache, never a source of
//! truth: it can be rebuilt at any time from the same inputs, so
//! concurrent recomputes racing each other is harmless.

use chrono::Utc;
use lettermill_common::types::CampaignId;
use lettermill_storage::db::DatabasePool;
use lettermill_storage::models::CampaignStatistics;
use lettermill_storage::repository::{
    DeliveryEventRepository, QueueItemRepository, StatisticsRepository,
};
use sqlx::PgPool;
use tracing::{debug, info};

/// Delivery-base percentage, 0 when the denominator is empty
fn rate(numerator: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    (numerator as f64 / denominator as f64) * 100.0
}

/// Statistics aggregator
#[derive(Clone)]
pub struct StatisticsAggregator {
    pool: PgPool,
    queue_repo: QueueItemRepository,
    event_repo: DeliveryEventRepository,
    stats_repo: StatisticsRepository,
}

impl StatisticsAggregator {
    pub fn new(db_pool: &DatabasePool) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            queue_repo: QueueItemRepository::new(pool.clone()),
            event_repo: DeliveryEventRepository::new(pool.clone()),
            stats_repo: StatisticsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Rebuild and store the rollup for one campaign
    pub async fn recompute(
        &self,
        campaign_id: CampaignId,
    ) -> Result<CampaignStatistics, sqlx::Error> {
        let queue = self.queue_repo.status_counts(campaign_id).await?;
        let events = self.event_repo.campaign_event_counts(campaign_id).await?;

        // "sent" counts everything submitted to the provider; confirmed
        // items move to `delivered` in the queue but remain sent mail.
        let sent = queue.sent + queue.delivered;

        let stats = CampaignStatistics {
            campaign_id,
            total_recipients: queue.total(),
            sent,
            delivered: queue.delivered,
            bounced: queue.bounced,
            failed: queue.failed,
            total_opens: events.total_opens,
            unique_opens: events.unique_opens,
            total_clicks: events.total_clicks,
            unique_clicks: events.unique_clicks,
            unsubscribes: events.unsubscribes,
            open_rate: rate(events.unique_opens, queue.delivered),
            click_rate: rate(events.unique_clicks, queue.delivered),
            bounce_rate: rate(queue.bounced, sent),
            unsubscribe_rate: rate(events.unsubscribes, queue.delivered),
            computed_at: Utc::now(),
        };

        self.stats_repo.upsert(&stats).await?;

        debug!(campaign_id = %campaign_id, "Statistics recomputed");

        Ok(stats)
    }

    /// Fetch the stored rollup, computing it on demand when absent
    pub async fn get_or_compute(
        &self,
        campaign_id: CampaignId,
    ) -> Result<CampaignStatistics, sqlx::Error> {
        match self.stats_repo.get(campaign_id).await? {
            Some(stats) => Ok(stats),
            None => self.recompute(campaign_id).await,
        }
    }

    /// Apply daily engagement decay to every scored subscriber so scores
    /// reflect recent behavior rather than accumulating forever
    pub async fn decay_engagement(&self, decay_per_day: f64) -> Result<u64, sqlx::Error> {
        if decay_per_day <= 0.0 {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE subscribers SET
                engagement_score = GREATEST(engagement_score - $1, 0),
                updated_at = NOW()
            WHERE engagement_score > 0
            "#,
        )
        .bind(decay_per_day.ceil() as i32)
        .execute(&self.pool)
        .await?;

        let affected = result.rows_affected();
        if affected > 0 {
            info!(subscribers = affected, "Engagement scores decayed");
        }

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rate_basic() {
        assert_eq!(rate(25, 100), 25.0);
        assert_eq!(rate(1, 3), 100.0 / 3.0);
    }

    #[test]
    fn test_rate_zero_denominator() {
        assert_eq!(rate(5, 0), 0.0);
        assert_eq!(rate(0, 0), 0.0);
        assert_eq!(rate(5, -1), 0.0);
    }

    #[test]
    fn test_rate_full() {
        assert_eq!(rate(100, 100), 100.0);
    }
}
