//! Campaign statistics repository
//!
//! The rollup is overwrite-in-place: concurrent recomputes race benignly
//! (last write wins) because every writer derives the full row from the
//! same source tables.

use lettermill_common::types::CampaignId;
use sqlx::PgPool;

use crate::models::CampaignStatistics;

/// Campaign statistics repository
#[derive(Clone)]
pub struct StatisticsRepository {
    pool: PgPool,
}

impl StatisticsRepository {
    /// Create a new statistics repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the rollup for a campaign
    pub async fn get(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Option<CampaignStatistics>, sqlx::Error> {
        sqlx::query_as::<_, CampaignStatistics>(
            "SELECT * FROM campaign_statistics WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Overwrite the rollup for a campaign
    pub async fn upsert(&self, stats: &CampaignStatistics) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO campaign_statistics (
                campaign_id, total_recipients, sent, delivered, bounced, failed,
                total_opens, unique_opens, total_clicks, unique_clicks, unsubscribes,
                open_rate, click_rate, bounce_rate, unsubscribe_rate, computed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (campaign_id) DO UPDATE SET
                total_recipients = EXCLUDED.total_recipients,
                sent = EXCLUDED.sent,
                delivered = EXCLUDED.delivered,
                bounced = EXCLUDED.bounced,
                failed = EXCLUDED.failed,
                total_opens = EXCLUDED.total_opens,
                unique_opens = EXCLUDED.unique_opens,
                total_clicks = EXCLUDED.total_clicks,
                unique_clicks = EXCLUDED.unique_clicks,
                unsubscribes = EXCLUDED.unsubscribes,
                open_rate = EXCLUDED.open_rate,
                click_rate = EXCLUDED.click_rate,
                bounce_rate = EXCLUDED.bounce_rate,
                unsubscribe_rate = EXCLUDED.unsubscribe_rate,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(stats.campaign_id)
        .bind(stats.total_recipients)
        .bind(stats.sent)
        .bind(stats.delivered)
        .bind(stats.bounced)
        .bind(stats.failed)
        .bind(stats.total_opens)
        .bind(stats.unique_opens)
        .bind(stats.total_clicks)
        .bind(stats.unique_clicks)
        .bind(stats.unsubscribes)
        .bind(stats.open_rate)
        .bind(stats.click_rate)
        .bind(stats.bounce_rate)
        .bind(stats.unsubscribe_rate)
        .bind(stats.computed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
