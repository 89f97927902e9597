//! Pipeline scheduler
//!
//! Single background task driving the time-based parts of the pipeline:
//! starting scheduled campaigns whose send time arrived, reclaiming
//! expired worker leases, completing drained campaigns, refreshing
//! statistics, and applying daily engagement decay. Dispatch itself runs
//! in the worker pool; the scheduler only moves state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lettermill_storage::db::DatabasePool;
use lettermill_storage::repository::QueueItemRepository;
use tracing::{debug, error, info, warn};

use crate::campaign::{CampaignError, CampaignManager};
use crate::stats::StatisticsAggregator;

/// Pipeline scheduler
pub struct PipelineScheduler {
    manager: Arc<CampaignManager>,
    aggregator: StatisticsAggregator,
    queue_repo: QueueItemRepository,
    poll_interval: Duration,
    lease_secs: i64,
    stats_refresh_interval: Duration,
    engagement_decay_per_day: f64,
}

impl PipelineScheduler {
    pub fn new(
        db_pool: &DatabasePool,
        manager: Arc<CampaignManager>,
        aggregator: StatisticsAggregator,
        poll_interval: Duration,
        lease_secs: i64,
        stats_refresh_interval: Duration,
        engagement_decay_per_day: f64,
    ) -> Self {
        Self {
            manager,
            aggregator,
            queue_repo: QueueItemRepository::new(db_pool.pool().clone()),
            poll_interval,
            lease_secs,
            stats_refresh_interval,
            engagement_decay_per_day,
        }
    }

    /// Run the scheduler loop until the task is aborted
    pub async fn run(self) {
        info!("Pipeline scheduler started");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut last_stats_refresh = Utc::now();
        let mut last_decay = Utc::now();

        loop {
            interval.tick().await;

            if let Err(e) = self.start_due_campaigns().await {
                error!("Failed to start due campaigns: {}", e);
            }

            if let Err(e) = self.reclaim_leases().await {
                error!("Failed to reclaim expired leases: {}", e);
            }

            if let Err(e) = self.complete_drained_campaigns().await {
                error!("Failed to complete drained campaigns: {}", e);
            }

            let now = Utc::now();

            if elapsed_at_least(last_stats_refresh, now, self.stats_refresh_interval) {
                last_stats_refresh = now;
                if let Err(e) = self.refresh_statistics().await {
                    error!("Failed to refresh statistics: {}", e);
                }
            }

            if elapsed_at_least(last_decay, now, Duration::from_secs(24 * 3600)) {
                last_decay = now;
                match self.aggregator.decay_engagement(self.engagement_decay_per_day).await {
                    Ok(n) => debug!(subscribers = n, "Daily engagement decay applied"),
                    Err(e) => error!("Failed to apply engagement decay: {}", e),
                }
            }
        }
    }

    /// Start every scheduled campaign whose send time has arrived.
    /// Per-campaign failures are logged and skipped so one bad campaign
    /// never blocks the rest of the batch.
    async fn start_due_campaigns(&self) -> Result<(), CampaignError> {
        let due = self.manager.get_scheduled_ready().await?;

        for campaign in due {
            match self.manager.start(campaign.id).await {
                Ok(started) => {
                    info!(
                        campaign_id = %started.id,
                        name = %started.name,
                        recipients = started.total_recipients,
                        "Scheduled campaign started"
                    );
                }
                Err(CampaignError::NoRecipients | CampaignError::EmptyTargeting) => {
                    // Already marked failed by the manager
                    warn!(campaign_id = %campaign.id, "Campaign had no recipients, marked failed");
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, "Failed to start campaign: {}", e);
                }
            }
        }

        Ok(())
    }

    async fn reclaim_leases(&self) -> Result<(), sqlx::Error> {
        let reclaimed = self.queue_repo.release_expired_leases(self.lease_secs).await?;
        if reclaimed > 0 {
            warn!(items = reclaimed, "Reclaimed expired worker leases");
        }
        Ok(())
    }

    async fn complete_drained_campaigns(&self) -> Result<(), CampaignError> {
        for campaign_id in self.manager.sending_campaign_ids().await? {
            if self.manager.check_completion(campaign_id).await? {
                // Final rollup once the campaign settles
                if let Err(e) = self.aggregator.recompute(campaign_id).await {
                    error!(campaign_id = %campaign_id, "Failed to compute final statistics: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Refresh rollups for in-flight campaigns so dashboards track live
    /// progress without querying the source tables
    async fn refresh_statistics(&self) -> Result<(), CampaignError> {
        for campaign_id in self.manager.sending_campaign_ids().await? {
            if let Err(e) = self.aggregator.recompute(campaign_id).await {
                error!(campaign_id = %campaign_id, "Failed to refresh statistics: {}", e);
            }
        }
        Ok(())
    }
}

fn elapsed_at_least(since: DateTime<Utc>, now: DateTime<Utc>, min: Duration) -> bool {
    (now - since).num_seconds() >= min.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_elapsed_at_least() {
        let now = Utc::now();
        assert!(elapsed_at_least(
            now - ChronoDuration::seconds(61),
            now,
            Duration::from_secs(60)
        ));
        assert!(!elapsed_at_least(
            now - ChronoDuration::seconds(59),
            now,
            Duration::from_secs(60)
        ));
    }
}
