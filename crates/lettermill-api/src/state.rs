//! Shared API state

use std::sync::Arc;

use lettermill_core::{CampaignManager, EventRecorder, StatisticsAggregator, TemplateRenderer};
use lettermill_storage::db::DatabasePool;

/// Application state shared across handlers
pub struct AppState {
    pub db_pool: DatabasePool,
    pub manager: Arc<CampaignManager>,
    pub recorder: EventRecorder,
    pub aggregator: StatisticsAggregator,
    pub renderer: Arc<TemplateRenderer>,
    /// Shared secret for webhook signature verification
    pub webhook_secret: String,
}
