//! Repository layer for data access

pub mod campaigns;
pub mod delivery_events;
pub mod queue_items;
pub mod segments;
pub mod statistics;
pub mod subscribers;

pub use campaigns::CampaignRepository;
pub use delivery_events::{CampaignEventCounts, DeliveryEventRepository};
pub use queue_items::{NewQueueItem, QueueItemRepository, QueueStatusCounts};
pub use segments::SegmentRepository;
pub use statistics::StatisticsRepository;
pub use subscribers::SubscriberRepository;
