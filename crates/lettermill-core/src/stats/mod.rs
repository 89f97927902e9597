//! Statistics - derived per-campaign rollups

pub mod aggregator;

pub use aggregator::StatisticsAggregator;
