//! Campaign lifecycle management

pub mod manager;

pub use manager::{CampaignError, CampaignManager};
