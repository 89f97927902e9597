//! Event recording - provider webhook ingestion

pub mod recorder;

pub use recorder::{EventRecorder, RecordOutcome, WebhookEvent};
