//! Lettermill Core - Campaign delivery pipeline
//!
//! This crate implements the delivery pipeline: recipient resolution,
//! the campaign state machine, dispatch workers draining the send queue,
//! provider event recording, and derived statistics.

pub mod campaign;
pub mod delivery;
pub mod events;
pub mod resolver;
pub mod scheduler;
pub mod stats;

pub use campaign::{CampaignError, CampaignManager};
pub use delivery::{
    BackoffPolicy, DispatchWorker, OutgoingEmail, SmtpMailer, TemplateRenderer, Transport,
    TransportError, TransportReceipt,
};
pub use events::{EventRecorder, RecordOutcome, WebhookEvent};
pub use resolver::{RecipientResolver, ResolveError};
pub use scheduler::PipelineScheduler;
pub use stats::StatisticsAggregator;
