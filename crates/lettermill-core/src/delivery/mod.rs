//! Delivery - dispatch workers draining the send queue over SMTP

pub mod backoff;
pub mod template;
pub mod transport;
pub mod worker;

pub use backoff::BackoffPolicy;
pub use template::TemplateRenderer;
pub use transport::{OutgoingEmail, SmtpMailer, Transport, TransportError, TransportReceipt};
pub use worker::DispatchWorker;
