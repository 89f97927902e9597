//! Error types for Lettermill

use thiserror::Error;

/// Main error type for Lettermill
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Campaign resolved to zero recipients")]
    NoRecipients,

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Signature verification failed")]
    InvalidSignature,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Lettermill
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Transport(_) => 502,
            Error::Template(_) => 422,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::InvalidTransition(_) => 409,
            Error::NoRecipients => 409,
            Error::Webhook(_) => 400,
            Error::InvalidSignature => 401,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Transport(_) => "TRANSPORT_ERROR",
            Error::Template(_) => "TEMPLATE_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidTransition(_) => "INVALID_TRANSITION",
            Error::NoRecipients => "NO_RECIPIENTS",
            Error::Webhook(_) => "WEBHOOK_ERROR",
            Error::InvalidSignature => "UNAUTHORIZED",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
