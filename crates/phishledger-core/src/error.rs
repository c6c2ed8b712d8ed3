//! Error types for the core library.

use thiserror::Error;

use crate::email::EmailId;
use crate::request::ValidationError;

/// Message returned to callers for failures whose detail must not leak.
const GENERIC_FAILURE: &str = "An unexpected error occurred";

/// Message returned to callers when no classifier verdict is available.
const UNAVAILABLE: &str = "Classification is temporarily unavailable";

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required request field is missing or empty.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The referenced email does not exist.
    #[error("Email not found: {0}")]
    EmailNotFound(EmailId),

    /// The user already cast this exact verdict for this email.
    #[error("You have already voted this way for email {email_id}")]
    DuplicateVote {
        /// Email the vote was cast on.
        email_id: EmailId,
        /// The verdict that was repeated.
        is_phishing: bool,
    },

    /// The requesting identity does not own the email.
    #[error("You can only delete emails you submitted (email {0})")]
    Forbidden(EmailId),

    /// No classifier verdict could be obtained.
    #[error("Classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Stored timestamp could not be parsed.
    #[error("Timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local model artifact is missing or inconsistent.
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential storage error.
    #[error("Credential error: {0}")]
    Credential(#[from] crate::credentials::CredentialError),
}

impl Error {
    /// Build an [`Error::InvalidInput`] from a list of validation failures.
    #[must_use]
    pub fn invalid_input(errors: &[ValidationError]) -> Self {
        let message = errors
            .iter()
            .map(ValidationError::message)
            .collect::<Vec<_>>()
            .join("; ");
        Self::InvalidInput(message)
    }

    /// HTTP-equivalent status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::DuplicateVote { .. } => 400,
            Self::Forbidden(_) => 403,
            Self::EmailNotFound(_) => 404,
            Self::ClassificationUnavailable(_) => 503,
            _ => 500,
        }
    }

    /// Whether the caller is at fault (4xx-equivalent).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self.status_code(), 400..=499)
    }

    /// Message safe to show to the caller.
    ///
    /// Client errors are described verbatim. An unavailable classifier gets
    /// a fixed reason, since its detail may quote upstream responses.
    /// Everything else collapses into a generic message.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::ClassificationUnavailable(_) => UNAVAILABLE.to_string(),
            _ if self.is_client_error() => self.to_string(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

impl From<Vec<ValidationError>> for Error {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::invalid_input(&errors)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
