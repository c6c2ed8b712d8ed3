//! Request and response shapes exchanged with the transport layer.
//!
//! Required fields are `Option`s so a missing field is reported by
//! validation as [`crate::Error::InvalidInput`] instead of failing to decode.

mod validation;

use serde::{Deserialize, Serialize};

pub use validation::{
    ValidationError, ValidationResult, validate_classification, validate_submission,
    validate_vote,
};

use crate::email::EmailId;

/// Submission of a suspected phishing email.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubmissionRequest {
    /// Domain of the sender.
    pub sender_domain: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Body text.
    pub content: Option<String>,
    /// Date the email was received, stored verbatim.
    pub date: Option<String>,
    /// URLs extracted by the client.
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Request to classify an email without storing it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassificationRequest {
    /// Domain of the sender.
    pub sender_domain: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Body text.
    pub content: Option<String>,
}

/// Request to cast or switch a vote.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct VoteRequest {
    /// Email being voted on.
    pub email_id: Option<EmailId>,
    /// `true` for phishing, `false` for legitimate.
    pub is_phishing: Option<bool>,
}

/// A validated submission, ready for redaction and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmail {
    /// Domain of the sender.
    pub sender_domain: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub content: String,
    /// Externally supplied date string.
    pub submission_date: String,
    /// URLs in the order the client extracted them.
    pub extracted_urls: Vec<String>,
}

/// A validated classification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailText {
    /// Domain of the sender.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub content: String,
}

/// A validated vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ballot {
    /// Email being voted on.
    pub email_id: EmailId,
    /// `true` for phishing, `false` for legitimate.
    pub is_phishing: bool,
}

/// Response to a classification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    /// `"yes"` for phishing, `"no"` for legitimate.
    pub phishy: String,
}

/// Acknowledgement returned by operations without a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// Human-readable confirmation.
    pub message: String,
}

impl Acknowledgement {
    /// Create an acknowledgement with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_urls_default_to_empty() {
        let request: SubmissionRequest = serde_json::from_str(
            r#"{"sender_domain":"test.com","subject":"Hi","content":"x","date":"2024-01-01"}"#,
        )
        .unwrap();
        assert!(request.urls.is_empty());
    }

    #[test]
    fn test_vote_request_missing_fields_decode() {
        let request: VoteRequest = serde_json::from_str(r#"{"email_id": 3}"#).unwrap();
        assert_eq!(request.email_id, Some(EmailId::new(3)));
        assert_eq!(request.is_phishing, None);
    }
}
