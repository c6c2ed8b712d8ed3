//! Request validation.

use super::{
    Ballot, ClassificationRequest, EmailText, NewEmail, SubmissionRequest, VoteRequest,
};

/// Validation error for an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    /// Sender domain is missing or blank.
    MissingSenderDomain,
    /// Subject is missing or blank.
    MissingSubject,
    /// Content is missing or blank.
    MissingContent,
    /// Date is missing or blank.
    MissingDate,
    /// Email id is missing.
    MissingEmailId,
    /// Verdict is missing.
    MissingVerdict,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::MissingSenderDomain => "sender_domain is required",
            Self::MissingSubject => "subject is required",
            Self::MissingContent => "content is required",
            Self::MissingDate => "date is required",
            Self::MissingEmailId => "email_id is required",
            Self::MissingVerdict => "is_phishing is required",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingSenderDomain => "sender_domain",
            Self::MissingSubject => "subject",
            Self::MissingContent => "content",
            Self::MissingDate => "date",
            Self::MissingEmailId => "email_id",
            Self::MissingVerdict => "is_phishing",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a request.
pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

/// Take a required text field, recording an error when it is missing or blank.
fn required(
    value: Option<&String>,
    error: ValidationError,
    errors: &mut Vec<ValidationError>,
) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.clone(),
        _ => {
            errors.push(error);
            String::new()
        }
    }
}

fn finish<T>(value: T, errors: Vec<ValidationError>) -> ValidationResult<T> {
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}

/// Validate an email submission.
///
/// # Errors
///
/// Returns every missing required field.
pub fn validate_submission(request: &SubmissionRequest) -> ValidationResult<NewEmail> {
    let mut errors = Vec::new();

    let email = NewEmail {
        sender_domain: required(
            request.sender_domain.as_ref(),
            ValidationError::MissingSenderDomain,
            &mut errors,
        ),
        subject: required(
            request.subject.as_ref(),
            ValidationError::MissingSubject,
            &mut errors,
        ),
        content: required(
            request.content.as_ref(),
            ValidationError::MissingContent,
            &mut errors,
        ),
        submission_date: required(
            request.date.as_ref(),
            ValidationError::MissingDate,
            &mut errors,
        ),
        extracted_urls: request.urls.clone(),
    };

    finish(email, errors)
}

/// Validate a classification request.
///
/// # Errors
///
/// Returns every missing required field.
pub fn validate_classification(request: &ClassificationRequest) -> ValidationResult<EmailText> {
    let mut errors = Vec::new();

    let text = EmailText {
        sender: required(
            request.sender_domain.as_ref(),
            ValidationError::MissingSenderDomain,
            &mut errors,
        ),
        subject: required(
            request.subject.as_ref(),
            ValidationError::MissingSubject,
            &mut errors,
        ),
        content: required(
            request.content.as_ref(),
            ValidationError::MissingContent,
            &mut errors,
        ),
    };

    finish(text, errors)
}

/// Validate a vote request.
///
/// # Errors
///
/// Returns every missing required field.
pub fn validate_vote(request: &VoteRequest) -> ValidationResult<Ballot> {
    match (request.email_id, request.is_phishing) {
        (Some(email_id), Some(is_phishing)) => Ok(Ballot {
            email_id,
            is_phishing,
        }),
        (email_id, is_phishing) => {
            let mut errors = Vec::new();
            if email_id.is_none() {
                errors.push(ValidationError::MissingEmailId);
            }
            if is_phishing.is_none() {
                errors.push(ValidationError::MissingVerdict);
            }
            Err(errors)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::email::EmailId;

    fn submission() -> SubmissionRequest {
        SubmissionRequest {
            sender_domain: Some("test.com".into()),
            subject: Some("Hi".into()),
            content: Some("Call me".into()),
            date: Some("2024-01-01".into()),
            urls: vec!["test.com (1 link)".into()],
        }
    }

    #[test]
    fn test_valid_submission() {
        let email = validate_submission(&submission()).unwrap();
        assert_eq!(email.sender_domain, "test.com");
        assert_eq!(email.submission_date, "2024-01-01");
        assert_eq!(email.extracted_urls, vec!["test.com (1 link)".to_string()]);
    }

    #[test]
    fn test_submission_missing_fields() {
        let request = SubmissionRequest {
            sender_domain: None,
            date: Some("   ".into()),
            ..submission()
        };

        let errors = validate_submission(&request).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingSenderDomain,
                ValidationError::MissingDate
            ]
        );
    }

    #[test]
    fn test_classification_requires_all_fields() {
        let errors = validate_classification(&ClassificationRequest::default()).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].field(), "sender_domain");
    }

    #[test]
    fn test_vote_validation() {
        let ballot = validate_vote(&VoteRequest {
            email_id: Some(EmailId::new(4)),
            is_phishing: Some(false),
        })
        .unwrap();
        assert_eq!(ballot.email_id, EmailId::new(4));
        assert!(!ballot.is_phishing);

        let errors = validate_vote(&VoteRequest::default()).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::MissingEmailId,
                ValidationError::MissingVerdict
            ]
        );
    }
}
