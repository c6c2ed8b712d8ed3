//! The engine service.

use tracing::{debug, info};

use crate::classifier::{ChatBackend, Classifier, OpenAiChat, Verdict};
use crate::config::Settings;
use crate::email::{Email, EmailFilter, EmailId, EmailRepository, EmailView, UserId};
use crate::redact::redact_submission;
use crate::request::{
    Acknowledgement, ClassificationRequest, SubmissionRequest, VoteRequest,
    validate_classification, validate_submission, validate_vote,
};
use crate::vote::{Tally, VoteLedger};
use crate::{Error, Result};

/// Submission, classification and voting over one database.
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
#[derive(Debug)]
pub struct PhishLedger<B = OpenAiChat> {
    emails: EmailRepository,
    ledger: VoteLedger,
    classifier: Option<Classifier<B>>,
}

impl PhishLedger<OpenAiChat> {
    /// Open the database and build the configured classifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, the database cannot be
    /// opened, or the classifier cannot be built.
    pub async fn open(settings: &Settings) -> Result<Self> {
        let engine = Self::open_store(settings).await?;
        let classifier = Classifier::from_settings(&settings.classifier).await?;
        info!("Using {} classifier", classifier.kind());
        Ok(engine.with_classifier(classifier))
    }

    /// Open the database only. [`Self::classify`] fails until a classifier is
    /// attached.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the database cannot be
    /// opened.
    pub async fn open_store(settings: &Settings) -> Result<Self> {
        settings.validate()?;

        let path = settings.database_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let path = path
            .to_str()
            .ok_or_else(|| Error::Config(format!("database path {} is not UTF-8", path.display())))?;

        let emails = EmailRepository::new(path).await?;
        info!("Opened database {path}");
        Ok(Self::new(emails))
    }
}

impl<B: ChatBackend> PhishLedger<B> {
    /// Create an engine over an existing repository, without a classifier.
    #[must_use]
    pub fn new(emails: EmailRepository) -> Self {
        let ledger = VoteLedger::new(&emails);
        Self {
            emails,
            ledger,
            classifier: None,
        }
    }

    /// Attach a classifier.
    #[must_use]
    pub fn with_classifier<C>(self, classifier: Classifier<C>) -> PhishLedger<C> {
        PhishLedger {
            emails: self.emails,
            ledger: self.ledger,
            classifier: Some(classifier),
        }
    }

    /// The email repository.
    #[must_use]
    pub const fn emails(&self) -> &EmailRepository {
        &self.emails
    }

    /// The vote ledger.
    #[must_use]
    pub const fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }

    /// Store a submitted email after redacting its subject and content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a required field is missing, or a
    /// database error.
    pub async fn submit(&self, user: UserId, request: &SubmissionRequest) -> Result<Email> {
        let email = redact_submission(validate_submission(request)?);
        let email = self.emails.create(user, &email).await?;
        info!("User {user} submitted email {} from {}", email.id, email.sender_domain);
        Ok(email)
    }

    /// Classify an email without storing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a required field is missing, or
    /// [`Error::ClassificationUnavailable`] if no verdict can be obtained.
    pub async fn classify(&self, request: &ClassificationRequest) -> Result<Verdict> {
        let text = validate_classification(request)?;
        let classifier = self.classifier.as_ref().ok_or_else(|| {
            Error::ClassificationUnavailable("no classifier is configured".into())
        })?;

        let verdict = classifier.classify(&text).await?;
        debug!(
            "Classified email from {} as {} ({})",
            text.sender,
            verdict.phishy(),
            verdict.source
        );
        Ok(verdict)
    }

    /// Cast or switch a vote.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`], [`Error::EmailNotFound`],
    /// [`Error::DuplicateVote`] or a database error.
    pub async fn vote(&self, user: UserId, request: &VoteRequest) -> Result<Tally> {
        let ballot = validate_vote(request)?;
        self.ledger
            .cast_vote(user, ballot.email_id, ballot.is_phishing)
            .await
    }

    /// Delete an email the user submitted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotFound`], [`Error::Forbidden`] or a database
    /// error.
    pub async fn delete(&self, user: UserId, email_id: EmailId) -> Result<Acknowledgement> {
        self.ledger.delete_email(user, email_id).await?;
        Ok(Acknowledgement::new(format!("Email {email_id} deleted")))
    }

    /// List emails for a viewer, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub async fn list(&self, viewer: UserId, filter: &EmailFilter) -> Result<Vec<EmailView>> {
        self.emails.list(viewer, filter).await
    }

    /// Recompute an email's tally from its votes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmailNotFound`] or a database error.
    pub async fn reconcile(&self, email_id: EmailId) -> Result<Tally> {
        self.ledger.reconcile(email_id).await
    }
}
