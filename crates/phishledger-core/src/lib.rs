//! # phishledger-core
//!
//! Classification and community-consensus engine for reported phishing
//! emails.
//!
//! This crate provides:
//! - PII redaction of submissions before storage
//! - A classifier facade over a local TF-IDF model or a rate-limited chat
//!   model with strict answer checking and retries
//! - A vote ledger enforcing one vote per user per email, with vote
//!   switching and tallies kept consistent with the vote rows
//! - Email storage (`SQLite`)
//! - Layered settings and keyring-backed API credentials

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod classifier;
pub mod config;
pub mod credentials;
pub mod email;
mod error;
pub mod redact;
pub mod request;
pub mod service;
pub mod vote;

pub use classifier::{
    ChatBackend, ChatError, Classifier, ClassifierKind, LocalClassifier, OpenAiChat,
    RateLimiter, RemoteClassifier, RetryPolicy, Verdict,
};
pub use config::{Backend, Settings};
pub use credentials::{CredentialError, CredentialResult};
pub use email::{Email, EmailFilter, EmailId, EmailRepository, EmailView, UserId};
pub use error::{Error, Result};
pub use redact::{redact, redact_submission};
pub use request::{
    Acknowledgement, Ballot, ClassificationRequest, ClassificationResponse, EmailText, NewEmail,
    SubmissionRequest, ValidationError, ValidationResult, VoteRequest,
};
pub use service::PhishLedger;
pub use vote::{Tally, Vote, VoteChange, VoteChoice, VoteLedger};
