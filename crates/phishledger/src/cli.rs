//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use phishledger_core::{
    ClassificationRequest, EmailFilter, EmailId, SubmissionRequest, UserId, VoteRequest,
};

/// Classify reported phishing emails and record community votes.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands. Each maps to one engine request.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a suspected phishing email (subject and content are redacted)
    Submit {
        /// Submitting user
        #[arg(long)]
        user: i64,
        #[command(flatten)]
        email: EmailArgs,
        /// Date the email was received, stored verbatim
        #[arg(long)]
        date: Option<String>,
        /// URL found in the email (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,
    },
    /// Ask the configured classifier whether an email is phishing
    Classify {
        #[command(flatten)]
        email: EmailArgs,
    },
    /// Cast or switch a vote on a stored email
    Vote {
        /// Voting user
        #[arg(long)]
        user: i64,
        /// Email to vote on
        #[arg(long)]
        email_id: Option<i64>,
        /// `true` for phishing, `false` for legitimate
        #[arg(long)]
        is_phishing: Option<bool>,
    },
    /// Delete an email you submitted, with its votes
    Delete {
        /// Requesting user
        #[arg(long)]
        user: i64,
        /// Email to delete
        #[arg(long)]
        email_id: i64,
    },
    /// List stored emails, newest first
    List {
        /// Viewing user
        #[arg(long)]
        user: i64,
        /// Only emails you submitted
        #[arg(long)]
        mine: bool,
        /// Only emails you have not voted on
        #[arg(long)]
        unvoted: bool,
        /// Only emails from this sender domain
        #[arg(long)]
        domain: Option<String>,
        /// Only emails with at least this many phishing votes
        #[arg(long)]
        min_phishing_votes: Option<u32>,
    },
    /// Recompute an email's tally from its votes
    Reconcile {
        /// Email to repair
        #[arg(long)]
        email_id: i64,
    },
    /// Print text with personal data replaced by placeholders
    Redact {
        /// Text to redact
        text: String,
    },
    /// Write the effective settings to the settings file
    InitConfig {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
    /// Store the remote classifier API key in the system keyring
    SetApiKey {
        /// Keyring profile (defaults to the configured profile)
        #[arg(long)]
        profile: Option<String>,
        /// Remove the stored key instead
        #[arg(long, conflicts_with = "key")]
        clear: bool,
        /// API key
        #[arg(required_unless_present = "clear")]
        key: Option<String>,
    },
}

/// Fields shared by submission and classification.
#[derive(Debug, Clone, Args)]
pub struct EmailArgs {
    /// Sender domain
    #[arg(long)]
    pub sender_domain: Option<String>,
    /// Subject line
    #[arg(long)]
    pub subject: Option<String>,
    /// Body text
    #[arg(long)]
    pub content: Option<String>,
}

impl EmailArgs {
    /// Build a submission request.
    pub fn into_submission(self, date: Option<String>, urls: Vec<String>) -> SubmissionRequest {
        SubmissionRequest {
            sender_domain: self.sender_domain,
            subject: self.subject,
            content: self.content,
            date,
            urls,
        }
    }
}

impl From<EmailArgs> for ClassificationRequest {
    fn from(args: EmailArgs) -> Self {
        Self {
            sender_domain: args.sender_domain,
            subject: args.subject,
            content: args.content,
        }
    }
}

/// Build a vote request.
pub fn vote_request(email_id: Option<i64>, is_phishing: Option<bool>) -> VoteRequest {
    VoteRequest {
        email_id: email_id.map(EmailId::new),
        is_phishing,
    }
}

/// Build a list filter.
pub fn list_filter(
    mine: bool,
    unvoted: bool,
    domain: Option<String>,
    min_phishing_votes: Option<u32>,
) -> EmailFilter {
    EmailFilter {
        mine_only: mine,
        unvoted_only: unvoted,
        sender_domain: domain,
        min_phishing_votes,
    }
}

/// Wrap a raw user id.
pub const fn user(id: i64) -> UserId {
    UserId::new(id)
}
