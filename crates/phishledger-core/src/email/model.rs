//! Email record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vote::{Tally, VoteChoice};

/// Unique identifier for a submitted email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailId(pub i64);

impl EmailId {
    /// Create a new email ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of an authenticated user, supplied by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A submitted email as stored.
///
/// `tally` is a cached projection of the vote set and is only ever written
/// by the vote ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Unique identifier.
    pub id: EmailId,
    /// Domain of the sender.
    pub sender_domain: String,
    /// Subject line, PII-redacted.
    pub subject: String,
    /// Body text, PII-redacted.
    pub content: String,
    /// Externally supplied date string, stored verbatim.
    #[serde(rename = "date")]
    pub submission_date: String,
    /// URLs extracted by the submitter.
    #[serde(rename = "urls")]
    pub extracted_urls: Vec<String>,
    /// Community vote counts.
    #[serde(flatten)]
    pub tally: Tally,
    /// Submitting user.
    pub owner: UserId,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

impl Email {
    /// Check whether `user` submitted this email.
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}

/// An email annotated for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailView {
    /// The stored record.
    #[serde(flatten)]
    pub email: Email,
    /// Whether the viewer has voted on this email.
    pub user_vote: bool,
    /// The viewer's current vote, if any.
    pub user_vote_type: Option<VoteChoice>,
    /// Whether the viewer submitted this email.
    pub is_mine: bool,
}

impl EmailView {
    /// Annotate `email` for `viewer`.
    #[must_use]
    pub fn new(email: Email, viewer: UserId, vote: Option<VoteChoice>) -> Self {
        let is_mine = email.is_owned_by(viewer);
        Self {
            email,
            user_vote: vote.is_some(),
            user_vote_type: vote,
            is_mine,
        }
    }
}

/// Filters for listing emails. All set filters must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EmailFilter {
    /// Only emails the viewer submitted.
    #[serde(default, rename = "show_mine")]
    pub mine_only: bool,
    /// Only emails the viewer has not voted on.
    #[serde(default, rename = "show_unvoted")]
    pub unvoted_only: bool,
    /// Only emails from this sender domain (case-insensitive).
    #[serde(default, rename = "domain")]
    pub sender_domain: Option<String>,
    /// Only emails with at least this many phishing votes.
    #[serde(default)]
    pub min_phishing_votes: Option<u32>,
}
