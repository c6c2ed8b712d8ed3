//! Vote data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::email::{EmailId, UserId};

/// A user's verdict on an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    /// The email is a phishing attempt.
    Phishing,
    /// The email is legitimate.
    Legitimate,
}

impl VoteChoice {
    /// Convert from the `is_phishing` flag used on the wire.
    #[must_use]
    pub const fn from_is_phishing(is_phishing: bool) -> Self {
        if is_phishing {
            Self::Phishing
        } else {
            Self::Legitimate
        }
    }

    /// Convert to the `is_phishing` flag used on the wire.
    #[must_use]
    pub const fn is_phishing(self) -> bool {
        matches!(self, Self::Phishing)
    }

    /// String representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Phishing => "phishing",
            Self::Legitimate => "legitimate",
        }
    }
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vote counts cached on an email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// Number of users who voted phishing.
    pub votes_phishing: u32,
    /// Number of users who voted legitimate.
    pub votes_legitimate: u32,
}

impl Tally {
    /// Create a tally with the given counts.
    #[must_use]
    pub const fn new(votes_phishing: u32, votes_legitimate: u32) -> Self {
        Self {
            votes_phishing,
            votes_legitimate,
        }
    }

    /// Total number of votes.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.votes_phishing + self.votes_legitimate
    }
}

/// A persisted vote. At most one exists per (user, email) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Voting user.
    pub user: UserId,
    /// Email voted on.
    pub email_id: EmailId,
    /// Current verdict.
    pub choice: VoteChoice,
    /// When the vote was first cast.
    pub created_at: DateTime<Utc>,
    /// When the verdict last changed.
    pub updated_at: DateTime<Utc>,
}

/// How a ballot changes the vote set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChange {
    /// First vote by this user on this email.
    Cast(VoteChoice),
    /// The user's existing vote flips to the other verdict.
    Switch {
        /// Previous verdict.
        from: VoteChoice,
        /// New verdict.
        to: VoteChoice,
    },
}

impl VoteChange {
    /// Decide how a ballot applies given the user's existing vote.
    ///
    /// Returns `None` when the ballot repeats the existing verdict.
    #[must_use]
    pub fn plan(existing: Option<VoteChoice>, ballot: VoteChoice) -> Option<Self> {
        match existing {
            None => Some(Self::Cast(ballot)),
            Some(from) if from == ballot => None,
            Some(from) => Some(Self::Switch { from, to: ballot }),
        }
    }

    /// Signed adjustments to `(votes_phishing, votes_legitimate)`.
    #[must_use]
    pub const fn deltas(self) -> (i64, i64) {
        const fn unit(choice: VoteChoice) -> (i64, i64) {
            match choice {
                VoteChoice::Phishing => (1, 0),
                VoteChoice::Legitimate => (0, 1),
            }
        }

        match self {
            Self::Cast(choice) => unit(choice),
            Self::Switch { from, to } => {
                let (add_p, add_l) = unit(to);
                let (sub_p, sub_l) = unit(from);
                (add_p - sub_p, add_l - sub_l)
            }
        }
    }
}
