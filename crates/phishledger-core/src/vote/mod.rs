//! Community votes on submitted emails.
//!
//! Each user holds at most one vote per email. Casting the opposite verdict
//! switches the existing vote; repeating the same verdict is rejected. The
//! per-email [`Tally`] is a cached projection of the vote rows and is
//! updated in the same transaction as the vote itself.
//!
//! # Example
//!
//! ```ignore
//! use phishledger_core::{UserId, VoteLedger};
//!
//! let ledger = VoteLedger::new(&emails);
//! let tally = ledger.cast_vote(UserId::new(1), email_id, true).await?;
//! assert_eq!(tally.votes_phishing, 1);
//! ```

mod ledger;
mod model;

pub use ledger::VoteLedger;
pub use model::{Tally, Vote, VoteChange, VoteChoice};
