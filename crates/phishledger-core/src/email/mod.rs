//! Submitted email records.
//!
//! Emails are stored after PII redaction. Each record carries a cached
//! [`Tally`](crate::vote::Tally) that the vote ledger keeps in step with the
//! vote rows.

mod model;
mod repository;

pub use model::{Email, EmailFilter, EmailId, EmailView, UserId};
pub use repository::EmailRepository;
pub(crate) use repository::{parse_timestamp, tally_from_counts, timestamp};
