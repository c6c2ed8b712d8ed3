//! Request-level operations.
//!
//! [`PhishLedger`] is the object a transport layer holds. It validates
//! requests, redacts submissions before they reach storage, and routes
//! ballots through the vote ledger.

mod engine;

pub use engine::PhishLedger;
