//! PII redaction applied to submitted emails before they are stored.
//!
//! Each category is a single non-overlapping pass over the text. Card
//! numbers run before phone numbers and SSNs so a 16-digit sequence is
//! replaced whole instead of being split by the shorter patterns.

use std::sync::LazyLock;

use regex::Regex;

use crate::request::NewEmail;

/// Placeholder for email addresses.
pub const EMAIL_PLACEHOLDER: &str = "[REDACTED_EMAIL]";
/// Placeholder for phone numbers.
pub const PHONE_PLACEHOLDER: &str = "[REDACTED_PHONE]";
/// Placeholder for payment card numbers.
pub const CARD_PLACEHOLDER: &str = "[REDACTED_CC]";
/// Placeholder for social security numbers.
pub const SSN_PLACEHOLDER: &str = "[REDACTED_SSN]";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
});
static CARD: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b\d{4}[-.]?\d{4}[-.]?\d{4}[-.]?\d{4}\b"));
static PHONE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b"));
static SSN: LazyLock<Regex> = LazyLock::new(|| compile(r"\b\d{3}[-.]?\d{2}[-.]?\d{4}\b"));

#[allow(clippy::expect_used)] // Patterns are literals covered by tests.
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("redaction pattern must compile")
}

/// Replace personal data in `text` with fixed placeholders.
///
/// Total and deterministic. Running it twice gives the same output as
/// running it once.
#[must_use]
pub fn redact(text: &str) -> String {
    let passes: [(&Regex, &str); 4] = [
        (&EMAIL, EMAIL_PLACEHOLDER),
        (&CARD, CARD_PLACEHOLDER),
        (&PHONE, PHONE_PLACEHOLDER),
        (&SSN, SSN_PLACEHOLDER),
    ];

    passes
        .into_iter()
        .fold(text.to_string(), |acc, (pattern, placeholder)| {
            pattern.replace_all(&acc, placeholder).into_owned()
        })
}

/// Redact the free-text fields of a submission.
///
/// Only subject and content are touched; sender, date and URLs are kept
/// verbatim.
#[must_use]
pub fn redact_submission(email: NewEmail) -> NewEmail {
    NewEmail {
        subject: redact(&email.subject),
        content: redact(&email.content),
        ..email
    }
}
