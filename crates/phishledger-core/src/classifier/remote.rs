//! Language-model classifier with rate limiting and strict answer checking.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::openai::OpenAiChat;
use super::rate_limit::RateLimiter;
use crate::request::EmailText;
use crate::{Error, Result};

/// Instructions sent as the system message of every classification call.
pub const SYSTEM_PROMPT: &str = "You are a cybersecurity expert specializing in phishing email \
detection. Analyze the following email and determine if it is a phishing attempt. Consider \
sender domain legitimacy, urgency tactics, suspicious links, and grammatical errors. Respond \
with only 'yes' if it's phishing or 'no' if it's legitimate.";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Default output length cap, in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 10;

/// One chat-completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,
    /// System message.
    pub system: String,
    /// User message.
    pub user: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens in the answer.
    pub max_tokens: u32,
}

/// Errors from a chat backend. All are retryable.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport failure or timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the API.
    #[error("API returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Response did not contain an answer.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// A chat-completion transport.
pub trait ChatBackend: Send + Sync {
    /// Send one request and return the raw answer text.
    fn complete(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = std::result::Result<String, ChatError>> + Send;
}

/// Retry and pacing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    pub max_retries: u32,
    /// Pause before every call. Doubled after a transport error.
    pub inter_call_delay: Duration,
    /// How often to re-check the rate limiter while waiting.
    pub poll_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            inter_call_delay: Duration::from_secs(1),
            poll_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of a single call.
#[derive(Debug)]
pub enum Attempt {
    /// A valid answer: `true` for phishing.
    Verdict(bool),
    /// The model answered with something other than `yes` or `no`.
    Rejected(String),
    /// The call itself failed.
    Failed(ChatError),
}

/// Normalize a raw answer and accept only `yes` or `no`.
#[must_use]
pub fn parse_answer(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Format the user message for an email.
#[must_use]
pub fn user_message(text: &EmailText) -> String {
    format!(
        "Sender Domain: {}\nSubject: {}\nContent: {}",
        text.sender, text.subject, text.content
    )
}

/// Classifies emails by asking a chat model.
#[derive(Debug)]
pub struct RemoteClassifier<B = OpenAiChat> {
    backend: B,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl<B: ChatBackend> RemoteClassifier<B> {
    /// Create a classifier with the default model and sampling settings.
    pub fn new(backend: B, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            limiter,
            policy,
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the model and sampling settings.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        self.model = model.into();
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// The shared rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The retry policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Build the request sent for `text`.
    #[must_use]
    pub fn request_for(&self, text: &EmailText) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: user_message(text),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Classify using the configured number of attempts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassificationUnavailable`] if no attempt produced a
    /// valid answer.
    pub async fn classify(&self, text: &EmailText) -> Result<bool> {
        self.classify_with_retries(text, self.policy.max_retries)
            .await
    }

    /// Classify with an explicit attempt budget.
    ///
    /// Each attempt waits for rate-limiter admission, pauses for the
    /// inter-call delay, then calls the backend. Transport errors add a
    /// further pause of twice the inter-call delay before the next attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassificationUnavailable`] carrying the last error
    /// or response once `max_retries` attempts are spent.
    pub async fn classify_with_retries(&self, text: &EmailText, max_retries: u32) -> Result<bool> {
        let request = self.request_for(text);
        let mut last = String::from("no attempts were made");

        for attempt in 1..=max_retries {
            self.limiter.acquire(self.policy.poll_delay).await;
            tokio::time::sleep(self.policy.inter_call_delay).await;

            debug!("Classification attempt {attempt}/{max_retries} for {}", text.sender);
            match self.attempt(&request).await {
                Attempt::Verdict(is_phishing) => {
                    info!(
                        "Remote classifier judged email from {} as {}",
                        text.sender,
                        if is_phishing { "phishing" } else { "legitimate" }
                    );
                    return Ok(is_phishing);
                }
                Attempt::Rejected(raw) => {
                    warn!("Attempt {attempt}/{max_retries}: unexpected answer {raw:?}");
                    last = format!("unexpected answer {raw:?}");
                }
                Attempt::Failed(err) => {
                    warn!("Attempt {attempt}/{max_retries} failed: {err}");
                    last = err.to_string();
                    if attempt < max_retries {
                        tokio::time::sleep(self.policy.inter_call_delay * 2).await;
                    }
                }
            }
        }

        error!("Remote classifier gave up after {max_retries} attempt(s): {last}");
        Err(Error::ClassificationUnavailable(format!(
            "no valid answer after {max_retries} attempt(s): {last}"
        )))
    }

    /// Make one call and judge its answer.
    pub async fn attempt(&self, request: &ChatRequest) -> Attempt {
        match self.backend.complete(request).await {
            Ok(raw) => parse_answer(&raw).map_or(Attempt::Rejected(raw), Attempt::Verdict),
            Err(err) => Attempt::Failed(err),
        }
    }
}
