//! Phishing classifiers.
//!
//! [`Classifier`] is the facade callers hold. It wraps one of two backends,
//! chosen from settings at startup:
//!
//! - [`LocalClassifier`]: a pre-trained TF-IDF + linear model loaded from disk.
//! - [`RemoteClassifier`]: a chat model behind a [`RateLimiter`], with strict
//!   `yes`/`no` answer checking and bounded retries.
//!
//! # Example
//!
//! ```ignore
//! use phishledger_core::{Classifier, EmailText, config::ClassifierSettings};
//!
//! let classifier = Classifier::from_settings(&ClassifierSettings::default()).await?;
//! let verdict = classifier
//!     .classify(&EmailText {
//!         sender: "paypa1.com".into(),
//!         subject: "Account locked".into(),
//!         content: "Verify your password within 24 hours".into(),
//!     })
//!     .await?;
//! println!("phishy: {}", verdict.phishy());
//! ```

mod local;
pub mod openai;
mod rate_limit;
mod remote;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[cfg(test)]
pub(crate) use local::tests as local_tests;
pub use local::{LinearModel, LocalClassifier, ModelArtifact, Norm, TfidfVectorizer, normalize};
pub use openai::OpenAiChat;
pub use rate_limit::RateLimiter;
pub use remote::{
    Attempt, ChatBackend, ChatError, ChatRequest, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE, RemoteClassifier, RetryPolicy, SYSTEM_PROMPT, parse_answer,
    user_message,
};

use crate::config::{Backend, ClassifierSettings};
use crate::request::{ClassificationResponse, EmailText};
use crate::{Error, Result};

/// Which backend produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// Local model.
    Local,
    /// Remote chat model.
    Remote,
}

impl std::fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A classification result. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the email is phishing.
    pub is_phishing: bool,
    /// Backend that decided.
    pub source: ClassifierKind,
}

impl Verdict {
    /// `"yes"` for phishing, `"no"` otherwise.
    #[must_use]
    pub const fn phishy(&self) -> &'static str {
        if self.is_phishing { "yes" } else { "no" }
    }
}

impl From<Verdict> for ClassificationResponse {
    fn from(verdict: Verdict) -> Self {
        Self {
            phishy: verdict.phishy().to_string(),
        }
    }
}

/// Classifier facade over the local and remote backends.
#[derive(Debug)]
pub enum Classifier<B = OpenAiChat> {
    /// Local model, shared read-only.
    Local(Arc<LocalClassifier>),
    /// Remote chat model.
    Remote(RemoteClassifier<B>),
}

impl Classifier<OpenAiChat> {
    /// Build the backend selected in `settings`.
    ///
    /// # Errors
    ///
    /// Returns an error if the local model cannot be loaded, or the remote
    /// backend has no API key or its HTTP client cannot be built.
    pub async fn from_settings(settings: &ClassifierSettings) -> Result<Self> {
        match settings.backend {
            Backend::Local => {
                let model = LocalClassifier::load(settings.local.model_path()).await?;
                Ok(Self::Local(Arc::new(model)))
            }
            Backend::Remote => {
                let remote = &settings.remote;
                let chat = OpenAiChat::new(
                    remote.base_url.clone(),
                    remote.resolve_api_key()?,
                    remote.request_timeout(),
                )
                .map_err(|e| Error::Config(e.to_string()))?;
                let limiter = Arc::new(RateLimiter::new(
                    remote.window(),
                    remote.rate_limit_max_calls,
                ));

                tracing::info!(
                    "Remote classifier ready: model={} base_url={}",
                    remote.model,
                    remote.base_url
                );
                Ok(Self::Remote(
                    RemoteClassifier::new(chat, limiter, remote.retry_policy()).with_model(
                        remote.model.clone(),
                        remote.temperature,
                        remote.max_tokens,
                    ),
                ))
            }
        }
    }
}

impl<B: ChatBackend> Classifier<B> {
    /// The active backend.
    #[must_use]
    pub const fn kind(&self) -> ClassifierKind {
        match self {
            Self::Local(_) => ClassifierKind::Local,
            Self::Remote(_) => ClassifierKind::Remote,
        }
    }

    /// Classify an email.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassificationUnavailable`] if the backend cannot
    /// produce a verdict.
    pub async fn classify(&self, text: &EmailText) -> Result<Verdict> {
        let is_phishing = match self {
            Self::Local(model) => model.classify(text)?,
            Self::Remote(remote) => remote.classify(text).await?,
        };
        Ok(Verdict {
            is_phishing,
            source: self.kind(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::LocalSettings;
    use remote::tests::ScriptedChat;

    fn text() -> EmailText {
        EmailText {
            sender: "bank-secure.net".into(),
            subject: "Urgent".into(),
            content: "Verify your account".into(),
        }
    }

    #[test]
    fn test_phishy_rendering() {
        let yes = Verdict {
            is_phishing: true,
            source: ClassifierKind::Local,
        };
        assert_eq!(yes.phishy(), "yes");
        assert_eq!(
            Verdict {
                is_phishing: false,
                ..yes
            }
            .phishy(),
            "no"
        );
    }

    #[tokio::test]
    async fn test_local_facade() {
        let model = LocalClassifier::from_json(local::tests::MODEL_JSON).unwrap();
        let classifier: Classifier = Classifier::Local(Arc::new(model));

        let verdict = classifier.classify(&text()).await.unwrap();

        assert!(verdict.is_phishing);
        assert_eq!(verdict.source, ClassifierKind::Local);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_facade() {
        let remote = RemoteClassifier::new(
            ScriptedChat::new(vec![Ok("no".into())]),
            Arc::new(RateLimiter::new(Duration::from_secs(60), 50)),
            RetryPolicy::default(),
        );
        let classifier = Classifier::Remote(remote);

        let verdict = classifier.classify(&text()).await.unwrap();

        assert!(!verdict.is_phishing);
        assert_eq!(verdict.source, ClassifierKind::Remote);
    }

    #[tokio::test]
    async fn test_from_settings_missing_model() {
        let settings = ClassifierSettings {
            backend: Backend::Local,
            local: LocalSettings {
                model_path: Some("/nonexistent/phishledger/model.json".into()),
            },
            ..ClassifierSettings::default()
        };

        assert!(matches!(
            Classifier::from_settings(&settings).await,
            Err(Error::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_from_settings_remote_with_key() {
        let mut settings = ClassifierSettings {
            backend: Backend::Remote,
            ..ClassifierSettings::default()
        };
        settings.remote.api_key = Some("sk-test".into());

        let classifier = Classifier::from_settings(&settings).await.unwrap();
        assert_eq!(classifier.kind(), ClassifierKind::Remote);
    }
}
