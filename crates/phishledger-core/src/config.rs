//! Engine settings.
//!
//! Settings are layered: built-in defaults, then the JSON settings file,
//! then environment variables. The remote classifier's API key may also
//! come from the system keyring (see [`crate::credentials`]).

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::classifier::{RetryPolicy, openai};
use crate::credentials;
use crate::{Error, Result};

/// Directory name under the platform config and data directories.
const APP_DIR: &str = "phishledger";

/// Which classifier backs the facade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pre-trained local model.
    #[default]
    Local,
    /// Remote chat model.
    Remote,
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(Error::Config(format!(
                "unknown classifier backend {other:?} (expected \"local\" or \"remote\")"
            ))),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file. Defaults to the platform data directory.
    pub database_path: Option<PathBuf>,
    /// Classifier selection and tuning.
    pub classifier: ClassifierSettings,
}

/// Classifier settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Active backend.
    pub backend: Backend,
    /// Local model settings.
    pub local: LocalSettings,
    /// Remote model settings.
    pub remote: RemoteSettings,
}

/// Local model settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Model artifact. Defaults to `model.json` in the data directory.
    pub model_path: Option<PathBuf>,
}

impl LocalSettings {
    /// Resolved model artifact path.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| data_dir().join("model.json"))
    }
}

/// Remote chat model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// API credential. Never written back to the settings file.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Keyring profile to read the API key from when `api_key` is unset.
    pub credential_profile: String,
    /// OpenAI-compatible API base URL.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output length cap in tokens.
    pub max_tokens: u32,
    /// Rate limit window in seconds.
    pub rate_limit_window_secs: u64,
    /// Calls admitted per window.
    pub rate_limit_max_calls: usize,
    /// Attempts per classification.
    pub max_retries: u32,
    /// Pause before each call, in milliseconds.
    pub inter_call_delay_ms: u64,
    /// Rate limiter poll interval, in milliseconds.
    pub poll_delay_ms: u64,
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            credential_profile: credentials::DEFAULT_PROFILE.to_string(),
            base_url: openai::DEFAULT_BASE_URL.to_string(),
            model: crate::classifier::DEFAULT_MODEL.to_string(),
            temperature: crate::classifier::DEFAULT_TEMPERATURE,
            max_tokens: crate::classifier::DEFAULT_MAX_TOKENS,
            rate_limit_window_secs: 60,
            rate_limit_max_calls: 50,
            max_retries: 3,
            inter_call_delay_ms: 1000,
            poll_delay_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl RemoteSettings {
    /// Rate limiter window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Retry and pacing policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            inter_call_delay: Duration::from_millis(self.inter_call_delay_ms),
            poll_delay: Duration::from_millis(self.poll_delay_ms),
        }
    }

    /// The configured API key, falling back to the system keyring.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no key is configured anywhere, or a
    /// credential error if the keyring cannot be read.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        debug!("No API key configured, checking keyring profile {}", self.credential_profile);
        credentials::get_api_key(&self.credential_profile)?.ok_or_else(|| {
            Error::Config(
                "remote classifier needs an API key (PHISHLEDGER_API_KEY, OPENAI_API_KEY or set-api-key)"
                    .into(),
            )
        })
    }
}

impl Settings {
    /// Default settings file location.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("settings.json")
    }

    /// Read settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await? {
            debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let settings = serde_json::from_str(&contents)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write settings to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `PHISHLEDGER_BACKEND` is not a known backend.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(path) = var("PHISHLEDGER_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(backend) = var("PHISHLEDGER_BACKEND") {
            self.classifier.backend = backend.parse()?;
        }
        if let Some(path) = var("PHISHLEDGER_MODEL_PATH") {
            self.classifier.local.model_path = Some(PathBuf::from(path));
        }

        let remote = &mut self.classifier.remote;
        if let Some(key) = var("PHISHLEDGER_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            remote.api_key = Some(key);
        }
        if let Some(model) = var("PHISHLEDGER_LLM_MODEL") {
            remote.model = model;
        }
        if let Some(url) = var("PHISHLEDGER_LLM_BASE_URL") {
            remote.base_url = url;
        }
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let remote = &self.classifier.remote;
        let problem = if !(0.0..=2.0).contains(&remote.temperature) {
            Some(format!("temperature {} is outside 0..=2", remote.temperature))
        } else if remote.max_tokens == 0 {
            Some("max_tokens must be at least 1".to_string())
        } else if remote.rate_limit_window_secs == 0 {
            Some("rate_limit_window_secs must be at least 1".to_string())
        } else if remote.rate_limit_max_calls == 0 {
            Some("rate_limit_max_calls must be at least 1".to_string())
        } else if remote.max_retries == 0 {
            Some("max_retries must be at least 1".to_string())
        } else if remote.request_timeout_secs == 0 {
            Some("request_timeout_secs must be at least 1".to_string())
        } else if remote.model.trim().is_empty() {
            Some("model must not be empty".to_string())
        } else if remote.base_url.trim().is_empty() {
            Some("base_url must not be empty".to_string())
        } else {
            None
        };

        problem.map_or(Ok(()), |message| Err(Error::Config(message)))
    }

    /// Resolved database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join("phishledger.db"))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        let remote = &settings.classifier.remote;

        assert_eq!(settings.classifier.backend, Backend::Local);
        assert_eq!(remote.model, "gpt-4");
        assert_eq!(remote.max_tokens, 10);
        assert_eq!(remote.rate_limit_max_calls, 50);
        assert_eq!(remote.window(), Duration::from_secs(60));
        assert_eq!(remote.retry_policy(), RetryPolicy::default());
        assert!(settings.validate().is_ok());
        assert!(settings.database_path().ends_with("phishledger/phishledger.db"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{ "classifier": { "backend": "remote", "remote": { "max_retries": 5 } } }"#,
        )
        .unwrap();

        assert_eq!(settings.classifier.backend, Backend::Remote);
        assert_eq!(settings.classifier.remote.max_retries, 5);
        assert_eq!(settings.classifier.remote.poll_delay_ms, 1000);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut settings = Settings::default();
        settings.classifier.remote.api_key = Some("sk-secret".into());

        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("PHISHLEDGER_DATABASE", "/tmp/votes.db"),
                ("PHISHLEDGER_BACKEND", "Remote"),
                ("OPENAI_API_KEY", "sk-openai"),
                ("PHISHLEDGER_LLM_MODEL", "gpt-4o-mini"),
            ]))
            .unwrap();

        assert_eq!(settings.database_path(), PathBuf::from("/tmp/votes.db"));
        assert_eq!(settings.classifier.backend, Backend::Remote);
        assert_eq!(settings.classifier.remote.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(settings.classifier.remote.model, "gpt-4o-mini");
        assert_eq!(
            settings.classifier.remote.resolve_api_key().unwrap(),
            "sk-openai"
        );
    }

    #[test]
    fn test_env_prefers_own_api_key() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("PHISHLEDGER_API_KEY", "sk-own"),
                ("OPENAI_API_KEY", "sk-openai"),
            ]))
            .unwrap();
        assert_eq!(settings.classifier.remote.api_key.as_deref(), Some("sk-own"));
    }

    #[test]
    fn test_env_rejects_unknown_backend() {
        let mut settings = Settings::default();
        let err = settings
            .apply_env(env(&[("PHISHLEDGER_BACKEND", "cloud")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_ranges() {
        let mut settings = Settings::default();
        settings.classifier.remote.temperature = 2.5;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let mut settings = Settings::default();
        settings.classifier.remote.max_retries = 0;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let mut settings = Settings::default();
        settings.classifier.remote.rate_limit_max_calls = 0;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("phishledger-no-such-dir/settings.json");
        let settings = Settings::load(&path).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("phishledger-settings-{}", std::process::id()))
            .join("settings.json");
        let mut settings = Settings::default();
        settings.classifier.backend = Backend::Remote;
        settings.classifier.remote.max_retries = 4;

        settings.save(&path).await.unwrap();
        let loaded = Settings::load(&path).await.unwrap();

        assert_eq!(loaded, settings);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
