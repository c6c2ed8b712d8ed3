//! API key storage in the system keyring.
//!
//! Keeps the remote classifier's API key out of the settings file:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::{debug, warn};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "phishledger";

/// Credential type identifier for chat API keys.
const API_KEY_CREDENTIAL: &str = "llm_api_key";

/// Profile used when none is configured.
pub const DEFAULT_PROFILE: &str = "default";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Refused to store a blank key.
    #[error("API key must not be empty")]
    EmptyKey,
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

fn api_key_entry(profile: &str) -> CredentialResult<Entry> {
    let key = format!("{SERVICE_NAME}_{API_KEY_CREDENTIAL}_{profile}");
    Ok(Entry::new(SERVICE_NAME, &key)?)
}

/// Stores the chat API key for `profile`.
///
/// # Errors
///
/// Returns an error if the key is blank or the keyring operation fails.
pub fn store_api_key(profile: &str, api_key: &str) -> CredentialResult<()> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(CredentialError::EmptyKey);
    }
    api_key_entry(profile)?.set_password(api_key)?;
    debug!("Stored API key for profile {profile}");
    Ok(())
}

/// Retrieves the chat API key for `profile`.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn get_api_key(profile: &str) -> CredentialResult<Option<String>> {
    match api_key_entry(profile)?.get_password() {
        Ok(api_key) => Ok(Some(api_key)),
        Err(keyring::Error::NoEntry) => {
            debug!("No API key found for profile {profile}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Deletes the chat API key for `profile`. Missing entries are not an error.
///
/// # Errors
///
/// Returns an error if the keyring operation fails.
pub fn delete_api_key(profile: &str) -> CredentialResult<()> {
    match api_key_entry(profile)?.delete_credential() {
        Ok(()) => {
            debug!("Deleted API key for profile {profile}");
            Ok(())
        }
        Err(keyring::Error::NoEntry) => {
            debug!("No API key to delete for profile {profile}");
            Ok(())
        }
        Err(e) => {
            warn!("Failed to delete API key: {e}");
            Err(e.into())
        }
    }
}
