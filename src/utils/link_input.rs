//! Checks applied to user-supplied short keys and targets before they reach a store.

use base64::Engine as _;
use url::Url;

/// Random bytes behind a generated key; encodes to 8 URL-safe characters.
const KEY_BYTES: usize = 6;

const MAX_KEY_LEN: usize = 32;

/// Rejected link input.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("short key must be 1-{MAX_KEY_LEN} characters, got {0}")]
    KeyLength(usize),

    #[error("short key may only contain ASCII letters, digits, '-' and '_': {0}")]
    KeyCharacters(String),

    #[error("invalid target URL: {0}")]
    TargetFormat(String),

    #[error("target must be an http or https URL")]
    TargetScheme,

    #[error("system random source failed: {0}")]
    Entropy(String),
}

/// Generates a random URL-safe short key.
///
/// # Errors
///
/// Returns [`InputError::Entropy`] if the OS random source is unavailable.
pub fn generate_key() -> Result<String, InputError> {
    let mut buffer = [0u8; KEY_BYTES];
    getrandom::fill(&mut buffer).map_err(|e| InputError::Entropy(e.to_string()))?;

    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buffer))
}

/// Validates a caller-chosen short key.
///
/// `:` is rejected because it separates owner and key in storage indexes.
pub fn validate_key(key: &str) -> Result<(), InputError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(InputError::KeyLength(key.len()));
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(InputError::KeyCharacters(key.to_string()));
    }

    Ok(())
}

/// Normalizes a target URL.
///
/// Only http and https are accepted. The host is lowercased, the fragment
/// dropped and a default port removed; path and query are kept as given.
pub fn normalize_target(input: &str) -> Result<String, InputError> {
    let mut url = Url::parse(input.trim()).map_err(|e| InputError::TargetFormat(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(InputError::TargetScheme);
    }

    if let Some(host) = url.host_str().map(str::to_ascii_lowercase) {
        url.set_host(Some(&host))
            .map_err(|e| InputError::TargetFormat(e.to_string()))?;
    }
    url.set_fragment(None);

    // `Url` already drops a port equal to the scheme default on parse.
    Ok(url.to_string())
}
