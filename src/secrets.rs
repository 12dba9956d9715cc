//! Provider credentials read from single-value files
//!
//! Each secret lives in its own file at a configured path. Files are read once
//! when a session starts; surrounding whitespace is trimmed and an empty file
//! counts as missing.

use crate::config::{ProviderKind, SecretsConfig};
use crate::error::{Error, Result};
use std::path::Path;

/// Credentials for the providers that need them
#[derive(Clone, Default)]
pub struct Secrets {
    /// Pexels API key
    pub pexels_api_key: Option<String>,
    /// Pixabay API key
    pub pixabay_api_key: Option<String>,
}

// Keys stay out of logs
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("pexels_api_key", &self.pexels_api_key.as_ref().map(|_| "<redacted>"))
            .field("pixabay_api_key", &self.pixabay_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Secrets {
    /// Read every configured secret file; missing files are left as `None`
    pub async fn load(config: &SecretsConfig) -> Result<Self> {
        Ok(Self {
            pexels_api_key: read_secret_file(&config.pexels_key_file).await?,
            pixabay_api_key: read_secret_file(&config.pixabay_key_file).await?,
        })
    }

    /// Key for a provider, or [`Error::MissingSecret`]
    pub fn require(&self, provider: ProviderKind, config: &SecretsConfig) -> Result<&str> {
        let (value, path) = match provider {
            ProviderKind::Pexels => (&self.pexels_api_key, &config.pexels_key_file),
            ProviderKind::Pixabay => (&self.pixabay_api_key, &config.pixabay_key_file),
            ProviderKind::YtDlp => return Ok(""),
        };
        value.as_deref().ok_or_else(|| Error::MissingSecret {
            name: provider.as_str().to_string(),
            path: path.clone(),
        })
    }
}

/// Read a single-value secret file
///
/// Returns `Ok(None)` when the file does not exist or is blank.
pub async fn read_secret_file(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => {
            let value = content.trim();
            if value.is_empty() {
                tracing::warn!(?path, "secret file is empty");
                Ok(None)
            } else {
                Ok(Some(value.to_string()))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "secret file not found");
            Ok(None)
        }
        Err(e) => Err(Error::Io(e)),
    }
}
