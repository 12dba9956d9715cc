//! Hand-off of finished artifacts to an external upload service

mod command;
mod parser;

pub use command::CommandUploader;
pub use parser::{ResponseLabels, parse_link_output, parse_upload_output};

use crate::config::UploadConfig;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the upload service returns for a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Content identifier assigned by the service
    pub file_id: String,
}

/// Public links for an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicLinks {
    /// Direct download link
    pub direct: String,
    /// Share link for social posting
    pub social: String,
}

/// Trait for upload backends
///
/// # Examples
///
/// ```no_run
/// use filler_dl::upload::{CommandUploader, Uploader};
/// use filler_dl::config::UploadConfig;
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = UploadConfig {
///     upload_command: vec!["uploader".into(), "put".into(), "{local}".into(), "{remote}".into()],
///     link_command: vec!["uploader".into(), "link".into(), "{remote}".into()],
///     ..UploadConfig::default()
/// };
/// let uploader = CommandUploader::new(&config)?;
///
/// let receipt = uploader.upload(Path::new("work/filler.mp4"), "filler.mp4").await?;
/// let links = uploader.create_public_link("filler.mp4").await?;
/// println!("{} -> {}", receipt.file_id, links.direct);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Store `local` under the remote name `remote`
    ///
    /// # Errors
    ///
    /// - [`UploadError::Command`](crate::error::UploadError::Command) when the
    ///   transfer itself fails (retryable)
    /// - [`UploadError::Parse`](crate::error::UploadError::Parse) when the
    ///   response lacks the content identifier (not retryable)
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadReceipt>;

    /// Create direct and social links for an uploaded file
    async fn create_public_link(&self, remote: &str) -> Result<PublicLinks>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Remote name for an artifact, prefixed with the configured directory
pub fn remote_name(config: &UploadConfig, file_name: &str) -> String {
    match config.remote_dir.as_deref().map(|d| d.trim_end_matches('/')) {
        Some(dir) if !dir.is_empty() => format!("{dir}/{file_name}"),
        _ => file_name.to_string(),
    }
}
