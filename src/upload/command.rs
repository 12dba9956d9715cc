//! Uploader that shells out to configured external commands

use super::parser::{ResponseLabels, parse_link_output, parse_upload_output};
use super::{PublicLinks, UploadReceipt, Uploader};
use crate::config::UploadConfig;
use crate::error::{Error, Result, UploadError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

/// Placeholder replaced by the local artifact path
const LOCAL_PLACEHOLDER: &str = "{local}";
/// Placeholder replaced by the remote name
const REMOTE_PLACEHOLDER: &str = "{remote}";

/// Runs the configured upload and link commands and parses their output
///
/// Both commands are argument vectors (no shell). Output from stdout and
/// stderr is combined before label matching.
pub struct CommandUploader {
    upload_command: Vec<String>,
    link_command: Vec<String>,
    labels: ResponseLabels,
    command_timeout: Duration,
}

impl CommandUploader {
    /// Create an uploader from configuration
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when either command is empty or a label is invalid.
    pub fn new(config: &UploadConfig) -> Result<Self> {
        if config.upload_command.is_empty() {
            return Err(Error::config("upload.upload_command", "upload command is not configured"));
        }
        if config.link_command.is_empty() {
            return Err(Error::config("upload.link_command", "link command is not configured"));
        }
        Ok(Self {
            upload_command: config.upload_command.clone(),
            link_command: config.link_command.clone(),
            labels: ResponseLabels::from_config(config)?,
            command_timeout: config.command_timeout,
        })
    }

    async fn run(&self, operation: &'static str, argv: &[String]) -> Result<String> {
        let (program, args) = argv.split_first().ok_or_else(|| UploadError::Command {
            operation,
            reason: "empty command".to_string(),
        })?;

        tracing::debug!(operation, program = %program, "running uploader command");

        let output = tokio::time::timeout(
            self.command_timeout,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| UploadError::Command {
            operation,
            reason: format!("timed out after {:?}", self.command_timeout),
        })?
        .map_err(|e| UploadError::Command {
            operation,
            reason: format!("failed to execute {}: {}", program, e),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output");
            return Err(UploadError::Command {
                operation,
                reason: format!("exit code {:?}: {}", output.status.code(), detail),
            }
            .into());
        }

        Ok(format!("{}\n{}", stdout, stderr))
    }
}

/// Substitute placeholders in every argument
fn render(template: &[String], local: Option<&Path>, remote: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            let arg = arg.replace(REMOTE_PLACEHOLDER, remote);
            match local {
                Some(local) => arg.replace(LOCAL_PLACEHOLDER, &local.to_string_lossy()),
                None => arg,
            }
        })
        .collect()
}

#[async_trait]
impl Uploader for CommandUploader {
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadReceipt> {
        let argv = render(&self.upload_command, Some(local), remote);
        let output = self.run("upload", &argv).await?;
        let receipt = parse_upload_output(&output, &self.labels)?;
        tracing::info!(remote, file_id = %receipt.file_id, "upload accepted");
        Ok(receipt)
    }

    async fn create_public_link(&self, remote: &str) -> Result<PublicLinks> {
        let argv = render(&self.link_command, None, remote);
        let output = self.run("link", &argv).await?;
        parse_link_output(&output, &self.labels)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}
