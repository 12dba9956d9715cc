//! Scripted fakes for the provider, concatenator and uploader seams

use async_trait::async_trait;
use filler_dl::config::ProviderKind;
use filler_dl::error::{ConcatError, ProviderError, UploadError};
use filler_dl::{
    ConcatCapabilities, Concatenator, DownloadedFile, MediaCandidate, ProviderClient, PublicLinks,
    Resolution, Result, SizePolicy, UploadReceipt, Uploader,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Provider returning a fixed candidate list; fetch writes `actual` bytes
pub struct FakeProvider {
    kind: ProviderKind,
    policy: SizePolicy,
    /// (reported size, actual size) per candidate
    items: Vec<(Option<u64>, u64)>,
    search_error: bool,
    fetches: Mutex<Vec<String>>,
}

impl FakeProvider {
    /// Measured-policy provider whose candidates report no size
    pub fn measured(kind: ProviderKind, actual_sizes: &[u64]) -> Self {
        Self {
            kind,
            policy: SizePolicy::Measured,
            items: actual_sizes.iter().map(|s| (None, *s)).collect(),
            search_error: false,
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Estimated-policy provider whose estimates equal the actual sizes
    pub fn estimated(kind: ProviderKind, sizes: &[u64]) -> Self {
        Self {
            kind,
            policy: SizePolicy::Estimated,
            items: sizes.iter().map(|s| (Some(*s), *s)).collect(),
            search_error: false,
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Provider whose search always fails with a non-retryable error
    pub fn broken(kind: ProviderKind) -> Self {
        Self {
            kind,
            policy: SizePolicy::Measured,
            items: Vec::new(),
            search_error: true,
            fetches: Mutex::new(Vec::new()),
        }
    }

    /// Candidate ids fetched so far
    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn size_policy(&self) -> SizePolicy {
        self.policy
    }

    async fn search(&self, _query: &str) -> Result<Vec<MediaCandidate>> {
        if self.search_error {
            return Err(ProviderError::InvalidResponse {
                provider: self.kind.as_str().to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        Ok(self
            .items
            .iter()
            .enumerate()
            .map(|(i, (reported, _))| MediaCandidate {
                id: format!("{}-{i}", self.kind),
                title: format!("clip {i}"),
                provider: self.kind,
                duration_secs: 10,
                size_bytes: *reported,
                resolution: Resolution::new(1920, 1080),
                locator: i.to_string(),
            })
            .collect())
    }

    async fn fetch(&self, candidate: &MediaCandidate, dest: &Path) -> Result<DownloadedFile> {
        self.fetches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(candidate.id.clone());
        let index: usize = candidate.locator.parse().map_err(|_| ProviderError::NotFound {
            provider: self.kind.as_str().to_string(),
            locator: candidate.locator.clone(),
        })?;
        let size = self.items[index].1;
        tokio::fs::write(dest, vec![index as u8; size as usize]).await?;
        Ok(DownloadedFile {
            path: dest.to_path_buf(),
            size_bytes: size,
            provider: self.kind,
        })
    }
}

/// Outcome of one scripted concatenation step
#[derive(Clone, Copy, Debug)]
pub enum ToolOutcome {
    /// Exit cleanly after writing the inputs back to back
    Join,
    /// Exit non-zero
    Fail,
}

/// Concatenator with scripted outcomes
pub struct FakeConcatenator {
    pub fast: ToolOutcome,
    pub reencode: ToolOutcome,
}

impl FakeConcatenator {
    /// Both strategies succeed
    pub fn working() -> Self {
        Self {
            fast: ToolOutcome::Join,
            reencode: ToolOutcome::Join,
        }
    }

    /// Both strategies fail
    pub fn failing() -> Self {
        Self {
            fast: ToolOutcome::Fail,
            reencode: ToolOutcome::Fail,
        }
    }

    async fn run(&self, strategy: &'static str, outcome: ToolOutcome, inputs: &[PathBuf], output: &Path) -> Result<()> {
        match outcome {
            ToolOutcome::Join => {
                let mut joined = Vec::new();
                for input in inputs {
                    joined.extend(tokio::fs::read(input).await?);
                }
                tokio::fs::write(output, joined).await?;
                Ok(())
            }
            ToolOutcome::Fail => Err(ConcatError::ToolFailed {
                strategy,
                code: Some(1),
                stderr: "scripted failure".to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl Concatenator for FakeConcatenator {
    async fn fast_concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.run("fast_concat", self.fast, inputs, output).await
    }

    async fn reencode_concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.run("reencode_concat", self.reencode, inputs, output).await
    }

    fn capabilities(&self) -> ConcatCapabilities {
        ConcatCapabilities {
            can_fast_concat: true,
            can_reencode: true,
        }
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Scripted response to one upload call
#[derive(Clone, Debug)]
pub enum UploadScript {
    /// Accept and return this file id
    Accept(String),
    /// Respond without a file id
    NoFileId,
    /// Fail the transfer (retryable)
    TransferError,
}

/// Uploader that replays scripted responses, accepting everything once the script runs out
pub struct FakeUploader {
    script: Mutex<VecDeque<UploadScript>>,
    uploads: Mutex<Vec<(PathBuf, String)>>,
}

impl FakeUploader {
    /// Uploader replaying `script` in order
    pub fn scripted(script: Vec<UploadScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            uploads: Mutex::new(Vec::new()),
        }
    }

    /// Uploader that accepts everything
    pub fn accepting() -> Self {
        Self::scripted(Vec::new())
    }

    /// (local, remote) of every upload call
    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, local: &Path, remote: &str) -> Result<UploadReceipt> {
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((local.to_path_buf(), remote.to_string()));
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| UploadScript::Accept(format!("id-{remote}")));
        match next {
            UploadScript::Accept(file_id) => Ok(UploadReceipt { file_id }),
            UploadScript::NoFileId => Err(UploadError::Parse {
                field: "file id",
                response: "Upload complete".to_string(),
            }
            .into()),
            UploadScript::TransferError => Err(UploadError::Command {
                operation: "upload",
                reason: "connection reset".to_string(),
            }
            .into()),
        }
    }

    async fn create_public_link(&self, remote: &str) -> Result<PublicLinks> {
        Ok(PublicLinks {
            direct: format!("https://direct.example/{remote}"),
            social: format!("https://social.example/{remote}"),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
