//! Reduce a batch of downloaded files to one artifact
//!
//! Strategies are tried in a fixed order:
//!
//! 1. [`SingleFile`](ConcatStrategy::SingleFile): one input is renamed into place
//! 2. [`FastConcat`](ConcatStrategy::FastConcat): container-level copy
//! 3. [`ReencodeConcat`](ConcatStrategy::ReencodeConcat): full re-encode, when supported
//! 4. [`FirstOnly`](ConcatStrategy::FirstOnly): the first input becomes the artifact
//!
//! A tool step succeeds only when it exits cleanly and leaves a non-empty
//! output. Whatever state is reached, inputs that did not become the artifact
//! and failed outputs are deleted.

mod ffmpeg;

pub use ffmpeg::{CONCAT_LIST_SUFFIX, FfmpegConcatenator};

use crate::config::ProviderKind;
use crate::error::{ConcatError, Error, Result};
use crate::types::{Artifact, ConcatStrategy, DownloadedFile};
use crate::utils::{file_size_or_zero, remove_file_logged};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Capabilities of a concatenator implementation
#[derive(Debug, Clone, Copy)]
pub struct ConcatCapabilities {
    /// Can join containers without re-encoding
    pub can_fast_concat: bool,
    /// Can decode and re-encode inputs into one stream
    pub can_reencode: bool,
}

/// Trait for media concatenation tools
///
/// Implementations write the joined result to `output`. They do not need to
/// validate the output; [`concatenate`] checks size and existence itself.
#[async_trait]
pub trait Concatenator: Send + Sync {
    /// Join inputs without re-encoding
    async fn fast_concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Join inputs by re-encoding every stream
    async fn reencode_concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;

    /// Query capabilities of this concatenator
    fn capabilities(&self) -> ConcatCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Assemble `files` into a single artifact at `artifact_path`
///
/// Ownership of the inputs passes to this function: on return every input
/// has either become the artifact or been deleted.
///
/// # Errors
///
/// - [`ConcatError::NoInputs`] for an empty batch
/// - [`ConcatError::EmptyOutput`] when even the fallback leaves nothing usable
pub async fn concatenate(
    files: Vec<DownloadedFile>,
    artifact_path: &Path,
    concatenator: &dyn Concatenator,
    provider: ProviderKind,
) -> Result<Artifact> {
    let Some(first) = files.first() else {
        return Err(ConcatError::NoInputs.into());
    };
    let source_files = files.len();

    if source_files == 1 {
        return promote(first, artifact_path, ConcatStrategy::SingleFile, provider, 1).await;
    }

    let inputs: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
    let caps = concatenator.capabilities();

    let attempts = [
        (ConcatStrategy::FastConcat, caps.can_fast_concat),
        (ConcatStrategy::ReencodeConcat, caps.can_reencode),
    ];
    for (strategy, supported) in attempts {
        if !supported {
            tracing::debug!(
                concatenator = concatenator.name(),
                strategy = %strategy,
                "strategy not supported, skipping"
            );
            continue;
        }

        tracing::info!(
            concatenator = concatenator.name(),
            strategy = %strategy,
            inputs = source_files,
            "concatenating"
        );
        let run = match strategy {
            ConcatStrategy::FastConcat => concatenator.fast_concat(&inputs, artifact_path).await,
            _ => concatenator.reencode_concat(&inputs, artifact_path).await,
        };

        match verify_output(run, strategy, artifact_path).await {
            Ok(size_bytes) => {
                for input in &inputs {
                    remove_file_logged(input).await;
                }
                return Ok(Artifact {
                    path: artifact_path.to_path_buf(),
                    size_bytes,
                    strategy,
                    provider,
                    source_files,
                });
            }
            Err(e) => {
                tracing::warn!(strategy = %strategy, error = %e, "concatenation strategy failed");
                remove_file_logged(artifact_path).await;
            }
        }
    }

    // Keep the first file, drop the rest
    for input in &inputs[1..] {
        remove_file_logged(input).await;
    }
    promote(first, artifact_path, ConcatStrategy::FirstOnly, provider, source_files).await
}

/// Check a tool step's result: clean exit and a non-empty output
async fn verify_output(run: Result<()>, strategy: ConcatStrategy, output: &Path) -> Result<u64> {
    run?;
    let size = file_size_or_zero(output).await;
    if size == 0 {
        return Err(ConcatError::EmptyOutput {
            strategy: strategy.as_str(),
            path: output.to_path_buf(),
        }
        .into());
    }
    Ok(size)
}

/// Rename one input into the artifact position
async fn promote(
    file: &DownloadedFile,
    artifact_path: &Path,
    strategy: ConcatStrategy,
    provider: ProviderKind,
    source_files: usize,
) -> Result<Artifact> {
    if let Err(e) = tokio::fs::rename(&file.path, artifact_path).await {
        remove_file_logged(&file.path).await;
        return Err(Error::Io(e));
    }

    let size_bytes = file_size_or_zero(artifact_path).await;
    if size_bytes == 0 {
        remove_file_logged(artifact_path).await;
        return Err(ConcatError::EmptyOutput {
            strategy: strategy.as_str(),
            path: artifact_path.to_path_buf(),
        }
        .into());
    }

    tracing::info!(strategy = %strategy, size_bytes, path = ?artifact_path, "artifact ready");
    Ok(Artifact {
        path: artifact_path.to_path_buf(),
        size_bytes,
        strategy,
        provider,
        source_files,
    })
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Copy, Debug, PartialEq)]
    enum Outcome {
        /// Exit cleanly and write this many bytes
        Write(usize),
        /// Exit non-zero after writing a partial output
        Fail,
    }

    struct ScriptedConcatenator {
        fast: Outcome,
        reencode: Outcome,
        can_reencode: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedConcatenator {
        fn new(fast: Outcome, reencode: Outcome) -> Self {
            Self {
                fast,
                reencode,
                can_reencode: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        async fn run(&self, name: &'static str, outcome: Outcome, output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(name);
            match outcome {
                Outcome::Write(n) => {
                    tokio::fs::write(output, vec![9u8; n]).await?;
                    Ok(())
                }
                Outcome::Fail => {
                    tokio::fs::write(output, b"partial").await?;
                    Err(ConcatError::ToolFailed {
                        strategy: name,
                        code: Some(1),
                        stderr: "boom".into(),
                    }
                    .into())
                }
            }
        }
    }

    #[async_trait]
    impl Concatenator for ScriptedConcatenator {
        async fn fast_concat(&self, _inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.run("fast", self.fast, output).await
        }

        async fn reencode_concat(&self, _inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.run("reencode", self.reencode, output).await
        }

        fn capabilities(&self) -> ConcatCapabilities {
            ConcatCapabilities {
                can_fast_concat: true,
                can_reencode: self.can_reencode,
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn write_inputs(dir: &Path, contents: &[&[u8]]) -> Vec<DownloadedFile> {
        contents
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                let path = dir.join(format!("fdl-part-test-{i}.mp4"));
                std::fs::write(&path, bytes).unwrap();
                DownloadedFile {
                    path,
                    size_bytes: bytes.len() as u64,
                    provider: ProviderKind::Pexels,
                }
            })
            .collect()
    }

    fn names_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn single_file_is_renamed_byte_identical() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path(), &[b"exact bytes of the only clip"]);
        let artifact_path = dir.path().join("artifact.mp4");
        let concat = ScriptedConcatenator::new(Outcome::Fail, Outcome::Fail);

        let artifact = concatenate(files, &artifact_path, &concat, ProviderKind::Pexels)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, ConcatStrategy::SingleFile);
        assert_eq!(std::fs::read(&artifact_path).unwrap(), b"exact bytes of the only clip");
        assert!(concat.calls.lock().unwrap().is_empty(), "no tool runs for one file");
        assert_eq!(names_in(dir.path()), ["artifact.mp4"]);
    }

    #[tokio::test]
    async fn fast_concat_success_removes_inputs() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path(), &[b"aaa", b"bbb"]);
        let artifact_path = dir.path().join("artifact.mp4");
        let concat = ScriptedConcatenator::new(Outcome::Write(6), Outcome::Fail);

        let artifact = concatenate(files, &artifact_path, &concat, ProviderKind::Pexels)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, ConcatStrategy::FastConcat);
        assert_eq!(artifact.size_bytes, 6);
        assert_eq!(artifact.source_files, 2);
        assert_eq!(names_in(dir.path()), ["artifact.mp4"]);
    }

    #[tokio::test]
    async fn fast_failure_falls_through_to_reencode() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path(), &[b"aaa", b"bbb"]);
        let artifact_path = dir.path().join("artifact.mp4");
        let concat = ScriptedConcatenator::new(Outcome::Fail, Outcome::Write(10));

        let artifact = concatenate(files, &artifact_path, &concat, ProviderKind::Pexels)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, ConcatStrategy::ReencodeConcat);
        assert_eq!(*concat.calls.lock().unwrap(), ["fast", "reencode"]);
        assert_eq!(names_in(dir.path()), ["artifact.mp4"]);
    }

    #[tokio::test]
    async fn both_failing_keeps_first_and_deletes_second() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path(), &[b"first clip", b"second clip"]);
        let artifact_path = dir.path().join("artifact.mp4");
        let concat = ScriptedConcatenator::new(Outcome::Fail, Outcome::Fail);

        let artifact = concatenate(files, &artifact_path, &concat, ProviderKind::Pexels)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, ConcatStrategy::FirstOnly);
        assert_eq!(std::fs::read(&artifact_path).unwrap(), b"first clip");
        assert_eq!(names_in(dir.path()), ["artifact.mp4"], "second input and partial output are gone");
    }

    #[tokio::test]
    async fn zero_byte_output_is_never_success() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path(), &[b"first", b"second"]);
        let artifact_path = dir.path().join("artifact.mp4");
        let concat = ScriptedConcatenator::new(Outcome::Write(0), Outcome::Write(0));

        let artifact = concatenate(files, &artifact_path, &concat, ProviderKind::Pexels)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, ConcatStrategy::FirstOnly);
        assert!(artifact.size_bytes > 0);
        assert_eq!(std::fs::read(&artifact_path).unwrap(), b"first");
    }

    #[tokio::test]
    async fn reencode_is_skipped_when_unsupported() {
        let dir = TempDir::new().unwrap();
        let files = write_inputs(dir.path(), &[b"a", b"b", b"c"]);
        let artifact_path = dir.path().join("artifact.mp4");
        let mut concat = ScriptedConcatenator::new(Outcome::Fail, Outcome::Write(3));
        concat.can_reencode = false;

        let artifact = concatenate(files, &artifact_path, &concat, ProviderKind::Pexels)
            .await
            .unwrap();

        assert_eq!(artifact.strategy, ConcatStrategy::FirstOnly);
        assert_eq!(*concat.calls.lock().unwrap(), ["fast"]);
        assert_eq!(names_in(dir.path()), ["artifact.mp4"]);
    }

    #[tokio::test]
    async fn empty_batch_is_an_error() {
        let dir = TempDir::new().unwrap();
        let concat = ScriptedConcatenator::new(Outcome::Fail, Outcome::Fail);
        let err = concatenate(Vec::new(), &dir.path().join("a.mp4"), &concat, ProviderKind::Pexels)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Concat(ConcatError::NoInputs)));
    }
}
