//! Search-engine-style provider driven through the external yt-dlp binary

use super::progress::TransferProgress;
use super::{ProviderClient, SizePolicy, filter_and_sort_estimated};
use crate::config::{BudgetConfig, Config, ProviderKind};
use crate::error::{Error, ProviderError, Result};
use crate::types::{DownloadedFile, Event, MediaCandidate, Resolution};
use crate::utils::{PARTIAL_EXTENSION, file_size_or_zero, remove_file_logged};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Marker that prefixes our progress template lines on stdout
const PROGRESS_MARKER: &str = "FDL-PROGRESS";

/// How long to wait for stderr after the tool has exited or been killed
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// One entry of `yt-dlp --dump-json` output
#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    filesize: Option<f64>,
    #[serde(default)]
    filesize_approx: Option<f64>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    webpage_url: Option<String>,
}

/// yt-dlp search provider
///
/// Candidates carry the tool's reported size (`filesize`, falling back to
/// `filesize_approx`). Candidates outside the per-file window are dropped
/// before any download and the rest are ordered by size descending.
pub struct YtDlpProvider {
    binary_path: PathBuf,
    budget: BudgetConfig,
    page_size: u32,
    format: String,
    search_timeout: Duration,
    event_tx: broadcast::Sender<Event>,
}

impl YtDlpProvider {
    /// Create a provider with an explicit binary path
    pub fn new(config: &Config, binary_path: PathBuf, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            binary_path,
            budget: config.budget,
            page_size: config.providers.ytdlp_page_size.max(1),
            format: config.providers.ytdlp_format.clone(),
            search_timeout: config.providers.ytdlp_search_timeout,
            event_tx,
        }
    }

    /// Resolve the binary from configuration or PATH
    ///
    /// Returns `None` when no explicit path is configured and yt-dlp is not in PATH
    /// (or PATH search is disabled).
    pub fn from_config(config: &Config, event_tx: broadcast::Sender<Event>) -> Option<Self> {
        let binary = match &config.tools.ytdlp_path {
            Some(path) => Some(path.clone()),
            None if config.tools.search_path => which::which("yt-dlp").ok(),
            None => None,
        }?;
        Some(Self::new(config, binary, event_tx))
    }
}

#[async_trait]
impl ProviderClient for YtDlpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::YtDlp
    }

    fn size_policy(&self) -> SizePolicy {
        SizePolicy::Estimated
    }

    async fn search(&self, query: &str) -> Result<Vec<MediaCandidate>> {
        let deadline = tokio::time::Instant::now() + self.search_timeout;
        let mut child = Command::new(&self.binary_path)
            .arg("--dump-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--ignore-errors")
            .arg(format!("ytsearch{}:{}", self.page_size, query))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;
        let stderr_task = drain_stderr(&mut child);

        // One JSON object per line, printed as each result is extracted
        let mut candidates = Vec::new();
        let mut timed_out = false;
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match tokio::time::timeout_at(deadline, lines.next_line()).await {
                    Ok(Ok(Some(line))) => candidates.extend(parse_search_line(&line)),
                    Ok(Ok(None)) | Ok(Err(_)) => break,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                }
            }
        }

        let status = if timed_out {
            None
        } else {
            tokio::time::timeout_at(deadline, child.wait()).await.ok().transpose()?
        };
        if status.is_none() {
            timed_out = true;
            child.start_kill().ok();
            child.wait().await.ok();
        }
        let stderr = collect_stderr(stderr_task).await;

        if timed_out {
            if candidates.is_empty() {
                return Err(ProviderError::Network {
                    provider: ProviderKind::YtDlp.as_str().to_string(),
                    reason: format!("search timed out after {:?}", self.search_timeout),
                }
                .into());
            }
            tracing::warn!(
                provider = "yt-dlp",
                query,
                found = candidates.len(),
                timeout = ?self.search_timeout,
                "search timed out, keeping results printed so far"
            );
        } else if candidates.is_empty() && status.is_some_and(|s| !s.success()) {
            // --ignore-errors exits non-zero when any single entry fails; only an
            // empty result set with a failing exit is treated as a search failure
            return Err(classify_failure(&stderr, query).into());
        }

        let found = candidates.len();
        let candidates = filter_and_sort_estimated(candidates, &self.budget);
        tracing::debug!(
            provider = "yt-dlp",
            query,
            found,
            in_window = candidates.len(),
            "search complete"
        );
        Ok(candidates)
    }

    async fn fetch(&self, candidate: &MediaCandidate, dest: &Path) -> Result<DownloadedFile> {
        let partial = tool_output_path(dest);
        let result = self.run_download(candidate, &partial).await;
        if let Err(e) = result {
            remove_file_logged(&partial).await;
            return Err(e);
        }

        let size_bytes = file_size_or_zero(&partial).await;
        if size_bytes == 0 {
            remove_file_logged(&partial).await;
            return Err(Error::ExternalTool(format!(
                "yt-dlp reported success but wrote no data to {}",
                partial.display()
            )));
        }
        tokio::fs::rename(&partial, dest).await?;

        Ok(DownloadedFile {
            path: dest.to_path_buf(),
            size_bytes,
            provider: ProviderKind::YtDlp,
        })
    }
}

impl YtDlpProvider {
    async fn run_download(&self, candidate: &MediaCandidate, partial: &Path) -> Result<()> {
        let mut child = Command::new(&self.binary_path)
            .arg("-f")
            .arg(&self.format)
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--no-part")
            .arg("--no-playlist")
            .arg("--newline")
            .arg("--no-warnings")
            .arg("--progress-template")
            .arg(format!(
                "download:{PROGRESS_MARKER} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s"
            ))
            .arg("-o")
            .arg(partial)
            .arg(&candidate.locator)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stderr_task = drain_stderr(&mut child);

        let mut progress = TransferProgress::new(ProviderKind::YtDlp, &candidate.id, candidate.size_bytes);
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some((bytes, total)) = parse_progress_line(&line)
                    && let Some(event) = progress.set_absolute(bytes, total)
                {
                    self.event_tx.send(event).ok();
                }
            }
        }

        let status = child.wait().await?;
        let stderr = collect_stderr(stderr_task).await;

        if !status.success() {
            return Err(classify_failure(&stderr, &candidate.locator).into());
        }
        self.event_tx.send(progress.finish()).ok();
        Ok(())
    }
}

/// Where yt-dlp writes a fetch before it is moved to `dest`
///
/// The name keeps the `.mp4` extension: when yt-dlp merges separate video and
/// audio streams it appends the merge extension to any output name that does
/// not already end in it.
fn tool_output_path(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!("{stem}.{PARTIAL_EXTENSION}.mp4"))
}

/// Read stderr concurrently so a chatty tool cannot block on a full pipe
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            stderr.read_to_string(&mut buf).await.ok();
            buf
        })
    })
}

async fn collect_stderr(task: Option<JoinHandle<String>>) -> String {
    match task {
        // Grandchildren can keep the pipe open after yt-dlp itself is gone
        Some(task) => tokio::time::timeout(STDERR_GRACE, task)
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or_default(),
        None => String::new(),
    }
}

/// Parse one `--dump-json` line into a candidate
fn parse_search_line(line: &str) -> Option<MediaCandidate> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let entry: SearchEntry = match serde_json::from_str(line) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparseable yt-dlp line");
            return None;
        }
    };

    let size_bytes = entry
        .filesize
        .or(entry.filesize_approx)
        .filter(|s| *s > 0.0)
        .map(|s| s as u64);

    let locator = entry
        .webpage_url
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));

    Some(MediaCandidate {
        id: entry.id,
        title: entry.title,
        provider: ProviderKind::YtDlp,
        duration_secs: entry.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
        size_bytes,
        resolution: Resolution::new(entry.width.unwrap_or(0), entry.height.unwrap_or(0)),
        locator,
    })
}

/// Parse a progress-template line into (downloaded, total)
fn parse_progress_line(line: &str) -> Option<(u64, Option<u64>)> {
    let mut fields = line.trim().strip_prefix(PROGRESS_MARKER)?.split_whitespace();
    let number = |s: Option<&str>| s.and_then(|v| v.parse::<f64>().ok()).map(|v| v as u64);
    let downloaded = number(fields.next())?;
    let total = number(fields.next());
    let estimate = number(fields.next());
    Some((downloaded, total.or(estimate)))
}

/// Map yt-dlp stderr onto the provider error taxonomy
fn classify_failure(stderr: &str, locator: &str) -> ProviderError {
    let provider = ProviderKind::YtDlp.as_str().to_string();
    let lower = stderr.to_lowercase();
    if lower.contains("http error 429") || lower.contains("too many requests") || lower.contains("sign in to confirm") {
        ProviderError::QuotaOrAuth { provider, status: 429 }
    } else if lower.contains("http error 403") {
        ProviderError::QuotaOrAuth { provider, status: 403 }
    } else if lower.contains("http error 404")
        || lower.contains("video unavailable")
        || lower.contains("private video")
        || lower.contains("has been removed")
    {
        ProviderError::NotFound {
            provider,
            locator: locator.to_string(),
        }
    } else {
        let reason = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("yt-dlp exited with failure")
            .to_string();
        ProviderError::Network { provider, reason }
    }
}
