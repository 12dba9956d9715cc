//! Core types for filler-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::ProviderKind;

/// Video frame size in pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Resolution {
    /// Create a new resolution
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when both dimensions meet the given minimum
    pub fn meets(&self, min_width: u32, min_height: u32) -> bool {
        self.width >= min_width && self.height >= min_height
    }

    /// Pixel count, used to rank renditions
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A discoverable media item not yet fetched to local storage
///
/// Exists only for the duration of one search result set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaCandidate {
    /// Provider-scoped identifier
    pub id: String,
    /// Title or tag line
    pub title: String,
    /// Source that returned this candidate
    pub provider: ProviderKind,
    /// Duration in seconds
    pub duration_secs: u64,
    /// Reported size in bytes (estimated or exact), if the provider exposes one
    pub size_bytes: Option<u64>,
    /// Frame size of the chosen rendition
    pub resolution: Resolution,
    /// URL or tool locator used to fetch the bytes
    pub locator: String,
}

/// A candidate materialized on disk
///
/// Destroyed by being renamed into the artifact or deleted during cleanup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    /// Local path of the file
    pub path: PathBuf,
    /// Actual size on disk
    pub size_bytes: u64,
    /// Source the file came from
    pub provider: ProviderKind,
}

/// Concatenation state that produced an artifact
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatStrategy {
    /// Exactly one file was selected and renamed
    SingleFile,
    /// Container-level concatenation without re-encoding
    FastConcat,
    /// Full decode and re-encode concatenation
    ReencodeConcat,
    /// Both tool strategies failed; the first file was kept
    FirstOnly,
}

impl ConcatStrategy {
    /// Stable name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcatStrategy::SingleFile => "single_file",
            ConcatStrategy::FastConcat => "fast_concat",
            ConcatStrategy::ReencodeConcat => "reencode_concat",
            ConcatStrategy::FirstOnly => "first_only",
        }
    }
}

impl std::fmt::Display for ConcatStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single file produced by a session, destined for upload
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Local path
    pub path: PathBuf,
    /// Size in bytes; always greater than zero
    pub size_bytes: u64,
    /// How the artifact was produced
    pub strategy: ConcatStrategy,
    /// Provider whose files make up the artifact
    pub provider: ProviderKind,
    /// Number of downloaded files that went into the artifact
    pub source_files: usize,
}

/// One persisted upload, appended once and never mutated
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Remote file name
    pub file_name: String,
    /// Content identifier returned by the uploader
    pub file_id: String,
    /// Direct download link
    pub direct_link: String,
    /// Social/share link
    pub social_link: String,
    /// Artifact size in bytes
    pub size_bytes: u64,
    /// Provider the content came from
    pub provider: ProviderKind,
    /// Query the session searched for
    pub query: String,
    /// Upload completion time
    pub uploaded_at: DateTime<Utc>,
}

/// Result of one cycle iteration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IterationOutcome {
    /// Artifact produced, uploaded and recorded
    Uploaded {
        /// The appended record
        record: UploadRecord,
    },
    /// The iteration failed; the cycle moved on
    Failed {
        /// Query that was searched for
        query: String,
        /// Machine-readable error code
        code: String,
        /// Human-readable error message
        message: String,
    },
}

impl IterationOutcome {
    /// True when the iteration uploaded an artifact
    pub fn is_uploaded(&self) -> bool {
        matches!(self, IterationOutcome::Uploaded { .. })
    }
}

/// Summary of one `UploadCycle::run` invocation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Outcomes in iteration order
    pub outcomes: Vec<IterationOutcome>,
    /// True when the stop signal cut the cycle short
    pub cancelled: bool,
}

impl CycleReport {
    /// Number of iterations that uploaded an artifact
    pub fn uploaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_uploaded()).count()
    }

    /// Number of iterations that failed
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.uploaded()
    }
}

/// Event emitted by the pipeline
///
/// Events are broadcast to all subscribers; they are purely observational.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A session started for the given query
    SessionStarted {
        /// Iteration index (0-based)
        iteration: u32,
        /// Query being searched
        query: String,
    },

    /// A provider is being tried
    ProviderAttempt {
        /// Provider name
        provider: ProviderKind,
        /// Number of candidates returned by search
        candidates: usize,
    },

    /// Download progress for one file
    Downloading {
        /// Provider name
        provider: ProviderKind,
        /// Candidate identifier
        candidate_id: String,
        /// Bytes written so far
        bytes: u64,
        /// Expected total, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
        /// Instantaneous throughput in bytes per second
        speed_bps: u64,
        /// Estimated seconds remaining, when the total is known
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_secs: Option<u64>,
    },

    /// A provider attempt failed; the session moves on
    ProviderFailed {
        /// Provider name
        provider: ProviderKind,
        /// Error message
        error: String,
    },

    /// An artifact was assembled
    Concatenated {
        /// Strategy that produced it
        strategy: ConcatStrategy,
        /// Artifact size
        size_bytes: u64,
    },

    /// An artifact was uploaded and recorded
    Uploaded {
        /// Remote file name
        file_name: String,
        /// Content identifier
        file_id: String,
    },

    /// A cycle iteration failed
    IterationFailed {
        /// Iteration index (0-based)
        iteration: u32,
        /// Machine-readable error code
        code: String,
        /// Error message
        error: String,
    },

    /// The stop signal was handled and cleanup ran
    Shutdown,
}
