//! Configuration types for filler-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Byte-size window an acquisition session must fill
///
/// A session succeeds when its accumulated bytes land in
/// `[min_total_bytes, target_bytes]`. Individual files are only accepted when
/// their size lies in `[per_file_min_bytes, per_file_max_bytes]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Upper bound for the artifact's aggregate size (default: 1000 MB)
    #[serde(default = "default_target_bytes")]
    pub target_bytes: u64,

    /// Minimum aggregate size for a session to count as a success (default: 700 MB)
    #[serde(default = "default_min_total_bytes")]
    pub min_total_bytes: u64,

    /// Smallest single file that is accepted (default: 20 MB)
    #[serde(default = "default_per_file_min_bytes")]
    pub per_file_min_bytes: u64,

    /// Largest single file that is accepted (default: 1000 MB)
    #[serde(default = "default_per_file_max_bytes")]
    pub per_file_max_bytes: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            target_bytes: default_target_bytes(),
            min_total_bytes: default_min_total_bytes(),
            per_file_min_bytes: default_per_file_min_bytes(),
            per_file_max_bytes: default_per_file_max_bytes(),
        }
    }
}

/// Content sources, in the order a session tries them
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Search-engine-style source driven through yt-dlp (reported size estimates)
    YtDlp,
    /// Pexels stock video API
    Pexels,
    /// Pixabay stock video API
    Pixabay,
}

impl ProviderKind {
    /// Stable lowercase name used in logs and records
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::YtDlp => "yt-dlp",
            ProviderKind::Pexels => "pexels",
            ProviderKind::Pixabay => "pixabay",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider selection and search parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Provider order; fixed across attempts (default: yt-dlp, pexels, pixabay)
    #[serde(default = "default_provider_order")]
    pub order: Vec<ProviderKind>,

    /// Result page size requested from each search (default: 40)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Minimum video width passed to catalog searches (default: 1920)
    #[serde(default = "default_min_width")]
    pub min_width: u32,

    /// Minimum video height passed to catalog searches (default: 1080)
    #[serde(default = "default_min_height")]
    pub min_height: u32,

    /// Per-request timeout applied to every provider HTTP call (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Base URL of the Pexels API
    #[serde(default = "default_pexels_base_url")]
    pub pexels_base_url: String,

    /// Base URL of the Pixabay API
    #[serde(default = "default_pixabay_base_url")]
    pub pixabay_base_url: String,

    /// yt-dlp format selector used for fetches
    #[serde(default = "default_ytdlp_format")]
    pub ytdlp_format: String,

    /// Result count for yt-dlp searches (default: 15)
    ///
    /// yt-dlp extracts every result in turn, so this stays well below `page_size`.
    #[serde(default = "default_ytdlp_page_size")]
    pub ytdlp_page_size: u32,

    /// Deadline for one yt-dlp search (default: 300 seconds)
    ///
    /// Results printed before the deadline are kept when it expires.
    #[serde(default = "default_ytdlp_search_timeout", with = "duration_serde")]
    pub ytdlp_search_timeout: Duration,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_provider_order(),
            page_size: default_page_size(),
            min_width: default_min_width(),
            min_height: default_min_height(),
            request_timeout: default_request_timeout(),
            pexels_base_url: default_pexels_base_url(),
            pixabay_base_url: default_pixabay_base_url(),
            ytdlp_format: default_ytdlp_format(),
            ytdlp_page_size: default_ytdlp_page_size(),
            ytdlp_search_timeout: default_ytdlp_search_timeout(),
        }
    }
}

/// External tool paths (ffmpeg, yt-dlp)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Path to yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ytdlp_path: None,
            search_path: true,
        }
    }
}

/// Uploader command lines and response labels
///
/// Commands are argument vectors; `{local}` and `{remote}` placeholders are
/// substituted before execution. The labels are matched at the start of a line
/// in the command's stdout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload command, e.g. `["uploader", "put", "{local}", "{remote}"]`
    #[serde(default)]
    pub upload_command: Vec<String>,

    /// Public link command, e.g. `["uploader", "link", "{remote}"]`
    #[serde(default)]
    pub link_command: Vec<String>,

    /// Label preceding the content identifier (default: "File ID:")
    #[serde(default = "default_file_id_label")]
    pub file_id_label: String,

    /// Label preceding the direct link (default: "Direct link:")
    #[serde(default = "default_direct_link_label")]
    pub direct_link_label: String,

    /// Label preceding the social/share link (default: "Social link:")
    #[serde(default = "default_social_link_label")]
    pub social_link_label: String,

    /// Remote directory prefix joined with the artifact name (default: none)
    #[serde(default)]
    pub remote_dir: Option<String>,

    /// Timeout for a single uploader command (default: 3600 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub command_timeout: Duration,

    /// Delete the local artifact after a successful upload (default: true)
    #[serde(default = "default_true")]
    pub delete_after_upload: bool,

    /// Append-only upload record file (default: "uploads.json")
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_command: Vec::new(),
            link_command: Vec::new(),
            file_id_label: default_file_id_label(),
            direct_link_label: default_direct_link_label(),
            social_link_label: default_social_link_label(),
            remote_dir: None,
            command_timeout: default_upload_timeout(),
            delete_after_upload: true,
            records_path: default_records_path(),
        }
    }
}

/// Upload cycle settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Acquisition sessions per invocation (default: 1)
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Search terms; one is picked at random per iteration
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,

    /// Pause between iterations (default: 10 seconds)
    #[serde(default = "default_inter_cycle_delay", with = "duration_serde")]
    pub inter_cycle_delay: Duration,

    /// Prefix for artifact file names (default: "filler")
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            queries: default_queries(),
            inter_cycle_delay: default_inter_cycle_delay(),
            artifact_prefix: default_artifact_prefix(),
        }
    }
}

/// How the delay grows between failed attempts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// `base_delay * 2^attempt`
    #[default]
    Exponential,
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay the backoff is computed from (default: 2 seconds)
    #[serde(default = "default_base_delay", with = "duration_serde")]
    pub base_delay: Duration,

    /// Maximum delay between retries (default: 120 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Delay growth between attempts (default: exponential)
    #[serde(default)]
    pub backoff: Backoff,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            backoff: Backoff::default(),
            jitter: false,
        }
    }
}

/// Disk space precheck before each session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiskSpaceConfig {
    /// Enable the check (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Space to leave free after the session (default: 1 GB)
    #[serde(default = "default_min_free_space")]
    pub min_free_space: u64,

    /// Multiplier applied to `target_bytes`; concatenation holds inputs and output at once (default: 2.0)
    #[serde(default = "default_size_multiplier")]
    pub size_multiplier: f64,
}

impl Default for DiskSpaceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_free_space: default_min_free_space(),
            size_multiplier: default_size_multiplier(),
        }
    }
}

/// Locations of single-value credential files
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// File containing the Pexels API key (default: "secrets/pexels_api_key")
    #[serde(default = "default_pexels_key_file")]
    pub pexels_key_file: PathBuf,

    /// File containing the Pixabay API key (default: "secrets/pixabay_api_key")
    #[serde(default = "default_pixabay_key_file")]
    pub pixabay_key_file: PathBuf,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            pexels_key_file: default_pexels_key_file(),
            pixabay_key_file: default_pixabay_key_file(),
        }
    }
}

/// Main configuration for the acquisition pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`budget`](BudgetConfig): size window for each artifact
/// - [`providers`](ProvidersConfig): provider order and search parameters
/// - [`tools`](ToolsConfig): external binary paths
/// - [`upload`](UploadConfig): uploader commands and record store
/// - [`cycle`](CycleConfig): iterations and queries
/// - `download_retry` / `upload_retry`: independent [`RetryConfig`]s
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Working directory for transient downloads and artifacts (default: "work")
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Size budget
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Provider settings
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// External tools
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Uploader settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Cycle settings
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Retry policy for each per-candidate search and fetch
    #[serde(default)]
    pub download_retry: RetryConfig,

    /// Retry policy for the upload call
    #[serde(default)]
    pub upload_retry: RetryConfig,

    /// Disk space precheck
    #[serde(default)]
    pub disk_space: DiskSpaceConfig,

    /// Credential file locations
    #[serde(default)]
    pub secrets: SecretsConfig,
}

impl Config {
    /// Load configuration from a JSON file, filling unspecified fields with defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations whose invariants cannot hold
    pub fn validate(&self) -> Result<()> {
        let b = &self.budget;
        if b.target_bytes == 0 {
            return Err(Error::config("budget.target_bytes", "must be positive"));
        }
        if b.min_total_bytes > b.target_bytes {
            return Err(Error::config(
                "budget.min_total_bytes",
                format!(
                    "min_total_bytes ({}) exceeds target_bytes ({})",
                    b.min_total_bytes, b.target_bytes
                ),
            ));
        }
        if b.per_file_min_bytes > b.per_file_max_bytes {
            return Err(Error::config(
                "budget.per_file_min_bytes",
                format!(
                    "per_file_min_bytes ({}) exceeds per_file_max_bytes ({})",
                    b.per_file_min_bytes, b.per_file_max_bytes
                ),
            ));
        }
        if self.providers.order.is_empty() {
            return Err(Error::config("providers.order", "at least one provider required"));
        }
        if self.cycle.queries.is_empty() {
            return Err(Error::config("cycle.queries", "at least one query required"));
        }
        for (key, retry) in [
            ("download_retry.max_attempts", &self.download_retry),
            ("upload_retry.max_attempts", &self.upload_retry),
        ] {
            if retry.max_attempts == 0 {
                return Err(Error::config(key, "must be at least 1"));
            }
        }
        Ok(())
    }
}

const MB: u64 = 1_000_000;

// Default value functions
fn default_work_dir() -> PathBuf {
    PathBuf::from("work")
}

fn default_target_bytes() -> u64 {
    1000 * MB
}

fn default_min_total_bytes() -> u64 {
    700 * MB
}

fn default_per_file_min_bytes() -> u64 {
    20 * MB
}

fn default_per_file_max_bytes() -> u64 {
    1000 * MB
}

fn default_provider_order() -> Vec<ProviderKind> {
    vec![ProviderKind::YtDlp, ProviderKind::Pexels, ProviderKind::Pixabay]
}

fn default_page_size() -> u32 {
    40
}

fn default_min_width() -> u32 {
    1920
}

fn default_min_height() -> u32 {
    1080
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_pexels_base_url() -> String {
    "https://api.pexels.com".to_string()
}

fn default_pixabay_base_url() -> String {
    "https://pixabay.com".to_string()
}

fn default_ytdlp_format() -> String {
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string()
}

fn default_ytdlp_page_size() -> u32 {
    15
}

fn default_ytdlp_search_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_true() -> bool {
    true
}

fn default_file_id_label() -> String {
    "File ID:".to_string()
}

fn default_direct_link_label() -> String {
    "Direct link:".to_string()
}

fn default_social_link_label() -> String {
    "Social link:".to_string()
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_records_path() -> PathBuf {
    PathBuf::from("uploads.json")
}

fn default_iterations() -> u32 {
    1
}

fn default_queries() -> Vec<String> {
    ["nature", "ocean", "city timelapse", "forest", "clouds"]
        .iter()
        .map(|q| q.to_string())
        .collect()
}

fn default_inter_cycle_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_artifact_prefix() -> String {
    "filler".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(120)
}

fn default_min_free_space() -> u64 {
    1024 * 1024 * 1024 // 1 GB
}

fn default_size_multiplier() -> f64 {
    2.0
}

fn default_pexels_key_file() -> PathBuf {
    PathBuf::from("secrets/pexels_api_key")
}

fn default_pixabay_key_file() -> PathBuf {
    PathBuf::from("secrets/pixabay_api_key")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
