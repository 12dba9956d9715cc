//! Error types for filler-dl
//!
//! This module provides error handling for the acquisition pipeline:
//! - Domain-specific error types (Provider, Concat, Upload)
//! - Machine-readable error codes for iteration reports and events
//! - Context information (provider name, file path, byte totals)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for filler-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for filler-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "budget.target_bytes")
        key: Option<String>,
    },

    /// Provider search or fetch failed
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Accumulated bytes fell below the session minimum
    #[error(
        "insufficient size from provider {provider}: accumulated {total} bytes, need at least {min}"
    )]
    InsufficientSize {
        /// Provider whose candidates were accumulated
        provider: String,
        /// Bytes accumulated before the batch was discarded
        total: u64,
        /// Minimum total bytes required by the budget
        min: u64,
    },

    /// Every provider failed to produce an artifact
    #[error("all {attempted} providers exhausted for query '{query}'")]
    AllProvidersExhausted {
        /// Query the session was run for
        query: String,
        /// Number of providers that were attempted
        attempted: usize,
    },

    /// Concatenation step failed
    #[error("concatenation error: {0}")]
    Concat(#[from] ConcatError),

    /// Upload or link creation failed
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// A required secret file is missing or empty
    #[error("missing secret for {name} at {path}")]
    MissingSecret {
        /// Logical secret name (e.g., "pexels")
        name: String,
        /// Path the secret was expected at
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Insufficient disk space
    #[error("insufficient disk space: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        /// Number of bytes required for the session
        required: u64,
        /// Number of bytes currently available on disk
        available: u64,
    },

    /// Failed to check disk space
    #[error("failed to check disk space: {0}")]
    DiskSpaceCheckFailed(String),

    /// External tool execution failed (ffmpeg, yt-dlp, uploader)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The stop signal was received
    #[error("operation cancelled")]
    Cancelled,
}

/// Provider-related errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, reset, body read)
    #[error("{provider}: network error: {reason}")]
    Network {
        /// Provider name
        provider: String,
        /// Underlying failure description
        reason: String,
    },

    /// Provider rejected the request (bad key, quota exhausted, rate limited)
    #[error("{provider}: request rejected with status {status}")]
    QuotaOrAuth {
        /// Provider name
        provider: String,
        /// HTTP status code returned
        status: u16,
    },

    /// Remote resource not found
    #[error("{provider}: not found: {locator}")]
    NotFound {
        /// Provider name
        provider: String,
        /// Locator that could not be resolved
        locator: String,
    },

    /// Unexpected non-success HTTP status
    #[error("{provider}: unexpected HTTP status {status}")]
    Http {
        /// Provider name
        provider: String,
        /// HTTP status code returned
        status: u16,
    },

    /// Response body could not be interpreted
    #[error("{provider}: invalid response: {reason}")]
    InvalidResponse {
        /// Provider name
        provider: String,
        /// What was wrong with the response
        reason: String,
    },

    /// Search returned no usable candidates
    #[error("{provider}: no candidates for query '{query}'")]
    EmptyResult {
        /// Provider name
        provider: String,
        /// Query that returned nothing
        query: String,
    },
}

impl ProviderError {
    /// Classify a reqwest transport error for the given provider
    ///
    /// The request URL is stripped from the message since catalog keys can
    /// travel in the query string; a status error keeps only the URL path.
    pub fn from_reqwest(provider: &str, error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            let locator = error.url().map(|u| u.path().to_string());
            return Self::from_status(provider, status.as_u16(), locator.as_deref());
        }
        let error = error.without_url();
        let reason = if error.is_timeout() {
            format!("request timed out: {}", error)
        } else if error.is_connect() {
            format!("connection failed: {}", error)
        } else {
            error.to_string()
        };
        Self::Network {
            provider: provider.to_string(),
            reason,
        }
    }

    /// Map a non-success HTTP status to the provider error taxonomy
    pub fn from_status(provider: &str, status: u16, locator: Option<&str>) -> Self {
        let provider = provider.to_string();
        match status {
            401 | 403 | 429 => Self::QuotaOrAuth { provider, status },
            404 | 410 => Self::NotFound {
                provider,
                locator: locator.unwrap_or_default().to_string(),
            },
            _ => Self::Http { provider, status },
        }
    }
}

/// Concatenation errors
#[derive(Debug, Error)]
pub enum ConcatError {
    /// The external tool exited with a non-zero status
    #[error("{strategy} failed with exit code {code:?}: {stderr}")]
    ToolFailed {
        /// Strategy that was running
        strategy: &'static str,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Tail of the tool's stderr
        stderr: String,
    },

    /// The tool reported success but left no usable output
    #[error("{strategy} produced a missing or empty output at {path}")]
    EmptyOutput {
        /// Strategy that was running
        strategy: &'static str,
        /// Output path that was checked
        path: PathBuf,
    },

    /// The concatenator cannot perform this strategy
    #[error("{strategy} is not available: {reason}")]
    Unavailable {
        /// Strategy that was requested
        strategy: &'static str,
        /// Why it is unavailable
        reason: String,
    },

    /// No input files were provided
    #[error("no input files to concatenate")]
    NoInputs,
}

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// The upload or link command could not be run or exited non-zero
    #[error("{operation} command failed: {reason}")]
    Command {
        /// Operation that failed ("upload" or "link")
        operation: &'static str,
        /// Failure description
        reason: String,
    },

    /// The uploader response did not contain the content identifier
    #[error("could not parse {field} from uploader response")]
    Parse {
        /// Field that was expected (e.g., "file id")
        field: &'static str,
        /// Raw response text, kept for the failure record
        response: String,
    },

    /// The link response lacked one of the two link kinds
    #[error("uploader response is missing the {kind} link")]
    MissingLink {
        /// Link kind ("direct" or "social")
        kind: &'static str,
    },
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Provider(e) => match e {
                ProviderError::Network { .. } => "network_error",
                ProviderError::QuotaOrAuth { .. } => "quota_or_auth",
                ProviderError::NotFound { .. } => "not_found",
                ProviderError::Http { .. } => "http_error",
                ProviderError::InvalidResponse { .. } => "invalid_response",
                ProviderError::EmptyResult { .. } => "empty_result",
            },
            Error::InsufficientSize { .. } => "insufficient_size",
            Error::AllProvidersExhausted { .. } => "all_providers_exhausted",
            Error::Concat(e) => match e {
                ConcatError::ToolFailed { .. } => "concat_tool_failed",
                ConcatError::EmptyOutput { .. } => "concat_empty_output",
                ConcatError::Unavailable { .. } => "concat_unavailable",
                ConcatError::NoInputs => "concat_no_inputs",
            },
            Error::Upload(e) => match e {
                UploadError::Command { .. } => "upload_command_failed",
                UploadError::Parse { .. } => "upload_parse_error",
                UploadError::MissingLink { .. } => "upload_missing_link",
            },
            Error::MissingSecret { .. } => "missing_secret",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::DiskSpaceCheckFailed(_) => "disk_space_check_failed",
            Error::ExternalTool(_) => "external_tool_error",
            Error::NotSupported(_) => "not_supported",
            Error::Cancelled => "cancelled",
        }
    }
}
