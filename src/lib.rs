//! # filler-dl
//!
//! Bounded-size, multi-provider video acquisition and assembly.
//!
//! Each iteration of an [`UploadCycle`] searches content providers in a fixed
//! order, greedily downloads candidates until a byte budget is filled, joins the
//! files into one artifact and hands it to an external uploader.
//!
//! ## Design Philosophy
//!
//! filler-dl is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Bounded** - An artifact never exceeds its target size, and a batch below the minimum is discarded
//! - **Degrading, not failing** - Providers and concatenation strategies fall back in order
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use filler_dl::{Config, UploadCycle, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.upload.upload_command =
//!         vec!["uploader".into(), "put".into(), "{local}".into(), "{remote}".into()];
//!     config.upload.link_command = vec!["uploader".into(), "link".into(), "{remote}".into()];
//!
//!     let cycle = UploadCycle::from_config(config)?;
//!
//!     // Subscribe to events
//!     let mut events = cycle.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = run_with_shutdown(cycle, 3).await;
//!     println!("uploaded {} of {}", report.uploaded(), report.outcomes.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Greedy size-budget accumulation
pub mod accumulator;
/// Transient file cleanup
pub mod cleanup;
/// Concatenation strategies and the ffmpeg backend
pub mod concat;
/// Configuration types
pub mod config;
/// Upload cycle driver
pub mod cycle;
/// Error types
pub mod error;
/// Content providers
pub mod provider;
/// Append-only upload records
pub mod records;
/// Retry logic with exponential backoff
pub mod retry;
/// Provider credentials
pub mod secrets;
/// Acquisition sessions
pub mod session;
/// Core types and events
pub mod types;
/// Upload backends
pub mod upload;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use accumulator::{Accumulation, SizeBudgetAccumulator};
pub use concat::{ConcatCapabilities, Concatenator, FfmpegConcatenator, concatenate};
pub use config::{BudgetConfig, Config, ProviderKind, RetryConfig};
pub use cycle::UploadCycle;
pub use error::{ConcatError, Error, ProviderError, Result, UploadError};
pub use provider::{PexelsProvider, PixabayProvider, ProviderClient, SizePolicy, YtDlpProvider};
pub use records::RecordStore;
pub use retry::{IsRetryable, with_retry};
pub use session::{AcquisitionSession, ProviderSource};
pub use types::{
    Artifact, ConcatStrategy, CycleReport, DownloadedFile, Event, IterationOutcome, MediaCandidate,
    Resolution, UploadRecord,
};
pub use upload::{CommandUploader, PublicLinks, UploadReceipt, Uploader};

/// Run an upload cycle with graceful signal handling.
///
/// Races the cycle against a termination signal. On signal the cycle's
/// cancellation token is cancelled, the in-flight step is allowed to finish,
/// and [`UploadCycle::shutdown`] removes transient files.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use filler_dl::{Config, UploadCycle, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cycle = UploadCycle::from_config(Config::default())?;
///
///     // Run with automatic signal handling
///     let report = run_with_shutdown(cycle, 5).await;
///     println!("cancelled: {}", report.cancelled);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(cycle: UploadCycle, iterations: u32) -> CycleReport {
    let token = cycle.cancellation_token();
    let run = cycle.run(iterations);
    tokio::pin!(run);

    tokio::select! {
        report = &mut run => report,
        _ = wait_for_signal() => {
            token.cancel();
            let report = run.await;
            cycle.shutdown().await;
            report
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
