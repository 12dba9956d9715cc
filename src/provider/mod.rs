//! Content providers
//!
//! A provider turns a query into an ordered list of [`MediaCandidate`]s and
//! fetches a candidate's bytes to a local path. Each provider declares a
//! [`SizePolicy`] describing when the size budget can judge its candidates.
//!
//! | Provider | Policy | Source |
//! |----------|--------|--------|
//! | [`YtDlpProvider`] | [`SizePolicy::Estimated`] | external `yt-dlp` search |
//! | [`PexelsProvider`] | [`SizePolicy::Measured`] | Pexels video API |
//! | [`PixabayProvider`] | [`SizePolicy::Measured`] | Pixabay video API |

mod http;
mod pexels;
mod pixabay;
mod progress;
mod ytdlp;

pub use http::HttpFetcher;
pub use pexels::PexelsProvider;
pub use pixabay::PixabayProvider;
pub use progress::TransferProgress;
pub use ytdlp::YtDlpProvider;

use crate::config::{BudgetConfig, Config, ProviderKind};
use crate::error::Result;
use crate::secrets::Secrets;
use crate::types::{DownloadedFile, Event, MediaCandidate};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

/// When a provider's candidate sizes become trustworthy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizePolicy {
    /// Candidates carry a reported size; the budget is checked before download
    Estimated,
    /// Sizes are only known after download; files are judged on actual bytes
    Measured,
}

/// A searchable, fetchable content source
///
/// # Examples
///
/// ```no_run
/// use filler_dl::provider::{ProviderClient, YtDlpProvider};
/// use filler_dl::Config;
/// use std::path::Path;
/// use tokio::sync::broadcast;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (tx, _rx) = broadcast::channel(64);
/// let provider = YtDlpProvider::from_config(&Config::default(), tx)
///     .ok_or("yt-dlp not found in PATH")?;
///
/// let candidates = provider.search("rain on window").await?;
/// if let Some(first) = candidates.first() {
///     let file = provider.fetch(first, Path::new("work/clip.mp4")).await?;
///     println!("{} bytes", file.size_bytes);
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Which source this is
    fn kind(&self) -> ProviderKind;

    /// Size policy the accumulator applies to this provider's candidates
    fn size_policy(&self) -> SizePolicy;

    /// Search for candidates, already filtered and in preference order
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`](crate::error::ProviderError) for transport
    /// failures, rejected requests and unreadable responses. An empty result
    /// is `Ok(vec![])`.
    async fn search(&self, query: &str) -> Result<Vec<MediaCandidate>>;

    /// Fetch a candidate's bytes to `dest`
    ///
    /// On failure nothing is left at `dest`.
    async fn fetch(&self, candidate: &MediaCandidate, dest: &Path) -> Result<DownloadedFile>;
}

/// Order candidates by duration, longest first
///
/// The sort is stable so equal durations keep the provider's order.
pub fn sort_by_duration_desc(candidates: &mut [MediaCandidate]) {
    candidates.sort_by(|a, b| b.duration_secs.cmp(&a.duration_secs));
}

/// Keep candidates whose reported size lies in the per-file window, largest first
///
/// Candidates without a reported size are dropped.
pub fn filter_and_sort_estimated(
    candidates: Vec<MediaCandidate>,
    budget: &BudgetConfig,
) -> Vec<MediaCandidate> {
    let mut kept: Vec<_> = candidates
        .into_iter()
        .filter(|c| {
            c.size_bytes.is_some_and(|size| {
                size >= budget.per_file_min_bytes && size <= budget.per_file_max_bytes
            })
        })
        .collect();
    kept.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    kept
}

/// Construct the configured providers, in configured order
///
/// Providers whose credential or binary is unavailable are left out with a
/// warning; the session then only tries the ones that remain.
pub fn build_providers(
    config: &Config,
    secrets: &Secrets,
    event_tx: &broadcast::Sender<Event>,
) -> Vec<Arc<dyn ProviderClient>> {
    let mut providers: Vec<Arc<dyn ProviderClient>> = Vec::with_capacity(config.providers.order.len());

    for kind in &config.providers.order {
        let built: Result<Arc<dyn ProviderClient>> = match kind {
            ProviderKind::YtDlp => match YtDlpProvider::from_config(config, event_tx.clone()) {
                Some(p) => Ok(Arc::new(p)),
                None => Err(crate::Error::NotSupported(
                    "yt-dlp binary not found".to_string(),
                )),
            },
            ProviderKind::Pexels => secrets
                .require(*kind, &config.secrets)
                .and_then(|key| PexelsProvider::new(config, key.to_string(), event_tx.clone()))
                .map(|p| Arc::new(p) as Arc<dyn ProviderClient>),
            ProviderKind::Pixabay => secrets
                .require(*kind, &config.secrets)
                .and_then(|key| PixabayProvider::new(config, key.to_string(), event_tx.clone()))
                .map(|p| Arc::new(p) as Arc<dyn ProviderClient>),
        };

        match built {
            Ok(provider) => providers.push(provider),
            Err(e) => tracing::warn!(provider = %kind, error = %e, "provider unavailable, skipping"),
        }
    }

    providers
}
