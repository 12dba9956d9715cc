//! Pexels stock video provider

use super::http::HttpFetcher;
use super::{ProviderClient, SizePolicy, sort_by_duration_desc};
use crate::config::{Config, ProviderKind};
use crate::error::{ProviderError, Result};
use crate::types::{DownloadedFile, Event, MediaCandidate, Resolution};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio::sync::broadcast;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: u64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    file_type: Option<String>,
    link: String,
    #[serde(default)]
    size: Option<u64>,
}

/// Pexels `/videos/search` client
///
/// Filters by minimum resolution through query parameters, keeps the largest
/// mp4 rendition meeting that resolution, and orders by duration descending.
/// Sizes are only known after download.
pub struct PexelsProvider {
    http: HttpFetcher,
    base_url: String,
    api_key: String,
    page_size: u32,
    min_width: u32,
    min_height: u32,
}

impl PexelsProvider {
    /// Create a provider from configuration and an API key
    pub fn new(config: &Config, api_key: String, event_tx: broadcast::Sender<Event>) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(ProviderKind::Pexels, config.providers.request_timeout, event_tx)?,
            base_url: config.providers.pexels_base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: config.providers.page_size.clamp(1, 80),
            min_width: config.providers.min_width,
            min_height: config.providers.min_height,
        })
    }

    fn search_url(&self, query: &str) -> Result<url::Url> {
        url::Url::parse_with_params(
            &format!("{}/videos/search", self.base_url),
            &[
                ("query", query.to_string()),
                ("per_page", self.page_size.to_string()),
                ("min_width", self.min_width.to_string()),
                ("min_height", self.min_height.to_string()),
            ],
        )
        .map_err(|e| {
            ProviderError::InvalidResponse {
                provider: ProviderKind::Pexels.as_str().to_string(),
                reason: format!("bad base url: {}", e),
            }
            .into()
        })
    }

    fn to_candidate(&self, video: Video) -> Option<MediaCandidate> {
        let best = video
            .video_files
            .into_iter()
            .filter(|f| f.file_type.as_deref().is_none_or(|t| t == "video/mp4"))
            .filter_map(|f| {
                let resolution = Resolution::new(f.width?, f.height?);
                resolution
                    .meets(self.min_width, self.min_height)
                    .then_some((resolution, f))
            })
            .max_by_key(|(resolution, _)| resolution.area())?;

        let (resolution, file) = best;
        Some(MediaCandidate {
            id: video.id.to_string(),
            title: video.url,
            provider: ProviderKind::Pexels,
            duration_secs: video.duration,
            size_bytes: file.size,
            resolution,
            locator: file.link,
        })
    }
}

#[async_trait]
impl ProviderClient for PexelsProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Pexels
    }

    fn size_policy(&self) -> SizePolicy {
        SizePolicy::Measured
    }

    async fn search(&self, query: &str) -> Result<Vec<MediaCandidate>> {
        let url = self.search_url(query)?;
        let response: SearchResponse = self.http.get_json(url, Some(&self.api_key)).await?;

        let mut candidates: Vec<_> = response
            .videos
            .into_iter()
            .filter_map(|v| self.to_candidate(v))
            .collect();
        sort_by_duration_desc(&mut candidates);

        tracing::debug!(provider = "pexels", query, count = candidates.len(), "search complete");
        Ok(candidates)
    }

    async fn fetch(&self, candidate: &MediaCandidate, dest: &Path) -> Result<DownloadedFile> {
        self.http.download(candidate, dest).await
    }
}
