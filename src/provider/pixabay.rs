//! Pixabay stock video provider

use super::http::HttpFetcher;
use super::{ProviderClient, SizePolicy, sort_by_duration_desc};
use crate::config::{Config, ProviderKind};
use crate::error::{ProviderError, Result};
use crate::types::{DownloadedFile, Event, MediaCandidate, Resolution};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::broadcast;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    id: u64,
    #[serde(default)]
    tags: String,
    #[serde(default)]
    duration: u64,
    /// Renditions keyed by "large", "medium", "small", "tiny"
    #[serde(default)]
    videos: HashMap<String, Rendition>,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    #[serde(default)]
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    size: Option<u64>,
}

/// Pixabay `/api/videos/` client
///
/// Same selection timing as the other catalog provider: resolution filtered
/// through query parameters, duration-descending order, size accepted only
/// after download.
pub struct PixabayProvider {
    http: HttpFetcher,
    base_url: String,
    api_key: String,
    page_size: u32,
    min_width: u32,
    min_height: u32,
}

impl PixabayProvider {
    /// Create a provider from configuration and an API key
    pub fn new(config: &Config, api_key: String, event_tx: broadcast::Sender<Event>) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::new(ProviderKind::Pixabay, config.providers.request_timeout, event_tx)?,
            base_url: config.providers.pixabay_base_url.trim_end_matches('/').to_string(),
            api_key,
            // Pixabay rejects per_page outside 3..=200
            page_size: config.providers.page_size.clamp(3, 200),
            min_width: config.providers.min_width,
            min_height: config.providers.min_height,
        })
    }

    fn search_url(&self, query: &str) -> Result<url::Url> {
        url::Url::parse_with_params(
            &format!("{}/api/videos/", self.base_url),
            &[
                ("key", self.api_key.clone()),
                ("q", query.to_string()),
                ("per_page", self.page_size.to_string()),
                ("min_width", self.min_width.to_string()),
                ("min_height", self.min_height.to_string()),
            ],
        )
        .map_err(|e| {
            ProviderError::InvalidResponse {
                provider: ProviderKind::Pixabay.as_str().to_string(),
                reason: format!("bad base url: {}", e),
            }
            .into()
        })
    }

    fn to_candidate(&self, hit: Hit) -> Option<MediaCandidate> {
        let (resolution, rendition) = hit
            .videos
            .into_values()
            .filter(|r| !r.url.is_empty())
            .map(|r| (Resolution::new(r.width, r.height), r))
            .filter(|(resolution, _)| resolution.meets(self.min_width, self.min_height))
            .max_by_key(|(resolution, _)| resolution.area())?;

        Some(MediaCandidate {
            id: hit.id.to_string(),
            title: hit.tags,
            provider: ProviderKind::Pixabay,
            duration_secs: hit.duration,
            size_bytes: rendition.size.filter(|s| *s > 0),
            resolution,
            locator: rendition.url,
        })
    }
}

#[async_trait]
impl ProviderClient for PixabayProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Pixabay
    }

    fn size_policy(&self) -> SizePolicy {
        SizePolicy::Measured
    }

    async fn search(&self, query: &str) -> Result<Vec<MediaCandidate>> {
        let url = self.search_url(query)?;
        // The key travels in the query string
        let response: SearchResponse = self.http.get_json(url, None).await?;

        let mut candidates: Vec<_> = response
            .hits
            .into_iter()
            .filter_map(|h| self.to_candidate(h))
            .collect();
        sort_by_duration_desc(&mut candidates);

        tracing::debug!(provider = "pixabay", query, count = candidates.len(), "search complete");
        Ok(candidates)
    }

    async fn fetch(&self, candidate: &MediaCandidate, dest: &Path) -> Result<DownloadedFile> {
        self.http.download(candidate, dest).await
    }
}
