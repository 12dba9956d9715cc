//! Shared HTTP plumbing for catalog providers: JSON search calls and streamed fetches

use super::progress::TransferProgress;
use crate::config::ProviderKind;
use crate::error::{Error, ProviderError, Result};
use crate::types::{DownloadedFile, Event, MediaCandidate};
use crate::utils::partial_path;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

/// HTTP client bound to one provider
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    provider: ProviderKind,
    request_timeout: Duration,
    event_tx: broadcast::Sender<Event>,
}

impl HttpFetcher {
    /// Create a fetcher with the given per-request timeout
    pub fn new(
        provider: ProviderKind,
        request_timeout: Duration,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .user_agent(concat!("filler-dl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                Error::Io(std::io::Error::other(format!(
                    "Failed to create HTTP client: {}",
                    e
                )))
            })?;
        Ok(Self {
            client,
            provider,
            request_timeout,
            event_tx,
        })
    }

    fn name(&self) -> &'static str {
        self.provider.as_str()
    }

    /// GET a JSON document, mapping status codes onto [`ProviderError`]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: url::Url,
        authorization: Option<&str>,
    ) -> Result<T> {
        let mut request = self.client.get(url.clone()).timeout(self.request_timeout);
        if let Some(auth) = authorization {
            request = request.header("Authorization", auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(self.name(), status.as_u16(), Some(url.path())).into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(self.name(), e))?;

        serde_json::from_slice(&body).map_err(|e| {
            ProviderError::InvalidResponse {
                provider: self.name().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Stream a candidate's bytes to `dest`
    ///
    /// Bytes go to a `.partial` sibling first and are renamed into place once the
    /// body completes. Waiting for the response headers and every chunk read
    /// are each bounded by the request timeout. The partial file is removed on
    /// any failure.
    pub async fn download(&self, candidate: &MediaCandidate, dest: &Path) -> Result<DownloadedFile> {
        let partial = partial_path(dest);
        let result = self.stream_to(candidate, &partial).await;
        match result {
            Ok(size_bytes) => {
                tokio::fs::rename(&partial, dest).await?;
                tracing::debug!(
                    provider = self.name(),
                    candidate = %candidate.id,
                    size_bytes,
                    ?dest,
                    "download complete"
                );
                Ok(DownloadedFile {
                    path: dest.to_path_buf(),
                    size_bytes,
                    provider: self.provider,
                })
            }
            Err(e) => {
                crate::utils::remove_file_logged(&partial).await;
                Err(e)
            }
        }
    }

    async fn stream_to(&self, candidate: &MediaCandidate, partial: &Path) -> Result<u64> {
        let mut response = tokio::time::timeout(self.request_timeout, self.client.get(&candidate.locator).send())
            .await
            .map_err(|_| ProviderError::Network {
                provider: self.name().to_string(),
                reason: format!("no response headers within {:?}", self.request_timeout),
            })?
            .map_err(|e| ProviderError::from_reqwest(self.name(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(
                ProviderError::from_status(self.name(), status.as_u16(), Some(&candidate.locator))
                    .into(),
            );
        }

        let total = response.content_length().or(candidate.size_bytes);
        let mut progress = TransferProgress::new(self.provider, &candidate.id, total);
        let mut file = tokio::fs::File::create(partial).await?;

        loop {
            let chunk = tokio::time::timeout(self.request_timeout, response.chunk())
                .await
                .map_err(|_| ProviderError::Network {
                    provider: self.name().to_string(),
                    reason: format!("no data for {:?}", self.request_timeout),
                })?
                .map_err(|e| ProviderError::from_reqwest(self.name(), e))?;

            let Some(bytes) = chunk else { break };
            file.write_all(&bytes).await?;
            if let Some(event) = progress.record(bytes.len() as u64) {
                self.event_tx.send(event).ok();
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        self.event_tx.send(progress.finish()).ok();
        Ok(progress.bytes())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Resolution;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> (HttpFetcher, broadcast::Receiver<Event>) {
        let (tx, rx) = broadcast::channel(64);
        let f = HttpFetcher::new(ProviderKind::Pexels, Duration::from_secs(5), tx).unwrap();
        (f, rx)
    }

    fn candidate(locator: String) -> MediaCandidate {
        MediaCandidate {
            id: "42".into(),
            title: "clip".into(),
            provider: ProviderKind::Pexels,
            duration_secs: 10,
            size_bytes: None,
            resolution: Resolution::new(1920, 1080),
            locator,
        }
    }

    #[tokio::test]
    async fn download_writes_body_and_reports_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.mp4");
        let (f, mut rx) = fetcher();

        let file = f
            .download(&candidate(format!("{}/clip.mp4", server.uri())), &dest)
            .await
            .unwrap();

        assert_eq!(file.size_bytes, 4096);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 4096);
        assert!(!partial_path(&dest).exists(), "partial file must be renamed away");

        let event = rx.try_recv().unwrap();
        assert!(matches!(event, Event::Downloading { bytes: 4096, .. }));
    }

    #[tokio::test]
    async fn download_404_is_not_found_and_leaves_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.mp4");
        let (f, _rx) = fetcher();

        let err = f
            .download(&candidate(format!("{}/missing.mp4", server.uri())), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::NotFound { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn get_json_sends_authorization_and_maps_429() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(header("Authorization", "key-1"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let (f, _rx) = fetcher();
        let url = url::Url::parse(&format!("{}/search", server.uri())).unwrap();
        let err = f
            .get_json::<serde_json::Value>(url, Some("key-1"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::QuotaOrAuth { status: 429, .. })
        ));
    }

    #[tokio::test]
    async fn download_gives_up_on_a_server_that_never_answers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 16])
                    .set_delay(Duration::from_secs(6)),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.mp4");
        let (tx, _rx) = broadcast::channel(16);
        let f = HttpFetcher::new(ProviderKind::Pexels, Duration::from_secs(1), tx).unwrap();

        let started = std::time::Instant::now();
        let err = f
            .download(&candidate(format!("{}/slow.mp4", server.uri())), &dest)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
        assert!(matches!(err, Error::Provider(ProviderError::Network { .. })));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn transport_errors_do_not_echo_query_strings() {
        let (f, _rx) = fetcher();
        // Port 1 refuses connections
        let url = url::Url::parse("http://127.0.0.1:1/api/videos/?key=SUPERSECRETKEY&q=ocean").unwrap();

        let err = f.get_json::<serde_json::Value>(url, None).await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Network { .. })));
        assert!(!err.to_string().contains("SUPERSECRETKEY"), "{err}");
    }

    #[tokio::test]
    async fn not_found_locator_is_the_path_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (f, _rx) = fetcher();
        let url = url::Url::parse(&format!("{}/api/videos/?key=SUPERSECRETKEY", server.uri())).unwrap();
        let err = f.get_json::<serde_json::Value>(url, None).await.unwrap_err();

        match err {
            Error::Provider(ProviderError::NotFound { locator, .. }) => assert_eq!(locator, "/api/videos/"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn get_json_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let (f, _rx) = fetcher();
        let url = url::Url::parse(&server.uri()).unwrap();
        let err = f.get_json::<serde_json::Value>(url, None).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::InvalidResponse { .. })
        ));
    }
}
