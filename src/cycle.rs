//! Upload cycle: repeated sessions, uploads and records
//!
//! Each iteration picks a query at random, runs an [`AcquisitionSession`],
//! uploads the artifact, creates public links and appends an
//! [`UploadRecord`]. Iterations are independent: a failure is reported in the
//! [`CycleReport`] and the next iteration starts from a clean work directory.

use crate::cleanup::cleanup_transient;
use crate::concat::{Concatenator, FfmpegConcatenator};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::provider::ProviderClient;
use crate::records::RecordStore;
use crate::retry::with_retry;
use crate::session::{AcquisitionSession, ProviderSource};
use crate::types::{Artifact, CycleReport, Event, IterationOutcome, UploadRecord};
use crate::upload::{CommandUploader, Uploader, remote_name};
use crate::utils::remove_file_logged;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Event channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Drives acquisition sessions and uploads
///
/// # Examples
///
/// ```no_run
/// use filler_dl::{Config, UploadCycle};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_json_file(std::path::Path::new("filler-dl.json"))?;
/// let cycle = UploadCycle::from_config(config)?;
///
/// let mut events = cycle.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// let report = cycle.run(3).await;
/// println!("{} uploaded, {} failed", report.uploaded(), report.failed());
/// # Ok(())
/// # }
/// ```
pub struct UploadCycle {
    config: Arc<Config>,
    session: AcquisitionSession,
    uploader: Arc<dyn Uploader>,
    records: RecordStore,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl UploadCycle {
    /// Create a cycle with explicit concatenation and upload backends
    ///
    /// Providers are built from configuration at the start of every session.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] when the configuration does not validate.
    pub fn new(
        config: Config,
        concatenator: Arc<dyn Concatenator>,
        uploader: Arc<dyn Uploader>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        let session = AcquisitionSession::new(
            config.clone(),
            ProviderSource::Configured,
            concatenator,
            event_tx.clone(),
            cancel.clone(),
        );

        Ok(Self {
            records: RecordStore::new(config.upload.records_path.clone()),
            config,
            session,
            uploader,
            event_tx,
            cancel,
        })
    }

    /// Create a cycle backed by ffmpeg and the configured uploader commands
    ///
    /// # Errors
    ///
    /// - [`Error::NotSupported`] when ffmpeg cannot be found
    /// - [`Error::Config`] when the uploader commands are missing
    pub fn from_config(config: Config) -> Result<Self> {
        let ffmpeg = FfmpegConcatenator::from_config(&config.tools)
            .ok_or_else(|| Error::NotSupported("ffmpeg binary not found".to_string()))?
            .with_frame_size(config.providers.min_width, config.providers.min_height);
        let uploader = CommandUploader::new(&config.upload)?;
        Self::new(config, Arc::new(ffmpeg), Arc::new(uploader))
    }

    /// Use a fixed provider list instead of building providers from configuration
    pub fn with_providers(mut self, providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        self.session.set_providers(ProviderSource::Fixed(providers));
        self
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the cycle between steps when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The record store uploads are appended to
    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Run `iterations` independent iterations
    ///
    /// Never fails as a whole: each iteration's result lands in the report.
    pub async fn run(&self, iterations: u32) -> CycleReport {
        let mut report = CycleReport::default();

        for iteration in 0..iterations {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let query = self.pick_query();
            tracing::info!(iteration, query = %query, "starting iteration");
            self.event_tx
                .send(Event::SessionStarted {
                    iteration,
                    query: query.clone(),
                })
                .ok();

            match self.run_iteration(&query).await {
                Ok(record) => {
                    report.outcomes.push(IterationOutcome::Uploaded { record });
                }
                Err(Error::Cancelled) => {
                    tracing::info!(iteration, "iteration cancelled");
                    report.cancelled = true;
                    cleanup_transient(&self.config.work_dir).await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(iteration, query = %query, error = %e, code = e.error_code(), "iteration failed");
                    self.event_tx
                        .send(Event::IterationFailed {
                            iteration,
                            code: e.error_code().to_string(),
                            error: e.to_string(),
                        })
                        .ok();
                    report.outcomes.push(IterationOutcome::Failed {
                        query,
                        code: e.error_code().to_string(),
                        message: e.to_string(),
                    });
                }
            }

            cleanup_transient(&self.config.work_dir).await;

            if iteration + 1 < iterations {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.cycle.inter_cycle_delay) => {}
                    _ = self.cancel.cancelled() => {
                        report.cancelled = true;
                        break;
                    }
                }
            }
        }

        tracing::info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            cancelled = report.cancelled,
            "cycle finished"
        );
        report
    }

    /// Run one iteration for `query`: session, upload, links, record
    pub async fn run_iteration(&self, query: &str) -> Result<UploadRecord> {
        let artifact = self.session.run(query).await?;

        let result = self.publish(&artifact, query).await;
        // A failed upload leaves nothing worth keeping; a successful one only
        // keeps the artifact when configured to
        if result.is_err() || self.config.upload.delete_after_upload {
            remove_file_logged(&artifact.path).await;
        }
        result
    }

    async fn publish(&self, artifact: &Artifact, query: &str) -> Result<UploadRecord> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let file_name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Io(std::io::Error::other("artifact path has no file name")))?;
        let remote = remote_name(&self.config.upload, &file_name);
        let retry = &self.config.upload_retry;

        tracing::info!(
            uploader = self.uploader.name(),
            remote = %remote,
            size_bytes = artifact.size_bytes,
            "uploading artifact"
        );
        let receipt = with_retry(retry, "upload", || self.uploader.upload(&artifact.path, &remote)).await?;
        let links = with_retry(retry, "create public link", || self.uploader.create_public_link(&remote)).await?;

        let record = UploadRecord {
            file_name: remote.clone(),
            file_id: receipt.file_id,
            direct_link: links.direct,
            social_link: links.social,
            size_bytes: artifact.size_bytes,
            provider: artifact.provider,
            query: query.to_string(),
            uploaded_at: chrono::Utc::now(),
        };
        self.records.append(&record).await?;

        self.event_tx
            .send(Event::Uploaded {
                file_name: record.file_name.clone(),
                file_id: record.file_id.clone(),
            })
            .ok();
        Ok(record)
    }

    /// Stop the cycle and remove transient files
    pub async fn shutdown(&self) {
        tracing::info!("shutting down upload cycle");
        self.cancel.cancel();
        cleanup_transient(&self.config.work_dir).await;
        self.event_tx.send(Event::Shutdown).ok();
    }

    fn pick_query(&self) -> String {
        self.config
            .cycle
            .queries
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_default()
    }
}
