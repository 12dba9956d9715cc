//! One attempt to produce one artifact for a query
//!
//! Providers are tried in their fixed order. For each provider the session
//! searches, fills the size budget and concatenates; the first provider that
//! yields an artifact ends the session. A provider that fails at any step is
//! recorded as a failed attempt and the next one is tried.

use crate::accumulator::SizeBudgetAccumulator;
use crate::concat::{Concatenator, concatenate};
use crate::config::Config;
use crate::error::{Error, ProviderError, Result};
use crate::provider::{ProviderClient, build_providers};
use crate::retry::with_retry;
use crate::secrets::Secrets;
use crate::types::{Artifact, Event};
use crate::utils::{check_disk_space, get_unique_path};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Where a session gets its providers from
#[derive(Clone)]
pub enum ProviderSource {
    /// Build from configuration, reading secrets at every session start
    Configured,
    /// A fixed, pre-built list (tests, embedding applications)
    Fixed(Vec<Arc<dyn ProviderClient>>),
}

impl ProviderSource {
    async fn resolve(
        &self,
        config: &Config,
        event_tx: &broadcast::Sender<Event>,
    ) -> Result<Vec<Arc<dyn ProviderClient>>> {
        match self {
            ProviderSource::Configured => {
                let secrets = Secrets::load(&config.secrets).await?;
                Ok(build_providers(config, &secrets, event_tx))
            }
            ProviderSource::Fixed(providers) => Ok(providers.clone()),
        }
    }
}

/// Acquisition session runner
pub struct AcquisitionSession {
    config: Arc<Config>,
    providers: ProviderSource,
    concatenator: Arc<dyn Concatenator>,
    accumulator: SizeBudgetAccumulator,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl AcquisitionSession {
    /// Create a session runner
    pub fn new(
        config: Arc<Config>,
        providers: ProviderSource,
        concatenator: Arc<dyn Concatenator>,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        let accumulator = SizeBudgetAccumulator::new(
            config.budget,
            config.download_retry.clone(),
            config.work_dir.clone(),
        );
        Self {
            config,
            providers,
            concatenator,
            accumulator,
            event_tx,
            cancel,
        }
    }

    /// Replace the provider source
    pub fn set_providers(&mut self, providers: ProviderSource) {
        self.providers = providers;
    }

    /// Produce one artifact for `query`
    ///
    /// # Errors
    ///
    /// - [`Error::AllProvidersExhausted`] when no provider produced an artifact
    /// - [`Error::InsufficientSpace`] / [`Error::DiskSpaceCheckFailed`] from the precheck
    /// - [`Error::Cancelled`] when the stop signal fires between steps
    pub async fn run(&self, query: &str) -> Result<Artifact> {
        let work_dir = &self.config.work_dir;
        tokio::fs::create_dir_all(work_dir).await?;
        check_disk_space(work_dir, self.config.budget.target_bytes, &self.config.disk_space)?;

        let providers = self.providers.resolve(&self.config, &self.event_tx).await?;
        let mut attempted = 0;

        for provider in &providers {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            attempted += 1;

            match self.try_provider(provider.as_ref(), query).await {
                Ok(artifact) => return Ok(artifact),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        provider = %provider.kind(),
                        query,
                        error = %e,
                        "provider attempt failed, trying next provider"
                    );
                    self.event_tx
                        .send(Event::ProviderFailed {
                            provider: provider.kind(),
                            error: e.to_string(),
                        })
                        .ok();
                }
            }
        }

        tracing::error!(query, attempted, "all providers exhausted");
        Err(Error::AllProvidersExhausted {
            query: query.to_string(),
            attempted,
        })
    }

    async fn try_provider(&self, provider: &dyn ProviderClient, query: &str) -> Result<Artifact> {
        let kind = provider.kind();
        let label = format!("search {}", kind);
        let candidates = with_retry(&self.config.download_retry, &label, || provider.search(query)).await?;

        tracing::info!(provider = %kind, query, candidates = candidates.len(), "search returned");
        self.event_tx
            .send(Event::ProviderAttempt {
                provider: kind,
                candidates: candidates.len(),
            })
            .ok();

        if candidates.is_empty() {
            return Err(ProviderError::EmptyResult {
                provider: kind.as_str().to_string(),
                query: query.to_string(),
            }
            .into());
        }

        let accumulation = self
            .accumulator
            .accumulate(provider, &candidates, &self.cancel)
            .await?;

        if self.cancel.is_cancelled() {
            for file in &accumulation.files {
                crate::utils::remove_file_logged(&file.path).await;
            }
            return Err(Error::Cancelled);
        }

        let artifact_path = self.artifact_path()?;
        let artifact = concatenate(
            accumulation.files,
            &artifact_path,
            self.concatenator.as_ref(),
            kind,
        )
        .await?;

        tracing::info!(
            provider = %kind,
            strategy = %artifact.strategy,
            size_bytes = artifact.size_bytes,
            path = ?artifact.path,
            "artifact assembled"
        );
        self.event_tx
            .send(Event::Concatenated {
                strategy: artifact.strategy,
                size_bytes: artifact.size_bytes,
            })
            .ok();
        Ok(artifact)
    }

    fn artifact_path(&self) -> Result<PathBuf> {
        let name = format!(
            "{}-{}.mp4",
            self.config.cycle.artifact_prefix,
            chrono::Utc::now().format("%Y%m%d-%H%M%S")
        );
        get_unique_path(&self.config.work_dir.join(name))
    }
}
