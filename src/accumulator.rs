//! Greedy size-budget accumulation
//!
//! Walks a provider's candidates in order and downloads files until the
//! budget is filled or the candidates run out. The running total never
//! exceeds `target_bytes`; a batch that ends below `min_total_bytes` is
//! deleted in full.

use crate::config::{BudgetConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::provider::{ProviderClient, SizePolicy};
use crate::retry::with_retry;
use crate::types::{DownloadedFile, MediaCandidate};
use crate::utils::{remove_file_logged, transient_file_name};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Files selected for one artifact
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accumulation {
    /// Accepted files, in acceptance order
    pub files: Vec<DownloadedFile>,
    /// Sum of `files[*].size_bytes`
    pub total_bytes: u64,
}

/// Why a candidate was passed over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    /// Reported size would overshoot the target
    EstimateOverTarget,
    /// Reported size missing or outside the per-file window
    EstimateOutOfWindow,
    /// Actual size outside the per-file window
    ActualOutOfWindow,
    /// Actual size would overshoot the target
    ActualOverTarget,
}

impl Skip {
    fn as_str(&self) -> &'static str {
        match self {
            Skip::EstimateOverTarget => "estimate exceeds remaining budget",
            Skip::EstimateOutOfWindow => "estimate outside per-file window",
            Skip::ActualOutOfWindow => "size outside per-file window",
            Skip::ActualOverTarget => "size exceeds remaining budget",
        }
    }
}

/// Fills a size budget from one provider's candidates
#[derive(Debug, Clone)]
pub struct SizeBudgetAccumulator {
    budget: BudgetConfig,
    retry: RetryConfig,
    work_dir: PathBuf,
}

impl SizeBudgetAccumulator {
    /// Create an accumulator writing transient files into `work_dir`
    pub fn new(budget: BudgetConfig, retry: RetryConfig, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            budget,
            retry,
            work_dir: work_dir.into(),
        }
    }

    /// Download candidates until the budget is filled
    ///
    /// Each fetch is retried according to the download retry policy; a
    /// candidate that still fails is skipped. Skips never end the walk early.
    ///
    /// # Errors
    ///
    /// - [`Error::InsufficientSize`] when the accepted total is below
    ///   `min_total_bytes`; every downloaded file has been deleted by then
    /// - [`Error::Cancelled`] when `cancel` fires; downloaded files are deleted
    pub async fn accumulate(
        &self,
        provider: &dyn ProviderClient,
        candidates: &[MediaCandidate],
        cancel: &CancellationToken,
    ) -> Result<Accumulation> {
        let kind = provider.kind();
        let policy = provider.size_policy();
        let budget = &self.budget;
        let mut files: Vec<DownloadedFile> = Vec::new();
        let mut running: u64 = 0;

        for candidate in candidates {
            if cancel.is_cancelled() {
                discard(&files).await;
                return Err(Error::Cancelled);
            }

            if budget.target_bytes.saturating_sub(running) < budget.per_file_min_bytes {
                tracing::debug!(provider = %kind, running, "budget filled");
                break;
            }

            if policy == SizePolicy::Estimated
                && let Some(skip) = check_estimate(candidate, running, budget)
            {
                tracing::debug!(
                    provider = %kind,
                    candidate = %candidate.id,
                    estimate = ?candidate.size_bytes,
                    running,
                    reason = skip.as_str(),
                    "skipping candidate"
                );
                continue;
            }

            let dest = self
                .work_dir
                .join(transient_file_name(kind.as_str(), "mp4"));

            let label = format!("fetch {} {}", kind, candidate.id);
            let file = match with_retry(&self.retry, &label, || provider.fetch(candidate, &dest)).await {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!(
                        provider = %kind,
                        candidate = %candidate.id,
                        error = %e,
                        "fetch failed, skipping candidate"
                    );
                    remove_file_logged(&dest).await;
                    continue;
                }
            };

            if let Some(skip) = check_actual(policy, file.size_bytes, running, budget) {
                tracing::info!(
                    provider = %kind,
                    candidate = %candidate.id,
                    size_bytes = file.size_bytes,
                    running,
                    reason = skip.as_str(),
                    "rejecting downloaded file"
                );
                remove_file_logged(&file.path).await;
                continue;
            }

            running += file.size_bytes;
            tracing::info!(
                provider = %kind,
                candidate = %candidate.id,
                size_bytes = file.size_bytes,
                running,
                target = budget.target_bytes,
                "accepted file"
            );
            files.push(file);
        }

        if running < budget.min_total_bytes {
            tracing::warn!(
                provider = %kind,
                total = running,
                min = budget.min_total_bytes,
                files = files.len(),
                "accumulated size below minimum, discarding batch"
            );
            discard(&files).await;
            return Err(Error::InsufficientSize {
                provider: kind.as_str().to_string(),
                total: running,
                min: budget.min_total_bytes,
            });
        }

        Ok(Accumulation {
            files,
            total_bytes: running,
        })
    }

    /// Directory transient downloads are written to
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

fn check_estimate(candidate: &MediaCandidate, running: u64, budget: &BudgetConfig) -> Option<Skip> {
    let Some(estimate) = candidate.size_bytes else {
        return Some(Skip::EstimateOutOfWindow);
    };
    if estimate < budget.per_file_min_bytes || estimate > budget.per_file_max_bytes {
        return Some(Skip::EstimateOutOfWindow);
    }
    (running.saturating_add(estimate) > budget.target_bytes).then_some(Skip::EstimateOverTarget)
}

fn check_actual(policy: SizePolicy, actual: u64, running: u64, budget: &BudgetConfig) -> Option<Skip> {
    // Estimated candidates were windowed on their estimate; only a zero-byte
    // result is rejected on size alone
    let out_of_window = match policy {
        SizePolicy::Measured => actual < budget.per_file_min_bytes || actual > budget.per_file_max_bytes,
        SizePolicy::Estimated => actual == 0,
    };
    if out_of_window {
        return Some(Skip::ActualOutOfWindow);
    }
    (running.saturating_add(actual) > budget.target_bytes).then_some(Skip::ActualOverTarget)
}

async fn discard(files: &[DownloadedFile]) {
    for file in files {
        remove_file_logged(&file.path).await;
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backoff, ProviderKind};
    use crate::error::ProviderError;
    use crate::types::Resolution;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Writes files of scripted sizes; listed ids fail with a network error
    struct ScriptedProvider {
        policy: SizePolicy,
        actual_sizes: HashMap<String, u64>,
        failing: Vec<String>,
        fetched: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(policy: SizePolicy, sizes: &[(&str, u64)]) -> Self {
            Self {
                policy,
                actual_sizes: sizes.iter().map(|(id, s)| (id.to_string(), *s)).collect(),
                failing: Vec::new(),
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Pexels
        }

        fn size_policy(&self) -> SizePolicy {
            self.policy
        }

        async fn search(&self, _query: &str) -> Result<Vec<MediaCandidate>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, candidate: &MediaCandidate, dest: &Path) -> Result<DownloadedFile> {
            self.fetched.lock().unwrap().push(candidate.id.clone());
            if self.failing.contains(&candidate.id) {
                return Err(ProviderError::Network {
                    provider: "pexels".into(),
                    reason: "reset".into(),
                }
                .into());
            }
            let size = self.actual_sizes[&candidate.id];
            tokio::fs::write(dest, vec![0u8; size as usize]).await?;
            Ok(DownloadedFile {
                path: dest.to_path_buf(),
                size_bytes: size,
                provider: ProviderKind::Pexels,
            })
        }
    }

    fn budget() -> BudgetConfig {
        BudgetConfig {
            target_bytes: 1000,
            min_total_bytes: 700,
            per_file_min_bytes: 20,
            per_file_max_bytes: 1000,
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    fn candidate(id: &str, estimate: Option<u64>) -> MediaCandidate {
        MediaCandidate {
            id: id.to_string(),
            title: id.to_string(),
            provider: ProviderKind::Pexels,
            duration_secs: 10,
            size_bytes: estimate,
            resolution: Resolution::new(1920, 1080),
            locator: id.to_string(),
        }
    }

    fn file_count(dir: &Path) -> usize {
        walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }

    #[tokio::test]
    async fn estimated_scenario_keeps_only_the_900_file() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(
            SizePolicy::Estimated,
            &[("a", 900), ("b", 200), ("c", 150)],
        );
        let candidates = [
            candidate("a", Some(900)),
            candidate("b", Some(200)),
            candidate("c", Some(150)),
        ];
        let acc = SizeBudgetAccumulator::new(budget(), retry(), dir.path());

        let result = acc
            .accumulate(&provider, &candidates, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_bytes, 900);
        assert_eq!(result.files.len(), 1);
        assert_eq!(provider.fetched(), ["a"], "over-budget estimates are never downloaded");
        assert_eq!(file_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn measured_scenario_deletes_overflowing_downloads() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(
            SizePolicy::Measured,
            &[("a", 900), ("b", 200), ("c", 150)],
        );
        let candidates = [candidate("a", None), candidate("b", None), candidate("c", None)];
        let acc = SizeBudgetAccumulator::new(budget(), retry(), dir.path());

        let result = acc
            .accumulate(&provider, &candidates, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_bytes, 900);
        assert_eq!(provider.fetched(), ["a", "b", "c"]);
        assert_eq!(file_count(dir.path()), 1, "rejected downloads are deleted");
    }

    #[tokio::test]
    async fn measured_rejects_undersized_files_and_keeps_going() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(
            SizePolicy::Measured,
            &[("tiny", 5), ("a", 400), ("b", 350)],
        );
        let candidates = [candidate("tiny", None), candidate("a", None), candidate("b", None)];
        let acc = SizeBudgetAccumulator::new(budget(), retry(), dir.path());

        let result = acc
            .accumulate(&provider, &candidates, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_bytes, 750);
        assert_eq!(result.files.len(), 2);
        assert_eq!(
            result.files.iter().map(|f| f.size_bytes).sum::<u64>(),
            result.total_bytes
        );
    }

    #[tokio::test]
    async fn below_minimum_leaves_no_files() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(SizePolicy::Measured, &[("a", 300), ("b", 200)]);
        let candidates = [candidate("a", None), candidate("b", None)];
        let acc = SizeBudgetAccumulator::new(budget(), retry(), dir.path());

        let err = acc
            .accumulate(&provider, &candidates, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::InsufficientSize { total, min, .. } => {
                assert_eq!(total, 500);
                assert_eq!(min, 700);
            }
            other => panic!("expected InsufficientSize, got {other:?}"),
        }
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn total_never_exceeds_target() {
        let sizes: Vec<(String, u64)> = (0..40u64)
            .map(|i| (format!("c{i}"), 20 + (i * 37) % 400))
            .collect();
        let size_refs: Vec<(&str, u64)> = sizes.iter().map(|(id, s)| (id.as_str(), *s)).collect();

        for policy in [SizePolicy::Estimated, SizePolicy::Measured] {
            let dir = TempDir::new().unwrap();
            let provider = ScriptedProvider::new(policy, &size_refs);
            let candidates: Vec<_> = sizes
                .iter()
                .map(|(id, s)| candidate(id, Some(*s)))
                .collect();
            let mut small_budget = budget();
            small_budget.min_total_bytes = 0;
            let acc = SizeBudgetAccumulator::new(small_budget, retry(), dir.path());

            let result = acc
                .accumulate(&provider, &candidates, &CancellationToken::new())
                .await
                .unwrap();

            assert!(result.total_bytes <= small_budget.target_bytes, "{policy:?}");
            let on_disk: u64 = result
                .files
                .iter()
                .map(|f| std::fs::metadata(&f.path).unwrap().len())
                .sum();
            assert_eq!(on_disk, result.total_bytes, "{policy:?}");
        }
    }

    #[tokio::test]
    async fn failed_fetch_is_skipped_after_retries() {
        let dir = TempDir::new().unwrap();
        let mut provider = ScriptedProvider::new(SizePolicy::Measured, &[("bad", 0), ("good", 800)]);
        provider.failing.push("bad".into());
        let candidates = [candidate("bad", None), candidate("good", None)];
        let acc = SizeBudgetAccumulator::new(budget(), retry(), dir.path());

        let result = acc
            .accumulate(&provider, &candidates, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.total_bytes, 800);
        assert_eq!(provider.fetched(), ["bad", "bad", "good"], "two attempts, then skip");
    }

    #[tokio::test]
    async fn cancellation_discards_downloaded_files() {
        let dir = TempDir::new().unwrap();
        let provider = ScriptedProvider::new(SizePolicy::Measured, &[("a", 100)]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let acc = SizeBudgetAccumulator::new(budget(), retry(), dir.path());

        let err = acc
            .accumulate(&provider, &[candidate("a", None)], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(file_count(dir.path()), 0);
    }

    #[test]
    fn estimate_without_size_is_skipped() {
        assert_eq!(
            check_estimate(&candidate("x", None), 0, &budget()),
            Some(Skip::EstimateOutOfWindow)
        );
        assert_eq!(check_estimate(&candidate("x", Some(500)), 0, &budget()), None);
        assert_eq!(
            check_estimate(&candidate("x", Some(500)), 600, &budget()),
            Some(Skip::EstimateOverTarget)
        );
    }
}
