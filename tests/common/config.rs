//! Test configuration helpers

use filler_dl::config::{Backoff, BudgetConfig, RetryConfig};
use filler_dl::Config;
use std::path::Path;
use std::time::Duration;

/// Budget used by the scenario tests, in plain bytes
///
/// Mirrors the production ratios (target 1000, minimum 700, per-file 20..1000)
/// at a scale that keeps fixture files tiny.
pub fn small_budget() -> BudgetConfig {
    BudgetConfig {
        target_bytes: 1000,
        min_total_bytes: 700,
        per_file_min_bytes: 20,
        per_file_max_bytes: 1000,
    }
}

/// Retry policy with millisecond delays
pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        backoff: Backoff::Exponential,
        jitter: false,
    }
}

/// Configuration rooted in `dir` with fast retries and no disk precheck
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.work_dir = dir.join("work");
    config.budget = small_budget();
    config.download_retry = fast_retry(2);
    config.upload_retry = fast_retry(2);
    config.disk_space.enabled = false;
    config.cycle.inter_cycle_delay = Duration::ZERO;
    config.cycle.queries = vec!["ocean".to_string()];
    config.upload.records_path = dir.join("uploads.json");
    config
}
