//! Run upload cycles from a JSON configuration file
//!
//! This example demonstrates the core functionality of filler-dl:
//! - Loading configuration (budget, providers, uploader commands)
//! - Subscribing to pipeline events
//! - Running cycles with graceful SIGTERM/SIGINT handling
//!
//! Usage:
//!
//! ```bash
//! cargo run --example run_cycle -- filler-dl.json 3
//! ```
//!
//! API keys are read from the files named in `secrets` (default
//! `secrets/pexels_api_key` and `secrets/pixabay_api_key`).

use filler_dl::{Config, Event, UploadCycle, run_with_shutdown};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "filler-dl.json".to_string()));
    let config = Config::from_json_file(&config_path)?;
    let iterations = match args.next() {
        Some(n) => n.parse()?,
        None => config.cycle.iterations,
    };

    let cycle = UploadCycle::from_config(config)?;

    let mut events = cycle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::SessionStarted { iteration, query } => {
                    println!("▶ Iteration {}: searching \"{}\"", iteration + 1, query);
                }
                Event::ProviderAttempt { provider, candidates } => {
                    println!("  {} returned {} candidates", provider, candidates);
                }
                Event::Downloading {
                    candidate_id,
                    bytes,
                    speed_bps,
                    eta_secs,
                    ..
                } => {
                    println!(
                        "  ↓ {}: {:.1} MB at {:.1} MB/s (eta {})",
                        candidate_id,
                        bytes as f64 / 1_000_000.0,
                        speed_bps as f64 / 1_000_000.0,
                        eta_secs.map_or_else(|| "?".to_string(), |s| format!("{s}s"))
                    );
                }
                Event::ProviderFailed { provider, error } => {
                    println!("  ✗ {} failed: {}", provider, error);
                }
                Event::Concatenated { strategy, size_bytes } => {
                    println!("  ✓ Artifact via {}: {} bytes", strategy, size_bytes);
                }
                Event::Uploaded { file_name, file_id } => {
                    println!("  ✓ Uploaded {} as {}", file_name, file_id);
                }
                Event::IterationFailed { iteration, code, error } => {
                    println!("  ✗ Iteration {} failed [{}]: {}", iteration + 1, code, error);
                }
                Event::Shutdown => println!("Shutting down"),
            }
        }
    });

    let report = run_with_shutdown(cycle, iterations).await;
    println!(
        "Done: {} uploaded, {} failed{}",
        report.uploaded(),
        report.failed(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}
