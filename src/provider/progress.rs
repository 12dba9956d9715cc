//! Transfer progress tracking for streamed downloads

use crate::config::ProviderKind;
use crate::types::Event;
use std::time::{Duration, Instant};

/// Minimum spacing between two progress events for the same transfer
const EMIT_INTERVAL: Duration = Duration::from_millis(500);

/// Tracks bytes written for one download and derives throughput and ETA
///
/// Throughput is measured over the window since the previous emitted event;
/// ETA uses the average rate since the transfer started.
#[derive(Debug)]
pub struct TransferProgress {
    provider: ProviderKind,
    candidate_id: String,
    total_bytes: Option<u64>,
    bytes: u64,
    started: Instant,
    window_start: Instant,
    window_bytes: u64,
}

impl TransferProgress {
    /// Start tracking a transfer
    pub fn new(provider: ProviderKind, candidate_id: &str, total_bytes: Option<u64>) -> Self {
        let now = Instant::now();
        Self {
            provider,
            candidate_id: candidate_id.to_string(),
            total_bytes,
            bytes: 0,
            started: now,
            window_start: now,
            window_bytes: 0,
        }
    }

    /// Bytes recorded so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Record `n` more bytes; returns an event when one is due
    pub fn record(&mut self, n: u64) -> Option<Event> {
        self.bytes += n;
        self.window_bytes += n;
        let now = Instant::now();
        if now.duration_since(self.window_start) < EMIT_INTERVAL {
            return None;
        }
        Some(self.snapshot(now))
    }

    /// Event describing the current state, resetting the throughput window
    pub fn finish(&mut self) -> Event {
        self.snapshot(Instant::now())
    }

    /// Replace the tracked totals with values reported by an external tool
    pub fn set_absolute(&mut self, bytes: u64, total_bytes: Option<u64>) -> Option<Event> {
        let delta = bytes.saturating_sub(self.bytes);
        if total_bytes.is_some() {
            self.total_bytes = total_bytes;
        }
        self.record(delta)
    }

    fn snapshot(&mut self, now: Instant) -> Event {
        let window = now.duration_since(self.window_start).as_secs_f64();
        let speed_bps = if window > 0.0 {
            (self.window_bytes as f64 / window) as u64
        } else {
            0
        };

        let elapsed = now.duration_since(self.started).as_secs_f64();
        let eta_secs = self.total_bytes.and_then(|total| {
            let remaining = total.saturating_sub(self.bytes);
            if remaining == 0 {
                return Some(0);
            }
            let avg = if elapsed > 0.0 { self.bytes as f64 / elapsed } else { 0.0 };
            (avg > 0.0).then(|| (remaining as f64 / avg).ceil() as u64)
        });

        self.window_start = now;
        self.window_bytes = 0;

        Event::Downloading {
            provider: self.provider,
            candidate_id: self.candidate_id.clone(),
            bytes: self.bytes,
            total_bytes: self.total_bytes,
            speed_bps,
            eta_secs,
        }
    }
}
