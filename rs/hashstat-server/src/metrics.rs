//! Minimal service metrics.
//!
//! Low-cardinality counters only; per-client numbers live in [hashstat::StatsAggregator].

use std::sync::{
	Arc,
	atomic::{AtomicU64, Ordering},
};

/// Thread-safe counters for basic service metrics.
#[derive(Clone, Default)]
pub struct MetricsTracker {
	active_digests: Arc<AtomicU64>,
	digests_completed: Arc<AtomicU64>,
	digests_aborted: Arc<AtomicU64>,
	bytes_hashed: Arc<AtomicU64>,
	stats_reads: Arc<AtomicU64>,
}

impl MetricsTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Start tracking a digest stream until the returned guard is dropped.
	pub fn start_digest(&self) -> DigestGuard {
		self.active_digests.fetch_add(1, Ordering::Relaxed);
		DigestGuard {
			metrics: self.clone(),
			complete: false,
		}
	}

	pub fn record_stats_read(&self) {
		self.stats_reads.fetch_add(1, Ordering::Relaxed);
	}

	pub fn active_digests(&self) -> u64 {
		self.active_digests.load(Ordering::Relaxed)
	}

	pub fn digests_completed(&self) -> u64 {
		self.digests_completed.load(Ordering::Relaxed)
	}

	pub fn digests_aborted(&self) -> u64 {
		self.digests_aborted.load(Ordering::Relaxed)
	}

	pub fn bytes_hashed(&self) -> u64 {
		self.bytes_hashed.load(Ordering::Relaxed)
	}

	pub fn stats_reads(&self) -> u64 {
		self.stats_reads.load(Ordering::Relaxed)
	}
}

/// Tracks a single in-flight digest stream.
///
/// Dropping the guard without calling [DigestGuard::complete] counts the stream as aborted.
/// This happens when the client disconnects and the request future is dropped mid-stream.
pub struct DigestGuard {
	metrics: MetricsTracker,
	complete: bool,
}

impl DigestGuard {
	pub fn complete(mut self, bytes: u64) {
		self.complete = true;
		self.metrics.digests_completed.fetch_add(1, Ordering::Relaxed);
		self.metrics.bytes_hashed.fetch_add(bytes, Ordering::Relaxed);
	}
}

impl Drop for DigestGuard {
	fn drop(&mut self) {
		self.metrics.active_digests.fetch_sub(1, Ordering::Relaxed);
		if !self.complete {
			self.metrics.digests_aborted.fetch_add(1, Ordering::Relaxed);
		}
	}
}
