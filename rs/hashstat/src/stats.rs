//! Per-client running statistics.
//!
//! Each observation is a payload size and the time it took to process.
//! Observations are folded into a [StatsRecord] keyed by client, without storing them individually.
//! Means are recomputed incrementally from the previous mean, so floating-point rounding accumulates.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// The number of bytes in a mebibyte.
pub const MIB: f64 = 1024.0 * 1024.0;

/// Running statistics for a single client.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsRecord {
	/// The number of observations, always at least 1.
	#[cfg_attr(feature = "serde", serde(rename = "active"))]
	pub count: u64,

	/// The largest payload observed, in bytes.
	pub max_payload: u64,

	/// The mean payload size, in bytes.
	pub average_payload: f64,

	/// The mean of `size_in_mib / processing_time_ms` across observations.
	#[cfg_attr(feature = "serde", serde(rename = "average_time_per_mb"))]
	pub average_time_per_mib: f64,
}

impl StatsRecord {
	/// A record containing a single observation.
	pub fn new(size: u64, time_ms: f64) -> Self {
		Self {
			count: 1,
			max_payload: size,
			average_payload: size as f64,
			average_time_per_mib: time_per_mib(size, time_ms),
		}
	}

	/// Fold another observation into the record.
	pub fn observe(&mut self, size: u64, time_ms: f64) {
		let n = self.count as f64;

		self.count += 1;
		self.max_payload = self.max_payload.max(size);
		self.average_payload = (self.average_payload * n + size as f64) / (n + 1.0);
		self.average_time_per_mib = (self.average_time_per_mib * n + time_per_mib(size, time_ms)) / (n + 1.0);
	}
}

/// The contribution of a single observation to [StatsRecord::average_time_per_mib].
///
/// Returns 0.0 whenever the ratio is not a finite number or the time is not positive.
/// A zero duration would otherwise poison the running mean with infinity or NaN forever.
pub fn time_per_mib(size: u64, time_ms: f64) -> f64 {
	let ratio = (size as f64 / MIB) / time_ms;

	if time_ms > 0.0 && ratio.is_finite() {
		ratio
	} else {
		tracing::debug!(size, time_ms, "degenerate processing time, ignoring ratio");
		0.0
	}
}

/// A shared store of [StatsRecord]s, keyed by client.
///
/// Cloning produces another handle to the same store.
/// Every operation holds a single lock for its whole duration, so updates are linearizable:
/// concurrent updates to the same key behave as if applied one after another.
#[derive(Clone, Default)]
pub struct StatsAggregator {
	records: Arc<Mutex<HashMap<String, StatsRecord>>>,
}

impl StatsAggregator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fold an observation into the record for `key`, creating it if needed.
	///
	/// Returns a snapshot of the record after the update.
	pub fn update(&self, key: &str, size: u64, time_ms: f64) -> StatsRecord {
		let mut records = self.records.lock();

		match records.get_mut(key) {
			Some(record) => {
				record.observe(size, time_ms);
				*record
			}
			None => {
				let record = StatsRecord::new(size, time_ms);
				records.insert(key.to_string(), record);
				record
			}
		}
	}

	/// The current record for `key`, or `None` if it has never been observed.
	pub fn read(&self, key: &str) -> Option<StatsRecord> {
		self.records.lock().get(key).copied()
	}

	/// The number of distinct keys observed.
	pub fn len(&self) -> usize {
		self.records.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn assert_close(actual: f64, expected: f64) {
		assert!(
			(actual - expected).abs() <= expected.abs() * 1e-12,
			"expected {expected}, got {actual}"
		);
	}

	#[test]
	fn test_first_observation() {
		let stats = StatsAggregator::new();
		let record = stats.update("example.com", 100, 50.0);

		assert_eq!(record.count, 1);
		assert_eq!(record.max_payload, 100);
		assert_eq!(record.average_payload, 100.0);
		assert_close(record.average_time_per_mib, (100.0 / 1048576.0) / 50.0);

		assert_eq!(stats.read("example.com"), Some(record));
	}

	#[test]
	fn test_two_observations() {
		let stats = StatsAggregator::new();
		stats.update("example.com", 100, 50.0);
		let record = stats.update("example.com", 300, 25.0);

		assert_eq!(record.count, 2);
		assert_eq!(record.max_payload, 300);
		assert_eq!(record.average_payload, 200.0);

		let first = (100.0 / MIB) / 50.0;
		let second = (300.0 / MIB) / 25.0;
		assert_close(record.average_time_per_mib, (first + second) / 2.0);
	}

	#[test]
	fn test_max_is_kept() {
		let stats = StatsAggregator::new();
		stats.update("a", 500, 1.0);
		stats.update("a", 10, 1.0);
		let record = stats.update("a", 20, 1.0);

		assert_eq!(record.count, 3);
		assert_eq!(record.max_payload, 500);
		assert_close(record.average_payload, 530.0 / 3.0);
	}

	#[test]
	fn test_read_missing() {
		let stats = StatsAggregator::new();
		assert_eq!(stats.read("nobody"), None);
		assert!(stats.is_empty());
	}

	#[test]
	fn test_keys_are_independent() {
		let stats = StatsAggregator::new();
		stats.update("a", 1, 1.0);
		stats.update("b", 2, 1.0);
		stats.update("b", 4, 1.0);

		assert_eq!(stats.read("a").unwrap().count, 1);
		assert_eq!(stats.read("b").unwrap().count, 2);
		assert_eq!(stats.read("b").unwrap().average_payload, 3.0);
		assert_eq!(stats.len(), 2);
	}

	#[test]
	fn test_clone_shares_store() {
		let stats = StatsAggregator::new();
		let cloned = stats.clone();
		cloned.update("a", 1, 1.0);

		assert!(stats.read("a").is_some());
	}

	#[test]
	fn test_zero_time() {
		assert_eq!(time_per_mib(1024, 0.0), 0.0);
		assert_eq!(time_per_mib(0, 0.0), 0.0);
		assert_eq!(time_per_mib(1024, -1.0), 0.0);
		assert_eq!(time_per_mib(1024, f64::NAN), 0.0);
		assert_eq!(time_per_mib(0, 10.0), 0.0);
		assert_close(time_per_mib(1024 * 1024, 2.0), 0.5);

		let stats = StatsAggregator::new();
		stats.update("a", 1024, 0.0);
		let record = stats.update("a", 1024 * 1024, 1.0);

		assert_eq!(record.count, 2);
		assert!(record.average_time_per_mib.is_finite());
		assert_close(record.average_time_per_mib, 0.5);
	}

	#[test]
	fn test_concurrent_updates() {
		const THREADS: usize = 8;
		const UPDATES: usize = 100;

		let stats = StatsAggregator::new();

		std::thread::scope(|s| {
			for _ in 0..THREADS {
				let stats = stats.clone();
				s.spawn(move || {
					for _ in 0..UPDATES {
						stats.update("shared", 100, 50.0);
					}
				});
			}
		});

		let record = stats.read("shared").unwrap();
		assert_eq!(record.count, (THREADS * UPDATES) as u64);
		assert_eq!(record.max_payload, 100);
		assert_close(record.average_payload, 100.0);
		assert_close(record.average_time_per_mib, (100.0 / MIB) / 50.0);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_tasks() {
		let stats = StatsAggregator::new();

		let tasks: Vec<_> = (0..100u64)
			.map(|i| {
				let stats = stats.clone();
				tokio::spawn(async move { stats.update("shared", i, 1.0) })
			})
			.collect();

		for task in tasks {
			task.await.unwrap();
		}

		let record = stats.read("shared").unwrap();
		assert_eq!(record.count, 100);
		assert_eq!(record.max_payload, 99);
		assert_close(record.average_payload, 49.5);
	}
}
