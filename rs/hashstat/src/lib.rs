//! # hashstat: streaming digests with running statistics
//!
//! `hashstat` hashes payloads of arbitrary length without buffering them, and folds the
//! size and processing time of each payload into a per-client running aggregate.
//!
//! ## API
//!
//! - [StreamDigester]: incremental MD5 over a sequence of byte chunks, finalized exactly once.
//! - [measure]: drives a fallible chunk stream into a [StreamDigester] and times it.
//! - [StatsAggregator]: a shared, keyed store of [StatsRecord]s updated atomically per observation.
//!
//! The aggregator is a cheap handle; clone it into every task that needs it.
//! There is no global state, construct one per process (or per test).

mod digest;
mod stats;

pub use digest::*;
pub use stats::*;
