use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use md5::{Digest as _, Md5};

/// Incremental MD5 over a stream of byte chunks.
///
/// Owned by a single request for its whole lifetime.
/// [Self::finalize] consumes the digester, so no chunk can be applied after the digest is produced.
#[derive(Clone, Default)]
pub struct StreamDigester {
	hasher: Md5,
	size: u64,
}

impl StreamDigester {
	pub fn new() -> Self {
		Self::default()
	}

	/// Feed the next chunk into the hash and the byte counter.
	pub fn update(&mut self, chunk: &[u8]) {
		self.hasher.update(chunk);
		self.size += chunk.len() as u64;
	}

	/// The number of bytes consumed so far.
	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn finalize(self) -> Digest {
		Digest {
			hash: hex::encode(self.hasher.finalize()),
			size: self.size,
		}
	}
}

/// The result of a finalized [StreamDigester].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digest {
	/// Lower-case hex encoding of the hash.
	pub hash: String,

	/// Total number of bytes hashed.
	pub size: u64,
}

/// Hash an in-memory buffer in one shot, returning the lower-case hex digest.
pub fn digest(data: &[u8]) -> String {
	let mut digester = StreamDigester::new();
	digester.update(data);
	digester.finalize().hash
}

/// A [Digest] along with the time it took to consume the stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
	pub hash: String,
	pub size: u64,
	pub elapsed: Duration,
}

impl Measurement {
	/// The processing time in fractional milliseconds.
	pub fn time_ms(&self) -> f64 {
		self.elapsed.as_secs_f64() * 1000.0
	}
}

/// Hash every chunk of `stream` and time it, from the first poll until the digest is finalized.
///
/// The first error yielded by the stream aborts the measurement.
/// The partial digest is discarded and the error is returned as-is.
pub async fn measure<S, B, E>(stream: S) -> Result<Measurement, E>
where
	S: Stream<Item = Result<B, E>>,
	B: AsRef<[u8]>,
{
	let start = Instant::now();
	let mut stream = std::pin::pin!(stream);
	let mut digester = StreamDigester::new();

	while let Some(chunk) = stream.next().await {
		match chunk {
			Ok(chunk) => digester.update(chunk.as_ref()),
			Err(err) => {
				tracing::trace!(size = digester.size(), "stream aborted");
				return Err(err);
			}
		}
	}

	let digest = digester.finalize();

	Ok(Measurement {
		hash: digest.hash,
		size: digest.size,
		elapsed: start.elapsed(),
	})
}
