use std::{collections::HashSet, sync::Arc, time::Duration};

use tokio::time;
use triage_domain::{DiffMetric, Digest, diff_id, is_valid_digest};
use triage_storage::MetricsCache;

use crate::{
	PixelDiffer,
	metrics::{Counters, DIFF_CACHE_HITS, DIFF_COMPUTED, DIFF_ERRORS},
};

/// Compute-on-miss front of the metric cache.
pub struct DiffStore {
	cache: MetricsCache,
	differ: Arc<dyn PixelDiffer>,
	counters: Arc<dyn Counters>,
	timeout: Duration,
}
impl DiffStore {
	pub fn new(
		cache: MetricsCache,
		differ: Arc<dyn PixelDiffer>,
		counters: Arc<dyn Counters>,
		timeout: Duration,
	) -> Self {
		Self { cache, differ, counters, timeout }
	}

	/// Metric between `left` and `right`, or `None` when it can be neither loaded nor computed.
	///
	/// Cache failures degrade to a recomputation; a freshly computed metric that cannot be cached is
	/// still returned. Digests that cannot form a diff id are never compared.
	pub async fn get(&self, left: &str, right: &str) -> Option<DiffMetric> {
		if !is_valid_digest(left) || !is_valid_digest(right) {
			self.counters.error_increment(DIFF_ERRORS);

			tracing::warn!(left, right, "Refusing to diff malformed digests.");

			return None;
		}

		let id = diff_id(left, right);

		match self.cache.get(&id).await {
			Ok(Some(metric)) => {
				self.counters.increment(DIFF_CACHE_HITS);

				return Some(metric);
			},
			Ok(None) => {},
			Err(err) => {
				tracing::warn!(diff_id = %id, error = %err, "Failed to read cached diff metric.");
			},
		}

		match time::timeout(self.timeout, self.differ.compute(left, right)).await {
			Ok(Ok(metric)) => {
				self.counters.increment(DIFF_COMPUTED);

				if let Err(err) = self.cache.put(&id, &metric).await {
					tracing::warn!(diff_id = %id, error = %err, "Failed to cache diff metric.");
				}

				Some(metric)
			},
			Ok(Err(err)) => {
				self.counters.error_increment(DIFF_ERRORS);

				tracing::error!(left, right, error = %err, "Failed to compute diff metric.");

				None
			},
			Err(_) => {
				self.counters.error_increment(DIFF_ERRORS);

				tracing::error!(
					left,
					right,
					timeout_ms = self.timeout.as_millis() as u64,
					"Diff computation timed out."
				);

				None
			},
		}
	}

	/// Unavailable digests, or an empty set when the differ cannot report them in time.
	pub async fn unavailable_digests(&self) -> HashSet<Digest> {
		match time::timeout(self.timeout, self.differ.unavailable_digests()).await {
			Ok(Ok(digests)) => digests,
			Ok(Err(err)) => {
				tracing::warn!(error = %err, "Failed to load unavailable digests.");

				HashSet::new()
			},
			Err(_) => {
				tracing::warn!(
					timeout_ms = self.timeout.as_millis() as u64,
					"Loading unavailable digests timed out."
				);

				HashSet::new()
			},
		}
	}
}
