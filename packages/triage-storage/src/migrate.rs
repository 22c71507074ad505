use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use triage_domain::{DiffMetric, diff, diff_id, split_diff_id};

use crate::{
	MetricsStore,
	record::{self, MetricsRecord},
};

/// Recovers metrics stored in the previous record layout and rewrites them in the background.
///
/// Recovery runs inline so the reader always gets the decoded value. The rewrite under the
/// canonical id, and the removal of the old id, are detached tasks whose failures are only logged.
pub struct LegacyMigrator {
	store: Arc<dyn MetricsStore>,
	pending: Mutex<Vec<JoinHandle<()>>>,
}
impl LegacyMigrator {
	pub fn new(store: Arc<dyn MetricsStore>) -> Self {
		Self { store, pending: Mutex::new(Vec::new()) }
	}

	/// A record needs migrating when it carries no payload or its id uses the old separator.
	pub fn needs_migration(id: &str, record: &MetricsRecord) -> bool {
		record.diff_metrics.is_empty() || diff::is_legacy_diff_id(id)
	}

	pub fn recover(&self, id: &str, record: &MetricsRecord, raw: &[u8]) -> Option<DiffMetric> {
		let metric = if record.diff_metrics.is_empty() {
			match record::decode_legacy(raw) {
				Ok(legacy) => legacy.into_metric().or_else(|| {
					tracing::error!(diff_id = id, "Record is not a valid legacy diff metric.");

					None
				})?,
				Err(err) => {
					tracing::error!(diff_id = id, error = %err, "Failed to decode legacy record.");

					return None;
				},
			}
		} else {
			match record::decode_metric(&record.diff_metrics) {
				Ok(metric) => metric,
				Err(err) => {
					tracing::error!(diff_id = id, error = %err, "Failed to decode diff metric payload.");

					return None;
				},
			}
		};
		let Some((left, right)) = split_diff_id(id) else {
			tracing::error!(diff_id = id, "Legacy record id does not name two digests.");

			return None;
		};

		self.schedule_rewrite(id.to_string(), diff_id(left, right), metric.clone());

		Some(metric)
	}

	/// Waits for every rewrite scheduled so far.
	pub async fn flush(&self) {
		let handles = std::mem::take(&mut *self.pending.lock().unwrap_or_else(|err| err.into_inner()));

		for handle in handles {
			if let Err(err) = handle.await {
				tracing::error!(error = %err, "Legacy record rewrite task failed.");
			}
		}
	}

	fn schedule_rewrite(&self, old_id: String, new_id: String, metric: DiffMetric) {
		let store = self.store.clone();
		let handle = tokio::spawn(async move {
			let encoded = match record::encode_record(&new_id, &metric) {
				Ok(encoded) => encoded,
				Err(err) => {
					tracing::error!(diff_id = %new_id, error = %err, "Failed to encode migrated record.");

					return;
				},
			};

			if let Err(err) = store.write(&new_id, encoded).await {
				tracing::error!(diff_id = %new_id, error = %err, "Failed to write migrated record.");

				return;
			}
			if new_id != old_id
				&& let Err(err) = store.delete(std::slice::from_ref(&old_id)).await
			{
				tracing::error!(diff_id = %old_id, error = %err, "Failed to delete legacy record.");
			}

			tracing::info!(old_id = %old_id, new_id = %new_id, "Legacy record migrated.");
		});
		let mut pending = self.pending.lock().unwrap_or_else(|err| err.into_inner());

		pending.retain(|handle| !handle.is_finished());
		pending.push(handle);
	}
}
