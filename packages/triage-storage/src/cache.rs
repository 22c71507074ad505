use std::sync::Arc;

use tokio::task::JoinHandle;
use triage_domain::{DiffMetric, split_diff_id};

use crate::{
	Error, MetricsStore, Result,
	migrate::LegacyMigrator,
	record::{self, MetricsRecord},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
	pub scanned: usize,
	pub unreadable: usize,
}

/// Persistent, content-addressed cache of diff metrics keyed by [`triage_domain::diff_id`].
///
/// Safe for unlimited concurrent use. Metrics are deterministic in their inputs, so a second `put`
/// for the same id is a redundant upsert.
#[derive(Clone)]
pub struct MetricsCache {
	store: Arc<dyn MetricsStore>,
	migrator: Arc<LegacyMigrator>,
}
impl MetricsCache {
	pub fn new(store: Arc<dyn MetricsStore>) -> Self {
		let migrator = Arc::new(LegacyMigrator::new(store.clone()));

		Self { store, migrator }
	}

	/// Returns the cached metric for `id`, decoding and scheduling a rewrite of legacy records.
	///
	/// Records that cannot be decoded read as absent. Ids that do not name two valid digests are
	/// rejected.
	pub async fn get(&self, id: &str) -> Result<Option<DiffMetric>> {
		check_id(id)?;

		let Some(raw) = self.store.read(id).await? else {
			return Ok(None);
		};
		let record = record::decode_record(&raw).unwrap_or_else(|err| {
			tracing::warn!(diff_id = id, error = %err, "Stored record has an unknown layout.");

			MetricsRecord { id: id.to_string(), diff_metrics: Vec::new() }
		});

		if LegacyMigrator::needs_migration(id, &record) {
			return Ok(self.migrator.recover(id, &record, &raw));
		}

		match record::decode_metric(&record.diff_metrics) {
			Ok(metric) => Ok(Some(metric)),
			Err(err) => {
				tracing::warn!(diff_id = id, error = %err, "Failed to decode cached diff metric.");

				Ok(None)
			},
		}
	}

	pub async fn put(&self, id: &str, metric: &DiffMetric) -> Result<()> {
		check_id(id)?;

		let encoded = record::encode_record(id, metric)?;

		self.store.write(id, encoded).await
	}

	/// Removes every cached metric that involves any of `digests`.
	pub async fn purge(&self, digests: &[String]) -> Result<usize> {
		let removed = self.store.purge_digests(digests).await?;

		tracing::info!(digests = digests.len(), removed, "Purged cached diff metrics.");

		Ok(removed)
	}

	/// Loads every stored record, which migrates legacy ones, then rebuilds the digest index.
	pub async fn migrate_all(&self) -> Result<MigrationReport> {
		let ids = self.store.list_ids().await?;
		let mut report = MigrationReport { scanned: ids.len(), unreadable: 0 };

		tracing::info!(records = ids.len(), "Processing diff metric records.");

		for id in &ids {
			match self.get(id).await {
				Ok(Some(_)) => {},
				Ok(None) => report.unreadable += 1,
				Err(err) => {
					report.unreadable += 1;

					tracing::error!(diff_id = %id, error = %err, "Failed to convert legacy record.");
				},
			}
		}

		self.migrator.flush().await;
		self.store.reindex().await?;

		tracing::info!(
			scanned = report.scanned,
			unreadable = report.unreadable,
			"Legacy conversion completed."
		);

		Ok(report)
	}

	/// Runs [`Self::migrate_all`] as a detached task.
	pub fn convert_from_legacy(&self) -> JoinHandle<()> {
		let cache = self.clone();

		tokio::spawn(async move {
			if let Err(err) = cache.migrate_all().await {
				tracing::error!(error = %err, "Legacy conversion failed.");
			}
		})
	}

	/// Waits for background rewrites started by earlier reads.
	pub async fn flush_migrations(&self) {
		self.migrator.flush().await;
	}
}

fn check_id(id: &str) -> Result<()> {
	if split_diff_id(id).is_none() {
		return Err(Error::InvalidArgument(format!("Diff id {id:?} does not name two digests.")));
	}

	Ok(())
}
