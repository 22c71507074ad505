use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::{
	task::JoinHandle,
	time::{self as tokio_time, Instant, MissedTickBehavior},
};

use triage_config::Config;
use triage_storage::MetricsCache;

use crate::{
	Collaborators, Error, Result, TriageService,
	counts::{TileCounts, count_labels},
	expand::TestDetail,
	index::{LabeledTileIndex, ParamQuery},
	labeling::{LabeledTile, Partition, partition_tile},
	metrics::{ANALYSIS_ERRORS, ANALYSIS_RUNS},
	status::{Status, partition_status},
	with_timeout,
};

#[derive(Clone, Debug, Serialize)]
pub struct RebuildReport {
	pub commits: usize,
	pub tests: usize,
	pub traces: usize,
	pub ignored_traces: usize,
	pub elapsed_ms: u64,
}

/// A started [`TriageService`] and its background tasks.
pub struct Running {
	pub service: Arc<TriageService>,
	pub rebuild_loop: JoinHandle<()>,
	/// Present when the legacy cache sweep was requested at startup.
	pub legacy_migration: Option<JoinHandle<()>>,
}

/// One partition and the views derived from it.
pub(crate) struct PartitionState {
	pub(crate) tile: LabeledTile,
	pub(crate) index: LabeledTileIndex,
	pub(crate) counts: TileCounts,
	pub(crate) details: BTreeMap<String, TestDetail>,
}

pub(crate) struct Snapshot {
	pub(crate) current: PartitionState,
	pub(crate) ignored: PartitionState,
	pub(crate) status: Status,
}
impl Snapshot {
	pub(crate) fn partition(&self, include_ignores: bool) -> &PartitionState {
		if include_ignores { &self.ignored } else { &self.current }
	}
}

impl TriageService {
	/// Builds the service and starts the rebuild loop, plus the legacy cache sweep when configured.
	pub fn start(config: &Config, cache: MetricsCache, collaborators: Collaborators) -> Running {
		let legacy_migration =
			config.cache.migrate_legacy_on_start.then(|| cache.convert_from_legacy());
		let service = Arc::new(Self::new(config.analysis.clone(), cache, collaborators));
		let rebuild_loop = spawn_rebuild_loop(service.clone());

		Running { service, rebuild_loop, legacy_migration }
	}

	/// Rebuilds both partitions from the latest tile and expectations and swaps them in.
	///
	/// On failure the installed snapshot is kept.
	pub async fn rebuild(&self) -> Result<RebuildReport> {
		let _writer = self.writer.lock().await;
		let started = Instant::now();

		tracing::info!("Rebuilding analysis snapshot.");

		let snapshot = match self.build_snapshot().await {
			Ok(snapshot) => snapshot,
			Err(err) => {
				self.collaborators.counters.error_increment(ANALYSIS_ERRORS);

				tracing::error!(error = %err, "Analysis rebuild failed. Keeping the previous snapshot.");

				return Err(err);
			},
		};
		let report = RebuildReport {
			commits: snapshot.current.tile.commits.len(),
			tests: snapshot.current.tile.traces.len(),
			traces: snapshot.current.tile.trace_count(),
			ignored_traces: snapshot.ignored.tile.trace_count(),
			elapsed_ms: started.elapsed().as_millis() as u64,
		};

		self.replace_snapshot(snapshot).await;
		self.collaborators.counters.increment(ANALYSIS_RUNS);

		tracing::info!(
			commits = report.commits,
			tests = report.tests,
			traces = report.traces,
			ignored_traces = report.ignored_traces,
			elapsed_ms = report.elapsed_ms,
			"Analysis snapshot rebuilt."
		);

		Ok(report)
	}

	async fn replace_snapshot(&self, snapshot: Snapshot) {
		*self.snapshot.write().await = Some(snapshot);
	}

	async fn build_snapshot(&self) -> Result<Snapshot> {
		let tile = with_timeout(
			"tile snapshot",
			Duration::from_millis(self.cfg.tile_timeout_ms),
			self.collaborators.tiles.get_modifiable_snapshot(),
		)
		.await?
		.map_err(|err| Error::TileStore { message: err.to_string() })?;
		let expectations = with_timeout(
			"expectations",
			Duration::from_millis(self.cfg.expectations_timeout_ms),
			self.collaborators.expectations.get(false),
		)
		.await?
		.map_err(|err| Error::Expectations { message: err.to_string() })?;
		let matcher = with_timeout(
			"ignore matcher",
			Duration::from_millis(self.cfg.ignores_timeout_ms),
			self.collaborators.ignores.build_matcher(),
		)
		.await?
		.map_err(|err| Error::IgnoreStore { message: err.to_string() })?;
		let unavailable = self.diffs.unavailable_digests().await;
		let Partition { mut of_interest, mut ignored } =
			partition_tile(&tile, &matcher, &unavailable);

		of_interest.label_digests(&expectations);
		ignored.label_digests(&expectations);

		let current = self.derive_partition(of_interest).await;
		let ignored = self.derive_partition(ignored).await;
		let status = Status {
			built_at: OffsetDateTime::now_utc(),
			current: partition_status(&current.tile),
			ignored: partition_status(&ignored.tile),
		};

		Ok(Snapshot { current, ignored, status })
	}

	async fn derive_partition(&self, tile: LabeledTile) -> PartitionState {
		let index = LabeledTileIndex::new(&tile);
		let window = 0..=tile.commits.len().saturating_sub(1);
		let counts =
			count_labels(&tile.commits, tile.iter_traces(), window, index.all_params(&ParamQuery::new()));
		let details = self.build_test_details(&tile.traces).await;

		PartitionState { tile, index, counts, details }
	}
}

/// Rebuilds immediately and then every `rebuild_interval_ms` until the task is aborted.
pub fn spawn_rebuild_loop(service: Arc<TriageService>) -> JoinHandle<()> {
	let period = Duration::from_millis(service.cfg.rebuild_interval_ms.max(1));

	tokio::spawn(async move {
		let mut ticker = tokio_time::interval(period);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			ticker.tick().await;

			// Failures are logged and counted by `rebuild`.
			let _ = service.rebuild().await;
		}
	})
}
