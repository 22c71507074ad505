pub mod counts;
pub mod details;
pub mod diff_store;
pub mod expand;
pub mod ignores;
pub mod index;
pub mod labeling;
pub mod metrics;
pub mod rebuild;
pub mod status;
pub mod triage;

mod error;

pub use counts::{LabelCounts, TileCounts};
pub use details::TestDetails;
pub use diff_store::DiffStore;
pub use error::{Error, Result};
pub use expand::{DiffEntry, DigestInfo, TestDetail, UntriagedDigest};
pub use index::{LabeledTileIndex, ParamQuery, Query};
pub use labeling::{LabeledTile, LabeledTrace};
pub use metrics::{CounterRegistry, Counters};
pub use rebuild::{RebuildReport, Running, spawn_rebuild_loop};
pub use status::{PartitionStatus, Status};

use std::{collections::HashSet, future::Future, pin::Pin, sync::Arc, time::Duration};

use tokio::sync::{Mutex, RwLock};

use rebuild::Snapshot;
use triage_config::Analysis;
use triage_domain::{DiffMetric, Digest, Expectations, IgnoreRule, RuleMatcher, Tile};
use triage_storage::MetricsCache;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Turns a storage path into a URL a client can fetch.
pub type PathToUrl = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub trait TileStore
where
	Self: Send + Sync,
{
	fn get_snapshot<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Tile>>;

	/// Same as [`TileStore::get_snapshot`], but no ingestion may mutate the tile during the call.
	fn get_modifiable_snapshot<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Tile>>;
}

pub trait ExpectationsStore
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, force_refresh: bool) -> BoxFuture<'a, color_eyre::Result<Expectations>>;

	fn put<'a>(
		&'a self,
		expectations: &'a Expectations,
		actor: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

pub trait IgnoreStore
where
	Self: Send + Sync,
{
	fn list<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<Vec<IgnoreRule>>>;

	fn create<'a>(&'a self, rule: IgnoreRule) -> BoxFuture<'a, color_eyre::Result<()>>;

	/// Returns the number of rules removed.
	fn delete<'a>(&'a self, id: i64, actor: &'a str) -> BoxFuture<'a, color_eyre::Result<usize>>;

	fn build_matcher<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<RuleMatcher>>;
}

pub trait PixelDiffer
where
	Self: Send + Sync,
{
	fn compute<'a>(
		&'a self,
		left: &'a str,
		right: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<DiffMetric>>;

	/// Digests whose images cannot be fetched or decoded.
	fn unavailable_digests<'a>(&'a self) -> BoxFuture<'a, color_eyre::Result<HashSet<Digest>>>;

	fn abs_path(&self, digest: &str) -> String;
}

#[derive(Clone)]
pub struct Collaborators {
	pub tiles: Arc<dyn TileStore>,
	pub expectations: Arc<dyn ExpectationsStore>,
	pub ignores: Arc<dyn IgnoreStore>,
	pub differ: Arc<dyn PixelDiffer>,
	pub path_to_url: PathToUrl,
	pub counters: Arc<dyn Counters>,
}

/// Owns the labeled snapshots of both partitions and answers every query against them.
///
/// Rebuild and triage are serialized by `writer`. They compute outside `snapshot` and take its
/// write half only to swap in or patch the result, so queries wait at most for that step.
pub struct TriageService {
	pub cfg: Analysis,
	collaborators: Collaborators,
	diffs: Arc<DiffStore>,
	writer: Mutex<()>,
	snapshot: RwLock<Option<Snapshot>>,
}
impl TriageService {
	pub fn new(cfg: Analysis, cache: MetricsCache, collaborators: Collaborators) -> Self {
		let diffs = Arc::new(DiffStore::new(
			cache,
			collaborators.differ.clone(),
			collaborators.counters.clone(),
			Duration::from_millis(cfg.diff_timeout_ms),
		));

		Self { cfg, collaborators, diffs, writer: Mutex::new(()), snapshot: RwLock::new(None) }
	}

	/// Whether a snapshot has been installed.
	pub async fn is_ready(&self) -> bool {
		self.snapshot.read().await.is_some()
	}

	pub async fn get_param_universe(&self) -> Result<triage_domain::ParamSet> {
		let tile = with_timeout(
			"tile snapshot",
			Duration::from_millis(self.cfg.tile_timeout_ms),
			self.collaborators.tiles.get_snapshot(),
		)
		.await?
		.map_err(|err| Error::TileStore { message: err.to_string() })?;

		Ok(tile.param_set)
	}

	pub async fn get_status(&self) -> Result<Status> {
		let guard = self.snapshot.read().await;
		let snapshot = guard.as_ref().ok_or(Error::NotReady)?;

		Ok(snapshot.status.clone())
	}

	fn url_for_digest(&self, digest: &str) -> String {
		(self.collaborators.path_to_url)(&self.collaborators.differ.abs_path(digest))
	}
}

pub(crate) async fn with_timeout<F, T>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
	F: Future<Output = T>,
{
	tokio::time::timeout(limit, fut)
		.await
		.map_err(|_| Error::Timeout { operation: operation.to_string() })
}
