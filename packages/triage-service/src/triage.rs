use std::{collections::BTreeMap, time::Duration};

use triage_domain::TestClassification;

use crate::{
	Error, Result, TriageService, with_timeout,
	details::TestDetails,
	expand::TestDetail,
	index::ParamQuery,
	labeling::{LabeledTile, LabeledTrace},
	metrics::ANALYSIS_TRIAGE,
	rebuild::PartitionState,
	status::partition_status,
};

/// Test name to the labels assigned to its digests.
pub type LabelChanges = BTreeMap<String, TestClassification>;

impl TriageService {
	/// Persists `changes` and relabels the affected tests in both partitions.
	///
	/// Nothing local changes when the expectations store rejects the update. Aggregate counts keep
	/// the values of the last rebuild.
	pub async fn set_digest_labels(&self, changes: &LabelChanges, actor: &str) -> Result<TestDetails> {
		let _writer = self.writer.lock().await;
		let limit = Duration::from_millis(self.cfg.expectations_timeout_ms);
		let mut expectations =
			with_timeout("expectations", limit, self.collaborators.expectations.get(true))
				.await?
				.map_err(|err| Error::Expectations { message: err.to_string() })?;

		expectations.add_digests(changes);

		with_timeout(
			"expectations update",
			limit,
			self.collaborators.expectations.put(&expectations, actor),
		)
		.await?
		.map_err(|err| Error::Expectations { message: err.to_string() })?;

		self.collaborators.counters.increment(ANALYSIS_TRIAGE);

		tracing::info!(actor, tests = changes.len(), "Digest labels updated.");

		let (current, ignored) = {
			let guard = self.snapshot.read().await;
			let Some(snapshot) = guard.as_ref() else {
				tracing::info!("No analysis snapshot yet. Labels apply on the first rebuild.");

				return Ok(TestDetails::default());
			};

			(
				relabel_tests(&snapshot.current.tile, changes, &expectations),
				relabel_tests(&snapshot.ignored.tile, changes, &expectations),
			)
		};
		let current_details = self.build_test_details(&current).await;
		let ignored_details = self.build_test_details(&ignored).await;
		let mut guard = self.snapshot.write().await;
		let Some(snapshot) = guard.as_mut() else {
			return Ok(TestDetails::default());
		};

		patch_partition(&mut snapshot.current, current, current_details);
		patch_partition(&mut snapshot.ignored, ignored, ignored_details);

		snapshot.status.current = partition_status(&snapshot.current.tile);
		snapshot.status.ignored = partition_status(&snapshot.ignored.tile);

		let tests = changes
			.keys()
			.filter_map(|test| snapshot.current.details.get(test).cloned())
			.collect();

		Ok(TestDetails {
			commits: snapshot.current.tile.commits.clone(),
			all_params: snapshot.current.index.all_params(&ParamQuery::new()),
			tests,
			..Default::default()
		})
	}
}

fn relabel_tests(
	tile: &LabeledTile,
	changes: &LabelChanges,
	expectations: &triage_domain::Expectations,
) -> BTreeMap<String, Vec<LabeledTrace>> {
	changes
		.keys()
		.filter_map(|test| Some((test.clone(), tile.relabeled_test(test, expectations)?)))
		.collect()
}

/// Replaces the traces and details of the relabeled tests. Trace positions are unchanged, so the
/// index stays valid.
fn patch_partition(
	partition: &mut PartitionState,
	traces: BTreeMap<String, Vec<LabeledTrace>>,
	details: BTreeMap<String, TestDetail>,
) {
	partition.tile.traces.extend(traces);
	partition.details.extend(details);
}
