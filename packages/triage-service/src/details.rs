use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use triage_domain::{Commit, Digest, Label, PRIMARY_KEY_FIELD, ParamSet};

use crate::{
	Error, Result, TriageService,
	counts::{TileCounts, count_labels},
	expand::TestDetail,
	index::{ParamQuery, Query, QueryMatch},
};

#[derive(Clone, Debug, Default, Serialize)]
pub struct TestDetails {
	pub commits: Vec<Commit>,
	pub all_params: ParamSet,
	/// Sorted by test name.
	pub tests: Vec<TestDetail>,
	/// The effective form of the query that produced this response.
	pub query: ParamQuery,
	/// Only filled for single-test responses.
	pub commits_by_digest: BTreeMap<String, BTreeMap<Digest, Vec<usize>>>,
}

impl TriageService {
	pub async fn get_aggregate_counts(&self, query: &Query) -> Result<TileCounts> {
		let guard = self.snapshot.read().await;
		let snapshot = guard.as_ref().ok_or(Error::NotReady)?;
		let partition = snapshot.partition(query.include_ignores);
		let found = partition.index.query(&partition.tile, query)?;

		if found.is_unfiltered() {
			return Ok(partition.counts.clone());
		}

		let mut counts = count_labels(
			&partition.tile.commits,
			found.traces.iter().copied(),
			found.start..=found.end,
			partition.index.all_params(&query.params),
		);

		counts.query = found.effective;

		Ok(counts)
	}

	/// Details of every test matching `query`, restricted to the untriaged digests in its window.
	pub async fn list_test_details(&self, query: &Query) -> Result<TestDetails> {
		let guard = self.snapshot.read().await;
		let snapshot = guard.as_ref().ok_or(Error::NotReady)?;
		let partition = snapshot.partition(query.include_ignores);
		let found = partition.index.query(&partition.tile, query)?;

		if found.is_unfiltered() {
			return Ok(TestDetails {
				commits: partition.tile.commits.clone(),
				all_params: partition.counts.all_params.clone(),
				tests: partition.details.values().cloned().collect(),
				..Default::default()
			});
		}

		let mut untriaged = untriaged_in_window(&found, query.head);

		for test in partition.index.test_names(&query.params) {
			untriaged.entry(test).or_default();
		}

		let tests = untriaged
			.into_iter()
			.map(|(name, digests)| {
				let precomputed = partition.details.get(&name);

				restrict_detail(name, &digests, precomputed)
			})
			.collect();

		Ok(TestDetails {
			commits: partition.tile.commits.clone(),
			all_params: partition.index.all_params(&query.params),
			tests,
			query: found.effective,
			commits_by_digest: BTreeMap::new(),
		})
	}

	/// Details of one test. A query with no effective constraint and a window covering the tile
	/// returns the full precomputed detail.
	pub async fn get_test_details(&self, test: &str, query: &Query) -> Result<TestDetails> {
		let guard = self.snapshot.read().await;
		let snapshot = guard.as_ref().ok_or(Error::NotReady)?;
		let partition = snapshot.partition(query.include_ignores);
		let Some(detail) = partition.details.get(test) else {
			return Err(Error::NotFound { message: format!("Test {test:?} is not in the tile.") });
		};
		let mut scoped = query.clone();

		scoped.params.insert(PRIMARY_KEY_FIELD.to_string(), vec![test.to_string()]);

		let found = partition.index.query(&partition.tile, &scoped)?;
		let mut effective = found.effective.clone();

		effective.remove(PRIMARY_KEY_FIELD);

		let tested = if effective.is_empty() && found.covers_tile() {
			detail.clone()
		} else {
			let digests =
				untriaged_in_window(&found, query.head).remove(test).unwrap_or_default();

			restrict_detail(test.to_string(), &digests, Some(detail))
		};
		let commits_by_digest = partition
			.tile
			.commits_by_digest
			.get(test)
			.map(|by_digest| BTreeMap::from([(test.to_string(), by_digest.clone())]))
			.unwrap_or_default();

		Ok(TestDetails {
			commits: partition.tile.commits.clone(),
			all_params: partition.index.all_params(&query.params),
			tests: vec![tested],
			query: effective,
			commits_by_digest,
		})
	}
}

/// Untriaged digests per test among the matched traces.
///
/// With `head` set and a window reaching the tile head, only the latest value of each trace counts.
/// Otherwise every observation inside the window counts.
fn untriaged_in_window(found: &QueryMatch<'_>, head: bool) -> BTreeMap<String, BTreeSet<Digest>> {
	let mut untriaged = BTreeMap::<String, BTreeSet<Digest>>::new();

	for trace in &found.traces {
		if head && found.includes_head {
			if let Some((_, digest, Label::Untriaged)) = trace.head() {
				untriaged.entry(trace.test_name().to_string()).or_default().insert(digest.to_string());
			}

			continue;
		}

		for ((commit_id, digest), label) in
			trace.commit_ids.iter().zip(&trace.digests).zip(&trace.labels)
		{
			if *label == Label::Untriaged && found.contains_commit(*commit_id) {
				untriaged.entry(trace.test_name().to_string()).or_default().insert(digest.clone());
			}
		}
	}

	untriaged
}

fn restrict_detail(
	name: String,
	untriaged: &BTreeSet<Digest>,
	precomputed: Option<&TestDetail>,
) -> TestDetail {
	let Some(precomputed) = precomputed else {
		return TestDetail { name, ..Default::default() };
	};

	TestDetail {
		name,
		untriaged: untriaged
			.iter()
			.filter_map(|digest| {
				precomputed.untriaged.get(digest).map(|entry| (digest.clone(), entry.clone()))
			})
			.collect(),
		positive: precomputed.positive.clone(),
		negative: precomputed.negative.clone(),
	}
}
